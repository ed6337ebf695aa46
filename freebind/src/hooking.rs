use std::ffi::{c_int, c_void, CStr};
use std::io;
use std::sync::OnceLock;
use freebind_common::{AddressFamily, SocketAddress};
use crate::ShimContext;

pub type RawSocketFn = unsafe extern "C" fn(c_int, c_int, c_int) -> c_int;

static NEXT_SOCKET: OnceLock<NextSocket> = OnceLock::new();

/// Something which creates sockets with `socket(2)` semantics: a descriptor, or `-1` with `errno` set.
pub trait SocketFactory {
    fn create(&self, domain: c_int, socket_type: c_int, protocol: c_int) -> c_int;
}

impl<T: SocketFactory + ?Sized> SocketFactory for &T {
    fn create(&self, domain: c_int, socket_type: c_int, protocol: c_int) -> c_int {
        (**self).create(domain, socket_type, protocol)
    }
}

/// The calls we make on a freshly created socket.
pub trait SocketControl {
    fn enable_freebind(&self, fd: c_int) -> io::Result<()>;

    fn bind(&self, fd: c_int, address: &SocketAddress) -> io::Result<()>;
}

impl<T: SocketControl + ?Sized> SocketControl for &T {
    fn enable_freebind(&self, fd: c_int) -> io::Result<()> {
        (**self).enable_freebind(fd)
    }

    fn bind(&self, fd: c_int, address: &SocketAddress) -> io::Result<()> {
        (**self).bind(fd, address)
    }
}

/// The genuine `socket` implementation, found in the next object after ours in symbol resolution order.
#[derive(Debug, Clone, Copy)]
pub struct NextSocket(RawSocketFn);

impl NextSocket {
    pub fn resolve() -> eyre::Result<Self> {
        // SAFETY: the symbol name is a NUL terminated literal.
        let symbol = unsafe { libc::dlsym(libc::RTLD_NEXT, c"socket".as_ptr()) };
        if symbol.is_null() {
            eyre::bail!("Could not resolve the next `socket` symbol: {}", dlerror_message());
        }

        // SAFETY: every libc exports `socket` with exactly this signature.
        Ok(Self(unsafe { std::mem::transmute::<*mut c_void, RawSocketFn>(symbol) }))
    }

    /// The cached genuine implementation.
    ///
    /// Without it no socket can be created at all, so a failed lookup aborts the process.
    pub fn get() -> Self {
        *NEXT_SOCKET.get_or_init(|| match Self::resolve() {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(?e, "No genuine `socket` to forward to");
                eprintln!("freebind: {e}");
                std::process::abort()
            }
        })
    }
}

impl SocketFactory for NextSocket {
    fn create(&self, domain: c_int, socket_type: c_int, protocol: c_int) -> c_int {
        // SAFETY: forwards the caller's arguments unchanged, exactly as the unhooked call would.
        unsafe { (self.0)(domain, socket_type, protocol) }
    }
}

fn dlerror_message() -> String {
    // SAFETY: `dlerror` returns either null or a valid C string owned by the loader.
    unsafe {
        let message = libc::dlerror();
        if message.is_null() {
            "unknown error".to_string()
        } else {
            CStr::from_ptr(message).to_string_lossy().into_owned()
        }
    }
}

/// Plain `setsockopt`/`bind` calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibcControl;

impl SocketControl for LibcControl {
    fn enable_freebind(&self, fd: c_int) -> io::Result<()> {
        let enable: c_int = 1;
        // SAFETY: the option value points to a live `c_int` of the stated size.
        let result = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_IP,
                libc::IP_FREEBIND,
                (&enable as *const c_int).cast(),
                std::mem::size_of::<c_int>() as libc::socklen_t,
            )
        };

        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn bind(&self, fd: c_int, address: &SocketAddress) -> io::Result<()> {
        let (name, len) = address.as_raw();
        // SAFETY: `name` borrows `address`, which outlives the call, and `len` matches its layout.
        if unsafe { libc::bind(fd, name, len) } == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// Wraps a [SocketFactory]: every IPv4/IPv6 socket it creates gets freebind, and if the context holds ranges for
/// the socket's family it is bound to a random address in one of them.
///
/// Neither step can make socket creation fail, the caller always sees exactly what the inner factory returned.
pub struct FreebindSocket<'a, F, C> {
    next: F,
    control: C,
    context: &'a ShimContext,
}

impl<'a, F: SocketFactory, C: SocketControl> FreebindSocket<'a, F, C> {
    pub fn new(next: F, control: C, context: &'a ShimContext) -> Self {
        Self { next, control, context }
    }
}

impl<F: SocketFactory, C: SocketControl> SocketFactory for FreebindSocket<'_, F, C> {
    #[tracing::instrument(level = "trace", skip(self))]
    fn create(&self, domain: c_int, socket_type: c_int, protocol: c_int) -> c_int {
        let fd = self.next.create(domain, socket_type, protocol);
        if fd < 0 {
            return fd;
        }
        let Some(family) = AddressFamily::from_domain(domain) else {
            return fd;
        };

        if let Err(e) = self.control.enable_freebind(fd) {
            tracing::debug!(fd, %e, "Failed to enable freebind");
        }

        if let Some(address) = self.context.random_address(family) {
            match self.control.bind(fd, &address) {
                Ok(()) => tracing::trace!(fd, ?address, "Bound to random address"),
                Err(e) => tracing::debug!(fd, ?address, %e, "Random bind failed, leaving socket unbound"),
            }
        }

        fd
    }
}

/// Body of the exported `socket` override.
pub fn socket_hook(domain: c_int, socket_type: c_int, protocol: c_int) -> c_int {
    let context = crate::ensure_initialized();

    FreebindSocket::new(NextSocket::get(), LibcControl, context).create(domain, socket_type, protocol)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use freebind_common::CidrRange;
    use crate::ShimConfig;
    use super::*;

    const FD: c_int = 42;

    struct FakeFactory {
        result: c_int,
        calls: RefCell<Vec<(c_int, c_int, c_int)>>,
    }

    impl FakeFactory {
        fn returning(result: c_int) -> Self {
            Self {
                result,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl SocketFactory for FakeFactory {
        fn create(&self, domain: c_int, socket_type: c_int, protocol: c_int) -> c_int {
            self.calls.borrow_mut().push((domain, socket_type, protocol));
            self.result
        }
    }

    #[derive(Default)]
    struct RecordingControl {
        fail: bool,
        freebind: RefCell<Vec<c_int>>,
        binds: RefCell<Vec<(c_int, SocketAddress)>>,
    }

    impl RecordingControl {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn outcome(&self) -> io::Result<()> {
            if self.fail {
                Err(io::Error::from_raw_os_error(libc::EADDRNOTAVAIL))
            } else {
                Ok(())
            }
        }
    }

    impl SocketControl for RecordingControl {
        fn enable_freebind(&self, fd: c_int) -> io::Result<()> {
            self.freebind.borrow_mut().push(fd);
            self.outcome()
        }

        fn bind(&self, fd: c_int, address: &SocketAddress) -> io::Result<()> {
            self.binds.borrow_mut().push((fd, *address));
            self.outcome()
        }
    }

    fn context(config: ShimConfig) -> ShimContext {
        ShimContext::with_rng(&config, SmallRng::seed_from_u64(3))
    }

    #[test]
    fn v4_socket_is_bound_inside_range() {
        let context = context(ShimConfig::with_ranges("203.0.113.0/24"));
        let range: CidrRange = "203.0.113.0/24".parse().unwrap();
        let factory = FakeFactory::returning(FD);
        let control = RecordingControl::default();
        let hook = FreebindSocket::new(&factory, &control, &context);

        for _ in 0..50 {
            assert_eq!(hook.create(libc::AF_INET, libc::SOCK_STREAM, 0), FD);
        }

        assert_eq!(factory.calls.borrow().len(), 50);
        assert!(factory.calls.borrow().iter().all(|c| *c == (libc::AF_INET, libc::SOCK_STREAM, 0)));
        assert_eq!(control.freebind.borrow().len(), 50);

        let binds = control.binds.borrow();
        assert_eq!(binds.len(), 50);
        for (fd, address) in binds.iter() {
            assert_eq!(*fd, FD);
            assert_eq!(address.family(), AddressFamily::V4);
            assert_eq!(address.port(), 0);
            assert!(range.contains(address.ip()), "{address:?} outside {range}");
        }
    }

    #[test]
    fn v6_socket_without_v6_ranges_is_not_bound() {
        let context = context(ShimConfig::with_ranges("203.0.113.0/24"));
        let factory = FakeFactory::returning(FD);
        let control = RecordingControl::default();

        let fd = FreebindSocket::new(&factory, &control, &context).create(libc::AF_INET6, libc::SOCK_DGRAM, 0);

        assert_eq!(fd, FD);
        assert_eq!(*control.freebind.borrow(), [FD]);
        assert!(control.binds.borrow().is_empty());
    }

    #[test]
    fn v6_socket_is_bound_inside_v6_range() {
        let context = context(ShimConfig::with_ranges("10.0.0.0/8, 2001:db8:abcd::/48"));
        let range: CidrRange = "2001:db8:abcd::/48".parse().unwrap();
        let factory = FakeFactory::returning(FD);
        let control = RecordingControl::default();

        FreebindSocket::new(&factory, &control, &context).create(libc::AF_INET6, libc::SOCK_DGRAM, 0);

        let binds = control.binds.borrow();
        assert_eq!(binds.len(), 1);
        assert_eq!(binds[0].1.family(), AddressFamily::V6);
        assert!(range.contains(binds[0].1.ip()));
    }

    #[test]
    fn without_config_only_freebind_is_applied() {
        let context = context(ShimConfig::default());
        let factory = FakeFactory::returning(FD);
        let control = RecordingControl::default();
        let hook = FreebindSocket::new(&factory, &control, &context);

        hook.create(libc::AF_INET, libc::SOCK_DGRAM, 0);
        hook.create(libc::AF_INET6, libc::SOCK_STREAM, 0);

        assert_eq!(*control.freebind.borrow(), [FD, FD]);
        assert!(control.binds.borrow().is_empty());
    }

    #[test]
    fn failed_creation_is_passed_through() {
        let context = context(ShimConfig::with_ranges("10.0.0.0/8"));
        let factory = FakeFactory::returning(-1);
        let control = RecordingControl::default();

        let fd = FreebindSocket::new(&factory, &control, &context).create(libc::AF_INET, libc::SOCK_RAW, 255);

        assert_eq!(fd, -1);
        assert_eq!(*factory.calls.borrow(), [(libc::AF_INET, libc::SOCK_RAW, 255)]);
        assert!(control.freebind.borrow().is_empty());
        assert!(control.binds.borrow().is_empty());
    }

    #[test]
    fn other_domains_are_untouched() {
        let context = context(ShimConfig::with_ranges("10.0.0.0/8, 2001:db8::/32"));
        let factory = FakeFactory::returning(FD);
        let control = RecordingControl::default();
        let hook = FreebindSocket::new(&factory, &control, &context);

        assert_eq!(hook.create(libc::AF_UNIX, libc::SOCK_STREAM, 0), FD);
        assert_eq!(hook.create(libc::AF_NETLINK, libc::SOCK_RAW, 0), FD);

        assert!(control.freebind.borrow().is_empty());
        assert!(control.binds.borrow().is_empty());
    }

    #[test]
    fn syscall_failures_are_not_propagated() {
        let context = context(ShimConfig::with_ranges("10.0.0.0/8"));
        let factory = FakeFactory::returning(FD);
        let control = RecordingControl::failing();

        let fd = FreebindSocket::new(&factory, &control, &context).create(libc::AF_INET, libc::SOCK_DGRAM, 0);

        assert_eq!(fd, FD);
        assert_eq!(control.freebind.borrow().len(), 1);
        assert_eq!(control.binds.borrow().len(), 1);
    }

    #[test]
    fn torn_down_context_only_applies_freebind() {
        let context = context(ShimConfig::with_ranges("10.0.0.0/8"));
        context.teardown();
        let factory = FakeFactory::returning(FD);
        let control = RecordingControl::default();

        FreebindSocket::new(&factory, &control, &context).create(libc::AF_INET, libc::SOCK_DGRAM, 0);

        assert_eq!(*control.freebind.borrow(), [FD]);
        assert!(control.binds.borrow().is_empty());
    }

    #[test]
    fn real_socket_is_freebind_and_bound() {
        let context = context(ShimConfig::with_ranges("127.0.0.0/8"));
        let range: CidrRange = "127.0.0.0/8".parse().unwrap();
        let next = NextSocket::resolve().unwrap();

        let fd = FreebindSocket::new(next, LibcControl, &context).create(libc::AF_INET, libc::SOCK_DGRAM, 0);
        assert!(fd >= 0, "socket failed: {}", io::Error::last_os_error());

        let mut enabled: c_int = 0;
        let mut len = std::mem::size_of::<c_int>() as libc::socklen_t;
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let mut storage_len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        unsafe {
            assert_eq!(
                libc::getsockopt(fd, libc::SOL_IP, libc::IP_FREEBIND, (&mut enabled as *mut c_int).cast(), &mut len),
                0
            );
            assert_eq!(
                libc::getsockname(fd, (&mut storage as *mut libc::sockaddr_storage).cast(), &mut storage_len),
                0
            );
            libc::close(fd);
        }

        assert_eq!(enabled, 1);
        let local = SocketAddress::from_storage(&storage).unwrap();
        assert!(range.contains(local.ip()), "bound to {local:?}");
    }
}
