use std::fmt::Debug;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use libc::{c_int, sa_family_t, sockaddr, sockaddr_in, sockaddr_in6, sockaddr_storage, socklen_t, AF_INET, AF_INET6};

pub mod bits;
pub mod cidr;
pub mod random;

pub use cidr::{CidrRange, ParseError};

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Map a `socket()` domain onto a family we can pick addresses for.
    ///
    /// Anything other than `AF_INET`/`AF_INET6` yields `None`, which callers treat as "no range available".
    pub fn from_domain(domain: c_int) -> Option<Self> {
        match domain {
            AF_INET => Some(AddressFamily::V4),
            AF_INET6 => Some(AddressFamily::V6),
            _ => None,
        }
    }

    pub fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    pub const fn domain(self) -> c_int {
        match self {
            AddressFamily::V4 => AF_INET,
            AddressFamily::V6 => AF_INET6,
        }
    }

    /// Width of an address of this family in bytes.
    pub const fn byte_len(self) -> usize {
        match self {
            AddressFamily::V4 => 4,
            AddressFamily::V6 => 16,
        }
    }
}

/// A ready-to-bind socket address, sized exactly to the structure its family requires.
#[derive(Clone, Copy)]
pub enum SocketAddress {
    V4(sockaddr_in),
    V6(sockaddr_in6),
}

impl SocketAddress {
    /// Build a zero-port address from a 16 byte network-order buffer.
    ///
    /// IPv4 takes the first 4 bytes and ignores the rest.
    pub fn from_octets(family: AddressFamily, octets: &[u8; 16]) -> Self {
        match family {
            AddressFamily::V4 => {
                let [a, b, c, d, ..] = *octets;
                Self::from_ip(IpAddr::V4(Ipv4Addr::new(a, b, c, d)), 0)
            }
            AddressFamily::V6 => Self::from_ip(IpAddr::V6(Ipv6Addr::from(*octets)), 0),
        }
    }

    pub fn from_ip(ip: IpAddr, port: u16) -> Self {
        match ip {
            IpAddr::V4(ip) => {
                // SAFETY: `sockaddr_in` is plain old data, all-zero is a valid value.
                let mut addr: sockaddr_in = unsafe { std::mem::zeroed() };
                addr.sin_family = AF_INET as sa_family_t;
                addr.sin_port = port.to_be();
                // `s_addr` is stored in network order, so the in-memory bytes are the octets.
                addr.sin_addr.s_addr = u32::from_ne_bytes(ip.octets());
                SocketAddress::V4(addr)
            }
            IpAddr::V6(ip) => {
                // SAFETY: `sockaddr_in6` is plain old data, all-zero is a valid value.
                let mut addr: sockaddr_in6 = unsafe { std::mem::zeroed() };
                addr.sin6_family = AF_INET6 as sa_family_t;
                addr.sin6_port = port.to_be();
                addr.sin6_addr.s6_addr = ip.octets();
                SocketAddress::V6(addr)
            }
        }
    }

    /// Decode the address written by `getsockname`/`accept` into a `sockaddr_storage`.
    pub fn from_storage(storage: &sockaddr_storage) -> Option<Self> {
        let ptr: *const sockaddr_storage = storage;
        match c_int::from(storage.ss_family) {
            // SAFETY: the family tag says which layout the storage holds, and storage is large enough for both.
            AF_INET => Some(SocketAddress::V4(unsafe { *ptr.cast::<sockaddr_in>() })),
            AF_INET6 => Some(SocketAddress::V6(unsafe { *ptr.cast::<sockaddr_in6>() })),
            _ => None,
        }
    }

    pub fn family(&self) -> AddressFamily {
        match self {
            SocketAddress::V4(_) => AddressFamily::V4,
            SocketAddress::V6(_) => AddressFamily::V6,
        }
    }

    pub fn ip(&self) -> IpAddr {
        match self {
            SocketAddress::V4(addr) => IpAddr::V4(Ipv4Addr::from(addr.sin_addr.s_addr.to_ne_bytes())),
            SocketAddress::V6(addr) => IpAddr::V6(Ipv6Addr::from(addr.sin6_addr.s6_addr)),
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            SocketAddress::V4(addr) => u16::from_be(addr.sin_port),
            SocketAddress::V6(addr) => u16::from_be(addr.sin6_port),
        }
    }

    /// Pointer and length pair as expected by `bind(2)`.
    ///
    /// The pointer borrows from `self` and must not outlive it.
    pub fn as_raw(&self) -> (*const sockaddr, socklen_t) {
        match self {
            SocketAddress::V4(addr) => (
                (addr as *const sockaddr_in).cast(),
                std::mem::size_of::<sockaddr_in>() as socklen_t,
            ),
            SocketAddress::V6(addr) => (
                (addr as *const sockaddr_in6).cast(),
                std::mem::size_of::<sockaddr_in6>() as socklen_t,
            ),
        }
    }
}

impl Debug for SocketAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", SocketAddr::from(*self))
    }
}

impl From<SocketAddress> for SocketAddr {
    fn from(value: SocketAddress) -> Self {
        SocketAddr::new(value.ip(), value.port())
    }
}
