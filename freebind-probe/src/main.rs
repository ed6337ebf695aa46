//! Simple application for checking the preloaded shim in a controlled environment.
//!
//! `LD_PRELOAD=target/debug/libfreebind_preload.so FREEBIND_RANDOM=203.0.113.0/24 freebind-probe`
use std::net::IpAddr;
use eyre::{bail, Context};
use freebind::{RangeRegistry, ShimConfig};
use freebind_common::{AddressFamily, CidrRange, SocketAddress};
use libc::{c_int, sockaddr, sockaddr_storage, socklen_t};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let registry = ShimConfig::from_env()
        .random_ranges
        .as_deref()
        .map(RangeRegistry::from_config)
        .unwrap_or_default();
    let samples: usize = std::env::args()
        .nth(1)
        .map(|n| n.parse::<usize>())
        .transpose()
        .context("Expected a sample count as the only argument")?
        .unwrap_or(3);

    for family in [AddressFamily::V4, AddressFamily::V6] {
        for _ in 0..samples {
            unsafe { probe(family, registry.ranges(family))? };
        }
    }

    Ok(())
}

unsafe fn probe(family: AddressFamily, ranges: &[CidrRange]) -> eyre::Result<()> {
    let sock = create_socket(family)?;
    let freebind = freebind_enabled(sock);
    let local = local_address(sock);
    libc::close(sock);

    let verdict = match local {
        Some(ip) if ranges.iter().any(|r| r.contains(ip)) => "inside a configured range",
        Some(_) => "OUTSIDE every configured range",
        None => "unbound",
    };
    println!("{family:?} socket {sock}: freebind={freebind}, local={local:?} ({verdict})");

    Ok(())
}

unsafe fn create_socket(family: AddressFamily) -> eyre::Result<c_int> {
    let sock = libc::socket(family.domain(), libc::SOCK_DGRAM, 0);
    if sock < 0 {
        bail!("Failed to create {family:?} socket: {}", std::io::Error::last_os_error());
    }
    Ok(sock)
}

unsafe fn freebind_enabled(sock: c_int) -> bool {
    let mut value: c_int = 0;
    let mut len = std::mem::size_of::<c_int>() as socklen_t;
    let result = libc::getsockopt(sock, libc::SOL_IP, libc::IP_FREEBIND, (&mut value as *mut c_int).cast(), &mut len);

    result == 0 && value != 0
}

/// The bound address, `None` while the socket is still on the wildcard address.
unsafe fn local_address(sock: c_int) -> Option<IpAddr> {
    let mut storage: sockaddr_storage = std::mem::zeroed();
    let mut len = std::mem::size_of::<sockaddr_storage>() as socklen_t;
    if libc::getsockname(sock, (&mut storage as *mut sockaddr_storage).cast::<sockaddr>(), &mut len) != 0 {
        return None;
    }

    let ip = SocketAddress::from_storage(&storage)?.ip();
    (!ip.is_unspecified()).then_some(ip)
}
