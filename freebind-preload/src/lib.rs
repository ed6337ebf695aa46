//! Preloadable shim, e.g. `LD_PRELOAD=libfreebind_preload.so FREEBIND_RANDOM="10.0.0.0/8, 2001:db8::/32" <program>`.
use libc::c_int;

/// Replaces the process-wide `socket`, see [freebind::socket_hook].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn socket(domain: c_int, socket_type: c_int, protocol: c_int) -> c_int {
    match std::panic::catch_unwind(|| freebind::socket_hook(domain, socket_type, protocol)) {
        Ok(fd) => fd,
        Err(e) => {
            // The real `socket` may already have run, there is no sane value left to return.
            eprintln!("freebind: `socket` hook has panicked: {:#?}", e);
            std::process::abort()
        }
    }
}
