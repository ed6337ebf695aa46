use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use arc_swap::ArcSwapOption;
use freebind_common::{random, AddressFamily, SocketAddress};
use rand::rngs::SmallRng;

mod hooking;
mod trace;
pub mod config;
pub mod registry;

pub use config::ShimConfig;
pub use hooking::{socket_hook, FreebindSocket, LibcControl, NextSocket, RawSocketFn, SocketControl, SocketFactory};
pub use registry::RangeRegistry;

static CONTEXT: OnceLock<ShimContext> = OnceLock::new();

/// Process-wide state of the shim.
///
/// Built once by [ensure_initialized], read lock-free afterwards, and torn down by an `atexit` hook.
/// After teardown the registry is gone and sockets only get freebind.
pub struct ShimContext {
    registry: ArcSwapOption<RangeRegistry>,
    rng: Mutex<SmallRng>,
}

impl ShimContext {
    pub fn new(config: &ShimConfig) -> Self {
        Self::with_rng(config, random::clock_seeded())
    }

    pub fn with_rng(config: &ShimConfig, rng: SmallRng) -> Self {
        let registry = config
            .random_ranges
            .as_deref()
            .map(RangeRegistry::from_config)
            .unwrap_or_default();

        tracing::debug!(
            ipv4 = ?registry.ranges(AddressFamily::V4),
            ipv6 = ?registry.ranges(AddressFamily::V6),
            "Range registry initialised"
        );

        Self {
            registry: ArcSwapOption::from_pointee(registry),
            rng: Mutex::new(rng),
        }
    }

    /// The live registry, `None` once torn down.
    pub fn registry(&self) -> Option<Arc<RangeRegistry>> {
        self.registry.load_full()
    }

    /// A random address from one of the `family` ranges, `None` if there are none.
    pub fn random_address(&self, family: AddressFamily) -> Option<SocketAddress> {
        let registry = self.registry.load();
        let ranges = (*registry).as_ref()?.ranges(family);
        if ranges.is_empty() {
            return None;
        }

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let range = random::choose_range(ranges, &mut *rng)?;
        Some(random::random_address(range, &mut *rng))
    }

    /// Release the registry. Returns whether anything was released, so repeated calls are no-ops.
    pub fn teardown(&self) -> bool {
        let released = self.registry.swap(None);
        if released.is_some() {
            tracing::debug!("Range registry released");
        }
        released.is_some()
    }
}

/// The single access point to the process-wide [ShimContext], initialising it on first use.
///
/// Reads the configuration from the environment exactly once, concurrent first callers wait for the winner.
pub fn ensure_initialized() -> &'static ShimContext {
    CONTEXT.get_or_init(|| {
        let config = ShimConfig::from_env();
        if let Err(e) = trace::create_subscriber(&config.log) {
            eprintln!("freebind: failed to set up logging: {e:?}");
        }

        let context = ShimContext::new(&config);
        register_exit_hook();
        context
    })
}

extern "C" fn teardown_at_exit() {
    if let Some(context) = CONTEXT.get() {
        context.teardown();
    }
}

fn register_exit_hook() {
    // SAFETY: `teardown_at_exit` never unwinds and only touches the already initialised context.
    if unsafe { libc::atexit(teardown_at_exit) } != 0 {
        tracing::warn!("Could not register exit hook, ranges will be reclaimed by the OS");
    }
}
