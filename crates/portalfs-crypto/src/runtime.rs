//! Shared backend runtime
//!
//! Backend modules are loaded once per process. The first caller drives
//! `ThresholdNetwork::initialize`; concurrent callers await the same in-flight
//! future. A failed initialization leaves the cell empty so the next call retries.

use crate::network::{NetworkError, ThresholdNetwork};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

static GLOBAL_RUNTIME: Mutex<Option<BackendRuntime>> = parking_lot::const_mutex(None);

/// Lifecycle of an adapter's lazy initialization
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    Initializing,
    Ready,
    /// Last attempt failed; the next operation retries
    Failed,
}

/// Memoized one-time initialization of shared backend modules
#[derive(Clone, Default)]
pub struct BackendRuntime {
    modules: Arc<OnceCell<()>>,
}

impl BackendRuntime {
    /// A runtime isolated from the process-wide one
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide runtime
    pub fn global() -> Self {
        GLOBAL_RUNTIME.lock().get_or_insert_with(Self::new).clone()
    }

    /// Drop the process-wide runtime so the next `global()` starts fresh.
    ///
    /// Handles obtained before the reset keep their own state.
    pub fn reset() {
        *GLOBAL_RUNTIME.lock() = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.modules.initialized()
    }

    /// Initialize backend modules unless this runtime already has
    pub async fn ensure_initialized(
        &self,
        network: &dyn ThresholdNetwork,
    ) -> Result<(), NetworkError> {
        self.modules
            .get_or_try_init(|| async {
                debug!("Loading threshold backend modules");
                network.initialize().await
            })
            .await
            .map(|_| ())
    }
}

impl std::fmt::Debug for BackendRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRuntime")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_is_shared_until_reset() {
        let a = BackendRuntime::global();
        let b = BackendRuntime::global();
        assert!(Arc::ptr_eq(&a.modules, &b.modules));

        BackendRuntime::reset();
        let c = BackendRuntime::global();
        assert!(!Arc::ptr_eq(&a.modules, &c.modules));
    }

    #[test]
    fn test_new_runtime_is_isolated() {
        let runtime = BackendRuntime::new();
        assert!(!runtime.is_initialized());
        assert!(!Arc::ptr_eq(
            &runtime.modules,
            &BackendRuntime::global().modules
        ));
    }
}
