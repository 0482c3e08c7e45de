use parking_lot::Mutex;
use tracing::debug;

use crate::{backend::RuntimeInitializer, error::ZkResult};

type Setup = Box<dyn Fn() -> ZkResult<()> + Send + Sync>;

/// Runs a setup routine at most once successfully. A failed setup leaves the
/// runtime uninitialized so the next call tries again.
pub struct OnceRuntime {
    setup: Setup,
    initialized: Mutex<bool>,
}

impl OnceRuntime {
    pub fn new<F>(setup: F) -> Self
    where
        F: Fn() -> ZkResult<()> + Send + Sync + 'static,
    {
        Self {
            setup: Box::new(setup),
            initialized: Mutex::new(false),
        }
    }

    pub fn noop() -> Self {
        Self::new(|| Ok(()))
    }

    pub fn is_initialized(&self) -> bool {
        *self.initialized.lock()
    }
}

impl RuntimeInitializer for OnceRuntime {
    fn init(&self) -> ZkResult<bool> {
        let mut initialized = self.initialized.lock();
        if *initialized {
            return Ok(false);
        }
        (self.setup)()?;
        *initialized = true;
        debug!("native runtime initialized");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ZkError;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[test]
    fn reports_first_initialization_only() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let runtime = OnceRuntime::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(runtime.init().unwrap());
        assert!(!runtime.init().unwrap());
        assert!(runtime.is_initialized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_setup_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let runtime = OnceRuntime::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ZkError::new("wasm module missing"))
            } else {
                Ok(())
            }
        });
        assert_eq!(runtime.init().unwrap_err(), ZkError::new("wasm module missing"));
        assert!(!runtime.is_initialized());
        assert!(runtime.init().unwrap());
    }
}
