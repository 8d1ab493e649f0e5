//! One-shot pool initialization.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::pool::SlotPool;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Parking lot can be initialized only once")]
pub struct AlreadyInitialized;

/// Guards construction of the process' parking lot.
///
/// The first `initialize` wins the flag and installs the pool; every later
/// call fails without touching the installed instance.
#[derive(Debug, Default)]
pub struct PoolInitializer {
    initialized: AtomicBool,
    pool: OnceLock<Arc<SlotPool>>,
}

impl PoolInitializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(
        &self,
        name: impl Into<String>,
        capacity: usize,
    ) -> Result<Arc<SlotPool>, AlreadyInitialized> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("Rejected repeated parking lot initialization");
            return Err(AlreadyInitialized);
        }

        let name = name.into();
        tracing::info!(lot = %name, capacity, "Initializing parking lot");
        let pool = Arc::new(SlotPool::new(name, capacity));

        // Only the flag winner gets here, so the cell is still empty.
        if self.pool.set(Arc::clone(&pool)).is_err() {
            tracing::error!("Bug: parking lot installed twice");
        }
        tracing::info!("Parking lot initialized");
        Ok(pool)
    }

    /// The installed pool, once `initialize` has completed.
    pub fn get(&self) -> Option<Arc<SlotPool>> {
        self.pool.get().cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}
