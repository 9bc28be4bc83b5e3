//! Cache memory accounting with optional byte limit
//!
//! **Why**: A full time series can exceed RAM (`frames × frame size`).
//! The frame cache asks the budget whether an insert would overflow and
//! evicts least-recently-used slots until it fits.
//!
//! **Used by**: FrameCache (one budget per cache)

use log::{debug, info};
use sysinfo::System;

/// Byte usage tracker for one frame cache
#[derive(Debug, Clone, Default)]
pub struct MemoryBudget {
    /// Bytes currently held by cached frames
    usage: usize,
    /// Maximum allowed bytes (None = unlimited)
    limit: Option<usize>,
}

impl MemoryBudget {
    /// Unlimited budget (tracks usage only)
    pub fn unlimited() -> Self {
        Self { usage: 0, limit: None }
    }

    /// Fixed byte limit
    pub fn with_limit(bytes: usize) -> Self {
        Self {
            usage: 0,
            limit: Some(bytes),
        }
    }

    /// Limit derived from available system memory
    ///
    /// # Arguments
    ///
    /// * `mem_fraction` - Fraction of available memory (0.0-1.0, e.g. 0.75 = 75%)
    /// * `reserve_gb` - Memory left to the system (GB)
    pub fn from_system(mem_fraction: f64, reserve_gb: f64) -> Self {
        let limit = system_limit(mem_fraction, reserve_gb);
        Self::with_limit(limit)
    }

    pub fn usage(&self) -> usize {
        self.usage
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Would adding `bytes` exceed the limit?
    pub fn would_exceed(&self, bytes: usize) -> bool {
        match self.limit {
            Some(limit) => self.usage.saturating_add(bytes) > limit,
            None => false,
        }
    }

    pub fn add(&mut self, bytes: usize) {
        self.usage = self.usage.saturating_add(bytes);
        if let Some(limit) = self.limit {
            if self.usage > limit {
                debug!(
                    "Cache over budget: {} MB / {} MB",
                    self.usage / 1024 / 1024,
                    limit / 1024 / 1024
                );
            }
        }
    }

    /// Saturating, never underflows
    pub fn free(&mut self, bytes: usize) {
        self.usage = self.usage.saturating_sub(bytes);
    }

    pub fn reset(&mut self) {
        self.usage = 0;
    }

    /// Usage as a fraction of the limit (0.0 when unlimited)
    pub fn usage_fraction(&self) -> f64 {
        match self.limit {
            Some(0) | None => 0.0,
            Some(limit) => self.usage as f64 / limit as f64,
        }
    }
}

/// Compute a byte limit from currently available memory
pub fn system_limit(mem_fraction: f64, reserve_gb: f64) -> usize {
    let mut sys = System::new();
    sys.refresh_memory();

    let available = sys.available_memory() as usize;
    let reserve = (reserve_gb * 1024.0 * 1024.0 * 1024.0) as usize;
    let usable = available.saturating_sub(reserve);
    let limit = (usable as f64 * mem_fraction.clamp(0.0, 1.0)) as usize;

    info!(
        "Cache budget: available={} MB, reserve={} MB, limit={} MB ({}%)",
        available / 1024 / 1024,
        reserve / 1024 / 1024,
        limit / 1024 / 1024,
        (mem_fraction * 100.0) as u32
    );
    limit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_tracking() {
        let mut budget = MemoryBudget::with_limit(1024);
        budget.add(512);
        assert_eq!(budget.usage(), 512);
        assert!(!budget.would_exceed(512));
        assert!(budget.would_exceed(513));

        budget.free(1000);
        assert_eq!(budget.usage(), 0);
    }

    #[test]
    fn test_unlimited_never_exceeds() {
        let mut budget = MemoryBudget::unlimited();
        budget.add(usize::MAX / 2);
        assert!(!budget.would_exceed(usize::MAX / 2));
        assert_eq!(budget.usage_fraction(), 0.0);
    }

    #[test]
    fn test_system_budget_has_limit() {
        let budget = MemoryBudget::from_system(0.5, 0.0);
        assert!(budget.limit().is_some());
        assert_eq!(budget.usage(), 0);
    }
}
