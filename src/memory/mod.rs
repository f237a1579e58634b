//! Device memory substrate
//!
//! Device allocations are emulated as host-resident buffers that are only
//! reachable through [`crate::DeviceArray`] handles. Every allocation is
//! charged against a process-wide counter so that solvers can report their
//! device footprint and so that an installed [`DeviceMemoryLimits`] can refuse
//! requests once the device is "full".
//!
//! # Architecture
//!
//! - `buffer`: reference-counted fixed-length allocations with read/write guards
//! - `limits`: memory budget detection and enforcement

mod buffer;
mod limits;

pub(crate) use buffer::DeviceBuffer;
pub use limits::{DeviceMemoryLimits, DEVICE_MEMORY_ENV, USABLE_FRACTION};

use crate::Result;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

static ALLOCATED: AtomicUsize = AtomicUsize::new(0);
static PEAK: AtomicUsize = AtomicUsize::new(0);
static LIMITS: OnceLock<RwLock<DeviceMemoryLimits>> = OnceLock::new();

fn limits_cell() -> &'static RwLock<DeviceMemoryLimits> {
    LIMITS.get_or_init(|| RwLock::new(DeviceMemoryLimits::detect()))
}

/// Bytes currently held by live device buffers
#[must_use]
pub fn allocated_bytes() -> usize {
    ALLOCATED.load(Ordering::Acquire)
}

/// Highest value [`allocated_bytes`] has reached in this process
#[must_use]
pub fn peak_allocated_bytes() -> usize {
    PEAK.load(Ordering::Acquire)
}

/// Limits enforced by the allocator
#[must_use]
pub fn installed_limits() -> DeviceMemoryLimits {
    *limits_cell().read()
}

/// Usable device bytes enforced by the allocator
#[must_use]
pub fn memory_limit() -> usize {
    installed_limits().usable_bytes
}

pub(crate) fn set_memory_limits(limits: DeviceMemoryLimits) {
    *limits_cell().write() = limits;
}

/// Charge `bytes` against the device budget
pub(crate) fn reserve(bytes: usize) -> Result<()> {
    let limits = installed_limits();
    let reserved = ALLOCATED.fetch_update(Ordering::AcqRel, Ordering::Acquire, |in_use| {
        limits.check(bytes, in_use).ok().map(|()| in_use + bytes)
    });

    match reserved {
        Ok(previous) => {
            PEAK.fetch_max(previous + bytes, Ordering::AcqRel);
            Ok(())
        }
        Err(in_use) => {
            log::warn!(
                "Refusing device allocation of {bytes} bytes ({in_use} in use, limit {})",
                limits.usable_bytes
            );
            limits.check(bytes, in_use)
        }
    }
}

/// Return `bytes` to the device budget
pub(crate) fn release(bytes: usize) {
    ALLOCATED.fetch_sub(bytes, Ordering::AcqRel);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceError;

    #[test]
    fn test_reserve_and_release_accounting() {
        // Other tests allocate concurrently, so only lower bounds are stable
        reserve(1024).unwrap();
        assert!(allocated_bytes() >= 1024);
        assert!(peak_allocated_bytes() >= 1024);
        release(1024);
    }

    #[test]
    fn test_reserve_overflow_fails() {
        reserve(1).unwrap();
        let err = reserve(usize::MAX).unwrap_err();
        assert!(matches!(err, DeviceError::AllocationFailure { .. }));
        release(1);
    }
}
