//! Device memory limits
//!
//! Detects how much device memory the allocator may hand out and enforces it.
//! By default the budget is unlimited; `TRUENO_GAMG_DEVICE_MEMORY` (bytes)
//! models a device of that size.

use crate::{DeviceError, Result};

/// Environment variable holding the emulated device size in bytes
pub const DEVICE_MEMORY_ENV: &str = "TRUENO_GAMG_DEVICE_MEMORY";

/// Share of total device memory available to solver fields (rest is headroom)
pub const USABLE_FRACTION: f64 = 0.7;

/// Device memory limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMemoryLimits {
    /// Total device memory (bytes)
    pub total_bytes: usize,

    /// Maximum bytes handed out to device arrays
    pub usable_bytes: usize,
}

impl DeviceMemoryLimits {
    /// No budget: every allocation the host can satisfy is granted
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            total_bytes: usize::MAX,
            usable_bytes: usize::MAX,
        }
    }

    /// Limits for a device with `total_bytes` of memory
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn with_total(total_bytes: usize) -> Self {
        let usable_bytes = (total_bytes as f64 * USABLE_FRACTION) as usize;
        Self {
            total_bytes,
            usable_bytes,
        }
    }

    /// Detect limits from the environment
    ///
    /// Falls back to [`DeviceMemoryLimits::unlimited`] when the variable is
    /// unset or malformed.
    #[must_use]
    pub fn detect() -> Self {
        match std::env::var(DEVICE_MEMORY_ENV) {
            Ok(raw) => match raw.trim().parse::<usize>() {
                Ok(total) => Self::with_total(total),
                Err(_) => {
                    log::warn!("Ignoring {DEVICE_MEMORY_ENV}={raw:?}: not a byte count");
                    Self::unlimited()
                }
            },
            Err(_) => Self::unlimited(),
        }
    }

    /// Detect limits from a wgpu adapter
    ///
    /// Uses the maximum buffer size as a conservative VRAM estimate.
    #[cfg(feature = "gpu")]
    #[must_use]
    pub fn from_gpu(device: &crate::gpu::GpuDevice) -> Self {
        let total = device.max_buffer_size();
        Self::with_total(usize::try_from(total).unwrap_or(usize::MAX))
    }

    /// Check if `bytes` fit in the usable budget
    #[must_use]
    pub const fn fits(&self, bytes: usize) -> bool {
        bytes <= self.usable_bytes
    }

    /// Validate a request of `requested` bytes while `in_use` bytes are live
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if the request would exceed the budget
    pub fn check(&self, requested: usize, in_use: usize) -> Result<()> {
        match in_use.checked_add(requested) {
            Some(total) if self.fits(total) => Ok(()),
            _ => Err(DeviceError::AllocationFailure {
                requested_bytes: requested,
                reason: format!(
                    "{in_use} bytes in use, {} bytes usable",
                    self.usable_bytes
                ),
            }),
        }
    }

    /// Make these limits the process-wide allocation budget
    pub fn install(&self) {
        log::debug!(
            "Installing device memory limit: {} of {} bytes usable",
            self.usable_bytes,
            self.total_bytes
        );
        super::set_memory_limits(*self);
    }
}

impl Default for DeviceMemoryLimits {
    fn default() -> Self {
        Self::unlimited()
    }
}
