//! GPU execution of the interface-matrix update
//!
//! The host-emulated device in [`crate::memory`] is the reference backend.
//! This module runs the same per-cell fold as a WGSL compute kernel on a real
//! adapter, for `f32` fields.
//!
//! # Architecture
//!
//! - `device`: wgpu adapter/device/queue lifecycle, buffer helpers, readback
//! - `buffer`: interface addressing tables uploaded as storage buffers
//! - `scatter`: pipeline setup and dispatch of `shaders/interface_update.wgsl`
//!
//! # Feature Flag
//!
//! This module is only available with the `gpu` feature flag:
//! ```bash
//! cargo build --features gpu
//! ```

mod buffer;
mod device;
mod scatter;

pub use buffer::GpuInterfaceBuffers;
pub use device::{GpuDevice, GpuDeviceError};
pub use scatter::gpu_update_interface_matrix;
