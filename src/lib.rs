//! trueno-gamg: device-resident arrays and GAMG interface updates
//!
//! # Overview
//!
//! trueno-gamg provides the device-memory substrate of an algebraic multigrid
//! solver: a device array with owning and aliasing handles, plus the segmented
//! scatter-accumulate that folds interface coefficients into a field once per
//! solver sweep.
//!
//! # Quick Start
//!
//! ```
//! use trueno_gamg::{update_interface_matrix, DeviceArray, InterfaceCsr};
//!
//! # fn main() -> trueno_gamg::Result<()> {
//! // Interface faces 0 and 1 both border cell 2
//! let inter = InterfaceCsr::from_face_cells(&[2, 2])?;
//!
//! let coeffs = DeviceArray::from_slice(&[2.0, 3.0])?;
//! let pnf = DeviceArray::from_slice(&[5.0, 4.0])?;
//! let mut field = DeviceArray::<f64>::with_size(3)?;
//!
//! update_interface_matrix(&mut field, &coeffs, &pnf, &inter, false)?;
//! assert_eq!(field.to_vec(), vec![0.0, 0.0, 22.0]);
//!
//! // Views alias the field without copying
//! let tail = DeviceArray::delegate_range(&field, 1, 2)?;
//! assert_eq!(tail.first()?, 22.0);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Memory**: emulated device buffers with process-wide accounting and limits
//! - **Arrays**: `DeviceArray<T>` (owned, view, empty), host staging, list I/O
//! - **Interface**: CSR cell/face addressing and the race-free per-cell fold
//! - **GPU** (optional): wgpu compute kernel for the `f32` interface update

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod array;
pub mod config;
pub mod error;
pub mod interface;
pub mod memory;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use array::{DeviceArray, DeviceElement, DevicePtr, DeviceSlice, Label, Scalar};
pub use config::ExecutionConfig;
pub use error::{DeviceError, Result};
pub use interface::{
    interface_matrix_operation, interface_operation, update_interface_matrix, EqOp, FnEqOp,
    InterfaceAddressing, InterfaceCsr, InterfaceMatrixProduct, MinusEqOp, PlusEqOp,
};
pub use memory::DeviceMemoryLimits;

#[cfg(feature = "gpu")]
pub use gpu::{gpu_update_interface_matrix, GpuDevice, GpuDeviceError, GpuInterfaceBuffers};
