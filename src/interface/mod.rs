//! GAMG interface addressing and interface-coefficient scatter
//!
//! At partition or cyclic boundaries each interface cell is coupled to a
//! variable number of interface faces. The coupling is stored CSR-style:
//!
//! ```text
//! position:          0        1
//! sort_cells:       [4,       9]          cell updated by each position
//! cell_faces_start: [0,       2,    3]    position i owns faces [start[i], start[i+1])
//! cell_faces:       [0, 2,    1]          interface face indices
//! ```
//!
//! Because every position writes a different cell, the per-sweep update
//! folds each cell independently and needs no synchronisation between cells.
//!
//! # Architecture
//!
//! - `csr`: the addressing collaborator trait and a concrete implementation
//! - `scatter`: the segmented scatter-accumulate and the interface-matrix update

mod csr;
mod scatter;

pub use csr::{InterfaceAddressing, InterfaceCsr};
#[cfg(feature = "gpu")]
pub(crate) use csr::validate_segments;
pub use scatter::{
    interface_matrix_operation, interface_operation, update_interface_matrix, EqOp, FnEqOp,
    InterfaceMatrixProduct, MinusEqOp, PlusEqOp,
};
