//! Segmented scatter-accumulate over interface cells
//!
//! Every interface cell is an independent fold: start from the current
//! output value, combine each of its faces in segment order, store the
//! result back. The update runs in two phases:
//!
//! 1. fold all cells (data-parallel above the configured threshold) while
//!    holding read guards on the inputs and the output
//! 2. release the guards and store the folded values at their cell positions

use super::csr::{validate_segments, InterfaceAddressing};
use crate::array::{DeviceArray, DeviceElement, Label};
use crate::config::ExecutionConfig;
use crate::{DeviceError, Result};
use rayon::prelude::*;
use std::ops::{AddAssign, Mul, SubAssign};

/// In-place reduce operator `acc <op>= value`
///
/// Implementations must only touch the accumulator they are handed.
pub trait EqOp<T>: Sync {
    /// Fold `value` into `acc`
    fn apply(&self, acc: &mut T, value: T);
}

/// `acc += value`
#[derive(Debug, Clone, Copy, Default)]
pub struct PlusEqOp;

impl<T: AddAssign> EqOp<T> for PlusEqOp {
    #[inline]
    fn apply(&self, acc: &mut T, value: T) {
        *acc += value;
    }
}

/// `acc -= value`
#[derive(Debug, Clone, Copy, Default)]
pub struct MinusEqOp;

impl<T: SubAssign> EqOp<T> for MinusEqOp {
    #[inline]
    fn apply(&self, acc: &mut T, value: T) {
        *acc -= value;
    }
}

/// Reduce operator backed by a closure
///
/// ```
/// use trueno_gamg::{EqOp, FnEqOp};
///
/// let max_eq = FnEqOp(|acc: &mut f64, value: f64| *acc = acc.max(value));
/// let mut acc = 1.0;
/// max_eq.apply(&mut acc, 4.0);
/// assert_eq!(acc, 4.0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FnEqOp<F>(pub F);

impl<T, F> EqOp<T> for FnEqOp<F>
where
    F: Fn(&mut T, T) + Sync,
{
    #[inline]
    fn apply(&self, acc: &mut T, value: T) {
        (self.0)(acc, value);
    }
}

/// Interface-matrix combine: `coeffs[face] * pnf[face]`
///
/// `pnf` holds the neighbour-side value for every interface face.
#[derive(Debug, Clone, Copy)]
pub struct InterfaceMatrixProduct<'a, T> {
    coeffs: &'a [T],
    pnf: &'a [T],
}

impl<'a, T: Copy + Mul<Output = T>> InterfaceMatrixProduct<'a, T> {
    /// Pair the coefficient and neighbour-value ranges
    #[must_use]
    pub const fn new(coeffs: &'a [T], pnf: &'a [T]) -> Self {
        Self { coeffs, pnf }
    }

    /// Contribution of `face` (the cell does not enter the product)
    ///
    /// # Panics
    ///
    /// Panics if `face` indexes past either range
    #[inline]
    #[must_use]
    pub fn combine(&self, _cell: Label, face: Label) -> T {
        let face = face as usize;
        self.coeffs[face] * self.pnf[face]
    }
}

/// Fold `combine(cell, face)` over every interface face into `out`
///
/// For the cell at each position of `inter.sort_cells()`:
/// `out[cell] = op(...op(op(out[cell], combine(cell, f0)), combine(cell, f1))...)`
/// with the faces taken in `cell_faces` segment order.
///
/// `combine` must not hold a guard on `out`'s buffer: the store phase takes
/// the write lock.
///
/// # Errors
///
/// Returns `SizeMismatch` if the segment boundaries are inconsistent or a
/// cell indexes past `out.len()`; `out` is left untouched
///
/// # Example
///
/// ```
/// use trueno_gamg::{interface_operation, DeviceArray, InterfaceCsr, PlusEqOp};
///
/// // faces 0 and 2 border cell 1, face 1 borders cell 0
/// let inter = InterfaceCsr::from_face_cells(&[1, 0, 1]).unwrap();
/// let mut out = DeviceArray::from_slice(&[10_u32, 20]).unwrap();
///
/// interface_operation(&mut out, &inter, |_cell, face| face + 1, PlusEqOp).unwrap();
/// assert_eq!(out.to_vec(), vec![12, 24]);
/// ```
pub fn interface_operation<T, I, F, R>(
    out: &mut DeviceArray<T>,
    inter: &I,
    combine: F,
    op: R,
) -> Result<()>
where
    T: DeviceElement,
    I: InterfaceAddressing + ?Sized,
    F: Fn(Label, Label) -> T + Sync,
    R: EqOp<T>,
{
    check_addressing(out, inter)?;
    let updates = fold_cells(out, inter, &combine, &op);
    store(out, updates);
    Ok(())
}

/// Interface-matrix update with an explicit reduce operator
///
/// `out[cell] <op>= coeffs[face] * pnf[face]` for every face of every
/// interface cell. The inputs may alias `out`; they are read before any
/// store happens.
///
/// # Errors
///
/// Returns `SizeMismatch` if the addressing does not fit `out`, or a face
/// indexes past `coeffs` or `pnf`
pub fn interface_matrix_operation<T, I, R>(
    out: &mut DeviceArray<T>,
    coeffs: &DeviceArray<T>,
    pnf: &DeviceArray<T>,
    inter: &I,
    op: R,
) -> Result<()>
where
    T: DeviceElement + Mul<Output = T>,
    I: InterfaceAddressing + ?Sized,
    R: EqOp<T>,
{
    check_addressing(out, inter)?;
    check_face_range(inter, coeffs.len(), "coefficients")?;
    check_face_range(inter, pnf.len(), "neighbour values")?;

    let updates = {
        let coeffs = coeffs.read();
        let pnf = pnf.read();
        let product = InterfaceMatrixProduct::new(&coeffs, &pnf);
        let combine = |cell: Label, face: Label| product.combine(cell, face);
        fold_cells(out, inter, &combine, &op)
    };
    store(out, updates);
    Ok(())
}

/// Fold interface coefficients times neighbour values into `out`
///
/// `reverse == false` adds the contributions, `reverse == true` subtracts
/// them.
///
/// # Errors
///
/// Returns `SizeMismatch` if the tables and arrays are size-inconsistent
///
/// # Example
///
/// ```
/// use trueno_gamg::{update_interface_matrix, DeviceArray, InterfaceCsr};
///
/// let inter = InterfaceCsr::from_parts(&[0], &[0, 2], &[0, 1]).unwrap();
/// let coeffs = DeviceArray::from_slice(&[2.0_f64, 3.0]).unwrap();
/// let pnf = DeviceArray::from_slice(&[5.0, 4.0]).unwrap();
/// let mut out = DeviceArray::with_size(1).unwrap();
///
/// update_interface_matrix(&mut out, &coeffs, &pnf, &inter, false).unwrap();
/// assert_eq!(out.get(0).unwrap(), 22.0);
/// ```
pub fn update_interface_matrix<T, I>(
    out: &mut DeviceArray<T>,
    coeffs: &DeviceArray<T>,
    pnf: &DeviceArray<T>,
    inter: &I,
    reverse: bool,
) -> Result<()>
where
    T: DeviceElement + Mul<Output = T> + AddAssign + SubAssign,
    I: InterfaceAddressing + ?Sized,
{
    log::trace!(
        "Interface matrix update over {} cells ({})",
        inter.num_cells(),
        if reverse { "subtract" } else { "add" }
    );
    if reverse {
        interface_matrix_operation(out, coeffs, pnf, inter, MinusEqOp)
    } else {
        interface_matrix_operation(out, coeffs, pnf, inter, PlusEqOp)
    }
}

/// Shape contract between the addressing tables and the output
fn check_addressing<T, I>(out: &DeviceArray<T>, inter: &I) -> Result<()>
where
    T: DeviceElement,
    I: InterfaceAddressing + ?Sized,
{
    let cells = inter.sort_cells().read();
    validate_segments(cells.len(), &inter.cell_faces_start().read(), inter.num_faces())?;

    if let Some(&cell) = cells.iter().find(|&&cell| cell as usize >= out.len()) {
        return Err(DeviceError::size_mismatch(format!(
            "interface cell {cell} is outside an output of {} elements",
            out.len()
        )));
    }
    Ok(())
}

fn check_face_range<I>(inter: &I, len: usize, what: &str) -> Result<()>
where
    I: InterfaceAddressing + ?Sized,
{
    match inter.cell_faces().read().iter().max() {
        Some(&face) if face as usize >= len => Err(DeviceError::size_mismatch(format!(
            "interface face {face} is outside {len} {what}"
        ))),
        _ => Ok(()),
    }
}

/// Compute phase: the folded value for every interface cell
///
/// Callers have validated the tables against `out`.
fn fold_cells<T, I, F, R>(
    out: &DeviceArray<T>,
    inter: &I,
    combine: &F,
    op: &R,
) -> Vec<(usize, T)>
where
    T: DeviceElement,
    I: InterfaceAddressing + ?Sized,
    F: Fn(Label, Label) -> T + Sync,
    R: EqOp<T>,
{
    let current = out.read();
    let cells = inter.sort_cells().read();
    let starts = inter.cell_faces_start().read();
    let faces = inter.cell_faces().read();

    let fold = |position: usize| {
        let cell = cells[position];
        let segment = starts[position] as usize..starts[position + 1] as usize;
        let mut acc = current[cell as usize];
        for &face in &faces[segment] {
            op.apply(&mut acc, combine(cell, face));
        }
        (cell as usize, acc)
    };

    let config = ExecutionConfig::global();
    if config.use_parallel(cells.len()) {
        log::debug!("Parallel interface fold over {} cells", cells.len());
        (0..cells.len())
            .into_par_iter()
            .with_min_len(config.min_cells_per_task.max(1))
            .map(fold)
            .collect()
    } else {
        (0..cells.len()).map(fold).collect()
    }
}

/// Store phase: cells are distinct, so every update lands on its own element
fn store<T: DeviceElement>(out: &mut DeviceArray<T>, updates: Vec<(usize, T)>) {
    if updates.is_empty() {
        return;
    }
    let mut dst = out.write();
    for (cell, value) in updates {
        dst[cell] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::InterfaceCsr;

    fn sequential_reference(
        out: &[f64],
        cells: &[Label],
        starts: &[Label],
        faces: &[Label],
        coeffs: &[f64],
        pnf: &[f64],
        reverse: bool,
    ) -> Vec<f64> {
        let mut expected = out.to_vec();
        for (position, &cell) in cells.iter().enumerate() {
            for slot in starts[position]..starts[position + 1] {
                let face = faces[slot as usize] as usize;
                let value = coeffs[face] * pnf[face];
                if reverse {
                    expected[cell as usize] -= value;
                } else {
                    expected[cell as usize] += value;
                }
            }
        }
        expected
    }

    #[test]
    fn test_single_cell_forward_and_reverse() {
        let inter = InterfaceCsr::from_parts(&[0], &[0, 2], &[0, 1]).unwrap();
        let coeffs = DeviceArray::from_slice(&[2.0_f64, 3.0]).unwrap();
        let pnf = DeviceArray::from_slice(&[5.0, 4.0]).unwrap();

        let mut forward = DeviceArray::with_value(1, 0.0).unwrap();
        update_interface_matrix(&mut forward, &coeffs, &pnf, &inter, false).unwrap();
        assert_eq!(forward.to_vec(), vec![22.0]);

        let mut reverse = DeviceArray::with_value(1, 0.0).unwrap();
        update_interface_matrix(&mut reverse, &coeffs, &pnf, &inter, true).unwrap();
        assert_eq!(reverse.to_vec(), vec![-22.0]);
    }

    #[test]
    fn test_update_accumulates_into_existing_values() {
        let inter = InterfaceCsr::from_face_cells(&[2, 0, 2]).unwrap();
        let coeffs = DeviceArray::from_slice(&[1.0_f64, 2.0, 3.0]).unwrap();
        let pnf = DeviceArray::from_slice(&[1.0, 1.0, 2.0]).unwrap();
        let mut out = DeviceArray::from_slice(&[10.0, 10.0, 10.0, 10.0]).unwrap();

        update_interface_matrix(&mut out, &coeffs, &pnf, &inter, false).unwrap();
        // cell 0 <- face 1, cell 2 <- faces 0 and 2, others untouched
        assert_eq!(out.to_vec(), vec![12.0, 10.0, 17.0, 10.0]);
    }

    #[test]
    fn test_permuted_cell_order_matches_reference() {
        let cells = [4, 1, 3];
        let starts = [0, 1, 4, 5];
        let faces = [3, 0, 4, 1, 2];
        let inter = InterfaceCsr::from_parts(&cells, &starts, &faces).unwrap();

        let coeffs = [0.5, -1.0, 2.0, 4.0, 1.5];
        let pnf = [2.0, 3.0, -1.0, 0.25, 2.0];
        let initial = [1.0, 2.0, 3.0, 4.0, 5.0];

        for reverse in [false, true] {
            let mut out = DeviceArray::from_slice(&initial).unwrap();
            update_interface_matrix(
                &mut out,
                &DeviceArray::from_slice(&coeffs).unwrap(),
                &DeviceArray::from_slice(&pnf).unwrap(),
                &inter,
                reverse,
            )
            .unwrap();
            let expected =
                sequential_reference(&initial, &cells, &starts, &faces, &coeffs, &pnf, reverse);
            assert_eq!(out.to_vec(), expected);
        }
    }

    #[test]
    fn test_large_interface_runs_parallel_fold() {
        let num_faces = 50_000_u32;
        let face_cells: Vec<Label> = (0..num_faces).map(|f| f % 9_973).collect();
        let inter = InterfaceCsr::from_face_cells(&face_cells).unwrap();

        let coeffs: Vec<f64> = (0..num_faces).map(|f| f64::from(f % 7) - 3.0).collect();
        let pnf: Vec<f64> = (0..num_faces).map(|f| f64::from(f % 5) * 0.5).collect();
        let initial = vec![1.0; 9_973];

        let mut out = DeviceArray::from_slice(&initial).unwrap();
        update_interface_matrix(
            &mut out,
            &DeviceArray::from_slice(&coeffs).unwrap(),
            &DeviceArray::from_slice(&pnf).unwrap(),
            &inter,
            true,
        )
        .unwrap();

        let expected = sequential_reference(
            &initial,
            &inter.sort_cells().to_vec(),
            &inter.cell_faces_start().to_vec(),
            &inter.cell_faces().to_vec(),
            &coeffs,
            &pnf,
            true,
        );
        assert_eq!(out.to_vec(), expected);
    }

    #[test]
    fn test_generic_operation_with_custom_reduce() {
        let inter = InterfaceCsr::from_face_cells(&[0, 0, 1]).unwrap();
        let mut out = DeviceArray::from_slice(&[0_i64, 100]).unwrap();
        let max_eq = FnEqOp(|acc: &mut i64, value: i64| *acc = (*acc).max(value));

        interface_operation(&mut out, &inter, |cell, face| i64::from(cell * 10 + face), max_eq)
            .unwrap();
        assert_eq!(out.to_vec(), vec![1, 100]);
    }

    #[test]
    fn test_empty_interface_is_noop() {
        let inter = InterfaceCsr::from_face_cells(&[]).unwrap();
        let mut out = DeviceArray::from_slice(&[3.0_f64]).unwrap();
        update_interface_matrix(&mut out, DeviceArray::null(), DeviceArray::null(), &inter, false)
            .unwrap();
        assert_eq!(out.to_vec(), vec![3.0]);
    }

    #[test]
    fn test_output_too_short() {
        let inter = InterfaceCsr::from_face_cells(&[0, 3]).unwrap();
        let coeffs = DeviceArray::from_slice(&[1.0_f64, 1.0]).unwrap();
        let mut out = DeviceArray::from_slice(&[0.0, 0.0]).unwrap();

        let err = update_interface_matrix(&mut out, &coeffs, &coeffs, &inter, false).unwrap_err();
        assert!(matches!(err, DeviceError::SizeMismatch(_)));
        assert_eq!(out.to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_face_outside_coefficients() {
        let inter = InterfaceCsr::from_face_cells(&[0, 0, 0]).unwrap();
        let short = DeviceArray::from_slice(&[1.0_f64, 1.0]).unwrap();
        let full = DeviceArray::from_slice(&[1.0, 1.0, 1.0]).unwrap();
        let mut out = DeviceArray::with_size(1).unwrap();

        assert!(update_interface_matrix(&mut out, &short, &full, &inter, false).is_err());
        assert!(update_interface_matrix(&mut out, &full, &short, &inter, false).is_err());
    }

    /// Addressing that skips construction-time validation
    struct RawAddressing {
        cells: DeviceArray<Label>,
        starts: DeviceArray<Label>,
        faces: DeviceArray<Label>,
    }

    impl InterfaceAddressing for RawAddressing {
        fn sort_cells(&self) -> &DeviceArray<Label> {
            &self.cells
        }

        fn cell_faces_start(&self) -> &DeviceArray<Label> {
            &self.starts
        }

        fn cell_faces(&self) -> &DeviceArray<Label> {
            &self.faces
        }
    }

    #[test]
    fn test_inconsistent_segments_rejected() {
        let raw = RawAddressing {
            cells: DeviceArray::from_slice(&[0, 1]).unwrap(),
            starts: DeviceArray::from_slice(&[0, 2, 1]).unwrap(),
            faces: DeviceArray::from_slice(&[0]).unwrap(),
        };
        let mut out = DeviceArray::from_slice(&[0_u32, 0]).unwrap();

        let err = interface_operation(&mut out, &raw, |_, _| 1, PlusEqOp).unwrap_err();
        assert!(matches!(err, DeviceError::SizeMismatch(_)));
    }

    #[test]
    fn test_inputs_aliasing_output() {
        let inter = InterfaceCsr::from_parts(&[0], &[0, 2], &[1, 2]).unwrap();
        let mut out = DeviceArray::from_slice(&[1.0_f64, 2.0, 3.0]).unwrap();
        let alias = DeviceArray::delegate(&out);

        update_interface_matrix(&mut out, &alias, &alias, &inter, false).unwrap();
        // out[0] = 1 + 2*2 + 3*3
        assert_eq!(out.to_vec(), vec![14.0, 2.0, 3.0]);
    }
}
