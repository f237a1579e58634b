//! Interface addressing tables (CSR cell -> faces)

use crate::array::{DeviceArray, Label};
use crate::{DeviceError, Result};
use std::collections::HashSet;

/// Read-only addressing exposed by a GAMG interface
///
/// Implementors must uphold:
/// - `cell_faces_start` has `num_cells() + 1` entries, is non-decreasing and
///   ends at `cell_faces().len()`
/// - `sort_cells` never repeats a cell, so every position writes a distinct
///   output element
pub trait InterfaceAddressing {
    /// Interface cells in processing order
    fn sort_cells(&self) -> &DeviceArray<Label>;

    /// Segment boundaries into [`InterfaceAddressing::cell_faces`]
    fn cell_faces_start(&self) -> &DeviceArray<Label>;

    /// Interface face index for every segment slot
    fn cell_faces(&self) -> &DeviceArray<Label>;

    /// Number of interface cells
    fn num_cells(&self) -> usize {
        self.sort_cells().len()
    }

    /// Number of interface faces
    fn num_faces(&self) -> usize {
        self.cell_faces().len()
    }
}

/// Device-resident interface addressing
///
/// # Example
///
/// ```
/// use trueno_gamg::{InterfaceAddressing, InterfaceCsr};
///
/// // face -> adjacent cell
/// let inter = InterfaceCsr::from_face_cells(&[7, 3, 7]).unwrap();
///
/// assert_eq!(inter.sort_cells().to_vec(), vec![3, 7]);
/// assert_eq!(inter.cell_faces_start().to_vec(), vec![0, 1, 3]);
/// assert_eq!(inter.cell_faces().to_vec(), vec![1, 0, 2]);
/// ```
#[derive(Debug)]
pub struct InterfaceCsr {
    sort_cells: DeviceArray<Label>,
    cell_faces_start: DeviceArray<Label>,
    cell_faces: DeviceArray<Label>,
}

impl InterfaceCsr {
    /// Build addressing from the cell adjacent to each interface face
    ///
    /// Cells are processed in ascending order; faces keep ascending order
    /// within their cell.
    ///
    /// # Errors
    ///
    /// Returns `SizeMismatch` if the face count does not fit a [`Label`] and
    /// `AllocationFailure` if the tables do not fit in device memory
    pub fn from_face_cells(face_cells: &[Label]) -> Result<Self> {
        let num_faces = Label::try_from(face_cells.len()).map_err(|_| {
            DeviceError::size_mismatch(format!(
                "{} interface faces exceed the label range",
                face_cells.len()
            ))
        })?;

        let mut faces: Vec<Label> = (0..num_faces).collect();
        // Stable: faces stay ascending within a cell
        faces.sort_by_key(|&face| face_cells[face as usize]);

        let mut sort_cells = Vec::new();
        let mut starts = vec![0];
        for (slot, &face) in faces.iter().enumerate() {
            let cell = face_cells[face as usize];
            if sort_cells.last() != Some(&cell) {
                if slot > 0 {
                    starts.push(to_label(slot));
                }
                sort_cells.push(cell);
            }
        }
        if !faces.is_empty() {
            starts.push(num_faces);
        }

        log::debug!(
            "Built interface addressing: {} cells, {} faces",
            sort_cells.len(),
            faces.len()
        );

        Ok(Self {
            sort_cells: DeviceArray::from_slice(&sort_cells)?,
            cell_faces_start: DeviceArray::from_slice(&starts)?,
            cell_faces: DeviceArray::from_slice(&faces)?,
        })
    }

    /// Upload pre-built tables after validating them
    ///
    /// # Errors
    ///
    /// Returns `SizeMismatch` if the segment boundaries are inconsistent or
    /// a cell appears twice in `sort_cells`
    pub fn from_parts(
        sort_cells: &[Label],
        cell_faces_start: &[Label],
        cell_faces: &[Label],
    ) -> Result<Self> {
        validate_segments(sort_cells.len(), cell_faces_start, cell_faces.len())?;

        let mut seen = HashSet::with_capacity(sort_cells.len());
        if let Some(cell) = sort_cells.iter().find(|&&cell| !seen.insert(cell)) {
            return Err(DeviceError::size_mismatch(format!(
                "cell {cell} appears more than once in the interface cell order"
            )));
        }

        Ok(Self {
            sort_cells: DeviceArray::from_slice(sort_cells)?,
            cell_faces_start: DeviceArray::from_slice(cell_faces_start)?,
            cell_faces: DeviceArray::from_slice(cell_faces)?,
        })
    }

    /// Faces folded into the cell at `position` of the processing order
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `position >= num_cells()`
    pub fn faces_of(&self, position: usize) -> Result<Vec<Label>> {
        if position >= self.num_cells() {
            return Err(DeviceError::OutOfRange {
                index: position,
                len: self.num_cells(),
            });
        }
        let starts = self.cell_faces_start.read();
        let faces = self.cell_faces.read();
        Ok(faces[starts[position] as usize..starts[position + 1] as usize].to_vec())
    }
}

impl InterfaceAddressing for InterfaceCsr {
    fn sort_cells(&self) -> &DeviceArray<Label> {
        &self.sort_cells
    }

    fn cell_faces_start(&self) -> &DeviceArray<Label> {
        &self.cell_faces_start
    }

    fn cell_faces(&self) -> &DeviceArray<Label> {
        &self.cell_faces
    }
}

#[allow(clippy::cast_possible_truncation)] // callers bound slot by the label-sized face count
const fn to_label(slot: usize) -> Label {
    slot as Label
}

/// Check the CSR segment invariant
///
/// An interface without cells may omit the boundary table entirely.
pub(crate) fn validate_segments(
    num_cells: usize,
    starts: &[Label],
    num_faces: usize,
) -> Result<()> {
    if num_cells == 0 && num_faces == 0 && starts.len() <= 1 {
        return match starts.first() {
            Some(&first) if first != 0 => Err(DeviceError::size_mismatch(format!(
                "empty interface starts at offset {first}"
            ))),
            _ => Ok(()),
        };
    }

    if starts.len() != num_cells + 1 {
        return Err(DeviceError::size_mismatch(format!(
            "{} segment boundaries for {num_cells} interface cells",
            starts.len()
        )));
    }

    if let Some(pair) = starts.windows(2).find(|pair| pair[0] > pair[1]) {
        return Err(DeviceError::size_mismatch(format!(
            "segment boundaries decrease from {} to {}",
            pair[0], pair[1]
        )));
    }

    let last = starts[num_cells] as usize;
    if last != num_faces {
        return Err(DeviceError::size_mismatch(format!(
            "final segment boundary {last} does not match {num_faces} interface faces"
        )));
    }

    Ok(())
}
