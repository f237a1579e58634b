//! GPU buffer management for interface addressing
//!
//! Uploads the three CSR tables (`sort_cells`, `cell_faces_start`,
//! `cell_faces`) once per interface; they are reused by every sweep.

use super::GpuDevice;
use crate::array::Label;
use crate::interface::{validate_segments, InterfaceAddressing};
use anyhow::Result;

/// GPU buffers for one interface's addressing tables
#[derive(Debug)]
pub struct GpuInterfaceBuffers {
    /// Number of interface cells
    pub num_cells: usize,

    /// Number of interface faces
    pub num_faces: usize,

    /// Largest cell index written by the kernel
    pub max_cell: Option<Label>,

    /// Largest face index read by the kernel
    pub max_face: Option<Label>,

    /// GPU buffer for `sort_cells` (size: `num_cells`)
    pub sort_cells: wgpu::Buffer,

    /// GPU buffer for `cell_faces_start` (size: `num_cells` + 1)
    pub cell_faces_start: wgpu::Buffer,

    /// GPU buffer for `cell_faces` (size: `num_faces`)
    pub cell_faces: wgpu::Buffer,
}

impl GpuInterfaceBuffers {
    /// Upload interface addressing to the GPU
    ///
    /// # Errors
    ///
    /// Returns error if the segment boundaries are inconsistent
    pub fn from_addressing<I>(device: &GpuDevice, inter: &I) -> Result<Self>
    where
        I: InterfaceAddressing + ?Sized,
    {
        let cells = inter.sort_cells().read();
        let starts = inter.cell_faces_start().read();
        let faces = inter.cell_faces().read();
        validate_segments(cells.len(), &starts, faces.len())?;

        let usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
        let sort_cells =
            device.create_buffer_init("Interface sort_cells", bytemuck::cast_slice(&cells), usage);
        let cell_faces_start = device.create_buffer_init(
            "Interface cell_faces_start",
            bytemuck::cast_slice(&starts),
            usage,
        );
        let cell_faces =
            device.create_buffer_init("Interface cell_faces", bytemuck::cast_slice(&faces), usage);

        log::debug!(
            "Uploaded interface addressing: {} cells, {} faces",
            cells.len(),
            faces.len()
        );

        Ok(Self {
            num_cells: cells.len(),
            num_faces: faces.len(),
            max_cell: cells.iter().copied().max(),
            max_face: faces.iter().copied().max(),
            sort_cells,
            cell_faces_start,
            cell_faces,
        })
    }

    /// Get number of interface cells
    #[must_use]
    pub const fn num_cells(&self) -> usize {
        self.num_cells
    }

    /// Get number of interface faces
    #[must_use]
    pub const fn num_faces(&self) -> usize {
        self.num_faces
    }
}
