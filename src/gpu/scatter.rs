//! GPU interface-matrix update
//!
//! One compute invocation per interface cell, 256 per workgroup. Each
//! invocation folds its face segment into a private accumulator and writes
//! its own cell, so the kernel needs no atomics.

use super::{GpuDevice, GpuInterfaceBuffers};
use crate::array::{DeviceArray, Label};
use crate::DeviceError;
use anyhow::{Context, Result};

const SHADER: &str = include_str!("shaders/interface_update.wgsl");
const WORKGROUP_SIZE: u32 = 256;

/// Kernel parameters (uniform, 16-byte aligned)
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct InterfaceParams {
    num_cells: u32,
    reverse: u32,
    _padding: [u32; 2],
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn check_index(max: Option<Label>, len: usize, what: &str) -> Result<()> {
    match max {
        Some(index) if index as usize >= len => Err(DeviceError::SizeMismatch(format!(
            "interface index {index} is outside {len} {what}"
        ))
        .into()),
        _ => Ok(()),
    }
}

/// Run the interface-matrix update on the GPU
///
/// Same semantics as [`crate::update_interface_matrix`] for `f32` fields:
/// `reverse == false` adds `coeffs[face] * pnf[face]` into each interface
/// cell of `out`, `reverse == true` subtracts it. `out` is uploaded, updated
/// on the device and written back.
///
/// # Errors
///
/// Returns error if:
/// - the interface tables do not fit `out`, `coeffs` or `pnf` (`DeviceError::SizeMismatch`)
/// - the cell count exceeds what one dispatch can cover
/// - result readback fails
///
/// # Example
///
/// ```ignore
/// # use trueno_gamg::gpu::{gpu_update_interface_matrix, GpuDevice, GpuInterfaceBuffers};
/// # use trueno_gamg::{DeviceArray, InterfaceCsr};
/// # async fn example() -> anyhow::Result<()> {
/// let device = GpuDevice::new().await?;
/// let inter = InterfaceCsr::from_parts(&[0], &[0, 2], &[0, 1])?;
/// let buffers = GpuInterfaceBuffers::from_addressing(&device, &inter)?;
///
/// let coeffs = DeviceArray::from_slice(&[2.0_f32, 3.0])?;
/// let pnf = DeviceArray::from_slice(&[5.0_f32, 4.0])?;
/// let mut out = DeviceArray::with_size(1)?;
///
/// gpu_update_interface_matrix(&device, &buffers, &mut out, &coeffs, &pnf, false).await?;
/// assert_eq!(out.get(0)?, 22.0);
/// # Ok(())
/// # }
/// ```
#[allow(clippy::too_many_lines)]
pub async fn gpu_update_interface_matrix(
    device: &GpuDevice,
    buffers: &GpuInterfaceBuffers,
    out: &mut DeviceArray<f32>,
    coeffs: &DeviceArray<f32>,
    pnf: &DeviceArray<f32>,
    reverse: bool,
) -> Result<()> {
    check_index(buffers.max_cell, out.len(), "output elements")?;
    check_index(buffers.max_face, coeffs.len(), "coefficients")?;
    check_index(buffers.max_face, pnf.len(), "neighbour values")?;

    if buffers.num_cells() == 0 {
        return Ok(());
    }

    let num_cells =
        u32::try_from(buffers.num_cells()).context("Interface cell count exceeds u32")?;
    let num_workgroups = num_cells.div_ceil(WORKGROUP_SIZE);
    let max_workgroups = device.device().limits().max_compute_workgroups_per_dimension;
    anyhow::ensure!(
        num_workgroups <= max_workgroups,
        "{num_cells} interface cells need {num_workgroups} workgroups, device allows {max_workgroups}"
    );

    // Step 1: Load WGSL shader
    let shader_module = device
        .device()
        .create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Interface Update Shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

    // Step 2: Bind group layout
    // @binding(0) params, (1..=5) read-only tables and inputs, (6) out
    let bind_group_layout =
        device
            .device()
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Interface Update Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    storage_entry(1, true),
                    storage_entry(2, true),
                    storage_entry(3, true),
                    storage_entry(4, true),
                    storage_entry(5, true),
                    storage_entry(6, false),
                ],
            });

    // Step 3: Compute pipeline
    let pipeline_layout = device
        .device()
        .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Interface Update Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

    let compute_pipeline =
        device
            .device()
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Interface Update Pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader_module,
                entry_point: "interface_update",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });

    // Step 4: Upload field data
    let params_buffer = device.create_buffer_init(
        "Interface Params",
        bytemuck::bytes_of(&InterfaceParams {
            num_cells,
            reverse: u32::from(reverse),
            _padding: [0; 2],
        }),
        wgpu::BufferUsages::UNIFORM,
    );
    let coeffs_buffer = device.create_buffer_init(
        "Interface Coefficients",
        bytemuck::cast_slice(&coeffs.read()),
        wgpu::BufferUsages::STORAGE,
    );
    let pnf_buffer = device.create_buffer_init(
        "Interface Neighbour Values",
        bytemuck::cast_slice(&pnf.read()),
        wgpu::BufferUsages::STORAGE,
    );
    let out_buffer = device.create_buffer_init(
        "Interface Output",
        bytemuck::cast_slice(&out.read()),
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
    );

    // Step 5: Bind group
    let bind_group = device
        .device()
        .create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Interface Update Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.sort_cells.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffers.cell_faces_start.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: buffers.cell_faces.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: coeffs_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: pnf_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: out_buffer.as_entire_binding(),
                },
            ],
        });

    // Step 6: Dispatch
    let mut encoder = device
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Interface Update Encoder"),
        });
    {
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Interface Update Pass"),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(&compute_pipeline);
        compute_pass.set_bind_group(0, &bind_group, &[]);
        compute_pass.dispatch_workgroups(num_workgroups, 1, 1);
    }
    device.queue().submit(Some(encoder.finish()));
    log::debug!("Dispatched interface update: {num_cells} cells, {num_workgroups} workgroups");

    // Step 7: Read back into the device array
    let updated: Vec<f32> = device.read_buffer(&out_buffer, out.len()).await?;
    out.assign_slice(&updated)?;
    Ok(())
}
