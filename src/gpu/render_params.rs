//! Render parameter block for the external renderer
//!
//! Holds the three transform matrices and the packed render uniforms in a
//! uniform buffer bound at render group 1, binding 0.

use super::context::GpuContext;
use super::types::RenderPushConstants;
use crate::error::EngineResult;
use crate::uniforms::{UniformMarshaler, UserUniform};

/// Column-major 4x4 matrix
pub type Mat4 = [[f32; 4]; 4];

pub struct RenderParams {
    gpu: GpuContext,
    constants: RenderPushConstants,
    marshaler: UniformMarshaler,
    buffer: wgpu::Buffer,
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
}

impl RenderParams {
    pub fn new(gpu: GpuContext) -> Self {
        let device = &gpu.device;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Render Params Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Render Params Buffer"),
            size: std::mem::size_of::<RenderPushConstants>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Render Params Bind Group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        let params = Self {
            gpu,
            constants: RenderPushConstants::default(),
            marshaler: UniformMarshaler::new(),
            buffer,
            layout,
            bind_group,
        };
        params.flush();
        params
    }

    pub fn set_transforms(&mut self, model: Mat4, view: Mat4, proj: Mat4) {
        self.constants.model = model;
        self.constants.view = view;
        self.constants.proj = proj;
        self.flush();
    }

    /// Pack `uniforms` and write the whole block to the device
    pub fn write(&mut self, uniforms: &[UserUniform]) -> EngineResult<()> {
        self.constants.user_unif_vals = *self.marshaler.pack(uniforms)?;
        self.flush();
        Ok(())
    }

    fn flush(&self) {
        self.gpu
            .queue
            .write_buffer(&self.buffer, 0, bytemuck::bytes_of(&self.constants));
    }

    /// The record most recently written
    pub fn constants(&self) -> &RenderPushConstants {
        &self.constants
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}
