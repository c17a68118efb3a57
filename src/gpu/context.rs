//! Device and queue ownership

use std::sync::Arc;

use tracing::{debug, info};

use super::types::ATTRIBUTE_COUNT;
use crate::error::{EngineError, EngineResult};

/// Storage buffers a compute-binding-set needs: both sides plus queue state
pub const REQUIRED_STORAGE_BUFFERS: u32 = 2 * ATTRIBUTE_COUNT as u32 + 1;

/// Shared handles to the device and its single command queue
#[derive(Clone, Debug)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    /// Request an adapter and device, blocking until both are ready
    pub fn new(high_performance: bool) -> EngineResult<Self> {
        pollster::block_on(Self::create_device(high_performance))
    }

    /// Wrap a device created by the caller
    ///
    /// The device must allow [`REQUIRED_STORAGE_BUFFERS`] storage buffers per
    /// shader stage.
    pub fn from_parts(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self { device, queue }
    }

    /// Limits the engine needs on top of the adapter defaults
    pub fn required_limits(adapter_limits: &wgpu::Limits) -> wgpu::Limits {
        wgpu::Limits {
            max_storage_buffers_per_shader_stage: REQUIRED_STORAGE_BUFFERS,
            max_buffer_size: adapter_limits.max_buffer_size,
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            ..wgpu::Limits::default()
        }
    }

    async fn create_device(high_performance: bool) -> EngineResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power_preference = if high_performance {
            wgpu::PowerPreference::HighPerformance
        } else {
            wgpu::PowerPreference::LowPower
        };
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(EngineError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "selected GPU adapter"
        );

        let required_limits = Self::required_limits(&adapter.limits());
        debug!(
            storage_buffers = required_limits.max_storage_buffers_per_shader_stage,
            max_buffer_size = required_limits.max_buffer_size,
            "requesting device"
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Simulation Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits,
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None, // trace path
            )
            .await?;

        Ok(Self::from_parts(Arc::new(device), Arc::new(queue)))
    }

    /// Largest buffer the device can allocate
    pub fn max_buffer_size(&self) -> u64 {
        self.device.limits().max_buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_storage_buffers() {
        // 5 attributes on each side + shared queue state
        assert_eq!(REQUIRED_STORAGE_BUFFERS, 11);
    }

    #[test]
    fn test_required_limits_keep_adapter_buffer_sizes() {
        let adapter = wgpu::Limits {
            max_buffer_size: 1 << 34,
            max_storage_buffer_binding_size: 1 << 31,
            ..wgpu::Limits::default()
        };
        let limits = GpuContext::required_limits(&adapter);
        assert_eq!(limits.max_storage_buffers_per_shader_stage, 11);
        assert_eq!(limits.max_buffer_size, 1 << 34);
        assert_eq!(limits.max_storage_buffer_binding_size, 1 << 31);
    }
}
