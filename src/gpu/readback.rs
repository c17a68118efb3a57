//! Blocking device-to-host copies through a staging buffer

use bytemuck::Pod;

use super::context::GpuContext;
use crate::error::{EngineError, EngineResult};

/// Copy `size` bytes starting at `offset` out of `source` and wait for them
///
/// `source` needs `COPY_SRC` usage; `offset` and `size` must be multiples of
/// four.
pub fn read_bytes(
    gpu: &GpuContext,
    source: &wgpu::Buffer,
    offset: u64,
    size: u64,
) -> EngineResult<Vec<u8>> {
    if size == 0 {
        return Ok(Vec::new());
    }

    let staging_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging Buffer"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
    encoder.copy_buffer_to_buffer(source, offset, &staging_buffer, 0, size);
    gpu.queue.submit(std::iter::once(encoder.finish()));

    let buffer_slice = staging_buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = gpu.device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|_| EngineError::Readback("map callback was dropped".to_string()))??;

    let data = buffer_slice.get_mapped_range();
    let bytes = data.to_vec();
    drop(data);
    staging_buffer.unmap();

    Ok(bytes)
}

/// Read `count` elements of `T` from the start of `source`
pub fn read_pod_vec<T: Pod>(
    gpu: &GpuContext,
    source: &wgpu::Buffer,
    count: usize,
) -> EngineResult<Vec<T>> {
    let size = (count * std::mem::size_of::<T>()) as u64;
    let bytes = read_bytes(gpu, source, 0, size)?;
    Ok(bytemuck::pod_collect_to_vec(&bytes))
}

/// Read a single `T` from the start of `source`
pub fn read_pod<T: Pod>(gpu: &GpuContext, source: &wgpu::Buffer) -> EngineResult<T> {
    let size = std::mem::size_of::<T>() as u64;
    let bytes = read_bytes(gpu, source, 0, size)?;
    bytemuck::try_pod_read_unaligned(&bytes)
        .map_err(|e| EngineError::Readback(format!("unexpected readback size: {e}")))
}
