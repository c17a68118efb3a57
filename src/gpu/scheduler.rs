//! Multi-iteration dispatch scheduling
//!
//! A run records every iteration into one command encoder, submits it once
//! and blocks until the device has finished. Iteration `i` reads side
//! `i % 2` and writes the other side through that side's
//! compute-binding-set, so a run of `k` iterations leaves its output on side
//! `k % 2`.
//!
//! `wgpu` has no standalone barrier command. Each iteration gets its own
//! compute pass, and closing one pass before the next begins is what orders
//! the previous iteration's storage writes before this iteration's reads.

use std::time::Instant;

use tracing::{info, trace};
use wgpu::util::DeviceExt;

use super::buffers::DoubleBufferSet;
use super::context::GpuContext;
use super::shaders::{KERNEL_ENTRY_POINT, kernel_module_source};
use super::types::{
    COMPUTE_HEADER_SIZE, ComputeHeader, ComputePushConstants, MAX_ITERS, QUEUE_CAPACITY,
    SIDE_COUNT, SharedQueueState, WORKGROUP_SIZE, other_side,
};
use crate::error::{EngineError, EngineResult};
use crate::uniforms::PackedUniforms;

/// Workgroups dispatched for `node_count` nodes
///
/// Always one more than strictly needed, even on exact multiples of the
/// workgroup size; kernels guard against out-of-range invocations.
pub fn group_count(node_count: u32) -> u32 {
    node_count.div_ceil(WORKGROUP_SIZE) + 1
}

/// Side that reads during iteration `iter_num`
pub fn read_side(iter_num: u32) -> usize {
    (iter_num & 1) as usize
}

/// Side holding the output of a run of `num_iters` iterations
pub fn result_side(num_iters: u32) -> usize {
    num_iters as usize % SIDE_COUNT
}

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Recording { iter: u32 },
    Submitted,
}

impl SchedulerState {
    /// The state following `self` in a run of `num_iters` iterations
    pub fn next(self, num_iters: u32) -> SchedulerState {
        match self {
            SchedulerState::Idle if num_iters == 0 => SchedulerState::Submitted,
            SchedulerState::Idle => SchedulerState::Recording { iter: 0 },
            SchedulerState::Recording { iter } if iter + 1 < num_iters => {
                SchedulerState::Recording { iter: iter + 1 }
            }
            SchedulerState::Recording { .. } => SchedulerState::Submitted,
            SchedulerState::Submitted => SchedulerState::Idle,
        }
    }
}

/// One recorded step of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunCommand {
    /// Make the previous dispatch's writes visible to the next one's reads
    Barrier,
    Dispatch {
        iter_num: u32,
        read_side: usize,
        write_side: usize,
        groups: u32,
    },
}

/// Host-side recording of a run's command sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    num_iters: u32,
    node_count: u32,
}

impl RunPlan {
    pub fn new(num_iters: u32, node_count: u32) -> Self {
        Self {
            num_iters,
            node_count,
        }
    }

    /// Commands in submission order; no barrier precedes the first dispatch
    pub fn commands(&self) -> impl Iterator<Item = RunCommand> + '_ {
        let groups = group_count(self.node_count);
        (0..self.num_iters).flat_map(move |iter_num| {
            let barrier = (iter_num > 0).then_some(RunCommand::Barrier);
            let read = read_side(iter_num);
            let dispatch = RunCommand::Dispatch {
                iter_num,
                read_side: read,
                write_side: other_side(read),
                groups,
            };
            barrier.into_iter().chain(std::iter::once(dispatch))
        })
    }

    pub fn num_iters(&self) -> u32 {
        self.num_iters
    }

    pub fn result_side(&self) -> usize {
        result_side(self.num_iters)
    }

    /// Per-iteration parameter headers in iteration order
    pub fn headers(&self, inactive_node_count: u32) -> Vec<ComputeHeader> {
        (0..self.num_iters)
            .map(|iter_num| ComputeHeader {
                node_count: self.node_count,
                inactive_node_count,
                iter_num,
                queue_len: QUEUE_CAPACITY as u32,
            })
            .collect()
    }
}

/// Reject runs that cannot be recorded
///
/// `max_buffer_size` bounds the buffer staging per-iteration headers.
///
/// A run costs 16 bytes of host memory and 16 bytes of device staging per
/// iteration, plus one compute pass each. Near the upper bound that is
/// gigabytes on both sides and a very long recording; callers wanting
/// interactive runs should stay several orders of magnitude below it.
pub fn check_iterations(num_iters: u32, max_buffer_size: u64) -> EngineResult<()> {
    let max = MAX_ITERS.min(max_buffer_size / COMPUTE_HEADER_SIZE);
    if u64::from(num_iters) > max {
        return Err(EngineError::TooManyIterations {
            count: u64::from(num_iters),
            max,
        });
    }
    Ok(())
}

/// Inputs of one run besides the buffers it operates on
#[derive(Debug, Clone, Copy)]
pub struct RunParams<'a> {
    pub num_iters: u32,
    pub inactive_node_count: u32,
    pub uniforms: &'a PackedUniforms,
    pub queue_seed: &'a SharedQueueState,
}

/// Records and submits simulation runs
pub struct SimulationScheduler {
    gpu: GpuContext,

    pipeline: wgpu::ComputePipeline,
    pipeline_layout: wgpu::PipelineLayout,

    // Group 1: parameter block
    params_buffer: wgpu::Buffer,
    params_binding: wgpu::BindGroup,
    // Kept alive to maintain GPU resource
    _params_layout: wgpu::BindGroupLayout,

    state: SchedulerState,
}

impl SimulationScheduler {
    /// Compile `kernel` against the compute-binding-set layout
    pub fn new(
        gpu: GpuContext,
        compute_layout: &wgpu::BindGroupLayout,
        kernel: &str,
    ) -> EngineResult<Self> {
        let device = &gpu.device;

        let params_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Compute Params Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Compute Params Buffer"),
            size: std::mem::size_of::<ComputePushConstants>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let params_binding = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Compute Params Bind Group"),
            layout: &params_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Simulation Pipeline Layout"),
            bind_group_layouts: &[compute_layout, &params_layout],
            push_constant_ranges: &[],
        });

        let pipeline = create_pipeline(device, &pipeline_layout, kernel)?;

        Ok(Self {
            gpu,
            pipeline,
            pipeline_layout,
            params_buffer,
            params_binding,
            _params_layout: params_layout,
            state: SchedulerState::Idle,
        })
    }

    /// Replace the kernel; the current one stays in use if `kernel` fails to
    /// compile
    pub fn set_kernel(&mut self, kernel: &str) -> EngineResult<()> {
        self.pipeline = create_pipeline(&self.gpu.device, &self.pipeline_layout, kernel)?;
        Ok(())
    }

    /// Reject iteration counts this device cannot record
    pub fn check(&self, num_iters: u32) -> EngineResult<()> {
        check_iterations(num_iters, self.gpu.max_buffer_size())
    }

    /// Run the kernel `params.num_iters` times and return the result side
    ///
    /// The queue state is reseeded before the first iteration. Blocks until
    /// the device has executed the whole run.
    pub fn run(
        &mut self,
        buffers: &mut DoubleBufferSet,
        params: RunParams<'_>,
    ) -> EngineResult<usize> {
        self.check(params.num_iters)?;
        let start = Instant::now();

        let node_count = buffers.node_count() as u32;
        let plan = RunPlan::new(params.num_iters, node_count);
        let headers = plan.headers(params.inactive_node_count);

        buffers.write_queue_state(params.queue_seed);
        let first_header = headers.first().copied().unwrap_or(ComputeHeader {
            node_count,
            inactive_node_count: params.inactive_node_count,
            iter_num: 0,
            queue_len: QUEUE_CAPACITY as u32,
        });
        let constants = ComputePushConstants::new(first_header, params.uniforms);
        self.gpu
            .queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&constants));

        self.state = SchedulerState::Idle.next(plan.num_iters());
        if plan.num_iters() > 0 {
            let header_stage = self
                .gpu
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Iteration Header Stage"),
                    contents: bytemuck::cast_slice(&headers),
                    usage: wgpu::BufferUsages::COPY_SRC,
                });

            let mut encoder =
                self.gpu
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("Simulation Run Encoder"),
                    });

            for command in plan.commands() {
                match command {
                    RunCommand::Barrier => {
                        // The previous pass has already ended; the next one
                        // starts after it in the same encoder.
                        self.state = self.state.next(plan.num_iters());
                    }
                    RunCommand::Dispatch {
                        iter_num,
                        read_side,
                        write_side,
                        groups,
                    } => {
                        trace!(iter_num, read_side, write_side, groups, "recording dispatch");
                        encoder.copy_buffer_to_buffer(
                            &header_stage,
                            u64::from(iter_num) * COMPUTE_HEADER_SIZE,
                            &self.params_buffer,
                            0,
                            COMPUTE_HEADER_SIZE,
                        );

                        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                            label: Some("Simulation Pass"),
                            timestamp_writes: None,
                        });
                        pass.set_pipeline(&self.pipeline);
                        pass.set_bind_group(0, buffers.compute_binding(write_side)?, &[]);
                        pass.set_bind_group(1, &self.params_binding, &[]);
                        pass.dispatch_workgroups(groups, 1, 1);
                    }
                }
            }

            self.state = self.state.next(plan.num_iters());
            let submission = self.gpu.queue.submit(std::iter::once(encoder.finish()));
            let _ = self
                .gpu
                .device
                .poll(wgpu::Maintain::wait_for(submission));
        }

        buffers.set_result_side(plan.result_side())?;
        self.state = self.state.next(plan.num_iters());

        info!(
            iters = plan.num_iters(),
            nodes = node_count,
            result_side = plan.result_side(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "simulation run complete"
        );
        Ok(plan.result_side())
    }

    /// Where the scheduler is in its run lifecycle
    pub fn state(&self) -> SchedulerState {
        self.state
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    kernel: &str,
) -> EngineResult<wgpu::ComputePipeline> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Simulation Kernel"),
        source: wgpu::ShaderSource::Wgsl(kernel_module_source(kernel).into()),
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("Simulation Pipeline"),
        layout: Some(layout),
        module: &module,
        entry_point: Some(KERNEL_ENTRY_POINT),
        compilation_options: Default::default(),
        cache: None,
    });

    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(EngineError::Shader(error.to_string())),
        None => Ok(pipeline),
    }
}
