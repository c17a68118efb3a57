//! Double-buffered GPU simulation
//!
//! The device side of the engine, built on wgpu compute shaders:
//!
//! - **Buffers**: two mirrors of the node store with render and compute
//!   binding sets ([`DoubleBufferSet`])
//! - **Scheduling**: multi-iteration runs that alternate sides by parity
//!   ([`SimulationScheduler`])
//! - **Indexing**: point and line index buffers derived from adjacency
//!   ([`TopologyIndexer`])
//! - **Render parameters**: transforms and render uniforms for an external
//!   renderer ([`RenderParams`])

mod buffers;
mod context;
mod indexer;
mod readback;
mod render_params;
mod scheduler;
mod shaders;
mod types;

pub use buffers::{
    DoubleBufferSet, QUEUE_STATE_BINDING, compute_layout_entries, other_binding, own_binding,
    render_layout_entries,
};
pub use context::{GpuContext, REQUIRED_STORAGE_BUFFERS};
pub use indexer::{
    INDEX_FORMAT, IndexCounts, Topology, TopologyIndexer, derive_indices, line_indices,
    point_indices, triangle_indices,
};
pub use render_params::{Mat4, RenderParams};
pub use scheduler::{
    RunCommand, RunParams, RunPlan, SchedulerState, SimulationScheduler, check_iterations,
    group_count, read_side, result_side,
};
pub use shaders::{
    DEFAULT_KERNEL, KERNEL_ENTRY_POINT, compute_preamble, kernel_module_source, render_preamble,
};
pub use types::{
    // Capacity constants
    ATTRIBUTE_COUNT,
    COMPUTE_HEADER_SIZE,
    ComputeHeader,
    ComputePushConstants,
    IDENTITY,
    MAX_INDICES,
    MAX_ITERS,
    QUEUE_CAPACITY,
    RenderPushConstants,
    SIDE_COUNT,
    SharedQueueState,
    WORKGROUP_SIZE,
    check_side,
    other_side,
};
