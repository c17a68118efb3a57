//! Double-buffered node attribute storage
//!
//! Two device-resident mirrors of the node store ("sides") live in an
//! explicit registry indexed by side id. Each side carries a
//! render-binding-set (its own attributes, read-only) and a
//! compute-binding-set (its own attributes writable, the other side's
//! attributes read-only, plus the shared queue state).
//!
//! Bindings are built in two phases: every side's buffers are allocated
//! first, then compute-binding-sets are assembled, since each one references
//! the other side's buffers. Any reallocation repeats both phases.

use tracing::debug;

use super::context::GpuContext;
use super::readback;
use super::types::{ATTRIBUTE_COUNT, SIDE_COUNT, SharedQueueState, check_side, other_side};
use crate::error::{EngineError, EngineResult};
use crate::nodes::{Attribute, MAX_NODES, NodeStore, Vec4};

const VEC4_SIZE: u64 = std::mem::size_of::<Vec4>() as u64;

/// Binding index of the shared queue state in a compute-binding-set
pub const QUEUE_STATE_BINDING: u32 = 2 * ATTRIBUTE_COUNT as u32;

/// Binding index of attribute `attr` on the side that owns the binding set
pub fn own_binding(attr: Attribute) -> u32 {
    attr.index() as u32
}

/// Binding index of attribute `attr` on the opposite side
pub fn other_binding(attr: Attribute) -> u32 {
    (ATTRIBUTE_COUNT + attr.index()) as u32
}

fn storage_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    read_only: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Layout entries of a render-binding-set
pub fn render_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    Attribute::ALL
        .iter()
        .map(|&attr| {
            storage_entry(
                own_binding(attr),
                wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                true,
            )
        })
        .collect()
}

/// Layout entries of a compute-binding-set
pub fn compute_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    let own = Attribute::ALL
        .iter()
        .map(|&attr| storage_entry(own_binding(attr), wgpu::ShaderStages::COMPUTE, false));
    let other = Attribute::ALL
        .iter()
        .map(|&attr| storage_entry(other_binding(attr), wgpu::ShaderStages::COMPUTE, true));
    own.chain(other)
        .chain(std::iter::once(storage_entry(
            QUEUE_STATE_BINDING,
            wgpu::ShaderStages::COMPUTE,
            false,
        )))
        .collect()
}

/// One side's attribute buffers, indexed by [`Attribute::index`]
struct SideBuffers {
    attributes: [wgpu::Buffer; ATTRIBUTE_COUNT],
}

impl SideBuffers {
    fn allocate(device: &wgpu::Device, side: usize, capacity: usize) -> Self {
        let size = capacity as u64 * VEC4_SIZE;
        let attributes = std::array::from_fn(|a| {
            let attr = Attribute::ALL[a];
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("Side {side} {} Buffer", attr.name())),
                size,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        });
        Self { attributes }
    }

    fn buffer(&self, attr: Attribute) -> &wgpu::Buffer {
        &self.attributes[attr.index()]
    }
}

/// Two mirrored node stores on the device plus their binding sets
pub struct DoubleBufferSet {
    gpu: GpuContext,

    sides: [SideBuffers; SIDE_COUNT],
    render_bindings: [wgpu::BindGroup; SIDE_COUNT],
    compute_bindings: [wgpu::BindGroup; SIDE_COUNT],
    render_layout: wgpu::BindGroupLayout,
    compute_layout: wgpu::BindGroupLayout,

    // Written once per run, bound by both compute-binding-sets
    queue_state_buffer: wgpu::Buffer,

    capacity: usize,
    node_count: usize,
    result_side: usize,
    binding_generation: u64,
}

impl DoubleBufferSet {
    /// Allocate both sides with room for `initial_capacity` nodes
    pub fn new(gpu: GpuContext, initial_capacity: usize) -> Self {
        let device = &gpu.device;
        let capacity = initial_capacity.clamp(1, MAX_NODES);

        let render_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Render Binding Set Layout"),
            entries: &render_layout_entries(),
        });
        let compute_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Compute Binding Set Layout"),
            entries: &compute_layout_entries(),
        });

        let queue_state_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shared Queue State Buffer"),
            size: std::mem::size_of::<SharedQueueState>() as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let sides: [SideBuffers; SIDE_COUNT] =
            std::array::from_fn(|side| SideBuffers::allocate(device, side, capacity));
        let render_bindings =
            std::array::from_fn(|side| build_render_binding(device, &render_layout, &sides, side));
        let compute_bindings = std::array::from_fn(|side| {
            build_compute_binding(
                device,
                &compute_layout,
                &sides,
                &queue_state_buffer,
                side,
                other_side(side),
            )
        });
        debug!(capacity, "allocated double buffer set");

        Self {
            gpu,
            sides,
            render_bindings,
            compute_bindings,
            render_layout,
            compute_layout,
            queue_state_buffer,
            capacity,
            node_count: 0,
            result_side: 0,
            binding_generation: 1,
        }
    }

    /// Grow both sides so they hold at least `node_count` nodes
    ///
    /// Growth reallocates every attribute buffer, discarding device contents,
    /// and rebuilds all binding sets.
    pub fn ensure_capacity(&mut self, node_count: usize) -> EngineResult<()> {
        check_node_count(node_count)?;
        if node_count <= self.capacity {
            return Ok(());
        }

        let capacity = node_count.next_power_of_two();
        let device = &self.gpu.device;

        // Phase 1: every side's storage exists before any binding refers to it
        self.sides = std::array::from_fn(|side| SideBuffers::allocate(device, side, capacity));

        // Phase 2: bindings, including the cross-side references
        self.render_bindings = std::array::from_fn(|side| {
            build_render_binding(device, &self.render_layout, &self.sides, side)
        });
        self.compute_bindings = std::array::from_fn(|side| {
            build_compute_binding(
                device,
                &self.compute_layout,
                &self.sides,
                &self.queue_state_buffer,
                side,
                other_side(side),
            )
        });

        self.binding_generation += 1;
        debug!(
            old_capacity = self.capacity,
            capacity,
            generation = self.binding_generation,
            "reallocated node buffers and rebuilt bindings"
        );
        self.capacity = capacity;
        Ok(())
    }

    /// Write `store` into side 0, replacing whatever topology was there
    pub fn upload(&mut self, store: &NodeStore) -> EngineResult<()> {
        check_node_count(store.len())?;
        store.validate_neighbors()?;
        self.ensure_capacity(store.len())?;

        for attr in Attribute::ALL {
            let values = store.attribute(attr);
            if !values.is_empty() {
                self.gpu.queue.write_buffer(
                    self.sides[0].buffer(attr),
                    0,
                    bytemuck::cast_slice(values),
                );
            }
        }
        self.node_count = store.len();
        self.result_side = 0;
        debug!(nodes = self.node_count, "uploaded node store to side 0");
        Ok(())
    }

    /// Read every attribute of `side` back to the host
    pub fn download(&self, side: usize) -> EngineResult<NodeStore> {
        let side = check_side(side)?;
        let mut store = NodeStore::default();
        if self.node_count == 0 {
            return Ok(store);
        }

        for attr in Attribute::ALL {
            *store.attribute_mut(attr) =
                readback::read_pod_vec(&self.gpu, self.sides[side].buffer(attr), self.node_count)?;
        }
        Ok(store)
    }

    /// Overwrite the shared queue state buffer
    pub fn write_queue_state(&self, state: &SharedQueueState) {
        self.gpu
            .queue
            .write_buffer(&self.queue_state_buffer, 0, bytemuck::bytes_of(state));
    }

    /// Read the shared queue state buffer back to the host
    pub fn read_queue_state(&self) -> EngineResult<SharedQueueState> {
        readback::read_pod(&self.gpu, &self.queue_state_buffer)
    }

    pub fn render_binding(&self, side: usize) -> EngineResult<&wgpu::BindGroup> {
        Ok(&self.render_bindings[check_side(side)?])
    }

    pub fn compute_binding(&self, side: usize) -> EngineResult<&wgpu::BindGroup> {
        Ok(&self.compute_bindings[check_side(side)?])
    }

    /// Device buffer backing one attribute of one side
    pub fn attribute_buffer(&self, side: usize, attr: Attribute) -> EngineResult<&wgpu::Buffer> {
        Ok(self.sides[check_side(side)?].buffer(attr))
    }

    pub fn render_layout(&self) -> &wgpu::BindGroupLayout {
        &self.render_layout
    }

    pub fn compute_layout(&self) -> &wgpu::BindGroupLayout {
        &self.compute_layout
    }

    pub fn queue_state_buffer(&self) -> &wgpu::Buffer {
        &self.queue_state_buffer
    }

    /// Number of nodes in the last upload
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Number of nodes each side can hold without reallocating
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Side holding the newest simulation output
    pub fn result_side(&self) -> usize {
        self.result_side
    }

    pub(crate) fn set_result_side(&mut self, side: usize) -> EngineResult<()> {
        self.result_side = check_side(side)?;
        Ok(())
    }

    /// How many times the binding sets have been built
    pub fn binding_generation(&self) -> u64 {
        self.binding_generation
    }
}

fn check_node_count(count: usize) -> EngineResult<()> {
    if count >= MAX_NODES {
        return Err(EngineError::TooManyNodes {
            count,
            max: MAX_NODES,
        });
    }
    Ok(())
}

fn build_render_binding(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    sides: &[SideBuffers; SIDE_COUNT],
    side: usize,
) -> wgpu::BindGroup {
    let entries: Vec<_> = Attribute::ALL
        .iter()
        .map(|&attr| wgpu::BindGroupEntry {
            binding: own_binding(attr),
            resource: sides[side].buffer(attr).as_entire_binding(),
        })
        .collect();

    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("Side {side} Render Binding Set")),
        layout,
        entries: &entries,
    })
}

/// Compute-binding-set writing `self_id` and reading `other_id`
fn build_compute_binding(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    sides: &[SideBuffers; SIDE_COUNT],
    queue_state: &wgpu::Buffer,
    self_id: usize,
    other_id: usize,
) -> wgpu::BindGroup {
    let own = Attribute::ALL.iter().map(|&attr| wgpu::BindGroupEntry {
        binding: own_binding(attr),
        resource: sides[self_id].buffer(attr).as_entire_binding(),
    });
    let other = Attribute::ALL.iter().map(|&attr| wgpu::BindGroupEntry {
        binding: other_binding(attr),
        resource: sides[other_id].buffer(attr).as_entire_binding(),
    });
    let entries: Vec<_> = own
        .chain(other)
        .chain(std::iter::once(wgpu::BindGroupEntry {
            binding: QUEUE_STATE_BINDING,
            resource: queue_state.as_entire_binding(),
        }))
        .collect();

    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("Side {self_id} Compute Binding Set")),
        layout,
        entries: &entries,
    })
}
