//! Index topologies derived from post-simulation adjacency
//!
//! Points are the identity sequence and lines are the undirected edges
//! implied by the neighbor slots. Triangle derivation is not implemented and
//! always yields an empty list.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use super::context::GpuContext;
use super::readback;
use super::types::MAX_INDICES;
use crate::error::{EngineError, EngineResult};
use crate::nodes::{NO_NEIGHBOR, NeighborSlot, NodeStore};

/// Index format of every topology buffer
pub const INDEX_FORMAT: wgpu::IndexFormat = wgpu::IndexFormat::Uint32;

/// A primitive topology the external renderer can draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    Points,
    Lines,
    Triangles,
}

impl Topology {
    pub const ALL: [Topology; 3] = [Topology::Points, Topology::Lines, Topology::Triangles];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Matching primitive topology for a render pipeline
    pub fn primitive(self) -> wgpu::PrimitiveTopology {
        match self {
            Topology::Points => wgpu::PrimitiveTopology::PointList,
            Topology::Lines => wgpu::PrimitiveTopology::LineList,
            Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Topology::Points => "points",
            Topology::Lines => "lines",
            Topology::Triangles => "triangles",
        };
        f.write_str(name)
    }
}

/// Number of indices stored for each topology
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexCounts {
    pub points: u32,
    pub lines: u32,
    pub triangles: u32,
}

impl IndexCounts {
    pub fn get(&self, topology: Topology) -> u32 {
        match topology {
            Topology::Points => self.points,
            Topology::Lines => self.lines,
            Topology::Triangles => self.triangles,
        }
    }

    fn set(&mut self, topology: Topology, count: u32) {
        match topology {
            Topology::Points => self.points = count,
            Topology::Lines => self.lines = count,
            Topology::Triangles => self.triangles = count,
        }
    }
}

/// `[0, 1, ..., node_count - 1]`
pub fn point_indices(node_count: usize) -> Vec<u32> {
    (0..node_count as u32).collect()
}

/// One index pair per undirected edge, in first-seen order
///
/// Neighbor values that do not name a node in the store are skipped.
pub fn line_indices(store: &NodeStore) -> Vec<u32> {
    let node_count = store.len();
    let mut seen = HashSet::new();
    let mut indices = Vec::new();

    for (i, neighbors) in store.neighbors().iter().enumerate() {
        for slot in NeighborSlot::ALL {
            let value = neighbors[slot.index()];
            if value == NO_NEIGHBOR {
                continue;
            }
            if !(value >= 0.0 && (value as usize) < node_count) {
                warn!(node = i, ?slot, value, "skipping out-of-range neighbor");
                continue;
            }

            let n = value as u32;
            let i = i as u32;
            let pair = (i.min(n), i.max(n));
            if seen.insert(pair) {
                indices.extend([pair.0, pair.1]);
            }
        }
    }
    indices
}

/// Face derivation is not implemented
pub fn triangle_indices(_store: &NodeStore) -> Vec<u32> {
    Vec::new()
}

/// Index lists for every topology, checked against the index capacity
pub fn derive_indices(store: &NodeStore) -> EngineResult<[Vec<u32>; 3]> {
    let lists = [
        point_indices(store.len()),
        line_indices(store),
        triangle_indices(store),
    ];
    for topology in Topology::ALL {
        let count = lists[topology.index()].len();
        if count >= MAX_INDICES {
            return Err(EngineError::TooManyIndices {
                topology,
                count,
                max: MAX_INDICES,
            });
        }
    }
    Ok(lists)
}

/// Device index buffers, one per topology
pub struct TopologyIndexer {
    gpu: GpuContext,
    buffers: [wgpu::Buffer; 3],
    capacities: [usize; 3],
    counts: IndexCounts,
}

impl TopologyIndexer {
    pub fn new(gpu: GpuContext, initial_capacity: usize) -> Self {
        let capacity = initial_capacity.clamp(1, MAX_INDICES);
        let buffers =
            std::array::from_fn(|t| create_index_buffer(&gpu.device, Topology::ALL[t], capacity));
        Self {
            gpu,
            buffers,
            capacities: [capacity; 3],
            counts: IndexCounts::default(),
        }
    }

    /// Derive and upload every topology's indices from `store`
    ///
    /// Nothing on the device changes if any list exceeds the capacity.
    pub fn rebuild(&mut self, store: &NodeStore) -> EngineResult<IndexCounts> {
        let lists = derive_indices(store)?;

        for topology in Topology::ALL {
            let indices = &lists[topology.index()];
            self.counts.set(topology, indices.len() as u32);
            if indices.is_empty() {
                continue;
            }

            let t = topology.index();
            if indices.len() > self.capacities[t] {
                let capacity = indices.len().next_power_of_two();
                self.buffers[t] = create_index_buffer(&self.gpu.device, topology, capacity);
                self.capacities[t] = capacity;
                debug!(%topology, capacity, "grew index buffer");
            }
            self.gpu
                .queue
                .write_buffer(&self.buffers[t], 0, bytemuck::cast_slice(indices));
        }

        debug!(
            points = self.counts.points,
            lines = self.counts.lines,
            triangles = self.counts.triangles,
            "rebuilt index buffers"
        );
        Ok(self.counts)
    }

    pub fn counts(&self) -> IndexCounts {
        self.counts
    }

    pub fn index_count(&self, topology: Topology) -> u32 {
        self.counts.get(topology)
    }

    /// Buffer to draw `topology` from; only the first
    /// [`index_count`](Self::index_count) entries are meaningful
    pub fn index_buffer(&self, topology: Topology) -> &wgpu::Buffer {
        &self.buffers[topology.index()]
    }

    /// Read the stored indices of `topology` back to the host
    pub fn read_indices(&self, topology: Topology) -> EngineResult<Vec<u32>> {
        readback::read_pod_vec(
            &self.gpu,
            self.index_buffer(topology),
            self.index_count(topology) as usize,
        )
    }
}

fn create_index_buffer(
    device: &wgpu::Device,
    topology: Topology,
    capacity: usize,
) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(&format!("{topology} Index Buffer")),
        size: (capacity * std::mem::size_of::<u32>()) as u64,
        usage: wgpu::BufferUsages::INDEX
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{Node, generate_grid};

    #[test]
    fn test_point_indices() {
        assert_eq!(point_indices(4), vec![0, 1, 2, 3]);
        assert!(point_indices(0).is_empty());
    }

    #[test]
    fn test_grid_line_indices() {
        let store = generate_grid((2, 2));
        insta::assert_debug_snapshot!(line_indices(&store), @r"
        [
            0,
            1,
            0,
            2,
            1,
            3,
            2,
            3,
        ]
        ");
    }

    #[test]
    fn test_cycle_edges_are_deduplicated() {
        // 0 - 1
        // |   |
        // 3 - 2, each node naming both of its cycle neighbors
        let n = NO_NEIGHBOR;
        let nodes = [
            Node::default().with_neighbors([1.0, n, n, 3.0]),
            Node::default().with_neighbors([n, n, 0.0, 2.0]),
            Node::default().with_neighbors([n, 1.0, 3.0, n]),
            Node::default().with_neighbors([2.0, 0.0, n, n]),
        ];
        let indices = line_indices(&NodeStore::from_nodes(&nodes));

        assert_eq!(indices.len(), 8);
        assert!(indices.iter().all(|&i| i < 4));
        let pairs: HashSet<_> = indices.chunks(2).map(|p| (p[0], p[1])).collect();
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs, HashSet::from([(0, 1), (0, 3), (1, 2), (2, 3)]));
    }

    #[test]
    fn test_grid_edge_count() {
        let (a, b) = (5, 3);
        let store = generate_grid((a, b));
        let edges = line_indices(&store).len() / 2;
        assert_eq!(edges as u32, a * (b - 1) + b * (a - 1));
    }

    #[test]
    fn test_out_of_range_neighbors_are_skipped() {
        let nodes = [
            Node::default().with_neighbors([1.0, 7.0, -3.0, NO_NEIGHBOR]),
            Node::default(),
        ];
        assert_eq!(line_indices(&NodeStore::from_nodes(&nodes)), vec![0, 1]);
    }

    #[test]
    fn test_triangles_are_empty() {
        let lists = derive_indices(&generate_grid((3, 3))).unwrap();
        assert!(lists[Topology::Triangles.index()].is_empty());
        assert_eq!(lists[Topology::Points.index()].len(), 9);
    }

    #[test]
    fn test_topology_display() {
        let names: Vec<_> = Topology::ALL.iter().map(|t| t.to_string()).collect();
        assert_eq!(names, ["points", "lines", "triangles"]);
        assert_eq!(Topology::Lines.primitive(), wgpu::PrimitiveTopology::LineList);
    }

    #[test]
    fn test_index_counts_lookup() {
        let mut counts = IndexCounts::default();
        counts.set(Topology::Lines, 8);
        assert_eq!(counts.get(Topology::Lines), 8);
        assert_eq!(counts.get(Topology::Points), 0);
    }
}
