//! Node data model and topology generation
//!
//! A [`NodeStore`] keeps one array per node attribute ("parallel arrays"):
//! entry `i` across all attribute arrays describes node `i`. This is the exact
//! layout the device buffers use, so uploads and downloads are plain slice
//! copies.

use std::fmt;

use serde::Serialize;

use crate::error::{EngineError, EngineResult};

/// A four-component float vector, laid out like WGSL `vec4<f32>`
pub type Vec4 = [f32; 4];

/// Neighbor value meaning "no neighbor in this direction"
pub const NO_NEIGHBOR: f32 = -1.0;

/// Upper bound (exclusive) on the number of nodes in a store
pub const MAX_NODES: usize = 1_000_000;

/// Smallest per-axis grid sample count
pub const MIN_GRID_SAMPLES: u32 = 2;

/// Largest per-axis grid sample count
pub const MAX_GRID_SAMPLES: u32 = 500;

/// Half-extent of the plane a generated grid is embedded in
const GRID_PLANE_SIZE: f32 = 10.0;

/// Per-node attributes, in device binding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Pos,
    Vel,
    Neighbors,
    Data,
    TopData,
}

impl Attribute {
    /// Number of attributes carried by every node
    pub const COUNT: usize = 5;

    /// All attributes in binding order
    pub const ALL: [Attribute; Attribute::COUNT] = [
        Attribute::Pos,
        Attribute::Vel,
        Attribute::Neighbors,
        Attribute::Data,
        Attribute::TopData,
    ];

    /// Position of this attribute in binding order
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short name used in labels and shader identifiers
    pub fn name(self) -> &'static str {
        match self {
            Attribute::Pos => "pos",
            Attribute::Vel => "vel",
            Attribute::Neighbors => "neighbors",
            Attribute::Data => "data",
            Attribute::TopData => "top_data",
        }
    }
}

/// Directional neighbor slots, in the order they are stored in `neighbors`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeighborSlot {
    Right,
    Upper,
    Left,
    Lower,
}

impl NeighborSlot {
    /// All slots in storage order
    pub const ALL: [NeighborSlot; 4] = [
        NeighborSlot::Right,
        NeighborSlot::Upper,
        NeighborSlot::Left,
        NeighborSlot::Lower,
    ];

    /// Component of the `neighbors` vector holding this slot
    pub fn index(self) -> usize {
        self as usize
    }

    /// The slot pointing back the other way
    pub fn opposite(self) -> NeighborSlot {
        match self {
            NeighborSlot::Right => NeighborSlot::Left,
            NeighborSlot::Upper => NeighborSlot::Lower,
            NeighborSlot::Left => NeighborSlot::Right,
            NeighborSlot::Lower => NeighborSlot::Upper,
        }
    }

    /// Grid coordinate offset of this slot
    fn offset(self) -> (i64, i64) {
        match self {
            NeighborSlot::Right => (1, 0),
            NeighborSlot::Upper => (0, 1),
            NeighborSlot::Left => (-1, 0),
            NeighborSlot::Lower => (0, -1),
        }
    }
}

/// One element of the simulated graph
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Node {
    pub pos: Vec4,
    pub vel: Vec4,
    pub neighbors: Vec4,
    pub data: Vec4,
    pub top_data: Vec4,
}

impl Node {
    /// Create an unconnected node at the given position
    pub fn new(pos: Vec4) -> Self {
        Self {
            pos,
            ..Self::default()
        }
    }

    /// Set all four neighbor slots (right, upper, left, lower)
    pub fn with_neighbors(mut self, neighbors: Vec4) -> Self {
        self.neighbors = neighbors;
        self
    }

    /// Set the free-form payload
    pub fn with_data(mut self, data: Vec4) -> Self {
        self.data = data;
        self
    }

    /// Neighbor index in the given direction, if any
    pub fn neighbor(&self, slot: NeighborSlot) -> Option<u32> {
        decode_neighbor(self.neighbors[slot.index()])
    }
}

impl Default for Node {
    fn default() -> Self {
        Self {
            pos: [0.0; 4],
            vel: [0.0; 4],
            neighbors: [NO_NEIGHBOR; 4],
            data: [0.0; 4],
            top_data: [0.0; 4],
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pos: {}, vel: {}, neighbors: {}, data: {}, top_data: {}",
            Vec4Display(&self.pos),
            Vec4Display(&self.vel),
            Vec4Display(&self.neighbors),
            Vec4Display(&self.data),
            Vec4Display(&self.top_data),
        )
    }
}

struct Vec4Display<'a>(&'a Vec4);

impl fmt::Display for Vec4Display<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(f, "[{:5.2} {:5.2} {:5.2} {:5.2}]", v[0], v[1], v[2], v[3])
    }
}

/// Decode a float-encoded neighbor reference
fn decode_neighbor(value: f32) -> Option<u32> {
    if value == NO_NEIGHBOR {
        None
    } else {
        Some(value as u32)
    }
}

/// Structure-of-arrays container for per-node attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeStore {
    pos: Vec<Vec4>,
    vel: Vec<Vec4>,
    neighbors: Vec<Vec4>,
    data: Vec<Vec4>,
    top_data: Vec<Vec4>,
}

impl NodeStore {
    /// A store of `len` nodes with every attribute zeroed
    pub fn zeroed(len: usize) -> Self {
        Self {
            pos: vec![[0.0; 4]; len],
            vel: vec![[0.0; 4]; len],
            neighbors: vec![[0.0; 4]; len],
            data: vec![[0.0; 4]; len],
            top_data: vec![[0.0; 4]; len],
        }
    }

    /// Split a list of nodes into parallel attribute arrays
    pub fn from_nodes(nodes: &[Node]) -> Self {
        Self {
            pos: nodes.iter().map(|n| n.pos).collect(),
            vel: nodes.iter().map(|n| n.vel).collect(),
            neighbors: nodes.iter().map(|n| n.neighbors).collect(),
            data: nodes.iter().map(|n| n.data).collect(),
            top_data: nodes.iter().map(|n| n.top_data).collect(),
        }
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.pos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pos.is_empty()
    }

    /// Reassemble node `i` from the attribute arrays
    pub fn node_at(&self, i: usize) -> Node {
        Node {
            pos: self.pos[i],
            vel: self.vel[i],
            neighbors: self.neighbors[i],
            data: self.data[i],
            top_data: self.top_data[i],
        }
    }

    /// Iterate over reassembled nodes
    pub fn nodes(&self) -> impl Iterator<Item = Node> + '_ {
        (0..self.len()).map(|i| self.node_at(i))
    }

    /// The array backing one attribute
    pub fn attribute(&self, attribute: Attribute) -> &[Vec4] {
        match attribute {
            Attribute::Pos => &self.pos,
            Attribute::Vel => &self.vel,
            Attribute::Neighbors => &self.neighbors,
            Attribute::Data => &self.data,
            Attribute::TopData => &self.top_data,
        }
    }

    pub(crate) fn attribute_mut(&mut self, attribute: Attribute) -> &mut Vec<Vec4> {
        match attribute {
            Attribute::Pos => &mut self.pos,
            Attribute::Vel => &mut self.vel,
            Attribute::Neighbors => &mut self.neighbors,
            Attribute::Data => &mut self.data,
            Attribute::TopData => &mut self.top_data,
        }
    }

    pub fn positions(&self) -> &[Vec4] {
        &self.pos
    }

    pub fn velocities(&self) -> &[Vec4] {
        &self.vel
    }

    pub fn neighbors(&self) -> &[Vec4] {
        &self.neighbors
    }

    pub fn data(&self) -> &[Vec4] {
        &self.data
    }

    pub fn top_data(&self) -> &[Vec4] {
        &self.top_data
    }

    /// Neighbor of node `i` in the given direction, if any
    pub fn neighbor(&self, i: usize, slot: NeighborSlot) -> Option<u32> {
        decode_neighbor(self.neighbors[i][slot.index()])
    }

    /// Check that every non-sentinel neighbor value names a node in the store
    pub fn validate_neighbors(&self) -> EngineResult<()> {
        let node_count = self.len();
        for (node, neighbors) in self.neighbors.iter().enumerate() {
            for &value in neighbors {
                if value == NO_NEIGHBOR {
                    continue;
                }
                let in_range = value.is_finite()
                    && value >= 0.0
                    && value.fract() == 0.0
                    && (value as usize) < node_count;
                if !in_range {
                    return Err(EngineError::InvalidNeighbor {
                        node,
                        value,
                        node_count,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Clamp a requested per-axis sample count to the supported range
pub fn clamp_samples(samples: u32) -> u32 {
    samples.clamp(MIN_GRID_SAMPLES, MAX_GRID_SAMPLES)
}

/// Index of the grid node at `(x, y)`, or `None` outside the grid
fn coord_to_index(x: i64, y: i64, samples: (u32, u32)) -> Option<u32> {
    let (a, b) = (i64::from(samples.0), i64::from(samples.1));
    if (0..a).contains(&x) && (0..b).contains(&y) {
        Some((x + a * y) as u32)
    } else {
        None
    }
}

/// Planar embedding of a grid coordinate, centered on the origin in XZ
fn plane_position(x: u32, y: u32, samples: (u32, u32)) -> Vec4 {
    let ux = x as f32 / samples.0.saturating_sub(1).max(1) as f32;
    let uy = y as f32 / samples.1.saturating_sub(1).max(1) as f32;
    [
        GRID_PLANE_SIZE * (ux - 0.5),
        0.0,
        GRID_PLANE_SIZE * (uy - 0.5),
        0.0,
    ]
}

/// Generate a regular `A×B` grid of nodes in row-major order (`x + A*y`)
///
/// Each node's neighbor slots reference the adjacent grid nodes, or hold
/// [`NO_NEIGHBOR`] along the grid border. Callers clamp the sample counts with
/// [`clamp_samples`].
pub fn generate_grid(samples: (u32, u32)) -> NodeStore {
    let (a, b) = samples;
    let mut nodes = Vec::with_capacity(a as usize * b as usize);
    for y in 0..b {
        for x in 0..a {
            let mut neighbors = [NO_NEIGHBOR; 4];
            for slot in NeighborSlot::ALL {
                let (dx, dy) = slot.offset();
                if let Some(index) = coord_to_index(i64::from(x) + dx, i64::from(y) + dy, samples)
                {
                    neighbors[slot.index()] = index as f32;
                }
            }
            nodes.push(Node::new(plane_position(x, y, samples)).with_neighbors(neighbors));
        }
    }
    NodeStore::from_nodes(&nodes)
}
