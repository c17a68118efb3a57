//! GPU buffer types for the simulation engine
//!
//! These types are uploaded directly to GPU buffers, so all of them are
//! `repr(C)` and plain-old-data.

use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::error::{EngineError, EngineResult};
use crate::nodes::Attribute;
use crate::uniforms::{MAX_USER_UNIFORMS, PackedUniforms};

// =============================================================================
// Capacity Constants
// =============================================================================

/// Invocations per compute workgroup (matches `@workgroup_size` in kernels)
pub const WORKGROUP_SIZE: u32 = 256;

/// Number of device-resident mirrors of the node store
pub const SIDE_COUNT: usize = 2;

/// Number of per-node attribute buffers on each side
pub const ATTRIBUTE_COUNT: usize = Attribute::COUNT;

/// Capacity of the shared queue ring buffer
pub const QUEUE_CAPACITY: usize = 1000;

/// Exclusive upper bound on any topology's index count
pub const MAX_INDICES: usize = 1_000_000;

/// Largest number of iterations a single run may record
pub const MAX_ITERS: u64 = 1_000_000_000;

/// Size in bytes of the per-iteration compute parameter header
pub const COMPUTE_HEADER_SIZE: u64 = std::mem::size_of::<ComputeHeader>() as u64;

/// The side opposite `side`
pub fn other_side(side: usize) -> usize {
    (side + 1) % SIDE_COUNT
}

/// Reject side indices other than 0 and 1
pub fn check_side(side: usize) -> EngineResult<usize> {
    if side < SIDE_COUNT {
        Ok(side)
    } else {
        Err(EngineError::InvalidSide(side))
    }
}

// =============================================================================
// Shared Queue State
// =============================================================================

/// Ring buffer and per-side cursors shared by every dispatch of a run
///
/// Layout matches the `QueueState` struct in the compute preamble.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SharedQueueState {
    /// Per-side counters kernels may increment atomically
    pub step_counters: [u32; SIDE_COUNT],
    /// Per-side position of the first live entry
    pub start_ptrs: [u32; SIDE_COUNT],
    /// Per-side position one past the last live entry
    pub end_ptrs: [u32; SIDE_COUNT],
    pub _padding: [u32; 2],
    pub queue_mem: [u32; QUEUE_CAPACITY],
}

impl Default for SharedQueueState {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl SharedQueueState {
    /// Build a state with `contents` at the front of the ring and the given
    /// cursors; counters start at zero and the rest of the ring is zeroed
    pub fn seeded(
        contents: &[u32],
        start_ptrs: [u32; SIDE_COUNT],
        end_ptrs: [u32; SIDE_COUNT],
    ) -> EngineResult<Self> {
        if contents.len() > QUEUE_CAPACITY {
            return Err(EngineError::TooManyQueueEntries {
                count: contents.len(),
                max: QUEUE_CAPACITY,
            });
        }
        let mut state = Self::default();
        state.queue_mem[..contents.len()].copy_from_slice(contents);
        state.start_ptrs = start_ptrs;
        state.end_ptrs = end_ptrs;
        Ok(state)
    }

    /// The seed every run starts from unless the caller replaces it
    pub fn default_seed() -> Self {
        let mut state = Self::default();
        state.queue_mem[..3].copy_from_slice(&[1, 2, 3]);
        state.end_ptrs = [3, 3];
        state
    }

    /// Entries in `[start, end)` for `side`, wrapping modulo the capacity
    pub fn live_entries(&self, side: usize) -> EngineResult<impl Iterator<Item = u32> + '_> {
        let side = check_side(side)?;
        let len = QUEUE_CAPACITY as u32;
        let start = self.start_ptrs[side] % len;
        let end = self.end_ptrs[side] % len;
        let count = (end + len - start) % len;
        Ok((0..count).map(move |k| self.queue_mem[((start + k) % len) as usize]))
    }
}

impl fmt::Display for SharedQueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ctr0 {:4}, ctr1 {:4}",
            self.step_counters[0], self.step_counters[1]
        )?;
        for side in 0..SIDE_COUNT {
            writeln!(
                f,
                "start{side} {:4}, end{side} {:4}",
                self.start_ptrs[side], self.end_ptrs[side]
            )?;
        }

        // Only the prefix up to the furthest cursor carries anything useful
        let len = QUEUE_CAPACITY as u32;
        let last = self
            .start_ptrs
            .iter()
            .chain(&self.end_ptrs)
            .map(|p| p % len)
            .max()
            .unwrap_or(0);
        writeln!(f, "queue mem:")?;
        for i in 0..=last.min(len - 1) {
            let mark = |ptrs: &[u32; SIDE_COUNT], side: usize, tag: &'static str| {
                if ptrs[side] % len == i { tag } else { "" }
            };
            writeln!(
                f,
                "({:2} {:2} {:2} {:2}) {:4}: {:4}",
                mark(&self.start_ptrs, 0, "s0"),
                mark(&self.end_ptrs, 0, "e0"),
                mark(&self.start_ptrs, 1, "s1"),
                mark(&self.end_ptrs, 1, "e1"),
                i,
                self.queue_mem[i as usize]
            )?;
        }
        Ok(())
    }
}

// =============================================================================
// Kernel Parameters
// =============================================================================

/// Per-iteration part of the compute parameters
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct ComputeHeader {
    pub node_count: u32,
    /// Nodes below this index pass through unchanged
    pub inactive_node_count: u32,
    pub iter_num: u32,
    /// Logical length of the shared queue ring
    pub queue_len: u32,
}

/// Full parameter record for one compute dispatch
///
/// Layout matches `ComputeParams` in the compute preamble.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ComputePushConstants {
    pub header: ComputeHeader,
    pub user_unif_vals: PackedUniforms,
}

impl ComputePushConstants {
    pub fn new(header: ComputeHeader, user_unif_vals: &PackedUniforms) -> Self {
        Self {
            header,
            user_unif_vals: *user_unif_vals,
        }
    }
}

/// Identity 4x4 matrix, column-major
pub const IDENTITY: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Parameter record for the external renderer
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RenderPushConstants {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub user_unif_vals: PackedUniforms,
}

impl Default for RenderPushConstants {
    fn default() -> Self {
        Self {
            model: IDENTITY,
            view: IDENTITY,
            proj: IDENTITY,
            user_unif_vals: [[0.0; 4]; MAX_USER_UNIFORMS],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_state_size() {
        // 8 u32 of counters, cursors and padding + 1000 u32 of ring
        assert_eq!(std::mem::size_of::<SharedQueueState>(), 4032);
    }

    #[test]
    fn test_compute_params_size() {
        // 4 u32 header + 100 vec4 = 16 + 1600 bytes
        assert_eq!(COMPUTE_HEADER_SIZE, 16);
        assert_eq!(std::mem::size_of::<ComputePushConstants>(), 1616);
    }

    #[test]
    fn test_render_params_size() {
        // 3 mat4 + 100 vec4, 16-byte aligned for a uniform block
        let size = std::mem::size_of::<RenderPushConstants>();
        assert_eq!(size, 192 + 1600);
        assert_eq!(size % 16, 0);
    }

    #[test]
    fn test_default_seed() {
        let state = SharedQueueState::default_seed();
        assert_eq!(&state.queue_mem[..4], &[1, 2, 3, 0]);
        assert_eq!(state.start_ptrs, [0, 0]);
        assert_eq!(state.end_ptrs, [3, 3]);
        assert_eq!(state.step_counters, [0, 0]);
        assert_eq!(
            SharedQueueState::seeded(&[1, 2, 3], [0, 0], [3, 3]).unwrap(),
            state
        );
    }

    #[test]
    fn test_seed_rejects_overflow() {
        let contents = vec![7; QUEUE_CAPACITY + 1];
        assert!(matches!(
            SharedQueueState::seeded(&contents, [0, 0], [0, 0]),
            Err(EngineError::TooManyQueueEntries { count: 1001, max: 1000 })
        ));
    }

    #[test]
    fn test_live_entries_wrap() {
        let mut state = SharedQueueState::seeded(&[10, 11, 12], [1, 998], [3, 1]).unwrap();
        state.queue_mem[998] = 98;
        state.queue_mem[999] = 99;

        assert_eq!(state.live_entries(0).unwrap().collect::<Vec<_>>(), vec![11, 12]);
        assert_eq!(state.live_entries(1).unwrap().collect::<Vec<_>>(), vec![98, 99, 10]);
    }

    #[test]
    fn test_equal_cursors_are_empty() {
        let state = SharedQueueState::seeded(&[5], [4, 0], [4, 0]).unwrap();
        assert_eq!(state.live_entries(0).unwrap().count(), 0);
        assert_eq!(state.live_entries(1).unwrap().count(), 0);
    }

    #[test]
    fn test_live_entries_reject_invalid_side() {
        let state = SharedQueueState::default_seed();
        assert!(matches!(
            state.live_entries(2).map(|entries| entries.count()),
            Err(EngineError::InvalidSide(2))
        ));
    }

    #[test]
    fn test_queue_display_marks_cursors() {
        let text = SharedQueueState::default_seed().to_string();
        assert!(text.starts_with("ctr0    0, ctr1    0\n"));
        assert!(text.contains("start1    0, end1    3"));
        assert!(text.contains("(s0    s1   )    0:    1"));
        assert!(text.contains("(   e0    e1)    3:    0"));
    }

    #[test]
    fn test_side_helpers() {
        assert_eq!(other_side(0), 1);
        assert_eq!(other_side(1), 0);
        assert!(check_side(1).is_ok());
        assert!(matches!(check_side(2), Err(EngineError::InvalidSide(2))));
    }
}
