//! Engine error type
//!
//! Capacity violations are reported before any device state is touched, so a
//! caller that receives one of them can correct its input and retry.

use thiserror::Error;

use crate::gpu::Topology;

/// Errors that can occur while driving the simulation engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// A node store exceeds the device node capacity
    #[error("node count {count} exceeds capacity (must be below {max})")]
    TooManyNodes { count: usize, max: usize },

    /// A derived index list exceeds the index buffer capacity
    #[error("{topology} index count {count} exceeds capacity (must be below {max})")]
    TooManyIndices {
        topology: Topology,
        count: usize,
        max: usize,
    },

    /// A user uniform list does not fit the packed uniform array
    #[error("uniform list of {count} entries exceeds capacity (must be below {max})")]
    TooManyUniforms { count: usize, max: usize },

    /// A run asks for more iterations than can be recorded
    #[error("iteration count {count} exceeds the limit of {max}")]
    TooManyIterations { count: u64, max: u64 },

    /// Queue seed content does not fit the shared ring buffer
    #[error("queue seed of {count} entries exceeds ring capacity {max}")]
    TooManyQueueEntries { count: usize, max: usize },

    /// A node references a neighbor outside the store
    #[error("node {node} references neighbor {value}, outside [0, {node_count})")]
    InvalidNeighbor {
        node: usize,
        value: f32,
        node_count: usize,
    },

    /// A double-buffer side index other than 0 or 1
    #[error("side {0} does not exist")]
    InvalidSide(usize),

    /// Malformed user uniform declaration in kernel text
    #[error("malformed uniform declaration on line {line}: {reason}")]
    UniformParse { line: usize, reason: String },

    /// No adapter satisfies the engine's requirements
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    /// The adapter refused the requested device
    #[error("failed to create GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    /// Kernel text failed shader or pipeline validation
    #[error("shader compilation failed: {0}")]
    Shader(String),

    /// A readback buffer could not be mapped
    #[error("failed to map buffer for readback: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    /// The readback completion signal was lost
    #[error("readback failed: {0}")]
    Readback(String),

    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file could not be understood
    #[error("config error: {0}")]
    Config(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_errors_name_the_limit() {
        let err = EngineError::TooManyNodes {
            count: 1_000_000,
            max: 1_000_000,
        };
        assert_eq!(
            err.to_string(),
            "node count 1000000 exceeds capacity (must be below 1000000)"
        );

        let err = EngineError::TooManyIndices {
            topology: Topology::Lines,
            count: 12,
            max: 10,
        };
        assert_eq!(
            err.to_string(),
            "lines index count 12 exceeds capacity (must be below 10)"
        );
    }

    #[test]
    fn parse_errors_carry_line_numbers() {
        let err = EngineError::UniformParse {
            line: 7,
            reason: "expected a vec4 declaration".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "malformed uniform declaration on line 7: expected a vec4 declaration"
        );
    }
}
