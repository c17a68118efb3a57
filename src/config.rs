//! Engine configuration
//!
//! Configuration files are YAML or JSON, chosen by extension. Every field is
//! optional.
//!
//! ```yaml
//! grid_samples: 64
//! inactive_node_count: 0
//! kernel: kernels/diffuse.wgsl
//! log:
//!   output_queue_state: true
//!   durations: true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::gpu::DEFAULT_KERNEL;
use crate::nodes::clamp_samples;

/// Diagnostic dumps emitted while running the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogToggles {
    pub input_nodes: bool,
    pub output_nodes: bool,
    pub point_indices: bool,
    pub line_indices: bool,
    pub triangle_indices: bool,
    pub input_queue_state: bool,
    pub output_queue_state: bool,
    pub durations: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Grid samples per axis for `reset`
    pub grid_samples: u32,
    /// Iterations per pipeline run
    pub num_iters: u32,
    /// Nodes below this index pass through the kernel unchanged
    pub inactive_node_count: u32,
    pub initial_node_capacity: usize,
    pub initial_index_capacity: usize,
    /// WGSL kernel file; the built-in kernel when absent
    pub kernel: Option<PathBuf>,
    /// Prefer a discrete adapter over an integrated one
    pub high_performance: bool,
    pub log: LogToggles,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid_samples: 100,
            num_iters: 0,
            inactive_node_count: 0,
            initial_node_capacity: 1024,
            initial_index_capacity: 4096,
            kernel: None,
            high_performance: true,
            log: LogToggles::default(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration file, picking the format from its extension
    pub fn load(path: &Path) -> EngineResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| {
                EngineError::Config(format!(
                    "could not determine config format from path: {}",
                    path.display()
                ))
            })?;

        let text = std::fs::read_to_string(path)?;
        match ext.as_str() {
            "yaml" | "yml" => {
                serde_yaml::from_str(&text).map_err(|e| EngineError::Config(e.to_string()))
            }
            "json" => serde_json::from_str(&text).map_err(|e| EngineError::Config(e.to_string())),
            other => Err(EngineError::Config(format!(
                "unsupported config format: {other}"
            ))),
        }
    }

    /// Grid samples per axis, clamped to the supported range
    pub fn samples(&self) -> u32 {
        clamp_samples(self.grid_samples)
    }

    /// Text of the configured kernel
    pub fn kernel_source(&self) -> EngineResult<String> {
        match &self.kernel {
            Some(path) => Ok(std::fs::read_to_string(path)?),
            None => Ok(DEFAULT_KERNEL.to_string()),
        }
    }
}
