//! The engine context
//!
//! [`Engine`] owns every piece of simulation state: the double-buffered node
//! storage, the scheduler, the index buffers, the render parameters and the
//! uniform lists. Callers hold it and pass it by reference; there is no
//! global state.

use std::fmt::Write;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::gpu::{
    DoubleBufferSet, GpuContext, IndexCounts, Mat4, RenderParams, RunParams, SIDE_COUNT,
    SharedQueueState, SimulationScheduler, Topology, TopologyIndexer,
};
use crate::nodes::{NodeStore, clamp_samples, generate_grid};
use crate::uniforms::{UniformMarshaler, UserUniform, check_uniform_count, parse_user_uniforms};

/// Outcome of one [`Engine::run_pipeline`] call
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub result_side: usize,
    pub counts: IndexCounts,
    pub nodes: NodeStore,
}

pub struct Engine {
    config: EngineConfig,

    buffers: DoubleBufferSet,
    scheduler: SimulationScheduler,
    indexer: TopologyIndexer,
    render_params: RenderParams,

    compute_marshaler: UniformMarshaler,
    compute_uniforms: Vec<UserUniform>,
    render_uniforms: Vec<UserUniform>,
    queue_seed: SharedQueueState,
}

impl Engine {
    /// Allocate device resources and compile the configured kernel
    pub fn new(gpu: GpuContext, config: EngineConfig) -> EngineResult<Self> {
        let kernel = config.kernel_source()?;
        let compute_uniforms = parse_user_uniforms(&kernel)?;
        check_uniform_count(&compute_uniforms)?;

        let buffers = DoubleBufferSet::new(gpu.clone(), config.initial_node_capacity);
        let scheduler = SimulationScheduler::new(gpu.clone(), buffers.compute_layout(), &kernel)?;
        let indexer = TopologyIndexer::new(gpu.clone(), config.initial_index_capacity);
        let render_params = RenderParams::new(gpu);

        debug!(
            compute_uniforms = compute_uniforms.len(),
            "engine initialized"
        );
        Ok(Self {
            config,
            buffers,
            scheduler,
            indexer,
            render_params,
            compute_marshaler: UniformMarshaler::new(),
            compute_uniforms,
            render_uniforms: Vec::new(),
            queue_seed: SharedQueueState::default_seed(),
        })
    }

    // =========================================================================
    // Host-facing operations
    // =========================================================================

    /// Replace the topology on side 0
    pub fn upload(&mut self, store: &NodeStore) -> EngineResult<()> {
        self.buffers.upload(store)
    }

    /// Run `num_iters` iterations and return the side holding the result
    ///
    /// The iteration count and both uniform lists are checked before
    /// anything is written to the device.
    pub fn run(
        &mut self,
        num_iters: u32,
        render_uniforms: &[UserUniform],
        compute_uniforms: &[UserUniform],
    ) -> EngineResult<usize> {
        check_uniform_count(render_uniforms)?;
        check_uniform_count(compute_uniforms)?;
        self.scheduler.check(num_iters)?;

        self.render_params.write(render_uniforms)?;
        let uniforms = self.compute_marshaler.pack(compute_uniforms)?;
        self.scheduler.run(
            &mut self.buffers,
            RunParams {
                num_iters,
                inactive_node_count: self.config.inactive_node_count,
                uniforms,
                queue_seed: &self.queue_seed,
            },
        )
    }

    /// Read one side back to the host
    pub fn download(&self, side: usize) -> EngineResult<NodeStore> {
        self.buffers.download(side)
    }

    /// Derive index buffers from the current result side
    pub fn rebuild_index_buffers(&mut self) -> EngineResult<IndexCounts> {
        let store = self.buffers.download(self.buffers.result_side())?;
        self.indexer.rebuild(&store)
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    /// Generate a fresh `samples` x `samples` grid and upload it
    pub fn reset(&mut self, samples: u32) -> EngineResult<NodeStore> {
        let samples = clamp_samples(samples);
        let store = generate_grid((samples, samples));
        if self.config.log.input_nodes {
            info!("input nodes:\n{}", format_nodes(&store));
        }
        self.upload(&store)?;
        Ok(store)
    }

    /// Reset, simulate with the engine's own uniform lists, read the result
    /// back and rebuild the index buffers
    pub fn run_pipeline(&mut self, num_iters: u32) -> EngineResult<PipelineReport> {
        let log = self.config.log;
        let start = Instant::now();

        self.reset(self.config.samples())?;
        if log.input_queue_state {
            info!("input queue state:\n{}", self.queue_seed);
        }

        let render_uniforms = self.render_uniforms.clone();
        let compute_uniforms = self.compute_uniforms.clone();
        let run_start = Instant::now();
        let result_side = self.run(num_iters, &render_uniforms, &compute_uniforms)?;
        let run_elapsed = run_start.elapsed();

        if log.output_queue_state {
            info!("output queue state:\n{}", self.read_queue_state()?);
        }

        let nodes = self.download(result_side)?;
        let counts = self.indexer.rebuild(&nodes)?;
        self.log_indices()?;

        if log.output_nodes {
            info!("output nodes:\n{}", format_nodes(&nodes));
        }
        if log.durations {
            info!(
                simulation_ms = run_elapsed.as_secs_f64() * 1000.0,
                total_ms = start.elapsed().as_secs_f64() * 1000.0,
                "pipeline durations"
            );
        }

        Ok(PipelineReport {
            result_side,
            counts,
            nodes,
        })
    }

    fn log_indices(&self) -> EngineResult<()> {
        let log = self.config.log;
        let toggles = [
            (Topology::Points, log.point_indices, 1),
            (Topology::Lines, log.line_indices, 2),
            (Topology::Triangles, log.triangle_indices, 3),
        ];
        for (topology, enabled, per_line) in toggles {
            if enabled {
                let indices = self.indexer.read_indices(topology)?;
                info!(
                    "{topology} indices ({}):\n{}",
                    indices.len(),
                    format_indices(&indices, per_line)
                );
            }
        }
        Ok(())
    }

    /// Recompile the simulation kernel and adopt its uniform declarations
    ///
    /// On failure the previous kernel and uniforms stay in place.
    pub fn reload_kernel(&mut self, kernel: &str) -> EngineResult<()> {
        let uniforms = parse_user_uniforms(kernel)?;
        check_uniform_count(&uniforms)?;
        self.scheduler.set_kernel(kernel)?;
        self.compute_uniforms = uniforms;
        info!(uniforms = self.compute_uniforms.len(), "reloaded kernel");
        Ok(())
    }

    /// Adopt the uniform declarations of a render shader
    pub fn load_render_uniforms(&mut self, shader: &str) -> EngineResult<()> {
        let uniforms = parse_user_uniforms(shader)?;
        check_uniform_count(&uniforms)?;
        self.render_params.write(&uniforms)?;
        self.render_uniforms = uniforms;
        Ok(())
    }

    pub fn set_transforms(&mut self, model: Mat4, view: Mat4, proj: Mat4) {
        self.render_params.set_transforms(model, view, proj);
    }

    /// Replace the queue state every subsequent run starts from
    pub fn set_queue_seed(&mut self, seed: SharedQueueState) {
        self.queue_seed = seed;
    }

    /// Read the shared queue state as the last run left it
    pub fn read_queue_state(&self) -> EngineResult<SharedQueueState> {
        self.buffers.read_queue_state()
    }

    /// Download both sides and log every node
    pub fn log_buffers(&self) -> EngineResult<()> {
        for side in 0..SIDE_COUNT {
            let store = self.download(side)?;
            info!("side {side}:\n{}", format_nodes(&store));
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn buffers(&self) -> &DoubleBufferSet {
        &self.buffers
    }

    pub fn indexer(&self) -> &TopologyIndexer {
        &self.indexer
    }

    pub fn render_params(&self) -> &RenderParams {
        &self.render_params
    }

    pub fn result_side(&self) -> usize {
        self.buffers.result_side()
    }

    pub fn index_counts(&self) -> IndexCounts {
        self.indexer.counts()
    }

    pub fn compute_uniforms(&self) -> &[UserUniform] {
        &self.compute_uniforms
    }

    pub fn compute_uniforms_mut(&mut self) -> &mut [UserUniform] {
        &mut self.compute_uniforms
    }

    pub fn render_uniforms(&self) -> &[UserUniform] {
        &self.render_uniforms
    }

    pub fn render_uniforms_mut(&mut self) -> &mut [UserUniform] {
        &mut self.render_uniforms
    }
}

/// One line per node, prefixed with its index
pub fn format_nodes(store: &NodeStore) -> String {
    let mut out = String::new();
    for (i, node) in store.nodes().enumerate() {
        let _ = writeln!(out, "{i:6}: {node}");
    }
    out
}

/// Indices laid out `per_line` to a row
pub fn format_indices(indices: &[u32], per_line: usize) -> String {
    indices
        .chunks(per_line.max(1))
        .map(|row| {
            row.iter()
                .map(|i| format!("{i:4}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_indices_rows() {
        assert_eq!(format_indices(&[0, 1, 0, 2], 2), "   0    1\n   0    2");
        assert_eq!(format_indices(&[5, 6, 7], 1), "   5\n   6\n   7");
        assert_eq!(format_indices(&[], 3), "");
    }

    #[test]
    fn test_format_nodes_numbers_lines() {
        let text = format_nodes(&generate_grid((2, 2)));
        assert_eq!(text.lines().count(), 4);
        assert!(text.lines().nth(3).is_some_and(|l| l.starts_with("     3: pos:")));
    }
}
