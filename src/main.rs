use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use morph::config::EngineConfig;
use morph::engine::Engine;
use morph::gpu::{GpuContext, Topology, derive_indices};
use morph::nodes::{clamp_samples, generate_grid};
use morph::uniforms::{UserUniform, parse_user_uniforms};

mod cli;

use cli::{Cli, Commands};

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(
    config_path: Option<&Path>,
    samples: Option<u32>,
    iters: Option<u32>,
    kernel: Option<PathBuf>,
    dump: Option<&Path>,
) -> anyhow::Result<()> {
    let mut config = match config_path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(samples) = samples {
        config.grid_samples = samples;
    }
    if let Some(iters) = iters {
        config.num_iters = iters;
    }
    if kernel.is_some() {
        config.kernel = kernel;
    }

    let gpu = GpuContext::new(config.high_performance)?;
    let num_iters = config.num_iters;
    let mut engine = Engine::new(gpu, config)?;
    let report = engine.run_pipeline(num_iters)?;

    println!(
        "{} iterations on {} nodes, result on side {}",
        num_iters,
        report.nodes.len(),
        report.result_side
    );
    for topology in Topology::ALL {
        println!("{topology}: {} indices", report.counts.get(topology));
    }

    if let Some(path) = dump {
        let json = serde_json::to_string_pretty(&report.nodes)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Wrote node store to {}", path.display());
    }
    Ok(())
}

fn list_uniforms(kernel: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let source = match kernel {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read kernel {}", path.display()))?,
        None => morph::gpu::DEFAULT_KERNEL.to_string(),
    };
    let uniforms = parse_user_uniforms(&source)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&uniforms)?);
    } else {
        for uniform in &uniforms {
            println!("{}", describe_uniform(uniform));
        }
    }
    Ok(())
}

fn describe_uniform(uniform: &UserUniform) -> String {
    format!(
        "{}: comps {} min {} max {} speed {} def {:?}",
        uniform.name,
        uniform.num_comps,
        uniform.min_val,
        uniform.max_val,
        uniform.drag_speed,
        uniform.default_val
    )
}

fn grid(samples: u32) -> anyhow::Result<()> {
    let samples = clamp_samples(samples);
    let store = generate_grid((samples, samples));
    let lists = derive_indices(&store)?;

    println!("grid {samples}x{samples}: {} nodes", store.len());
    for topology in Topology::ALL {
        println!("{topology}: {} indices", lists[topology.index()].len());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            samples,
            iters,
            kernel,
            dump,
        } => run(config.as_deref(), samples, iters, kernel, dump.as_deref()),
        Commands::Uniforms { kernel, json } => list_uniforms(kernel.as_deref(), json),
        Commands::Grid { samples } => grid(samples),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_uniform_lists_every_field() {
        let uniform = UserUniform::new("rate", 2, [0.5, 1.0, 0.0, 0.0], -1.0, 2.0, 0.1);
        assert_eq!(
            describe_uniform(&uniform),
            "rate: comps 2 min -1 max 2 speed 0.1 def [0.5, 1.0, 0.0, 0.0]"
        );
    }
}
