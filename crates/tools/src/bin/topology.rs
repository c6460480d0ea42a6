//! Prints the NUMA layout seen by the engine and where each search thread would run

use std::path::PathBuf;
use std::thread;

use anyhow::{Result, bail};
use clap::Parser;
use log::info;
use rsearch_core::NodeRegistry;
use rsearch_core::numa::LinuxSysfs;
use rsearch_core::output::StdoutOutput;
use tools::{ToolConfig, init_logging};

#[derive(Parser, Debug)]
#[command(author, version, about = "Show the NUMA node registry and the thread to node mapping")]
struct Cli {
    /// Read the topology from this sysfs tree instead of the native platform
    #[arg(long)]
    sysfs_root: Option<PathBuf>,

    /// Number of search threads to map (default: one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Spawn the threads and bind each one to its node
    #[arg(long, default_value_t = false)]
    bind: bool,

    /// Tool config (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = ToolConfig::load_or_default(cli.config.as_deref())?;

    let registry = match &cli.sysfs_root {
        Some(root) => {
            if !root.is_dir() {
                bail!("sysfs root {} is not a directory", root.display());
            }
            NodeRegistry::with_platform(Box::new(LinuxSysfs::with_root(root)))
        }
        None => NodeRegistry::discover(),
    };
    info!("platform {}, {} cores", registry.platform_name(), registry.core_count());

    registry.display(&StdoutOutput::new());

    let threads = match cli.threads.unwrap_or(config.threads) {
        0 => registry.core_count(),
        n => n,
    };
    println!();
    println!("Thread mapping ({threads} threads):");
    for index in 0..threads {
        let node = registry.preferred_node(index);
        println!("thread {index:>3} -> node {}", node_label(node.id()));
    }

    if cli.bind {
        bind_all(&registry, threads);
    }
    Ok(())
}

fn node_label(id: Option<u32>) -> String {
    id.map_or_else(|| "-1".to_string(), |id| id.to_string())
}

fn bind_all(registry: &NodeRegistry, threads: usize) {
    let results: Vec<(usize, Option<u32>, Result<(), String>)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|index| {
                scope.spawn(move || {
                    let node = registry.preferred_node(index);
                    let bound = registry.bind(node).map_err(|err| err.to_string());
                    (index, node.id(), bound)
                })
            })
            .collect();
        handles.into_iter().filter_map(|h| h.join().ok()).collect()
    });

    println!();
    let mut failures = 0;
    for (index, id, bound) in results {
        match bound {
            Ok(()) => println!("thread {index:>3} bound to node {}", node_label(id)),
            Err(err) => {
                failures += 1;
                println!("thread {index:>3} unbound: {err}");
            }
        }
    }
    info!("bind test finished, {failures} of {threads} threads unbound");
}
