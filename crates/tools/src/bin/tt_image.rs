//! Creates and inspects raw transposition table images
//!
//! `fill` writes random search results into a fresh table and saves it,
//! `inspect` loads an image and reports occupancy per generation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::info;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rsearch_core::TranspositionTable;
use rsearch_core::tt::CLUSTER_SIZE;
use rsearch_core::types::{Bound, Move, Square, Value};
use tools::{ToolConfig, init_logging};

#[derive(Parser, Debug)]
#[command(author, version, about = "Transposition table image utility")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Tool config (TOML); `engine.hash_mb` is the default table size
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fill a fresh table with random entries and save it
    Fill {
        /// Output image
        #[arg(long)]
        out: PathBuf,

        /// Table size in MB (default: from config)
        #[arg(long)]
        hash_mb: Option<usize>,

        /// Stores per search
        #[arg(long, default_value_t = 100_000)]
        entries: usize,

        /// Number of searches (generations) to simulate
        #[arg(long, default_value_t = 1)]
        searches: u32,

        #[arg(long, default_value_t = 0x5EED)]
        seed: u64,
    },
    /// Load an image and print its statistics
    Inspect {
        /// Image to load
        file: PathBuf,

        /// Keys to look up (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_key)]
        probe: Vec<u64>,
    },
}

fn parse_key(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|err| format!("invalid key {text:?}: {err}"))
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = ToolConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Fill {
            out,
            hash_mb,
            entries,
            searches,
            seed,
        } => {
            let hash_mb = hash_mb.unwrap_or(config.engine.hash_mb);
            if hash_mb == 0 {
                bail!("--hash-mb must be at least 1");
            }
            fill(&out, hash_mb, config.engine.large_pages, entries, searches, seed)
        }
        Command::Inspect { file, probe } => inspect(&file, &probe),
    }
}

fn fill(out: &Path, hash_mb: usize, large_pages: bool, entries: usize, searches: u32, seed: u64) -> Result<()> {
    let tt = TranspositionTable::new(hash_mb, large_pages);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

    for _ in 0..searches {
        tt.new_search();
        for _ in 0..entries {
            let key: u64 = rng.random();
            let from = Square::new(rng.random_range(0..64));
            let to = Square::new(rng.random_range(0..64));
            let bound = match rng.random_range(0..3) {
                0 => Bound::Upper,
                1 => Bound::Lower,
                _ => Bound::Exact,
            };
            let value = Value::new(rng.random_range(-3000..=3000));
            let eval = Value::new(rng.random_range(-1000..=1000));
            let depth = rng.random_range(1..=40);
            tt.probe(key).write(key, value, bound, depth, Move::new(from, to), eval);
        }
        info!("search done, hashfull {}", tt.hashfull());
    }

    tt.save(out)?;
    println!(
        "wrote {} ({} clusters, {} MB, hashfull {})",
        out.display(),
        tt.cluster_count(),
        tt.size_bytes() >> 20,
        tt.hashfull()
    );
    Ok(())
}

fn inspect(file: &Path, keys: &[u64]) -> Result<()> {
    let mut tt = TranspositionTable::new(1, false);
    tt.load(file).with_context(|| format!("cannot inspect {}", file.display()))?;

    let mut occupied = 0usize;
    let mut by_generation: BTreeMap<u8, usize> = BTreeMap::new();
    let mut by_bound: BTreeMap<String, usize> = BTreeMap::new();
    for cluster in tt.clusters() {
        for entry in cluster.entries().iter().filter(|e| !e.is_empty()) {
            occupied += 1;
            let data = entry.read();
            *by_generation.entry(data.generation).or_default() += 1;
            *by_bound.entry(format!("{:?}", data.bound)).or_default() += 1;
        }
    }

    let slots = tt.cluster_count() * CLUSTER_SIZE;
    println!("file      : {}", file.display());
    println!("clusters  : {}", tt.cluster_count());
    println!("size      : {} bytes", tt.size_bytes());
    println!("occupied  : {occupied} / {slots} ({}.{}%)", occupied * 100 / slots, occupied * 1000 / slots % 10);
    for (generation, count) in &by_generation {
        println!("generation {generation:>3}: {count}");
    }
    for (bound, count) in &by_bound {
        println!("bound {bound:>6}: {count}");
    }

    for &key in keys {
        let hit = tt.probe(key);
        if hit.found {
            let data = hit.data();
            println!(
                "probe {key:#018x}: value {} eval {} depth {} bound {:?} move {:#06x}",
                data.value.raw(),
                data.eval.raw(),
                data.depth,
                data.bound,
                data.mv.to_u16()
            );
        } else {
            println!("probe {key:#018x}: miss");
        }
    }
    Ok(())
}
