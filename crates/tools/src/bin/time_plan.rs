//! Prints the optimum and maximum time a search would get for a given clock

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use rsearch_core::options::NODESTIME_MAX;
use rsearch_core::time::{SearchLimits, TimeManager, move_horizon};
use rsearch_core::types::{Color, Value};
use tools::{ToolConfig, init_logging};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Side {
    White,
    Black,
}

impl From<Side> for Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Compute the time budget of one search")]
struct Cli {
    /// Remaining time of the side to move (ms)
    #[arg(long)]
    time: i64,

    /// Increment per move (ms)
    #[arg(long, default_value_t = 0)]
    inc: i64,

    /// Moves until the next time control (0: sudden death)
    #[arg(long, default_value_t = 0)]
    movestogo: i32,

    /// Game ply
    #[arg(long, default_value_t = 0)]
    ply: i32,

    /// Last score of the side to move
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    score: i32,

    /// Side to move (default: derived from the ply)
    #[arg(long, value_enum)]
    side: Option<Side>,

    /// Overrides `Move Overhead` from the config
    #[arg(long)]
    overhead: Option<i64>,

    /// Overrides `nodestime` from the config
    #[arg(long)]
    nodestime: Option<i64>,

    #[arg(long, default_value_t = false)]
    ponder: bool,

    /// Tool config (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    if cli.time < 0 || cli.inc < 0 {
        bail!("--time and --inc must not be negative");
    }

    let config = ToolConfig::load_or_default(cli.config.as_deref())?;
    let mut options = config.engine;
    if let Some(overhead) = cli.overhead {
        options.move_overhead = overhead.max(0);
    }
    if let Some(nodestime) = cli.nodestime {
        options.nodestime = nodestime.clamp(0, NODESTIME_MAX);
    }
    options.ponder |= cli.ponder;

    let us = cli.side.map_or_else(|| Color::to_move(cli.ply), Color::from);
    let mut limits = SearchLimits::default();
    limits.time[us.index()] = cli.time;
    limits.inc[us.index()] = cli.inc;
    limits.movestogo = cli.movestogo;

    let score = Value::new(cli.score);
    let mut tm = TimeManager::new();
    let plan = tm.init(&mut limits, us, cli.ply, score, &options.time_options());

    let unit = if limits.npmsec > 0 { "nodes" } else { "ms" };
    println!("remaining : {} {unit} ({} {}, {} {})", limits.time[us.index()], us.time_param(), cli.time, us.inc_param(), cli.inc);
    println!("horizon   : {} moves", move_horizon(score));
    println!("optimum   : {} {unit}", plan.optimum);
    println!("maximum   : {} {unit}", plan.maximum);
    Ok(())
}
