use clap::Parser;
use std::path::PathBuf;

const ABOUT: &str =
    "Faunus - a framework for Metropolis Monte Carlo simulation of molecular systems.";

#[derive(Parser, Debug)]
#[command(author, version, about = ABOUT)]
pub struct Cli {
    /// Path to the JSON input file (geometry, atomlist, energy, moves).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Write the final state to this checkpoint file.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Resume from a previously written checkpoint.
    #[arg(short, long, value_name = "PATH")]
    pub state: Option<PathBuf>,

    /// Number of Monte Carlo macro steps.
    #[arg(short, long, default_value_t = 10_000)]
    pub nstep: u64,

    /// Seed for the random number generator; a fixed seed gives a
    /// deterministic trajectory.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Treat an energy drift above tolerance as a fatal error.
    #[arg(long)]
    pub strict: bool,
}
