mod cli;
mod error;
mod logging;

use clap::Parser;
use cli::Cli;
use error::{CliError, Result};
use faunus_core::state::StateFile;
use faunus_core::{MarkovChain, SimulationConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info};

const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(interrupted) => {
            if interrupted {
                ExitCode::from(EXIT_INTERRUPTED)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            error!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(cli: &Cli) -> Result<bool> {
    let text = fs::read_to_string(&cli.input)?;
    let config = SimulationConfig::from_json(&text)?;
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let mut system = config.build(&mut rng)?;

    let mut restored_dusum = 0.0;
    if let Some(path) = &cli.state {
        restored_dusum = StateFile::load(path)?.restore(&mut system.space)?;
        info!(path = %path.display(), dusum = restored_dusum, "resumed from checkpoint");
    }

    let mut chain = MarkovChain::new(cli.seed.wrapping_add(1));
    chain.strict = cli.strict;
    for (mv, weight) in system.moves {
        chain.add_move(mv, weight);
    }
    chain.init(&system.space, &system.hamiltonian);

    // SIGINT stops the chain between macro steps; in-flight steps complete
    let stop = chain.stop_handle();
    ctrlc::set_handler(move || {
        info!("received Ctrl-C, stopping after the current step");
        stop.store(true, Ordering::Relaxed);
    })
    .map_err(anyhow::Error::new)?;

    info!(nstep = cli.nstep, seed = cli.seed, "starting Monte Carlo run");
    let report = chain.run(&mut system.space, &system.hamiltonian, cli.nstep)?;

    println!("{}", chain.report());
    println!(
        "steps {}  drift {:.3e} kT{}",
        report.steps,
        report.drift,
        if report.interrupted { "  (interrupted)" } else { "" }
    );

    if let Some(path) = &cli.output {
        let dusum = restored_dusum + chain.dusum();
        StateFile::capture(&system.space, dusum)
            .save(path)
            .map_err(CliError::from)?;
    }

    Ok(report.interrupted)
}
