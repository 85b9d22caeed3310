//! Entry point, grounded on `src/bin/main.rs`'s shape (`Logging::try_init`,
//! `Cli::parse`, `--print-debug-info` short-circuit, explicit shutdown
//! wiring) adapted from the teacher's tokio/ctrlc/OpAMP fleet startup to a
//! synchronous graph-driven Manager startup/shutdown.

use procd::cli::Cli;
use procd::config::loader::load_snapshot;
use procd::context::CancelContext;
use procd::logging::Logging;
use procd::manager::Manager;
use procd::signal::{self, OwnedPids};
use procd::sinks::Sinks;
use std::error::Error;
use std::time::Duration;
use tracing::{error, info};

fn main() -> Result<(), Box<dyn Error>> {
    Logging::try_init()?;

    let cli = Cli::parse_args();

    if cli.print_debug_info() {
        println!("Printing debug info");
        println!("CLI: {:#?}", cli);
        println!("PID 1 mode: {}", cli.pid1());
        return Ok(());
    }

    info!(path = %cli.config_path().display(), "loading configuration");
    let snapshot = load_snapshot(&cli.config_path())?;

    let sinks = Sinks::null();
    let owned_pids = OwnedPids::new();
    let mut manager = Manager::new(&snapshot, sinks)?.with_owned_pids(owned_pids.clone());

    let ctx: CancelContext = CancelContext::new(false);
    info!(pid1 = cli.pid1(), "installing signal handlers");
    signal::install(ctx.clone(), owned_pids, cli.pid1());

    info!("starting the managed fleet");
    let outcomes = manager.startup(&snapshot)?;
    for outcome in &outcomes {
        if !outcome.ok {
            error!(process = %outcome.name, "failed to start");
        }
    }

    ctx.wait_forever(true);

    info!("shutdown signal received, stopping the fleet");
    manager.shutdown(cli.shutdown_deadline().max(Duration::from_secs(1)));

    Ok(())
}
