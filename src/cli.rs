//! CLI surface, grounded on `src/cli/mod.rs`'s `Cli` (same flags: `--config`,
//! `--print-debug-info`), narrowed to what a single-binary process
//! supervisor needs.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, default_value_t = String::from("/etc/procd/config.yaml"))]
    config: String,

    #[arg(long)]
    print_debug_info: bool,

    /// Run as PID 1: also reap unclaimed zombies (spec §4.6).
    #[arg(long)]
    pid1: bool,

    #[arg(long, value_parser = humantime_secs, default_value = "30")]
    shutdown_deadline_secs: u64,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn config_path(&self) -> PathBuf {
        PathBuf::from(&self.config)
    }

    pub fn print_debug_info(&self) -> bool {
        self.print_debug_info
    }

    pub fn pid1(&self) -> bool {
        self.pid1
    }

    pub fn shutdown_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.shutdown_deadline_secs)
    }
}

fn humantime_secs(raw: &str) -> Result<u64, String> {
    raw.parse::<u64>().map_err(|e| e.to_string())
}
