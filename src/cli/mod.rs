//! CLI commands for tabrelay.
//!
//! Provides developer tooling around the bridge: replaying recorded host
//! sessions and checking configuration files.

pub mod replay;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tabrelay")]
#[command(about = "Route messages between content scripts, a background context and the toolbar", long_about = None)]
pub struct Cli {
    /// Config file (default: <config dir>/tabrelay/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a JSON-lines transcript of host events through a bridge
    Replay {
        /// Transcript file, or '-' for stdin
        #[arg(default_value = "-")]
        transcript: String,

        /// Serve resources from this unpacked extension directory
        #[arg(long, value_name = "DIR")]
        bundle: Option<PathBuf>,
    },

    /// Validate a config file and print the effective settings
    CheckConfig,
}
