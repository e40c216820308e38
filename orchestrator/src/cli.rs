//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "orchestratord", about = "Single-user control plane for concurrent AI-agent coding sessions")]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the control plane: scheduler, event bus and quest engine.
    Serve,

    /// Create or upgrade the sqlite schema, then exit.
    Migrate,
}
