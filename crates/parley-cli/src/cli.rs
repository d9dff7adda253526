use std::path::PathBuf;

use clap::Parser;

/// Run a scripted conversation through the Parley broker.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file. Defaults to the first of `parley.toml` and
    /// `~/.config/parley/parley.toml` that exists.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Conversation script (TOML). Runs the built-in demo when omitted.
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Print every participant's log as JSON when the script finishes.
    #[arg(long)]
    pub transcript: bool,

    /// Print collected metrics in Prometheus text format at exit.
    #[arg(long)]
    pub metrics: bool,
}
