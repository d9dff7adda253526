//! # Parley
//!
//! Scripted chat-room runner for the Parley broker.
//!
//! ## Usage
//!
//! ```bash
//! # Run the built-in demo conversation
//! parley
//!
//! # Run a script with a custom config
//! parley --config /path/to/parley.toml --script chat.toml
//!
//! # Override policies from the environment
//! PARLEY_BROKER__DELIVERY=fail_fast parley --script chat.toml
//! ```

mod cli;
mod config;
mod console;
mod metrics;
mod runner;
mod script;

use anyhow::Result;
use clap::Parser;
use parley_core::Listener;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::console::ConsoleListener;
use crate::runner::Runner;
use crate::script::Script;

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the conversation.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=info,parley_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = config::Settings::load(cli.config.as_deref())?;

    let prometheus = if cli.metrics || settings.metrics.enabled {
        Some(metrics::install_recorder()?)
    } else {
        None
    };
    metrics::init_metrics();

    let script = match &cli.script {
        Some(path) => Script::from_file(path)?,
        None => {
            tracing::info!("No script given, running the demo conversation");
            Script::demo()
        }
    };

    let listener: Option<Arc<dyn Listener>> = if settings.output.echo {
        Some(Arc::new(ConsoleListener::stdout()))
    } else {
        None
    };

    let mut runner = Runner::new(&settings, listener);
    let summary = runner.run(&script)?;
    tracing::debug!(rooms = ?runner.rooms(), ?summary, "Run complete");

    if cli.transcript || settings.output.transcript {
        println!("{}", serde_json::to_string_pretty(&runner.transcript())?);
    }

    if let Some(handle) = prometheus {
        print!("{}", handle.render());
    }

    Ok(())
}
