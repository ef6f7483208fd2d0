//! Entry point for the romlayout tool.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap`.
//! 2. Initialize logging at the requested level.
//! 3. Hand the configuration to the pipeline, which parses the input dumps,
//!    computes the ROM layout, and writes the three linker scripts.
//!
//! Error handling is done via `anyhow`.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use romlayout::config::Config;
use romlayout::pipeline;

fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    pipeline::run(&config)
}
