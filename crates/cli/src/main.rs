// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use clap::Parser;
use tether::Cli;
use tracing_subscriber::EnvFilter;

fn main() {
    // Logs go to stderr so JSON output on stdout stays parseable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = tether::run(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
