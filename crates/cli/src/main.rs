// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use clap::Parser;
use tether::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    tether::logging::init(cli.verbose, cli.log_file.as_deref());
    if let Err(e) = tether::run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
