// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use quill_engine::{run_stdio, BridgeOptions, DefaultClientFactory};

/// Agent execution engine for the quill coding assistant.
///
/// Runs as a single long-lived process speaking NDJSON on stdin/stdout;
/// front-ends spawn it and drive sessions over that stream.
#[derive(Debug, Parser)]
#[command(name = "quill", version, about)]
struct Cli {
    /// Repository root used when a front-end omits one (diagnostic only;
    /// every start_session carries its own repo_root).
    #[arg(long)]
    repo_root: Option<PathBuf>,

    /// Serve the NDJSON protocol on stdin/stdout.
    #[arg(long)]
    stdio: bool,

    /// Increase log verbosity on stderr (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if !cli.stdio {
        // The stdio transport is the only one this binary serves.
        anyhow::bail!("no transport selected; run with --stdio");
    }
    if let Some(root) = &cli.repo_root {
        tracing::info!(repo_root = %root.display(), "default repository root");
    }

    run_stdio(BridgeOptions {
        factory: Arc::new(DefaultClientFactory),
        config: None,
    })
    .await
    .context("stdio bridge failed")
}

/// Logging goes to stderr (or QUILL_LOG_FILE) — never stdout, which
/// carries the protocol stream.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("QUILL_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("quill={default_level}")));

    if let Ok(path) = std::env::var("QUILL_LOG_FILE") {
        if let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(Arc::new(file)).with_ansi(false))
                .init();
            return;
        }
    }
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
