//! # Regraft
//!
//! The main binary for the Regraft calculation substitution engine.
//!
//! This application provides:
//! - CLI commands against the remote calculation service or a local store
//! - An HTTP REST API server over a local store (axum-based)
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                 apps/regraft (THE BINARY)                 │
//! │                                                           │
//! │   ┌─────────────┐   ┌─────────────┐   ┌───────────────┐   │
//! │   │    CLI      │   │  HTTP API   │   │ Remote Client │   │
//! │   │   (clap)    │   │   (axum)    │   │   (reqwest)   │   │
//! │   └──────┬──────┘   └──────┬──────┘   └───────┬───────┘   │
//! │          └─────────────────┼──────────────────┘           │
//! │                            ▼                              │
//! │                   ┌────────────────┐                      │
//! │                   │  regraft-core  │                      │
//! │                   │  (THE LOGIC)   │                      │
//! │                   └────────────────┘                      │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server over a local database
//! regraft serve --host 0.0.0.0 --port 8080
//!
//! # Rewrite a remote graph
//! regraft substitute --root <id> --old <id> --new <id>
//!
//! # Same against the local database
//! regraft --store redb search --root <id> --needle add
//! ```

use clap::Parser;
use regraft::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // REGRAFT_LOG_FORMAT=json enables machine-parseable output
    let log_format = std::env::var("REGRAFT_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "regraft=info,regraft_core=info,tower_http=debug".into());

    // Logs go to stderr so command output on stdout stays parseable
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.global.quiet && matches!(cli.command, cli::Commands::Serve { .. }) {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  Regraft v{}

  Content-addressed calculation substitution
"#,
        env!("CARGO_PKG_VERSION")
    );
}
