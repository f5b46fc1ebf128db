//! # Regraft CLI Module
//!
//! This module implements the CLI interface for Regraft.
//!
//! ## Available Commands
//!
//! - `serve` - Start the HTTP server over a local store
//! - `classify` - Show which service issued an identifier
//! - `get` - Fetch a calculation
//! - `post` - Post a calculation from a file
//! - `substitute` - Replace one sub-calculation with another
//! - `search` - Find function applications by name
//! - `submit` - Submit a request built from nested `let`s
//! - `init` - Write a configuration template
//!
//! Store commands run against the remote service by default
//! (`--store remote`), or against a local redb file (`--store redb`).

mod commands;

use crate::config::{ConfigError, DEFAULT_CONFIG_FILE};
use clap::{Args, Parser, Subcommand, ValueEnum};
use regraft_core::{RegraftError, StoreError};
use std::path::PathBuf;
use thiserror::Error;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Regraft - calculation graph substitution
///
/// Rewrites content-addressed calculation graphs without mutating anything
/// already stored.
#[derive(Parser, Debug)]
#[command(name = "regraft")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Store to operate on
    #[arg(short = 'S', long, global = true, value_enum, default_value_t = StoreKind::Remote)]
    pub store: StoreKind,

    /// Path to the redb database (for `--store redb` and `serve`)
    #[arg(short = 'D', long, global = true, default_value = "regraft.db")]
    pub database: PathBuf,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,
}

/// Which store a command talks to.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// The remote calculation service from the configuration file
    Remote,
    /// A local redb database
    Redb,
}

/// Available CLI commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start HTTP server over a local store
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Keep calculations in memory instead of the database file
        #[arg(long)]
        in_memory: bool,
    },

    /// Show which service issued an identifier
    Classify {
        /// Identifier to classify
        id: String,
    },

    /// Fetch a calculation
    Get {
        /// Calculation identifier
        id: String,
    },

    /// Post a calculation read from a JSON file
    Post {
        /// Path to the calculation JSON
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Replace every reference to one calculation with another
    Substitute {
        /// Root of the graph to rewrite
        #[arg(short, long)]
        root: String,

        /// Identifier to replace
        #[arg(short, long)]
        old: String,

        /// Replacement identifier
        #[arg(short, long)]
        new: String,
    },

    /// Find function applications whose name contains a string
    Search {
        /// Root of the graph to search
        #[arg(short, long)]
        root: String,

        /// Substring of the function name
        #[arg(short, long)]
        needle: String,
    },

    /// Submit a request built from nested `let`s
    Submit {
        /// Path to the augmented request JSON
        #[arg(short, long)]
        file: PathBuf,

        /// Only check whether every piece is already stored
        #[arg(long)]
        dry_run: bool,
    },

    /// Write a configuration template
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },
}

// =============================================================================
// ERRORS
// =============================================================================

/// Errors surfaced by a CLI command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Regraft(#[from] RegraftError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Usage(String),
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
///
/// The engine and the remote client block, so every command except `serve`
/// runs on a blocking thread.
pub async fn execute(cli: Cli) -> Result<(), CliError> {
    let Cli { global, command } = cli;

    match command {
        Commands::Serve {
            host,
            port,
            in_memory,
        } => cmd_serve(&global, &host, port, in_memory).await,
        command => tokio::task::spawn_blocking(move || run_blocking(&global, command))
            .await
            .map_err(|e| CliError::Usage(format!("command task failed: {e}")))?,
    }
}

/// Run a store or local command on the current thread.
pub fn run_blocking(global: &GlobalArgs, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Serve { .. } => Err(CliError::Usage(
            "serve must run on the async runtime".to_string(),
        )),
        Commands::Classify { id } => cmd_classify(global, &id),
        Commands::Get { id } => cmd_get(global, &id),
        Commands::Post { file } => cmd_post(global, &file),
        Commands::Substitute { root, old, new } => cmd_substitute(global, &root, &old, &new),
        Commands::Search { root, needle } => cmd_search(global, &root, &needle),
        Commands::Submit { file, dry_run } => cmd_submit(global, &file, dry_run),
        Commands::Init { force } => cmd_init(global, force),
    }
}
