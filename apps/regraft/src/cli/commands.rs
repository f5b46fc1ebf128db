//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::{CliError, GlobalArgs, StoreKind};
use crate::api;
use crate::client::RemoteStore;
use crate::config::Config;
use regraft_core::{
    AugmentedCalculation, CalculationNode, CalculationStore, Identifier, RegraftError,
    StoreBackend, StoreError, Substitution, classify, search_calculation, submit_let_calculation,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a calculation or request file (16 MB).
const MAX_INPUT_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Canonicalize `path` and require a regular file no larger than the limit.
fn validate_input_file(path: &Path) -> Result<PathBuf, RegraftError> {
    let canonical = path.canonicalize().map_err(|e| {
        RegraftError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    let metadata = std::fs::metadata(&canonical)
        .map_err(|e| RegraftError::Io(format!("Cannot read file metadata: {}", e)))?;
    if !metadata.is_file() {
        return Err(RegraftError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    if metadata.len() > MAX_INPUT_FILE_SIZE {
        return Err(RegraftError::Serialization(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_INPUT_FILE_SIZE
        )));
    }

    Ok(canonical)
}

/// Read and parse a JSON input file.
fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, RegraftError> {
    let path = validate_input_file(path)?;
    let data = std::fs::read(&path)
        .map_err(|e| RegraftError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_slice(&data).map_err(|e| {
        RegraftError::MalformedCalculation(format!("{}: {}", path.display(), e))
    })
}

/// Print `value` as pretty JSON.
fn print_json<T: Serialize>(value: &T) -> Result<(), RegraftError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| RegraftError::Serialization(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// STORE SELECTION
// =============================================================================

/// The store a command runs against.
#[derive(Debug)]
pub enum CommandStore {
    Remote(RemoteStore),
    Local(StoreBackend),
}

impl CommandStore {
    /// Open the store selected by the global options.
    pub fn open(global: &GlobalArgs) -> Result<Self, CliError> {
        match global.store {
            StoreKind::Remote => {
                let config = Config::load(&global.config)?;
                tracing::debug!("Using remote store at {}", config.api_url);
                Ok(Self::Remote(RemoteStore::new(&config)?))
            }
            StoreKind::Redb => {
                tracing::debug!("Using redb store at {:?}", global.database);
                Ok(Self::Local(StoreBackend::open_redb(&global.database)?))
            }
        }
    }
}

impl CalculationStore for CommandStore {
    fn fetch_calculation(&mut self, id: &Identifier) -> Result<CalculationNode, StoreError> {
        match self {
            Self::Remote(store) => store.fetch_calculation(id),
            Self::Local(store) => store.fetch_calculation(id),
        }
    }

    fn post_calculation(&mut self, node: &CalculationNode) -> Result<Identifier, StoreError> {
        match self {
            Self::Remote(store) => store.post_calculation(node),
            Self::Local(store) => store.post_calculation(node),
        }
    }

    fn lookup_calculation(
        &mut self,
        node: &CalculationNode,
    ) -> Result<Option<Identifier>, StoreError> {
        match self {
            Self::Remote(store) => store.lookup_calculation(node),
            Self::Local(store) => store.lookup_calculation(node),
        }
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_serve(
    global: &GlobalArgs,
    host: &str,
    port: u16,
    in_memory: bool,
) -> Result<(), CliError> {
    let store = if in_memory {
        StoreBackend::default()
    } else {
        StoreBackend::open_redb(&global.database)?
    };

    if !global.quiet {
        println!("Configuration:");
        println!("  Host:     {}", host);
        println!("  Port:     {}", port);
        if in_memory {
            println!("  Store:    memory");
        } else {
            println!("  Store:    redb ({:?})", global.database);
        }
        println!();
        println!("Endpoints:");
        println!("  GET  /calc/{{id}}        - Fetch a calculation");
        println!("  POST /calc             - Store a calculation");
        println!("  POST /calc/substitute  - Substitute a sub-calculation");
        println!("  POST /calc/search      - Search by function name");
        println!("  GET  /id/{{id}}/service  - Classify an identifier");
        println!("  GET  /status           - Store status");
        println!("  GET  /health           - Health check");
        println!();
        println!("Press Ctrl+C to stop");
        println!();
    }

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, store).await?;
    Ok(())
}

// =============================================================================
// IDENTIFIER COMMANDS
// =============================================================================

/// Show which service issued an identifier.
pub fn cmd_classify(global: &GlobalArgs, id: &str) -> Result<(), CliError> {
    let id = Identifier::new(id);
    let service = classify(&id);

    if global.json_mode {
        print_json(&serde_json::json!({ "id": id, "service": service }))?;
    } else {
        println!("{}", service);
    }
    Ok(())
}

// =============================================================================
// CALCULATION COMMANDS
// =============================================================================

/// Fetch and print a calculation.
pub fn cmd_get(global: &GlobalArgs, id: &str) -> Result<(), CliError> {
    let id = Identifier::new(id);
    let mut store = CommandStore::open(global)?;
    let node = store
        .fetch_calculation(&id)
        .map_err(|e| RegraftError::read(&id, e))?;
    print_json(&node)?;
    Ok(())
}

/// Post a calculation read from a file.
pub fn cmd_post(global: &GlobalArgs, file: &Path) -> Result<(), CliError> {
    let node: CalculationNode = read_json_file(file)?;
    let mut store = CommandStore::open(global)?;
    let id = store.post_calculation(&node).map_err(RegraftError::write)?;

    if global.json_mode {
        print_json(&serde_json::json!({ "id": id }))?;
    } else {
        println!("{}", id);
    }
    Ok(())
}

// =============================================================================
// GRAPH COMMANDS
// =============================================================================

/// Substitute `old` with `new` under `root`.
pub fn cmd_substitute(
    global: &GlobalArgs,
    root: &str,
    old: &str,
    new: &str,
) -> Result<(), CliError> {
    let root = Identifier::new(root);
    let mut store = CommandStore::open(global)?;
    let outcome = Substitution::new(Identifier::new(old), Identifier::new(new))
        .run(&mut store, &root)?;

    if global.json_mode {
        print_json(&serde_json::json!({
            "root": root,
            "result": outcome.result,
            "fetched": outcome.fetched,
            "posted": outcome.posted,
        }))?;
        return Ok(());
    }

    if outcome.is_unchanged(&root) {
        println!("{} (unchanged)", outcome.result);
    } else {
        println!("{}", outcome.result);
    }
    if !global.quiet {
        eprintln!(
            "fetched {} calculation(s), posted {}",
            outcome.fetched, outcome.posted
        );
    }
    Ok(())
}

/// Search the graph under `root` for function applications.
pub fn cmd_search(global: &GlobalArgs, root: &str, needle: &str) -> Result<(), CliError> {
    let root = Identifier::new(root);
    let mut store = CommandStore::open(global)?;
    let matches = search_calculation(&mut store, &root, needle)?;

    if global.json_mode {
        print_json(&serde_json::json!({ "matches": matches }))?;
    } else {
        for id in &matches {
            println!("{}", id);
        }
    }
    Ok(())
}

/// Submit a request built from nested `let`s.
pub fn cmd_submit(global: &GlobalArgs, file: &Path, dry_run: bool) -> Result<(), CliError> {
    let request: AugmentedCalculation = read_json_file(file)?;
    let mut store = CommandStore::open(global)?;

    match submit_let_calculation(&mut store, &request, dry_run)? {
        Some(submission) if global.json_mode => print_json(&submission)?,
        Some(submission) => {
            println!("main: {}", submission.main_calc_id);
            for reported in &submission.reported_subcalcs {
                println!("reported: {} ({})", reported.id, reported.label);
            }
            for id in &submission.other_subcalc_ids {
                println!("other: {}", id);
            }
        }
        None if global.json_mode => print_json(&serde_json::Value::Null)?,
        None => println!("not yet submitted"),
    }
    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Write a configuration template, and create the database for redb.
pub fn cmd_init(global: &GlobalArgs, force: bool) -> Result<(), CliError> {
    if global.config.exists() && !force {
        return Err(CliError::Usage(format!(
            "{} already exists. Use --force to overwrite.",
            global.config.display()
        )));
    }

    Config::write_template(&global.config)?;
    println!("Wrote configuration template to {:?}", global.config);

    if global.store == StoreKind::Redb {
        let _store = StoreBackend::open_redb(&global.database)?;
        println!("Initialized redb database at {:?}", global.database);
    }
    Ok(())
}
