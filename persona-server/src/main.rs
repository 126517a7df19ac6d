// persona-server/src/main.rs
// ============================================================================
// Module: Persona Server Entry Point
// Description: CLI for the Persona customer data service.
// Purpose: Load configuration, wire the pipeline, and serve the HTTP API.
// Dependencies: persona-config, persona-core, persona-store-sqlite, axum, clap, tokio
// ============================================================================

//! ## Overview
//! The binary loads TOML configuration, selects a store backend, starts the
//! partitioned processing pipeline, and serves the HTTP API until interrupted.
//! The pipeline drains before exit so accepted events finish processing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use persona_config::AuditSinkKind;
use persona_config::PersonaConfig;
use persona_config::StoreBackend;
use persona_core::runtime::NoopPipelineAudit;
use persona_core::runtime::PipelineAuditSink;
use persona_core::runtime::StderrPipelineAudit;
use persona_core::InMemoryStore;
use persona_server::audit::NoopRequestAudit;
use persona_server::audit::RequestAuditSink;
use persona_server::audit::StderrRequestAudit;
use persona_server::build_router;
use persona_server::build_services;
use persona_server::Services;
use persona_store_sqlite::SqliteStore;
use persona_store_sqlite::SqliteStoreConfig;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "persona", version, about = "Persona customer data service")]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP service.
    Serve(ServeCommand),
}

/// Options for the serve subcommand.
#[derive(clap::Args, Debug)]
struct ServeCommand {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(command) => serve(&command),
    }
}

/// Runs the serve subcommand on a fresh runtime.
fn serve(command: &ServeCommand) -> ExitCode {
    let config = match PersonaConfig::load(command.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("persona: {error}");
            return ExitCode::FAILURE;
        }
    };
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("persona: failed to start runtime: {error}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("persona: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Builds the service graph and serves until interrupted.
async fn run(config: PersonaConfig) -> Result<(), String> {
    let (pipeline_audit, request_audit): (Arc<dyn PipelineAuditSink>, Arc<dyn RequestAuditSink>) =
        match config.audit.sink {
            AuditSinkKind::Stderr => (Arc::new(StderrPipelineAudit), Arc::new(StderrRequestAudit)),
            AuditSinkKind::Noop => (Arc::new(NoopPipelineAudit), Arc::new(NoopRequestAudit)),
        };

    let services = match config.store.backend {
        StoreBackend::Memory => build_services(
            Arc::new(InMemoryStore::new()),
            &config,
            pipeline_audit,
            request_audit,
        ),
        StoreBackend::Sqlite => {
            let path = config
                .store
                .path
                .clone()
                .ok_or_else(|| "store.path is required for the sqlite backend".to_string())?;
            let store = SqliteStore::open(&SqliteStoreConfig::at(path))
                .map_err(|error| format!("failed to open store: {error}"))?;
            build_services(Arc::new(store), &config, pipeline_audit, request_audit)
        }
    };
    let Services { state, pipeline } = services;

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr)
        .await
        .map_err(|error| format!("failed to bind {}: {error}", config.server.bind_addr))?;
    let router = build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|error| format!("server error: {error}"))?;

    pipeline.shutdown().await;
    Ok(())
}

/// Resolves when the process receives an interrupt.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
