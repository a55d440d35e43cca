//! `records-svc` — diabetes records service entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise structured logging (and OTLP export when configured).
//! 3. Build the [`CipherContext`] from the active and retired keys.
//! 4. Load the sensitive field policy.
//! 5. Wire store, audit sink and repository.
//! 6. Build the Axum router and start the HTTP server.

mod analytics;
mod audit;
mod config;
mod crypto;
mod keys;
mod records;
mod server;
mod telemetry;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use audit::TracingAuditSink;
use config::Config;
use keys::CipherContext;
use records::{FieldPolicy, MemoryStore, RecordRepository};
use server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        http_port = cfg.http_port,
        "records-svc starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key material
    // -----------------------------------------------------------------------
    let cipher = CipherContext::from_secrets(
        &cfg.encryption_key_id,
        &cfg.encryption_key,
        &cfg.retired_keys,
    )
    .context("invalid encryption key configuration")?;
    info!(
        active_key_id = %cipher.active_key_id(),
        retired_keys = cipher.retired_count(),
        "cipher context ready"
    );

    // -----------------------------------------------------------------------
    // 4. Field policy
    // -----------------------------------------------------------------------
    let policy = match &cfg.field_policy_path {
        Some(path) => FieldPolicy::load(Path::new(path))
            .with_context(|| format!("failed to load field policy from {path}"))?,
        None => FieldPolicy::default(),
    };
    info!(sensitive_paths = policy.path_count(), "field policy loaded");

    // -----------------------------------------------------------------------
    // 5. Repository
    // -----------------------------------------------------------------------
    let repository = RecordRepository::new(
        Arc::new(MemoryStore::new()),
        Arc::new(cipher),
        Arc::new(policy),
        Arc::new(TracingAuditSink),
        cfg.decode_failure_policy,
    );

    // -----------------------------------------------------------------------
    // 6. HTTP server
    // -----------------------------------------------------------------------
    let router = server::router::build(AppState::new(repository));

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.http_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
