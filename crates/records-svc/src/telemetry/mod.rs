//! Structured logging and optional span export.
//!
//! Logs are written as JSON lines to stdout. Spans are additionally exported
//! over OTLP/gRPC when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//!
//! # Telemetry invariants
//!
//! - **No plaintext sensitive values, stored ciphertext or key material** may
//!   appear in any span attribute or log field. Record ids, kinds, field paths
//!   and key ids are fine.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`).

pub mod init;

pub use init::init_telemetry;
