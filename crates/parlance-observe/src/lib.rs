//! Observability setup for Parlance.
//!
//! Structured logging via `tracing` with optional OpenTelemetry trace
//! export for local development.

pub mod tracing_setup;
