//! Observability for token verification.
//!
//! Metrics are emitted through the `metrics` facade; the embedding service
//! installs whichever recorder/exporter it uses. Without a recorder the
//! calls are no-ops.

pub mod metrics;
