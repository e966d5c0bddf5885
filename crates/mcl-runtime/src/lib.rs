//! `mcl-runtime` – runs the localizer as a live, event-driven node.
//!
//! # Modules
//!
//! - [`node`] – [`LocalizerNode`][node::LocalizerNode]: feeds odometry from
//!   the event bus into a shared transform buffer, runs at most one filter
//!   cycle at a time on a blocking thread, publishes the particle cloud and
//!   pose estimate, and rebroadcasts the map ← odom correction at a fixed
//!   rate.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export.

pub mod node;
pub mod telemetry;

pub use node::{LocalizerNode, NodeConfig};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
