//! `flexigate-runtime` – Gateway Session Lifecycle
//!
//! Wires the codec, the kernel's derivation pieces, the telemetry feed and a
//! transport into a running gateway.
//!
//! # Modules
//!
//! - [`control_cycle`] – [`ControlCycle`][control_cycle::ControlCycle]:
//!   one derivation step from the latest odometry and input snapshot to an
//!   output record, falling back to the most restrictive values when either
//!   input is stale.
//! - [`session`] – [`GatewaySession`][session::GatewaySession]: the
//!   `Disconnected → Connecting → Running → ShuttingDown → Stopped` state
//!   machine that owns the transport, the inbound listener and the
//!   fixed-period driver, and serves `set_mode`.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.

pub mod control_cycle;
pub mod session;
pub mod telemetry;

pub use control_cycle::{ControlCycle, CycleOutcome, EnableBasis, OutputState, SharedOutput};
pub use session::{GatewayConfig, GatewaySession, SessionState};
pub use telemetry::{init_tracing, TracerProviderGuard};
