//! `flexigate-kernel` – Safety Signal Derivation
//!
//! Pure, synchronous building blocks of the control cycle.  Nothing in this
//! crate performs I/O or awaits; the runtime composes these pieces on its
//! fixed-period driver.
//!
//! # Modules
//!
//! - [`input_cache`] – [`InputCache`][input_cache::InputCache]: the
//!   synchronized latest-value slot written by the transport's inbound path
//!   and read by the control cycle.
//! - [`freshness`] – [`FreshnessPolicy`][freshness::FreshnessPolicy]:
//!   classifies a sample's age as fresh, stale or missing.
//! - [`zone_policy`] – [`ZonePolicy`][zone_policy::ZonePolicy]: maps the
//!   robot's motion onto a laser field set and far-field indicators.
//! - [`enable_gate`] – [`EnableGate`][enable_gate::EnableGate]: a rule engine
//!   that derives per-subsystem enable flags from the input signals and the
//!   active [`GatewayMode`][flexigate_types::GatewayMode].

pub mod enable_gate;
pub mod freshness;
pub mod input_cache;
pub mod zone_policy;

pub use enable_gate::{EdmInterlock, EnableDecision, EnableGate, Interlock, SignalInterlock, SubsystemEnable};
pub use freshness::{FreshnessPolicy, SampleHealth};
pub use input_cache::{InputCache, StampedInput};
pub use zone_policy::{PolicyError, ZonePolicy, ZoneRange, ZoneSelection, ZoneSettings};
