//! `flexigate-middleware` – Telemetry and Event Routing
//!
//! Carries data between the gateway core and its collaborators without
//! interpreting it.
//!
//! # Modules
//!
//! - [`bus`] – typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`odometry`] – [`OdometryFeed`], the latest-value telemetry slot read by
//!   the control cycle, and [`OdometryBridge`], which validates inbound
//!   odometry, stores it in the feed and announces it on the bus.

pub mod bus;
pub mod odometry;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use odometry::{OdometryBridge, OdometryFeed, StampedOdometry};
