//! Odometry ingest.
//!
//! [`OdometryFeed`] is a latest-value slot: the control cycle reads whatever
//! sample is newest at tick time, regardless of how fast or slow odometry
//! arrives.  It is backed by a [`tokio::sync::watch`] channel, so writers
//! never block and readers never see a half-written sample.
//!
//! [`OdometryBridge`] is the inbound adapter: it rejects malformed samples,
//! stamps and stores valid ones, and announces them on [`Topic::Telemetry`].

use std::sync::Arc;
use std::time::Instant;

use flexigate_types::{Event, EventPayload, GatewayError, OdometrySample};
use tokio::sync::watch;
use tracing::warn;

use crate::bus::{EventBus, Topic};

/// Maximum plausible linear speed component (m/s).
///
/// Samples beyond this are treated as sensor glitches and rejected before
/// they can drive zone selection.
pub const MAX_LINEAR_SPEED_MPS: f64 = 20.0;

/// An odometry sample together with the instant it entered the feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampedOdometry {
    pub sample: OdometrySample,
    pub received_at: Instant,
}

/// Latest-value odometry slot shared between the ingest path and the control
/// cycle.
#[derive(Debug)]
pub struct OdometryFeed {
    tx: watch::Sender<Option<StampedOdometry>>,
}

impl OdometryFeed {
    /// Create an empty feed.  [`latest`][Self::latest] returns `None` until
    /// the first sample arrives.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Replace the current sample, stamping it with the current instant.
    pub fn update(&self, sample: OdometrySample) {
        self.update_at(sample, Instant::now());
    }

    /// Replace the current sample with an explicit receive instant.
    pub fn update_at(&self, sample: OdometrySample, received_at: Instant) {
        self.tx.send_replace(Some(StampedOdometry {
            sample,
            received_at,
        }));
    }

    /// The newest sample, if any has arrived.
    pub fn latest(&self) -> Option<StampedOdometry> {
        *self.tx.borrow()
    }

    /// Watch the feed for changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<StampedOdometry>> {
        self.tx.subscribe()
    }
}

impl Default for OdometryFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Inbound odometry adapter.
#[derive(Clone)]
pub struct OdometryBridge {
    bus: Arc<EventBus>,
    feed: Arc<OdometryFeed>,
}

impl OdometryBridge {
    pub fn new(bus: Arc<EventBus>, feed: Arc<OdometryFeed>) -> Self {
        Self { bus, feed }
    }

    /// Ingest the linear part of an odometry twist.
    ///
    /// Returns the number of telemetry subscribers that were notified.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidTelemetry`] when a component is non-finite or
    /// exceeds [`MAX_LINEAR_SPEED_MPS`].  Rejected samples never reach the
    /// feed, so the control cycle keeps treating the previous sample's age
    /// as authoritative.
    pub fn ingest_twist(&self, linear_x: f64, linear_y: f64) -> Result<usize, GatewayError> {
        let sample = OdometrySample::new(linear_x, linear_y);
        if !sample.is_finite() {
            warn!(linear_x, linear_y, "rejecting non-finite odometry");
            return Err(GatewayError::InvalidTelemetry(format!(
                "non-finite twist ({linear_x}, {linear_y})"
            )));
        }
        if linear_x.abs() > MAX_LINEAR_SPEED_MPS || linear_y.abs() > MAX_LINEAR_SPEED_MPS {
            warn!(linear_x, linear_y, "rejecting implausible odometry");
            return Err(GatewayError::InvalidTelemetry(format!(
                "twist ({linear_x}, {linear_y}) exceeds {MAX_LINEAR_SPEED_MPS} m/s"
            )));
        }

        self.feed.update(sample);
        let event = Event::new(
            "flexigate-middleware::odometry",
            EventPayload::Odometry(sample),
        );
        Ok(self.bus.publish_to(Topic::Telemetry, event))
    }

    pub fn feed(&self) -> &Arc<OdometryFeed> {
        &self.feed
    }
}
