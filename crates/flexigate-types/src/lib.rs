use chrono::{DateTime, Utc};
use flexigate_codec::{LaserCase, OutputRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Network endpoint of the safety controller gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` form used for logging and socket addressing.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Robot subsystems whose motion is gated by an enable bit in the output
/// data set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    /// Mobile base (drive motors).
    Base,
    /// Torso / lift axis.
    Torso,
}

impl Subsystem {
    pub const ALL: [Subsystem; 2] = [Subsystem::Base, Subsystem::Torso];
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subsystem::Base => write!(f, "base"),
            Subsystem::Torso => write!(f, "torso"),
        }
    }
}

/// Output-enable policy selected through the `set_mode` control surface.
///
/// A mode can only withhold enables; it never enables a subsystem whose
/// safety inputs report a fault.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatewayMode {
    /// Enable flags follow the safety inputs.
    #[default]
    Automatic,
    /// Torso held disabled.
    BaseOnly,
    /// Base held disabled.
    TorsoOnly,
    /// Every subsystem held disabled.
    Disabled,
}

impl GatewayMode {
    /// Wire code used by the `set_mode` request.
    pub fn code(self) -> i32 {
        match self {
            GatewayMode::Automatic => 0,
            GatewayMode::BaseOnly => 1,
            GatewayMode::TorsoOnly => 2,
            GatewayMode::Disabled => 3,
        }
    }

    /// `true` when the mode lets `subsystem` follow its derived enable flag.
    pub fn permits(self, subsystem: Subsystem) -> bool {
        match self {
            GatewayMode::Automatic => true,
            GatewayMode::BaseOnly => subsystem == Subsystem::Base,
            GatewayMode::TorsoOnly => subsystem == Subsystem::Torso,
            GatewayMode::Disabled => false,
        }
    }
}

impl TryFrom<i32> for GatewayMode {
    type Error = GatewayError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(GatewayMode::Automatic),
            1 => Ok(GatewayMode::BaseOnly),
            2 => Ok(GatewayMode::TorsoOnly),
            3 => Ok(GatewayMode::Disabled),
            other => Err(GatewayError::UnknownMode(other)),
        }
    }
}

/// `set_mode` request: integer mode selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetModeRequest {
    pub mode: i32,
}

/// `set_mode` response: definite success flag plus a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetModeResponse {
    pub success: bool,
    pub message: String,
}

impl SetModeResponse {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Linear velocity components of an odometry message (robot frame, m/s).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdometrySample {
    pub linear_x: f64,
    pub linear_y: f64,
}

impl OdometrySample {
    pub fn new(linear_x: f64, linear_y: f64) -> Self {
        Self { linear_x, linear_y }
    }

    /// `false` when either component is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.linear_x.is_finite() && self.linear_y.is_finite()
    }
}

/// Direction and magnitude of travel derived from one odometry sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionState {
    /// Direction of travel in the robot frame, `(-π, π]`, 0 = straight ahead,
    /// positive = towards the left.
    pub heading_rad: f64,
    /// Scalar speed (m/s), always ≥ 0.
    pub speed_mps: f64,
}

impl MotionState {
    pub fn from_twist(linear_x: f64, linear_y: f64) -> Self {
        Self {
            heading_rad: linear_y.atan2(linear_x),
            speed_mps: linear_x.hypot(linear_y),
        }
    }

    pub fn heading_deg(&self) -> f64 {
        self.heading_rad.to_degrees()
    }
}

impl From<OdometrySample> for MotionState {
    fn from(sample: OdometrySample) -> Self {
        Self::from_twist(sample.linear_x, sample.linear_y)
    }
}

/// Unified event wrapper for the gateway event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "flexigate-runtime::control_cycle"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the gateway event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A fresh odometry sample entered the telemetry feed.
    Odometry(OdometrySample),
    /// An output record was committed for transmission.
    OutputCommitted {
        record: OutputRecord,
        /// Odometry was not fresh; the most restrictive zone was selected.
        zone_fallback: bool,
        /// Enable flags were evaluated from a fresh input snapshot.
        enables_derived: bool,
    },
    /// A subsystem enable flag flipped.
    EnableChanged {
        subsystem: Subsystem,
        enabled: bool,
        /// Names of the input signals that withheld the enable.
        faults: Vec<String>,
    },
    /// The selected laser case changed.
    ZoneChanged { laser_case: LaserCase, far: bool },
    /// The output-enable policy was changed through `set_mode`.
    ModeChanged(GatewayMode),
    /// A gateway component reported a problem (transport, stale data, …).
    Fault { component: String, message: String },
}

/// Gateway-wide error type spanning transport failures, lifecycle misuse and
/// control-surface rejections.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayError {
    #[error("Connection to {endpoint} failed: {details}")]
    Connection { endpoint: String, details: String },

    #[error("Invalid session transition: cannot {operation} while {state}")]
    InvalidTransition { state: String, operation: String },

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Unknown gateway mode {0}")]
    UnknownMode(i32),

    #[error("Invalid telemetry: {0}")]
    InvalidTelemetry(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn mode_codes_roundtrip() {
        for code in 0..4 {
            let mode = GatewayMode::try_from(code).unwrap();
            assert_eq!(mode.code(), code);
        }
        assert_eq!(
            GatewayMode::try_from(7),
            Err(GatewayError::UnknownMode(7))
        );
        assert!(GatewayMode::try_from(-1).is_err());
    }

    #[test]
    fn modes_only_restrict() {
        assert!(GatewayMode::Automatic.permits(Subsystem::Base));
        assert!(GatewayMode::Automatic.permits(Subsystem::Torso));
        assert!(!GatewayMode::BaseOnly.permits(Subsystem::Torso));
        assert!(!GatewayMode::TorsoOnly.permits(Subsystem::Base));
        assert!(Subsystem::ALL
            .iter()
            .all(|s| !GatewayMode::Disabled.permits(*s)));
    }

    #[test]
    fn motion_state_from_twist() {
        let forward = MotionState::from_twist(0.5, 0.0);
        assert!(forward.heading_rad.abs() < 1e-12);
        assert!((forward.speed_mps - 0.5).abs() < 1e-12);

        let left = MotionState::from_twist(0.0, 0.3);
        assert!((left.heading_rad - FRAC_PI_2).abs() < 1e-12);

        let backward = MotionState::from_twist(-1.0, 0.0);
        assert!((backward.heading_rad - PI).abs() < 1e-12);

        let diagonal = MotionState::from_twist(3.0, -4.0);
        assert!((diagonal.speed_mps - 5.0).abs() < 1e-12);
        assert!(diagonal.heading_deg() < 0.0);
    }

    #[test]
    fn standstill_points_straight_ahead() {
        let still = MotionState::from_twist(0.0, 0.0);
        assert_eq!(still.heading_rad, 0.0);
        assert_eq!(still.speed_mps, 0.0);
    }

    #[test]
    fn non_finite_odometry_detected() {
        assert!(OdometrySample::new(0.1, 0.2).is_finite());
        assert!(!OdometrySample::new(f64::NAN, 0.0).is_finite());
        assert!(!OdometrySample::new(0.0, f64::INFINITY).is_finite());
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "flexigate-middleware::odometry",
            EventPayload::Odometry(OdometrySample::new(1.0, 2.0)),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
        assert!(matches!(back.payload, EventPayload::Odometry(s) if s.linear_y == 2.0));
    }

    #[test]
    fn gateway_error_display() {
        let err = GatewayError::Connection {
            endpoint: "10.4.7.99:9100".to_string(),
            details: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("10.4.7.99:9100"));

        let err2 = GatewayError::InvalidTransition {
            state: "Running".to_string(),
            operation: "start".to_string(),
        };
        assert!(err2.to_string().contains("Running"));
    }

    #[test]
    fn endpoint_formatting() {
        let cfg = ConnectionConfig::new("192.168.1.10", 9100);
        assert_eq!(cfg.endpoint(), "192.168.1.10:9100");
    }
}
