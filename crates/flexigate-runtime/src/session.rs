//! [`GatewaySession`] – lifecycle owner of one safety-controller link.
//!
//! ```text
//! Disconnected ──configure──▶ Connecting ──connected──▶ Running
//!       ▲                         │                       │
//!       └──── connect failed ─────┘                   shutdown
//!                                                         ▼
//!                                   Stopped ◀──────── ShuttingDown
//! ```
//!
//! A shutdown may also arrive while `Connecting`.  The pending `configure`
//! then fails, closes whatever it opened and never starts the driver.
//!
//! While `Running`, two activities proceed concurrently: the transport's
//! inbound path decodes frames into the [`InputCache`], and the driver task
//! runs one [`ControlCycle`] per control period and transmits the result.
//! `set_mode` may be called from any task at any time.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flexigate_hal::TcpTransport;
//! use flexigate_runtime::session::{GatewayConfig, GatewaySession};
//! use flexigate_types::ConnectionConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let session = GatewaySession::new(GatewayConfig::default(), Arc::new(TcpTransport::default()))?;
//! session.configure(&ConnectionConfig::new("192.168.1.10", 9100)).await?;
//! // ...
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use flexigate_codec::{decode_input, encode_output, InputFrame, OutputRecord};
use flexigate_hal::{FlexiTransport, FrameHandler};
use flexigate_kernel::{
    EnableGate, FreshnessPolicy, InputCache, PolicyError, ZonePolicy, ZoneSettings,
};
use flexigate_middleware::{EventBus, OdometryBridge, OdometryFeed, Topic};
use flexigate_types::{
    ConnectionConfig, Event, EventPayload, GatewayError, GatewayMode, SetModeRequest,
    SetModeResponse,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::control_cycle::{ControlCycle, CycleOutcome, Freshness, SharedOutput};

const SOURCE: &str = "flexigate-runtime::session";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`GatewaySession`].
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Period of the control-cycle driver.
    pub control_period: Duration,
    /// Odometry older than this no longer drives zone selection.
    pub telemetry_timeout: Duration,
    /// An input snapshot older than this no longer drives the enable flags.
    pub input_timeout: Duration,
    pub zone: ZoneSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            control_period: Duration::from_millis(25),
            telemetry_timeout: Duration::from_millis(250),
            input_timeout: Duration::from_millis(500),
            zone: ZoneSettings::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Running,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting",
            SessionState::Running => "Running",
            SessionState::ShuttingDown => "ShuttingDown",
            SessionState::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Core shared with the driver task
// ─────────────────────────────────────────────────────────────────────────────

struct SessionCore {
    cycle: ControlCycle,
    transport: Arc<dyn FlexiTransport>,
    bus: Arc<EventBus>,
    send_failures: AtomicU64,
}

impl SessionCore {
    /// Derive, encode and transmit one output record.  Transmit failures are
    /// logged and counted; the next cycle tries again.
    async fn tick(&self, now: Instant) -> CycleOutcome {
        let outcome = self.cycle.derive(now);
        let frame = encode_output(&outcome.record);
        if let Err(e) = self.transport.send(&frame).await {
            let failures = self.send_failures.fetch_add(1, Ordering::Relaxed) + 1;
            error!(error = %e, failures, "failed to transmit output record");
            self.bus.publish_to(
                Topic::SystemAlerts,
                Event::new(
                    SOURCE,
                    EventPayload::Fault {
                        component: "transport".to_string(),
                        message: e.to_string(),
                    },
                ),
            );
        }
        outcome
    }
}

/// Run one cycle per `period` until `shutdown_rx` reads `true`.  The signal
/// is only observed between cycles, so an in-flight cycle always completes.
fn spawn_driver(
    core: Arc<SessionCore>,
    mut shutdown_rx: watch::Receiver<bool>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        while !*shutdown_rx.borrow_and_update() {
            tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    core.tick(Instant::now()).await;
                }
            }
        }
        debug!("control-cycle driver stopped");
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewaySession
// ─────────────────────────────────────────────────────────────────────────────

pub struct GatewaySession {
    config: GatewayConfig,
    core: Arc<SessionCore>,
    cache: Arc<InputCache>,
    odometry: Arc<OdometryFeed>,
    state: Mutex<SessionState>,
    shutdown_tx: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl GatewaySession {
    /// Build a session around `transport`.
    ///
    /// # Errors
    ///
    /// [`PolicyError`] when the zone settings are invalid.
    pub fn new(
        config: GatewayConfig,
        transport: Arc<dyn FlexiTransport>,
    ) -> Result<Self, PolicyError> {
        let zone_policy = ZonePolicy::new(config.zone)?;
        let cache = Arc::new(InputCache::new());
        let odometry = Arc::new(OdometryFeed::new());
        let bus = Arc::new(EventBus::default());
        let cycle = ControlCycle::new(
            zone_policy,
            EnableGate::standard(),
            Freshness {
                telemetry: FreshnessPolicy::new(config.telemetry_timeout),
                input: FreshnessPolicy::new(config.input_timeout),
            },
            Arc::clone(&cache),
            Arc::clone(&odometry),
            Arc::clone(&bus),
        );
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            core: Arc::new(SessionCore {
                cycle,
                transport,
                bus,
                send_failures: AtomicU64::new(0),
            }),
            cache,
            odometry,
            state: Mutex::new(SessionState::Disconnected),
            shutdown_tx,
            driver: Mutex::new(None),
        })
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Connect to the controller and, on success, start the inbound listener
    /// and the control-cycle driver.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::InvalidTransition`] unless the session is
    ///   `Disconnected`, or when a shutdown overtook the connection attempt.
    /// - [`GatewayError::Connection`] when the controller cannot be reached;
    ///   the session returns to `Disconnected` and no cycle runs.
    pub async fn configure(&self, connection: &ConnectionConfig) -> Result<(), GatewayError> {
        self.transition(SessionState::Disconnected, SessionState::Connecting, "configure")?;
        info!(endpoint = %connection.endpoint(), "connecting to safety controller");

        if let Err(e) = self
            .core
            .transport
            .connect(&connection.host, connection.port)
            .await
        {
            // A shutdown that ran meanwhile keeps its terminal state.
            self.compare_and_set(SessionState::Connecting, SessionState::Disconnected);
            error!(error = %e, "safety controller connection failed");
            self.core.bus.publish_to(
                Topic::SystemAlerts,
                Event::new(
                    SOURCE,
                    EventPayload::Fault {
                        component: "transport".to_string(),
                        message: e.to_string(),
                    },
                ),
            );
            return Err(e);
        }

        if let Err(e) = self.expect_state(SessionState::Connecting, "configure") {
            // Shutdown already closed the link before this connect completed.
            warn!("shutdown overtook connection attempt; closing transport");
            self.core.transport.close().await;
            return Err(e);
        }
        self.start().await
    }

    /// Start the inbound listener and the driver on a connected transport.
    ///
    /// Called by [`configure`][Self::configure]; any other call is rejected,
    /// so there is never more than one listener or driver.  The session only
    /// becomes `Running` once the driver is in place, and not at all if a
    /// shutdown began while the listener was starting.
    pub async fn start(&self) -> Result<(), GatewayError> {
        self.expect_state(SessionState::Connecting, "start")?;
        // Subscribed before any await so a concurrent shutdown is never missed.
        let shutdown_rx = self.shutdown_tx.subscribe();

        if let Err(e) = self.core.transport.start_listener(self.frame_handler()).await {
            if self.compare_and_set(SessionState::Connecting, SessionState::Disconnected) {
                self.core.transport.close().await;
            }
            return Err(e);
        }

        let period = self.config.control_period;
        let committed = {
            let mut state = self.lock_state();
            match *state {
                SessionState::Connecting => {
                    *self.lock_driver() = Some(spawn_driver(
                        Arc::clone(&self.core),
                        shutdown_rx,
                        period,
                    ));
                    *state = SessionState::Running;
                    Ok(())
                }
                other => Err(other),
            }
        };

        match committed {
            Ok(()) => {
                info!(period_ms = period.as_millis() as u64, "gateway session running");
                Ok(())
            }
            Err(state) => {
                warn!(%state, "shutdown overtook session start; driver not started");
                if matches!(state, SessionState::ShuttingDown | SessionState::Stopped) {
                    // The listener may have started after shutdown closed the transport.
                    self.core.transport.close().await;
                }
                Err(GatewayError::InvalidTransition {
                    state: state.to_string(),
                    operation: "start".to_string(),
                })
            }
        }
    }

    /// Stop the driver, let the in-flight cycle finish, then close the
    /// transport.  Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let previous = {
            let mut state = self.lock_state();
            let previous = *state;
            match previous {
                SessionState::ShuttingDown | SessionState::Stopped => return,
                SessionState::Disconnected => *state = SessionState::Stopped,
                SessionState::Connecting | SessionState::Running => {
                    *state = SessionState::ShuttingDown
                }
            }
            previous
        };
        if previous == SessionState::Disconnected {
            info!("gateway session stopped before connecting");
            return;
        }

        info!("shutting down gateway session");
        self.shutdown_tx.send_replace(true);
        // Set under the state lock by `start`, so it is present whenever the
        // state was `Running`.
        let driver = self.lock_driver().take();
        if let Some(handle) = driver
            && let Err(e) = handle.await
        {
            warn!(error = %e, "control-cycle driver ended abnormally");
        }
        self.core.transport.close().await;
        self.set_state(SessionState::Stopped);
        info!("gateway session stopped");
    }

    // -------------------------------------------------------------------------
    // Control surface
    // -------------------------------------------------------------------------

    /// Select the output-enable policy.  Unknown modes are rejected and leave
    /// the active mode unchanged.
    pub fn set_mode(&self, request: SetModeRequest) -> SetModeResponse {
        let mode = match GatewayMode::try_from(request.mode) {
            Ok(mode) => mode,
            Err(e) => {
                warn!(mode = request.mode, "rejecting set_mode request");
                return SetModeResponse::rejected(format!("{e}; expected 0..=3"));
            }
        };

        let previous = self.core.cycle.output().set_mode(mode);
        if previous != mode {
            info!(?previous, ?mode, "gateway mode changed");
            self.core.bus.publish_to(
                Topic::SystemAlerts,
                Event::new(SOURCE, EventPayload::ModeChanged(mode)),
            );
        }
        SetModeResponse::accepted(format!("mode set to {mode:?}"))
    }

    /// Run one derive-and-transmit cycle now, outside the driver's schedule.
    pub async fn tick_once(&self) -> CycleOutcome {
        self.core.tick(Instant::now()).await
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    pub fn mode(&self) -> GatewayMode {
        self.core.cycle.output().get().mode
    }

    /// The most recently committed output record.
    pub fn last_output(&self) -> OutputRecord {
        self.core.cycle.output().get().last_output
    }

    pub fn output(&self) -> &SharedOutput {
        self.core.cycle.output()
    }

    pub fn input_cache(&self) -> &Arc<InputCache> {
        &self.cache
    }

    /// Telemetry ingest bound to this session's feed and bus.
    pub fn odometry_bridge(&self) -> OdometryBridge {
        OdometryBridge::new(Arc::clone(&self.core.bus), Arc::clone(&self.odometry))
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.core.bus
    }

    /// Number of output records that failed to transmit.
    pub fn send_failures(&self) -> u64 {
        self.core.send_failures.load(Ordering::Relaxed)
    }

    /// The inbound delivery callback: decode, then store.  Decoding happens
    /// before the cache lock is taken.
    pub fn frame_handler(&self) -> FrameHandler {
        let cache = Arc::clone(&self.cache);
        Arc::new(move |frame: InputFrame| {
            let record = decode_input(&frame);
            cache.store(record);
        })
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    fn transition(
        &self,
        from: SessionState,
        to: SessionState,
        operation: &str,
    ) -> Result<(), GatewayError> {
        let mut state = self.lock_state();
        if *state != from {
            return Err(GatewayError::InvalidTransition {
                state: state.to_string(),
                operation: operation.to_string(),
            });
        }
        *state = to;
        Ok(())
    }

    fn expect_state(&self, expected: SessionState, operation: &str) -> Result<(), GatewayError> {
        let state = self.lock_state();
        if *state != expected {
            return Err(GatewayError::InvalidTransition {
                state: state.to_string(),
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Move to `to` only while the state is still `from`.
    fn compare_and_set(&self, from: SessionState, to: SessionState) -> bool {
        let mut state = self.lock_state();
        if *state != from {
            return false;
        }
        *state = to;
        true
    }

    fn set_state(&self, to: SessionState) {
        *self.lock_state() = to;
    }

    fn lock_driver(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
