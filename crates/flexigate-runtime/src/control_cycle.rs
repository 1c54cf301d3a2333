//! [`ControlCycle`] – one derivation step from inputs to an output record.
//!
//! Each cycle:
//!
//! 1. **Sample** – copy the newest odometry sample and input snapshot.
//! 2. **Classify** – check both against their [`FreshnessPolicy`].
//! 3. **Zone** – fresh odometry → [`ZonePolicy::select`]; stale or missing
//!    odometry → [`ZonePolicy::fallback`], the most restrictive selection.
//! 4. **Enable** – a fresh snapshot → [`EnableGate::evaluate`] under the
//!    active [`GatewayMode`].  Before the first snapshot arrives the start-up
//!    flags are kept, still restricted by the mode; once a snapshot has gone
//!    stale every enable is withheld until fresh data returns.
//! 5. **Commit** – the new record replaces the previous one in the shared
//!    [`OutputState`]; transitions are logged and published on the bus.
//!
//! Derivation never fails.  Encoding and transmission are the caller's job.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use flexigate_codec::{InputRecord, OutputRecord};
use flexigate_kernel::{
    EnableDecision, EnableGate, FreshnessPolicy, InputCache, SampleHealth, ZonePolicy, ZoneRange,
    ZoneSelection,
};
use flexigate_middleware::{EventBus, OdometryFeed, Topic};
use flexigate_types::{Event, EventPayload, GatewayMode, MotionState, Subsystem};
use tracing::{debug, info, warn};

const SOURCE: &str = "flexigate-runtime::control_cycle";

/// Fault name reported when enables are withheld for stale inputs.
const STALE_INPUTS: &str = "inputs_stale";

// ─────────────────────────────────────────────────────────────────────────────
// Shared output state
// ─────────────────────────────────────────────────────────────────────────────

/// Output-side state shared by the control cycle and `set_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputState {
    pub mode: GatewayMode,
    /// The record committed by the most recent cycle.
    pub last_output: OutputRecord,
    last_range: ZoneRange,
    telemetry_health: SampleHealth,
    input_health: SampleHealth,
}

impl OutputState {
    /// Start-up state: both subsystems enabled, the most restrictive zone.
    pub fn initial(fallback: &ZoneSelection) -> Self {
        let mut last_output = OutputRecord {
            enable_base: true,
            enable_torso: true,
            ..OutputRecord::default()
        };
        fallback.apply_to(&mut last_output);
        Self {
            mode: GatewayMode::default(),
            last_output,
            last_range: fallback.range,
            telemetry_health: SampleHealth::Missing,
            input_health: SampleHealth::Missing,
        }
    }
}

/// Handle to the [`OutputState`] shared between tasks.
#[derive(Debug, Clone)]
pub struct SharedOutput(Arc<Mutex<OutputState>>);

impl SharedOutput {
    pub fn new(state: OutputState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    /// Copy of the current state.
    pub fn get(&self) -> OutputState {
        *self.lock()
    }

    /// Swap the active mode, returning the previous one.
    pub fn set_mode(&self, mode: GatewayMode) -> GatewayMode {
        std::mem::replace(&mut self.lock().mode, mode)
    }

    fn lock(&self) -> MutexGuard<'_, OutputState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Where a cycle's enable flags came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableBasis {
    /// Evaluated from a fresh input snapshot.
    Derived,
    /// No input data set received yet; the start-up flags were carried over,
    /// still restricted by the mode.
    StartUp,
    /// The input data set went stale; every enable is withheld.
    Withheld,
}

/// Result of one derivation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    pub record: OutputRecord,
    pub telemetry: SampleHealth,
    pub input: SampleHealth,
    /// Odometry was not fresh, so the most restrictive zone was selected.
    pub zone_fallback: bool,
    pub enables: EnableBasis,
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlCycle
// ─────────────────────────────────────────────────────────────────────────────

/// Freshness bounds for the two cycle inputs.
#[derive(Debug, Clone, Copy)]
pub struct Freshness {
    pub telemetry: FreshnessPolicy,
    pub input: FreshnessPolicy,
}

pub struct ControlCycle {
    zone_policy: ZonePolicy,
    gate: EnableGate,
    freshness: Freshness,
    cache: Arc<InputCache>,
    odometry: Arc<OdometryFeed>,
    output: SharedOutput,
    bus: Arc<EventBus>,
}

impl ControlCycle {
    pub fn new(
        zone_policy: ZonePolicy,
        gate: EnableGate,
        freshness: Freshness,
        cache: Arc<InputCache>,
        odometry: Arc<OdometryFeed>,
        bus: Arc<EventBus>,
    ) -> Self {
        let output = SharedOutput::new(OutputState::initial(&zone_policy.fallback()));
        Self {
            zone_policy,
            gate,
            freshness,
            cache,
            odometry,
            output,
            bus,
        }
    }

    pub fn output(&self) -> &SharedOutput {
        &self.output
    }

    /// Run one derivation step as seen at `now`.
    pub fn derive(&self, now: Instant) -> CycleOutcome {
        let odometry = self.odometry.latest();
        let telemetry = self
            .freshness
            .telemetry
            .classify(odometry.map(|o| o.received_at), now);
        let snapshot = self.cache.stamped_snapshot();
        let input = self.freshness.input.classify(snapshot.received_at, now);

        let zone = match odometry {
            Some(stamped) if telemetry.is_fresh() => {
                self.zone_policy.select(&MotionState::from(stamped.sample))
            }
            _ => self.zone_policy.fallback(),
        };

        let mode = self.output.get().mode;
        let decision = input
            .is_fresh()
            .then(|| self.gate.evaluate(&snapshot.record, mode));
        let enables = match (&decision, input) {
            (Some(_), _) => EnableBasis::Derived,
            (None, SampleHealth::Missing) => EnableBasis::StartUp,
            (None, _) => EnableBasis::Withheld,
        };

        let (previous, outcome) = {
            let mut state = self.output.lock();
            let previous = *state;
            // `set_mode` may have run since the copy above.
            let mode = state.mode;
            let mut record = previous.last_output;
            zone.apply_to(&mut record);
            state.last_range = zone.range;
            match &decision {
                Some(decision) => {
                    record.enable_base = decision.base.enabled && mode.permits(Subsystem::Base);
                    record.enable_torso = decision.torso.enabled && mode.permits(Subsystem::Torso);
                }
                None if enables == EnableBasis::StartUp => {
                    record.enable_base &= mode.permits(Subsystem::Base);
                    record.enable_torso &= mode.permits(Subsystem::Torso);
                }
                None => {
                    record.enable_base = false;
                    record.enable_torso = false;
                }
            }
            state.last_output = record;
            state.telemetry_health = telemetry;
            state.input_health = input;
            (
                previous,
                CycleOutcome {
                    record,
                    telemetry,
                    input,
                    zone_fallback: !telemetry.is_fresh(),
                    enables,
                },
            )
        };

        self.report_health(&previous, &outcome);
        self.report_zone(&previous, &zone);
        self.report_enables(&previous.last_output, &outcome, decision.as_ref(), &snapshot.record);
        self.bus.publish_to(
            Topic::SafetyOutput,
            Event::new(
                SOURCE,
                EventPayload::OutputCommitted {
                    record: outcome.record,
                    zone_fallback: outcome.zone_fallback,
                    enables_derived: outcome.enables == EnableBasis::Derived,
                },
            ),
        );
        outcome
    }

    fn report_health(&self, previous: &OutputState, outcome: &CycleOutcome) {
        if previous.telemetry_health.is_fresh() && !outcome.telemetry.is_fresh() {
            warn!(health = ?outcome.telemetry, "odometry no longer fresh; falling back to the most restrictive zone");
            self.alert("odometry", format!("odometry {:?}; fallback zone selected", outcome.telemetry));
        } else if !previous.telemetry_health.is_fresh() && outcome.telemetry.is_fresh() {
            info!("odometry fresh again");
        }

        if previous.input_health.is_fresh() && !outcome.input.is_fresh() {
            warn!(health = ?outcome.input, "controller inputs no longer fresh; withholding enable flags");
            self.alert("input_cache", format!("inputs {:?}; enables withheld", outcome.input));
        } else if !previous.input_health.is_fresh() && outcome.input.is_fresh() {
            info!("controller inputs fresh again");
        }
    }

    fn report_zone(&self, previous: &OutputState, zone: &ZoneSelection) {
        if zone.laser_case == previous.last_output.laser_case && zone.range == previous.last_range {
            return;
        }
        debug!(
            laser_case = zone.laser_case.value(),
            range = ?zone.range,
            far_front = zone.far_front,
            far_left = zone.far_left,
            far_right = zone.far_right,
            "zone changed"
        );
        self.bus.publish_to(
            Topic::SafetyOutput,
            Event::new(
                SOURCE,
                EventPayload::ZoneChanged {
                    laser_case: zone.laser_case,
                    far: zone.range != ZoneRange::Near,
                },
            ),
        );
    }

    fn report_enables(
        &self,
        previous: &OutputRecord,
        outcome: &CycleOutcome,
        decision: Option<&EnableDecision>,
        input: &InputRecord,
    ) {
        let current = &outcome.record;
        for subsystem in Subsystem::ALL {
            let (was, now) = match subsystem {
                Subsystem::Base => (previous.enable_base, current.enable_base),
                Subsystem::Torso => (previous.enable_torso, current.enable_torso),
            };
            if was == now {
                continue;
            }
            let faults = match (decision, outcome.enables) {
                (Some(d), _) => d.get(subsystem).faults.clone(),
                (None, EnableBasis::Withheld) => vec![STALE_INPUTS.to_string()],
                (None, _) => Vec::new(),
            };
            if now {
                info!(%subsystem, "subsystem enabled");
            } else {
                warn!(
                    %subsystem,
                    ?faults,
                    em_stop_ok = input.em_stop_ok,
                    "subsystem disabled"
                );
            }
            self.bus.publish_to(
                Topic::SystemAlerts,
                Event::new(
                    SOURCE,
                    EventPayload::EnableChanged {
                        subsystem,
                        enabled: now,
                        faults,
                    },
                ),
            );
        }
    }

    fn alert(&self, component: &str, message: String) {
        self.bus.publish_to(
            Topic::SystemAlerts,
            Event::new(
                SOURCE,
                EventPayload::Fault {
                    component: component.to_string(),
                    message,
                },
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexigate_kernel::ZoneSettings;
    use flexigate_types::OdometrySample;
    use std::time::Duration;

    struct Fixture {
        cycle: ControlCycle,
        cache: Arc<InputCache>,
        odometry: Arc<OdometryFeed>,
        bus: Arc<EventBus>,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(InputCache::new());
        let odometry = Arc::new(OdometryFeed::new());
        let bus = Arc::new(EventBus::default());
        let cycle = ControlCycle::new(
            ZonePolicy::new(ZoneSettings::default()).unwrap(),
            EnableGate::standard(),
            Freshness {
                telemetry: FreshnessPolicy::new(Duration::from_millis(250)),
                input: FreshnessPolicy::new(Duration::from_millis(500)),
            },
            Arc::clone(&cache),
            Arc::clone(&odometry),
            Arc::clone(&bus),
        );
        Fixture {
            cycle,
            cache,
            odometry,
            bus,
        }
    }

    #[test]
    fn initial_cycle_holds_start_up_output() {
        let f = fixture();
        let outcome = f.cycle.derive(Instant::now());
        assert_eq!(outcome.telemetry, SampleHealth::Missing);
        assert_eq!(outcome.input, SampleHealth::Missing);
        assert!(outcome.zone_fallback);
        assert_eq!(outcome.enables, EnableBasis::StartUp);
        assert!(outcome.record.enable_base && outcome.record.enable_torso);
        assert_eq!(outcome.record.laser_case.value(), 31);
        assert!(outcome.record.far_front && outcome.record.far_left && outcome.record.far_right);
    }

    #[test]
    fn fresh_inputs_drive_zone_and_enables() {
        let f = fixture();
        let t0 = Instant::now();
        f.odometry.update_at(OdometrySample::new(1.0, 0.0), t0);
        f.cache.store_at(InputRecord::nominal(), t0);

        let outcome = f.cycle.derive(t0 + Duration::from_millis(10));
        assert!(!outcome.zone_fallback);
        assert_eq!(outcome.enables, EnableBasis::Derived);
        assert_eq!(outcome.record.laser_case.value(), 12);
        assert!(outcome.record.far_front);
        assert!(!outcome.record.far_left && !outcome.record.far_right);
        assert!(outcome.record.enable_base && outcome.record.enable_torso);
        assert_eq!(f.cycle.output().get().last_output, outcome.record);
    }

    #[test]
    fn em_stop_drops_both_enables() {
        let f = fixture();
        let t0 = Instant::now();
        f.cache.store_at(
            InputRecord {
                em_stop_ok: false,
                ..InputRecord::nominal()
            },
            t0,
        );
        let mut alerts = f.bus.subscribe_to(Topic::SystemAlerts);

        let outcome = f.cycle.derive(t0);
        assert!(!outcome.record.enable_base);
        assert!(!outcome.record.enable_torso);

        let event = alerts.try_recv().expect("enable change published");
        match event.payload {
            EventPayload::EnableChanged {
                subsystem,
                enabled,
                faults,
            } => {
                assert_eq!(subsystem, Subsystem::Base);
                assert!(!enabled);
                assert_eq!(faults, vec!["em_stop_ok".to_string()]);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn stale_telemetry_falls_back_to_most_restrictive_zone() {
        let f = fixture();
        let t0 = Instant::now();
        f.odometry.update_at(OdometrySample::new(0.1, 0.0), t0);
        let fresh = f.cycle.derive(t0);
        assert_eq!(fresh.record.laser_case.value(), 0);
        assert!(!fresh.record.far_front);

        // No new odometry for longer than the timeout.
        let stale = f.cycle.derive(t0 + Duration::from_millis(400));
        assert_eq!(stale.telemetry, SampleHealth::Stale);
        assert!(stale.zone_fallback);
        assert_eq!(stale.record.laser_case.value(), 31);
        assert!(stale.record.far_front && stale.record.far_left && stale.record.far_right);

        // Fresh odometry lifts the fallback again.
        f.odometry
            .update_at(OdometrySample::new(0.1, 0.0), t0 + Duration::from_millis(400));
        let recovered = f.cycle.derive(t0 + Duration::from_millis(410));
        assert!(!recovered.zone_fallback);
        assert_eq!(recovered.record.laser_case.value(), 0);
    }

    #[test]
    fn long_silence_after_slow_motion_is_fully_restrictive() {
        let f = fixture();
        let t0 = Instant::now();
        f.odometry.update_at(OdometrySample::new(0.1, 0.0), t0);
        f.cache.store_at(InputRecord::nominal(), t0);
        let creeping = f.cycle.derive(t0);
        assert_eq!(creeping.record.laser_case.value(), 0);
        assert!(creeping.record.enable_base && creeping.record.enable_torso);

        let silent = f.cycle.derive(t0 + Duration::from_secs(3600));
        assert_eq!(silent.telemetry, SampleHealth::Stale);
        assert_eq!(silent.input, SampleHealth::Stale);
        assert_eq!(silent.record.laser_case.value(), 31);
        assert!(silent.record.far_front && silent.record.far_left && silent.record.far_right);
        assert!(!silent.record.enable_base && !silent.record.enable_torso);
    }

    #[test]
    fn stale_inputs_withhold_enables_until_fresh_again() {
        let f = fixture();
        let t0 = Instant::now();
        f.cache.store_at(InputRecord::nominal(), t0);
        assert!(f.cycle.derive(t0).record.enable_base);
        let mut alerts = f.bus.subscribe_to(Topic::SystemAlerts);

        let later = t0 + Duration::from_secs(1);
        let stale = f.cycle.derive(later);
        assert_eq!(stale.input, SampleHealth::Stale);
        assert_eq!(stale.enables, EnableBasis::Withheld);
        assert!(!stale.record.enable_base && !stale.record.enable_torso);

        // Health fault first, then one enable change per subsystem.
        let fault = alerts.try_recv().expect("stale input alert");
        assert!(matches!(
            fault.payload,
            EventPayload::Fault { ref component, .. } if component == "input_cache"
        ));
        let change = alerts.try_recv().expect("enable change published");
        match change.payload {
            EventPayload::EnableChanged { enabled, faults, .. } => {
                assert!(!enabled);
                assert_eq!(faults, vec![STALE_INPUTS.to_string()]);
            }
            other => panic!("unexpected payload: {other:?}"),
        }

        assert!(!f.cycle.derive(later + Duration::from_secs(5)).record.enable_base);

        f.cache.store_at(InputRecord::nominal(), later);
        let fresh = f.cycle.derive(later);
        assert_eq!(fresh.enables, EnableBasis::Derived);
        assert!(fresh.record.enable_base && fresh.record.enable_torso);
    }

    #[test]
    fn start_up_enables_are_still_restricted_by_mode() {
        let f = fixture();
        f.cycle.output().set_mode(GatewayMode::TorsoOnly);
        let outcome = f.cycle.derive(Instant::now());
        assert_eq!(outcome.enables, EnableBasis::StartUp);
        assert!(!outcome.record.enable_base);
        assert!(outcome.record.enable_torso);
    }

    #[test]
    fn mode_applies_to_fresh_inputs() {
        let f = fixture();
        let t0 = Instant::now();
        f.cache.store_at(InputRecord::nominal(), t0);
        f.cycle.output().set_mode(GatewayMode::Disabled);
        let outcome = f.cycle.derive(t0);
        assert!(!outcome.record.enable_base && !outcome.record.enable_torso);

        f.cycle.output().set_mode(GatewayMode::Automatic);
        let outcome = f.cycle.derive(t0);
        assert!(outcome.record.enable_base && outcome.record.enable_torso);
    }

    #[test]
    fn every_cycle_publishes_committed_output() {
        let f = fixture();
        let mut outputs = f.bus.subscribe_to(Topic::SafetyOutput);
        let t0 = Instant::now();
        f.odometry.update_at(OdometrySample::new(0.0, 0.2), t0);
        f.cycle.derive(t0);

        // Zone change, then the committed record.
        let first = outputs.try_recv().unwrap();
        assert!(matches!(first.payload, EventPayload::ZoneChanged { far: false, .. }));
        let second = outputs.try_recv().unwrap();
        assert!(matches!(
            second.payload,
            EventPayload::OutputCommitted {
                zone_fallback: false,
                enables_derived: false,
                ..
            }
        ));

        // Same zone again: only the committed record.
        f.cycle.derive(t0);
        let third = outputs.try_recv().unwrap();
        assert!(matches!(third.payload, EventPayload::OutputCommitted { .. }));
        assert!(outputs.try_recv().is_err());
    }
}
