//! [`EnableGate`] – per-subsystem motion enable derivation.
//!
//! Every registered [`Interlock`] is evaluated for each [`Subsystem`]; the
//! subsystem is enabled only when all of them hold.  The active
//! [`GatewayMode`] is applied afterwards and can only withhold an enable,
//! never grant one.
//!
//! [`EnableGate::standard`] registers the platform's interlock set:
//!
//! | Interlock | Applies to | Holds when |
//! |---|---|---|
//! | `em_stop_ok` | all | emergency-stop chain closed |
//! | `hardware_stop_ok` | all | hardware stop released |
//! | `software_stop_ok` | all | software stop released |
//! | `laser_stop_ok` | all | no laser protective stop |
//! | `connection_ok` | all | controller sees the gateway |
//! | `edm_err_base` | base | no contactor fault on the base |
//! | `edm_err_lift` | torso | no contactor fault on the lift |

use flexigate_codec::InputRecord;
use flexigate_types::{GatewayMode, Subsystem};
use tracing::trace;

// ────────────────────────────────────────────────────────────────────────────
// Interlock trait
// ────────────────────────────────────────────────────────────────────────────

/// A single input condition that must hold for a subsystem to move.
pub trait Interlock: Send + Sync {
    /// Signal name reported when the interlock withholds an enable.
    fn name(&self) -> &str;

    /// `true` when the interlock permits `subsystem` given `input`.
    fn holds(&self, input: &InputRecord, subsystem: Subsystem) -> bool;
}

/// Interlock on an active-high health signal shared by every subsystem.
pub struct SignalInterlock {
    pub name: &'static str,
    pub signal: fn(&InputRecord) -> bool,
}

impl Interlock for SignalInterlock {
    fn name(&self) -> &str {
        self.name
    }

    fn holds(&self, input: &InputRecord, _subsystem: Subsystem) -> bool {
        (self.signal)(input)
    }
}

/// Interlock on one subsystem's external device monitoring error flag.
/// Other subsystems are unaffected by it.
pub struct EdmInterlock {
    pub subsystem: Subsystem,
}

impl EdmInterlock {
    fn error_flag(&self, input: &InputRecord) -> bool {
        match self.subsystem {
            Subsystem::Base => input.edm_err_base,
            Subsystem::Torso => input.edm_err_lift,
        }
    }
}

impl Interlock for EdmInterlock {
    fn name(&self) -> &str {
        match self.subsystem {
            Subsystem::Base => "edm_err_base",
            Subsystem::Torso => "edm_err_lift",
        }
    }

    fn holds(&self, input: &InputRecord, subsystem: Subsystem) -> bool {
        subsystem != self.subsystem || !self.error_flag(input)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Decisions
// ────────────────────────────────────────────────────────────────────────────

/// Enable verdict for one subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemEnable {
    pub subsystem: Subsystem,
    pub enabled: bool,
    /// Names of the interlocks that did not hold.
    pub faults: Vec<String>,
    /// The mode withheld an enable the interlocks would have granted.
    pub withheld_by_mode: bool,
}

/// Enable verdicts for every subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnableDecision {
    pub base: SubsystemEnable,
    pub torso: SubsystemEnable,
}

impl EnableDecision {
    pub fn get(&self, subsystem: Subsystem) -> &SubsystemEnable {
        match subsystem {
            Subsystem::Base => &self.base,
            Subsystem::Torso => &self.torso,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// EnableGate
// ────────────────────────────────────────────────────────────────────────────

/// Rule engine that turns an [`InputRecord`] into enable flags.
///
/// # Example
///
/// ```
/// use flexigate_codec::InputRecord;
/// use flexigate_kernel::EnableGate;
/// use flexigate_types::GatewayMode;
///
/// let gate = EnableGate::standard();
///
/// let ok = gate.evaluate(&InputRecord::nominal(), GatewayMode::Automatic);
/// assert!(ok.base.enabled && ok.torso.enabled);
///
/// let stopped = InputRecord { em_stop_ok: false, ..InputRecord::nominal() };
/// let decision = gate.evaluate(&stopped, GatewayMode::Automatic);
/// assert!(!decision.base.enabled);
/// assert_eq!(decision.base.faults, vec!["em_stop_ok".to_string()]);
/// ```
#[derive(Default)]
pub struct EnableGate {
    interlocks: Vec<Box<dyn Interlock>>,
}

impl EnableGate {
    /// A gate with no interlocks: every subsystem is enabled unless the mode
    /// withholds it.
    pub fn new() -> Self {
        Self::default()
    }

    /// The platform's interlock set (see the module table).
    pub fn standard() -> Self {
        let mut gate = Self::new();
        let shared: [SignalInterlock; 5] = [
            SignalInterlock {
                name: "em_stop_ok",
                signal: |i| i.em_stop_ok,
            },
            SignalInterlock {
                name: "hardware_stop_ok",
                signal: |i| i.hardware_stop_ok,
            },
            SignalInterlock {
                name: "software_stop_ok",
                signal: |i| i.software_stop_ok,
            },
            SignalInterlock {
                name: "laser_stop_ok",
                signal: |i| i.laser_stop_ok,
            },
            SignalInterlock {
                name: "connection_ok",
                signal: |i| i.connection_ok,
            },
        ];
        for interlock in shared {
            gate.add_interlock(Box::new(interlock));
        }
        for subsystem in Subsystem::ALL {
            gate.add_interlock(Box::new(EdmInterlock { subsystem }));
        }
        gate
    }

    /// Register a new [`Interlock`].  Faults are reported in insertion order.
    pub fn add_interlock(&mut self, interlock: Box<dyn Interlock>) {
        self.interlocks.push(interlock);
    }

    /// Derive the verdict for one subsystem.
    pub fn evaluate_subsystem(
        &self,
        input: &InputRecord,
        mode: GatewayMode,
        subsystem: Subsystem,
    ) -> SubsystemEnable {
        let faults: Vec<String> = self
            .interlocks
            .iter()
            .filter(|interlock| !interlock.holds(input, subsystem))
            .map(|interlock| interlock.name().to_string())
            .collect();
        let interlocks_hold = faults.is_empty();
        let permitted = mode.permits(subsystem);
        if !interlocks_hold {
            trace!(%subsystem, ?faults, "interlocks withhold enable");
        } else if !permitted {
            trace!(%subsystem, ?mode, "mode withholds enable");
        }
        SubsystemEnable {
            subsystem,
            enabled: interlocks_hold && permitted,
            faults,
            withheld_by_mode: interlocks_hold && !permitted,
        }
    }

    /// Derive the verdict for every subsystem.
    pub fn evaluate(&self, input: &InputRecord, mode: GatewayMode) -> EnableDecision {
        EnableDecision {
            base: self.evaluate_subsystem(input, mode, Subsystem::Base),
            torso: self.evaluate_subsystem(input, mode, Subsystem::Torso),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a record from six bits:
    /// em_stop, hardware_stop, software_stop, laser_stop, connection, edm_err.
    fn record_from_bits(bits: u8, subsystem: Subsystem) -> InputRecord {
        let bit = |n: u8| bits & (1 << n) != 0;
        let mut record = InputRecord::nominal();
        record.em_stop_ok = bit(0);
        record.hardware_stop_ok = bit(1);
        record.software_stop_ok = bit(2);
        record.laser_stop_ok = bit(3);
        record.connection_ok = bit(4);
        match subsystem {
            Subsystem::Base => record.edm_err_base = bit(5),
            Subsystem::Torso => record.edm_err_lift = bit(5),
        }
        record
    }

    #[test]
    fn enable_is_conjunction_over_all_input_combinations() {
        let gate = EnableGate::standard();
        for subsystem in Subsystem::ALL {
            for bits in 0u8..64 {
                let record = record_from_bits(bits, subsystem);
                let expected = record.em_stop_ok
                    && record.hardware_stop_ok
                    && record.software_stop_ok
                    && record.laser_stop_ok
                    && record.connection_ok
                    && bits & (1 << 5) == 0;
                let verdict = gate.evaluate_subsystem(&record, GatewayMode::Automatic, subsystem);
                assert_eq!(
                    verdict.enabled, expected,
                    "{subsystem} with input bits {bits:06b}"
                );
                assert_eq!(verdict.faults.is_empty(), expected);
            }
        }
    }

    #[test]
    fn em_stop_alone_disables_every_subsystem() {
        let record = InputRecord {
            em_stop_ok: false,
            ..InputRecord::nominal()
        };
        let decision = EnableGate::standard().evaluate(&record, GatewayMode::Automatic);
        assert!(!decision.base.enabled);
        assert!(!decision.torso.enabled);
        assert_eq!(decision.torso.faults, vec!["em_stop_ok".to_string()]);
    }

    #[test]
    fn edm_error_only_affects_its_subsystem() {
        let gate = EnableGate::standard();
        let lift_fault = InputRecord {
            edm_err_lift: true,
            ..InputRecord::nominal()
        };
        let decision = gate.evaluate(&lift_fault, GatewayMode::Automatic);
        assert!(decision.base.enabled);
        assert!(!decision.torso.enabled);
        assert_eq!(decision.torso.faults, vec!["edm_err_lift".to_string()]);

        // The arm's EDM flag gates neither subsystem.
        let arm_fault = InputRecord {
            edm_err_arm: true,
            ..InputRecord::nominal()
        };
        let decision = gate.evaluate(&arm_fault, GatewayMode::Automatic);
        assert!(decision.base.enabled && decision.torso.enabled);
    }

    #[test]
    fn mode_only_restricts() {
        let gate = EnableGate::standard();
        let nominal = InputRecord::nominal();

        let base_only = gate.evaluate(&nominal, GatewayMode::BaseOnly);
        assert!(base_only.base.enabled);
        assert!(!base_only.torso.enabled);
        assert!(base_only.torso.withheld_by_mode);
        assert!(base_only.torso.faults.is_empty());

        let torso_only = gate.evaluate(&nominal, GatewayMode::TorsoOnly);
        assert!(!torso_only.get(Subsystem::Base).enabled);
        assert!(torso_only.get(Subsystem::Torso).enabled);

        let disabled = gate.evaluate(&nominal, GatewayMode::Disabled);
        assert!(!disabled.base.enabled && !disabled.torso.enabled);

        // A faulted subsystem stays off regardless of mode, and the fault is
        // what gets reported.
        let faulted = InputRecord {
            edm_err_base: true,
            ..nominal
        };
        let verdict = gate.evaluate_subsystem(&faulted, GatewayMode::BaseOnly, Subsystem::Base);
        assert!(!verdict.enabled);
        assert!(!verdict.withheld_by_mode);
    }

    #[test]
    fn empty_gate_follows_mode() {
        let gate = EnableGate::new();
        let decision = gate.evaluate(&InputRecord::default(), GatewayMode::Automatic);
        assert!(decision.base.enabled && decision.torso.enabled);
    }

    #[test]
    fn faults_are_listed_in_registration_order() {
        let record = InputRecord {
            connection_ok: false,
            em_stop_ok: false,
            edm_err_base: true,
            ..InputRecord::nominal()
        };
        let verdict = EnableGate::standard().evaluate_subsystem(
            &record,
            GatewayMode::Automatic,
            Subsystem::Base,
        );
        assert_eq!(
            verdict.faults,
            vec!["em_stop_ok", "connection_ok", "edm_err_base"]
        );
    }
}
