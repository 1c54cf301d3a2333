//! Memory map of the safety controller's gateway data sets.
//!
//! [`InputRecord`] mirrors the controller → gateway data set, [`OutputRecord`]
//! the gateway → controller data set.  Positions are `(byte, bit, width)`;
//! every position not listed is reserved.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::field::{self, FieldValue};
use crate::frame::{INPUT_FRAME_LEN, OUTPUT_FRAME_LEN};

// ────────────────────────────────────────────────────────────────────────────
// LaserCase
// ────────────────────────────────────────────────────────────────────────────

/// Laser field-set selector written into the 5-bit `laser_case` slot.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct LaserCase(u8);

impl LaserCase {
    /// Width of the selector slot in bits.
    pub const WIDTH: u8 = 5;
    /// Largest selectable case.
    pub const MAX: u8 = (1 << Self::WIDTH) - 1;

    /// Validate and wrap a case number.
    ///
    /// # Errors
    ///
    /// [`CodecError::LaserCaseOutOfRange`] when `value > LaserCase::MAX`.
    pub const fn new(value: u8) -> Result<Self, CodecError> {
        if value > Self::MAX {
            return Err(CodecError::LaserCaseOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// The raw case number.
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for LaserCase {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LaserCase> for u8 {
    fn from(case: LaserCase) -> Self {
        case.0
    }
}

impl fmt::Display for LaserCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "case {}", self.0)
    }
}

impl FieldValue for LaserCase {
    fn to_raw(self) -> u8 {
        self.0
    }

    fn from_raw(raw: u8) -> Self {
        Self(raw & Self::MAX)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Input data set
// ────────────────────────────────────────────────────────────────────────────

crate::frame_layout! {
    /// Decoded controller → gateway signals.
    ///
    /// `*_ok` signals are active-high health bits: `true` means nominal.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct InputRecord {
        /// Emergency-stop chain of the UR10 arm is closed.
        em_stop_ur10_ok: bool = (0, 6, 1),
        ext_permission: bool = (1, 0, 1),
        enabling_switch_pressed: bool = (1, 2, 1),
        manual_mode: bool = (1, 6, 1),
        base_active: bool = (2, 0, 1),
        lift_active: bool = (2, 1, 1),
        arm_active: bool = (2, 2, 1),
        em_can_recover: bool = (2, 3, 1),
        /// Platform emergency-stop chain is closed.
        em_stop_ok: bool = (2, 4, 1),
        hardware_stop_ok: bool = (2, 5, 1),
        laser_stop_ok: bool = (2, 6, 1),
        unlocked: bool = (2, 7, 1),
        /// The controller sees a live gateway connection.
        connection_ok: bool = (3, 0, 1),
        arm_locked: bool = (3, 1, 1),
        /// External device monitoring fault on the base contactors.
        edm_err_base: bool = (3, 2, 1),
        /// External device monitoring fault on the lift (torso) contactors.
        edm_err_lift: bool = (3, 3, 1),
        edm_err_arm: bool = (3, 4, 1),
        software_stop_ok: bool = (3, 5, 1),
        arm_in_laser: bool = (3, 6, 1),
        xtio1_input_ok: bool = (4, 0, 1),
        xtio2_input_ok: bool = (4, 1, 1),
        gateway_input_ok: bool = (5, 4, 1),
        xtio1_output_ok: bool = (6, 0, 1),
        xtio2_output_ok: bool = (6, 1, 1),
        gateway_output_ok: bool = (7, 4, 1),
        laser_front_ok: bool = (8, 4, 1),
        laser_rear_ok: bool = (9, 4, 1),
    }
}

const _: () = assert!(
    InputRecord::ENCODED_LEN <= INPUT_FRAME_LEN,
    "InputRecord does not fit into the input payload"
);
const _: () = assert!(
    field::is_disjoint(InputRecord::FIELDS),
    "InputRecord fields overlap"
);

impl InputRecord {
    /// A record with every health signal nominal and no fault latched.
    pub fn nominal() -> Self {
        Self {
            em_stop_ur10_ok: true,
            em_stop_ok: true,
            hardware_stop_ok: true,
            laser_stop_ok: true,
            software_stop_ok: true,
            connection_ok: true,
            unlocked: true,
            xtio1_input_ok: true,
            xtio2_input_ok: true,
            gateway_input_ok: true,
            xtio1_output_ok: true,
            xtio2_output_ok: true,
            gateway_output_ok: true,
            laser_front_ok: true,
            laser_rear_ok: true,
            ..Self::default()
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Output data set
// ────────────────────────────────────────────────────────────────────────────

crate::frame_layout! {
    /// Gateway → controller command signals.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct OutputRecord {
        /// Active laser field set.
        laser_case: LaserCase = (0, 0, 5),
        far_front: bool = (0, 5, 1),
        far_left: bool = (0, 6, 1),
        far_right: bool = (0, 7, 1),
        enable_base: bool = (1, 0, 1),
        enable_torso: bool = (1, 1, 1),
    }
}

const _: () = assert!(
    OutputRecord::ENCODED_LEN <= OUTPUT_FRAME_LEN,
    "OutputRecord does not fit into the output payload"
);
const _: () = assert!(
    field::is_disjoint(OutputRecord::FIELDS),
    "OutputRecord fields overlap"
);
