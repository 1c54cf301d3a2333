//! [`ZonePolicy`] – laser field-set selection from robot motion.
//!
//! The plane around the robot is divided into equal heading sectors, sector 0
//! centred straight ahead and numbered counter-clockwise.  Below the speed
//! threshold the near field set of the sector is selected; at or above it the
//! far field set is selected and the far-field indicators mark which sides of
//! the robot the motion points towards.
//!
//! | Range | `laser_case` | Far indicators |
//! |---|---|---|
//! | [`ZoneRange::Near`] | `near_case_offset + sector` | none |
//! | [`ZoneRange::Far`] | `far_case_offset + sector` | by heading |
//! | [`ZoneRange::Fallback`] | `fallback_case` | all |
//!
//! Ranges are ordered by restrictiveness, `Near < Far < Fallback`.

use flexigate_codec::{LaserCase, OutputRecord};
use flexigate_types::MotionState;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Restrictiveness class of a zone selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ZoneRange {
    Near,
    Far,
    /// Used when motion is unknown or unusable.
    Fallback,
}

/// The zone fields of one output record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneSelection {
    pub laser_case: LaserCase,
    pub far_front: bool,
    pub far_left: bool,
    pub far_right: bool,
    pub range: ZoneRange,
}

impl ZoneSelection {
    /// Write the zone fields into `record`, leaving the enable flags alone.
    pub fn apply_to(&self, record: &mut OutputRecord) {
        record.laser_case = self.laser_case;
        record.far_front = self.far_front;
        record.far_left = self.far_left;
        record.far_right = self.far_right;
    }
}

/// Tunables of the zone mapping, as loaded from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneSettings {
    /// Width of one heading sector in whole degrees; must divide 360.
    pub sector_width_deg: u16,
    /// Speed (m/s) at which the far field sets take over.
    pub speed_threshold_mps: f64,
    pub near_case_offset: u8,
    pub far_case_offset: u8,
    pub fallback_case: u8,
}

impl Default for ZoneSettings {
    fn default() -> Self {
        Self {
            sector_width_deg: 30,
            speed_threshold_mps: 0.5,
            near_case_offset: 0,
            far_case_offset: 12,
            fallback_case: LaserCase::MAX,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("Sector width {0}° does not evenly divide 360°")]
    InvalidSectorWidth(u16),

    #[error("Speed threshold {0} m/s is not a finite, non-negative speed")]
    InvalidSpeedThreshold(f64),

    #[error("{range} cases {first}..={last} exceed the largest laser case {max}", max = LaserCase::MAX)]
    CaseOutOfRange {
        range: &'static str,
        first: u16,
        last: u16,
    },

    #[error("Near cases {near_first}..={near_last} collide with far cases {far_first}..={far_last}")]
    RangesOverlap {
        near_first: u16,
        near_last: u16,
        far_first: u16,
        far_last: u16,
    },

    #[error("Fallback case {0} collides with a near or far case")]
    FallbackCollides(u8),
}

/// Validated zone mapping.
///
/// # Example
///
/// ```
/// use flexigate_kernel::zone_policy::{ZonePolicy, ZoneRange, ZoneSettings};
/// use flexigate_types::MotionState;
///
/// let policy = ZonePolicy::new(ZoneSettings::default()).unwrap();
///
/// let creeping = policy.select(&MotionState::from_twist(0.1, 0.0));
/// assert_eq!(creeping.range, ZoneRange::Near);
///
/// let cruising = policy.select(&MotionState::from_twist(1.0, 0.0));
/// assert_eq!(cruising.range, ZoneRange::Far);
/// assert!(cruising.far_front);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ZonePolicy {
    settings: ZoneSettings,
    sectors: u16,
    fallback: LaserCase,
}

impl ZonePolicy {
    /// Validate `settings`.
    ///
    /// # Errors
    ///
    /// A [`PolicyError`] when the sector width does not divide 360°, the
    /// threshold is unusable, a produced case would exceed
    /// [`LaserCase::MAX`], or two ranges share a case.
    pub fn new(settings: ZoneSettings) -> Result<Self, PolicyError> {
        let policy = Self::validate(settings);
        match &policy {
            Ok(p) => debug!(
                sectors = p.sectors,
                threshold_mps = settings.speed_threshold_mps,
                fallback = p.fallback.value(),
                "zone policy ready"
            ),
            Err(e) => warn!(error = %e, ?settings, "rejecting zone settings"),
        }
        policy
    }

    fn validate(settings: ZoneSettings) -> Result<Self, PolicyError> {
        let width = settings.sector_width_deg;
        if width == 0 || 360 % width != 0 {
            return Err(PolicyError::InvalidSectorWidth(width));
        }
        let threshold = settings.speed_threshold_mps;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(PolicyError::InvalidSpeedThreshold(threshold));
        }

        let sectors = 360 / width;
        let near = case_span("near", settings.near_case_offset, sectors)?;
        let far = case_span("far", settings.far_case_offset, sectors)?;
        if near.0 <= far.1 && far.0 <= near.1 {
            return Err(PolicyError::RangesOverlap {
                near_first: near.0,
                near_last: near.1,
                far_first: far.0,
                far_last: far.1,
            });
        }

        let fallback = LaserCase::new(settings.fallback_case).map_err(|_| {
            PolicyError::CaseOutOfRange {
                range: "fallback",
                first: u16::from(settings.fallback_case),
                last: u16::from(settings.fallback_case),
            }
        })?;
        let fb = u16::from(settings.fallback_case);
        if (near.0..=near.1).contains(&fb) || (far.0..=far.1).contains(&fb) {
            return Err(PolicyError::FallbackCollides(settings.fallback_case));
        }

        Ok(Self {
            settings,
            sectors,
            fallback,
        })
    }

    pub fn settings(&self) -> &ZoneSettings {
        &self.settings
    }

    /// Number of heading sectors.
    pub fn sectors(&self) -> u16 {
        self.sectors
    }

    /// The most restrictive selection.
    pub fn fallback(&self) -> ZoneSelection {
        ZoneSelection {
            laser_case: self.fallback,
            far_front: true,
            far_left: true,
            far_right: true,
            range: ZoneRange::Fallback,
        }
    }

    /// Select the zone for `motion`.  Non-finite motion yields
    /// [`fallback`][Self::fallback].
    pub fn select(&self, motion: &MotionState) -> ZoneSelection {
        let heading = motion.heading_deg();
        let speed = motion.speed_mps;
        if !heading.is_finite() || !speed.is_finite() {
            return self.fallback();
        }

        let heading = normalize_deg(heading);
        let sector = self.sector_of(heading);
        let half = f64::from(self.settings.sector_width_deg) / 2.0;

        let (offset, range) = if speed < self.settings.speed_threshold_mps {
            (self.settings.near_case_offset, ZoneRange::Near)
        } else {
            (self.settings.far_case_offset, ZoneRange::Far)
        };
        let case = u16::from(offset) + sector;
        let Some(laser_case) = u8::try_from(case)
            .ok()
            .and_then(|case| LaserCase::new(case).ok())
        else {
            return self.fallback();
        };

        let far = range == ZoneRange::Far;
        ZoneSelection {
            laser_case,
            far_front: far && heading.abs() <= 90.0,
            far_left: far && (half..=180.0 - half).contains(&heading),
            far_right: far && (-(180.0 - half)..=-half).contains(&heading),
            range,
        }
    }

    /// Index of the sector containing `heading` (degrees, normalised).
    pub fn sector_of(&self, heading_deg: f64) -> u16 {
        let width = f64::from(self.settings.sector_width_deg);
        let shifted = (heading_deg + width / 2.0).rem_euclid(360.0);
        // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
        ((shifted / width).floor() as u16).min(self.sectors - 1)
    }
}

/// Inclusive case span `offset..=offset + sectors - 1`, checked against the
/// selector width.
fn case_span(range: &'static str, offset: u8, sectors: u16) -> Result<(u16, u16), PolicyError> {
    let first = u16::from(offset);
    let last = first + sectors - 1;
    if last > u16::from(LaserCase::MAX) {
        return Err(PolicyError::CaseOutOfRange { range, first, last });
    }
    Ok((first, last))
}

/// Map any finite angle in degrees onto `(-180, 180]`.
fn normalize_deg(deg: f64) -> f64 {
    let wrapped = (deg + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 { wrapped + 360.0 } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::PI;

    fn policy() -> ZonePolicy {
        ZonePolicy::new(ZoneSettings::default()).unwrap()
    }

    fn heading(deg: f64, speed: f64) -> MotionState {
        MotionState {
            heading_rad: deg.to_radians(),
            speed_mps: speed,
        }
    }

    #[test]
    fn straight_ahead_slow_selects_near_case() {
        let sel = policy().select(&heading(0.0, 0.2));
        assert_eq!(sel.range, ZoneRange::Near);
        assert_eq!(sel.laser_case.value(), 0);
        assert!(!sel.far_front && !sel.far_left && !sel.far_right);
    }

    #[test]
    fn straight_ahead_fast_selects_far_case_with_front_flag() {
        let sel = policy().select(&heading(0.0, 1.2));
        assert_eq!(sel.range, ZoneRange::Far);
        assert_eq!(sel.laser_case.value(), 12);
        assert!(sel.far_front);
        assert!(!sel.far_left);
        assert!(!sel.far_right);
    }

    #[test]
    fn threshold_speed_is_far() {
        let sel = policy().select(&heading(0.0, 0.5));
        assert_eq!(sel.range, ZoneRange::Far);
    }

    #[test]
    fn far_indicators_follow_heading() {
        let p = policy();

        let left = p.select(&heading(60.0, 1.0));
        assert_eq!(left.laser_case.value(), 12 + 2);
        assert!(left.far_front && left.far_left && !left.far_right);

        let right = p.select(&heading(-60.0, 1.0));
        assert_eq!(right.laser_case.value(), 12 + 10);
        assert!(right.far_front && !right.far_left && right.far_right);

        let reverse = p.select(&heading(170.0, 1.0));
        assert_eq!(reverse.laser_case.value(), 12 + 6);
        assert!(!reverse.far_front && !reverse.far_left && !reverse.far_right);

        let rear_left = p.select(&heading(135.0, 1.0));
        assert!(!rear_left.far_front && rear_left.far_left);
    }

    #[test]
    fn sector_boundaries() {
        let p = policy();
        assert_eq!(p.sectors(), 12);
        assert_eq!(p.sector_of(14.9), 0);
        assert_eq!(p.sector_of(15.0), 1);
        assert_eq!(p.sector_of(-15.0), 0);
        assert_eq!(p.sector_of(-15.1), 11);
        assert_eq!(p.sector_of(180.0), 6);
        assert_eq!(p.sector_of(-1e-12), 0);
    }

    #[test]
    fn minus_pi_and_pi_select_the_same_zone() {
        let p = policy();
        let a = p.select(&MotionState { heading_rad: PI, speed_mps: 1.0 });
        let b = p.select(&MotionState { heading_rad: -PI, speed_mps: 1.0 });
        assert_eq!(a, b);
    }

    #[test]
    fn non_finite_motion_falls_back() {
        let p = policy();
        let sel = p.select(&MotionState {
            heading_rad: f64::NAN,
            speed_mps: 1.0,
        });
        assert_eq!(sel, p.fallback());
        assert_eq!(sel.laser_case.value(), 31);
        assert!(sel.far_front && sel.far_left && sel.far_right);
    }

    #[test]
    fn apply_to_keeps_enable_flags() {
        let mut record = OutputRecord {
            enable_base: true,
            enable_torso: true,
            ..OutputRecord::default()
        };
        policy().fallback().apply_to(&mut record);
        assert!(record.enable_base && record.enable_torso);
        assert!(record.far_front && record.far_left && record.far_right);
        assert_eq!(record.laser_case.value(), 31);
    }

    #[test]
    fn rejects_invalid_settings() {
        let bad_width = ZoneSettings {
            sector_width_deg: 7,
            ..ZoneSettings::default()
        };
        assert_eq!(
            ZonePolicy::new(bad_width),
            Err(PolicyError::InvalidSectorWidth(7))
        );

        let bad_threshold = ZoneSettings {
            speed_threshold_mps: f64::NAN,
            ..ZoneSettings::default()
        };
        assert!(matches!(
            ZonePolicy::new(bad_threshold),
            Err(PolicyError::InvalidSpeedThreshold(_))
        ));

        let overflow = ZoneSettings {
            far_case_offset: 25,
            ..ZoneSettings::default()
        };
        assert!(matches!(
            ZonePolicy::new(overflow),
            Err(PolicyError::CaseOutOfRange { range: "far", .. })
        ));

        let overlap = ZoneSettings {
            far_case_offset: 6,
            ..ZoneSettings::default()
        };
        assert!(matches!(
            ZonePolicy::new(overlap),
            Err(PolicyError::RangesOverlap { .. })
        ));

        let fallback = ZoneSettings {
            fallback_case: 20,
            ..ZoneSettings::default()
        };
        assert_eq!(
            ZonePolicy::new(fallback),
            Err(PolicyError::FallbackCollides(20))
        );
    }

    #[test]
    fn coarse_sectors_are_accepted() {
        let p = ZonePolicy::new(ZoneSettings {
            sector_width_deg: 90,
            far_case_offset: 4,
            fallback_case: 8,
            ..ZoneSettings::default()
        })
        .unwrap();
        assert_eq!(p.sectors(), 4);
        assert_eq!(p.select(&heading(-90.0, 2.0)).laser_case.value(), 4 + 3);
    }

    proptest! {
        /// For a fixed heading, going faster never selects a less
        /// restrictive range.
        #[test]
        fn faster_is_never_less_restrictive(
            heading_rad in -PI..=PI,
            a in 0.0f64..5.0,
            b in 0.0f64..5.0,
        ) {
            let p = policy();
            let (slow, fast) = if a <= b { (a, b) } else { (b, a) };
            let slow_sel = p.select(&MotionState { heading_rad, speed_mps: slow });
            let fast_sel = p.select(&MotionState { heading_rad, speed_mps: fast });
            prop_assert!(slow_sel.range <= fast_sel.range);
            prop_assert!(fast_sel.range <= p.fallback().range);
        }

        #[test]
        fn selected_case_stays_in_its_range(
            heading_rad in -PI..=PI,
            speed in 0.0f64..5.0,
        ) {
            let p = policy();
            let sel = p.select(&MotionState { heading_rad, speed_mps: speed });
            let case = sel.laser_case.value();
            match sel.range {
                ZoneRange::Near => prop_assert!(case < 12),
                ZoneRange::Far => prop_assert!((12..24).contains(&case)),
                ZoneRange::Fallback => prop_assert_eq!(case, 31),
            }
            if sel.range == ZoneRange::Near {
                prop_assert!(!sel.far_front && !sel.far_left && !sel.far_right);
            }
        }
    }
}
