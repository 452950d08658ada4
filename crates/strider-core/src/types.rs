//! Value types shared across the pipeline: gait events, phase timing,
//! contact configurations and transcription schemes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{InfeasibleProblemError, MalformedTimingError};

/// Number of contact phases in one gait cycle.
pub const GAIT_PHASES: usize = 4;

// ---------------------------------------------------------------------------
// Contact configuration
// ---------------------------------------------------------------------------

/// A point of the foot that can carry ground-reaction load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContactPoint {
    Heel,
    Toe,
}

impl ContactPoint {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Heel => "heel",
            Self::Toe => "toe",
        }
    }
}

/// Ground-contact configuration of the foot during one gait phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactConfiguration {
    /// Heel strike until the forefoot lands.
    Heel,
    /// Heel and forefoot both loaded.
    FlatFoot,
    /// Heel off, forefoot loaded until toe-off.
    Forefoot,
    /// No ground contact.
    Swing,
}

impl ContactConfiguration {
    /// The four gait phases in cycle order.
    pub const GAIT_CYCLE: [Self; GAIT_PHASES] =
        [Self::Heel, Self::FlatFoot, Self::Forefoot, Self::Swing];

    /// Contact points carrying load in this configuration.
    pub const fn active_points(self) -> &'static [ContactPoint] {
        match self {
            Self::Heel => &[ContactPoint::Heel],
            Self::FlatFoot => &[ContactPoint::Heel, ContactPoint::Toe],
            Self::Forefoot => &[ContactPoint::Toe],
            Self::Swing => &[],
        }
    }

    pub fn is_active(self, point: ContactPoint) -> bool {
        self.active_points().contains(&point)
    }

    pub const fn has_contact(self) -> bool {
        !matches!(self, Self::Swing)
    }

    /// Points loaded in `self` that are no longer loaded in `next`.
    pub fn lost_points(self, next: Self) -> Vec<ContactPoint> {
        self.active_points()
            .iter()
            .copied()
            .filter(|p| !next.is_active(*p))
            .collect()
    }

    /// Points not loaded in `self` that become loaded in `next`.
    pub fn gained_points(self, next: Self) -> Vec<ContactPoint> {
        next.lost_points(self)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Heel => "heel",
            Self::FlatFoot => "flat_foot",
            Self::Forefoot => "forefoot",
            Self::Swing => "swing",
        }
    }
}

impl fmt::Display for ContactConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Gait events
// ---------------------------------------------------------------------------

/// Phase-boundary times of one gait cycle, in seconds.
///
/// Five strictly increasing boundaries delimit the four contact phases:
/// heel strike, flat foot, forefoot, toe-off, and the end of the cycle
/// (next heel strike or end of recording).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaitEventTimestamps {
    pub heel_strike: f64,
    pub flat_foot: f64,
    pub forefoot: f64,
    pub toe_off: f64,
    pub cycle_end: f64,
}

impl GaitEventTimestamps {
    /// Number of boundary times (phases + 1).
    pub const BOUNDARIES: usize = GAIT_PHASES + 1;

    /// Build from an ordered boundary slice, validating count and ordering.
    pub fn from_boundaries(boundaries: &[f64]) -> Result<Self, MalformedTimingError> {
        if boundaries.len() < Self::BOUNDARIES {
            return Err(MalformedTimingError::TooFewBoundaries {
                expected: Self::BOUNDARIES,
                got: boundaries.len(),
            });
        }
        if boundaries.len() > Self::BOUNDARIES {
            return Err(MalformedTimingError::TooManyBoundaries {
                expected: Self::BOUNDARIES,
                got: boundaries.len(),
            });
        }
        validate_boundaries(boundaries)?;
        Ok(Self {
            heel_strike: boundaries[0],
            flat_foot: boundaries[1],
            forefoot: boundaries[2],
            toe_off: boundaries[3],
            cycle_end: boundaries[4],
        })
    }

    pub const fn boundaries(&self) -> [f64; Self::BOUNDARIES] {
        [
            self.heel_strike,
            self.flat_foot,
            self.forefoot,
            self.toe_off,
            self.cycle_end,
        ]
    }

    pub fn cycle_duration(&self) -> f64 {
        self.cycle_end - self.heel_strike
    }
}

/// Check that every boundary is finite and strictly greater than the previous one.
pub fn validate_boundaries(boundaries: &[f64]) -> Result<(), MalformedTimingError> {
    for (index, b) in boundaries.iter().enumerate() {
        if !b.is_finite() {
            return Err(MalformedTimingError::NonFiniteBoundary { index });
        }
    }
    for (index, pair) in boundaries.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(MalformedTimingError::NotStrictlyIncreasing {
                index: index + 1,
                previous: pair[0],
                next: pair[1],
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Phase timing
// ---------------------------------------------------------------------------

/// Timing of a single phase.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    /// Absolute start time (s).
    pub start: f64,
    /// Phase duration (s), always > 0.
    pub duration: f64,
    /// Number of control intervals, always >= 1.
    pub shooting_nodes: usize,
}

impl PhaseTiming {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Length of one control interval.
    #[allow(clippy::cast_precision_loss)]
    pub fn interval(&self) -> f64 {
        self.duration / self.shooting_nodes as f64
    }

    /// Number of interpolation nodes (`shooting_nodes + 1`).
    pub const fn node_count(&self) -> usize {
        self.shooting_nodes + 1
    }

    /// Evenly spaced node times covering `[start, end]`.
    #[allow(clippy::cast_precision_loss)]
    pub fn node_times(&self) -> Vec<f64> {
        let n = self.shooting_nodes;
        (0..=n)
            .map(|k| {
                if k == n {
                    self.end()
                } else {
                    self.start + self.duration * (k as f64) / (n as f64)
                }
            })
            .collect()
    }
}

/// Ordered per-phase durations and shooting-node counts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimingPlan {
    phases: Vec<PhaseTiming>,
}

impl PhaseTimingPlan {
    pub const fn new(phases: Vec<PhaseTiming>) -> Self {
        Self { phases }
    }

    pub fn phases(&self) -> &[PhaseTiming] {
        &self.phases
    }

    pub fn phase(&self, index: usize) -> Option<&PhaseTiming> {
        self.phases.get(index)
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn durations(&self) -> Vec<f64> {
        self.phases.iter().map(|p| p.duration).collect()
    }

    pub fn shooting_nodes(&self) -> Vec<usize> {
        self.phases.iter().map(|p| p.shooting_nodes).collect()
    }

    pub fn total_duration(&self) -> f64 {
        self.phases.iter().map(|p| p.duration).sum()
    }

    pub fn total_shooting_nodes(&self) -> usize {
        self.phases.iter().map(|p| p.shooting_nodes).sum()
    }
}

// ---------------------------------------------------------------------------
// Transcription scheme
// ---------------------------------------------------------------------------

/// How continuous dynamics become discrete NLP constraints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptionScheme {
    /// Explicit fixed-step RK4, `steps` substeps per control interval.
    Rk4 { steps: usize },
    /// Implicit Legendre-Gauss collocation with `degree` interior points per interval.
    Collocation { degree: usize },
}

impl TranscriptionScheme {
    /// Highest supported collocation degree.
    pub const MAX_COLLOCATION_DEGREE: usize = 9;

    pub const fn rk4() -> Self {
        Self::Rk4 { steps: 5 }
    }

    pub const fn collocation() -> Self {
        Self::Collocation { degree: 4 }
    }

    pub fn validate(&self) -> Result<(), InfeasibleProblemError> {
        match *self {
            Self::Rk4 { steps } if steps == 0 => Err(InfeasibleProblemError::InvalidScheme(
                "RK4 needs at least one substep".into(),
            )),
            Self::Collocation { degree }
                if degree == 0 || degree > Self::MAX_COLLOCATION_DEGREE =>
            {
                Err(InfeasibleProblemError::InvalidScheme(format!(
                    "collocation degree {degree} outside 1..={}",
                    Self::MAX_COLLOCATION_DEGREE
                )))
            }
            _ => Ok(()),
        }
    }

    /// Stable identifier used in reports and error tags.
    pub fn identifier(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TranscriptionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rk4 { steps } => write!(f, "RK4({steps})"),
            Self::Collocation { degree } => write!(f, "COLLOCATION(legendre, {degree})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_transitions_over_gait_cycle() {
        let [heel, flat, fore, swing] = ContactConfiguration::GAIT_CYCLE;
        assert_eq!(heel.gained_points(flat), vec![ContactPoint::Toe]);
        assert!(heel.lost_points(flat).is_empty());
        assert_eq!(flat.lost_points(fore), vec![ContactPoint::Heel]);
        assert_eq!(fore.lost_points(swing), vec![ContactPoint::Toe]);
        assert!(!swing.has_contact());
        assert!(swing.active_points().is_empty());
    }

    #[test]
    fn events_from_boundaries() {
        let ev = GaitEventTimestamps::from_boundaries(&[0.0, 0.2, 0.5, 0.8, 1.0]).unwrap();
        assert!((ev.forefoot - 0.5).abs() < f64::EPSILON);
        assert!((ev.cycle_duration() - 1.0).abs() < 1e-12);
        assert_eq!(ev.boundaries(), [0.0, 0.2, 0.5, 0.8, 1.0]);
    }

    #[test]
    fn events_reject_too_few() {
        let err = GaitEventTimestamps::from_boundaries(&[0.0, 0.2, 0.5]).unwrap_err();
        assert_eq!(
            err,
            MalformedTimingError::TooFewBoundaries {
                expected: 5,
                got: 3
            }
        );
    }

    #[test]
    fn events_reject_non_increasing() {
        let err = GaitEventTimestamps::from_boundaries(&[0.0, 0.2, 0.2, 0.8, 1.0]).unwrap_err();
        assert!(matches!(
            err,
            MalformedTimingError::NotStrictlyIncreasing { index: 2, .. }
        ));
    }

    #[test]
    fn events_reject_nan() {
        let err =
            GaitEventTimestamps::from_boundaries(&[0.0, f64::NAN, 0.5, 0.8, 1.0]).unwrap_err();
        assert_eq!(err, MalformedTimingError::NonFiniteBoundary { index: 1 });
    }

    #[test]
    fn node_times_hit_both_ends() {
        let phase = PhaseTiming {
            start: 0.2,
            duration: 0.3,
            shooting_nodes: 30,
        };
        let times = phase.node_times();
        assert_eq!(times.len(), 31);
        assert!((times[0] - 0.2).abs() < f64::EPSILON);
        assert!((times[30] - 0.5).abs() < 1e-12);
        assert!((phase.interval() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn scheme_identifiers() {
        assert_eq!(TranscriptionScheme::rk4().identifier(), "RK4(5)");
        assert_eq!(
            TranscriptionScheme::collocation().identifier(),
            "COLLOCATION(legendre, 4)"
        );
    }

    #[test]
    fn scheme_validation() {
        assert!(TranscriptionScheme::Rk4 { steps: 0 }.validate().is_err());
        assert!(TranscriptionScheme::Collocation { degree: 0 }.validate().is_err());
        assert!(TranscriptionScheme::Collocation { degree: 10 }.validate().is_err());
        assert!(TranscriptionScheme::Collocation { degree: 3 }.validate().is_ok());
    }

    #[test]
    fn scheme_deserializes_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            schemes: Vec<TranscriptionScheme>,
        }
        let w: Wrapper = toml::from_str(
            r#"schemes = [{ kind = "rk4", steps = 3 }, { kind = "collocation", degree = 2 }]"#,
        )
        .unwrap();
        assert_eq!(
            w.schemes,
            vec![
                TranscriptionScheme::Rk4 { steps: 3 },
                TranscriptionScheme::Collocation { degree: 2 }
            ]
        );
    }
}
