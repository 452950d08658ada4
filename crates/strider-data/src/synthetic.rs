//! Synthetic gait trials for benchmarking without lab recordings.
//!
//! The foot follows a rigid-contact stance (rolling over the heel, flat,
//! then rolling over the toe) and a smooth swing back to the next heel
//! strike; the pelvis walks at constant speed and the hip, knee and ankle
//! angles come from planar inverse kinematics. Markers come from the
//! planar leg's forward kinematics; the force plate sees a single stance
//! with a centre of pressure rolling from heel to toe so that event
//! detection recovers the configured boundaries.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector, Vector2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use strider_core::{
    ConfigError, ContactConfiguration, EventDetectionConfig, GaitEventTimestamps, StriderError,
};
use strider_model::{LegParameters, PhaseModel, PlanarLegModel};

use crate::dataset::{ExperimentalDataset, RawSignals};
use crate::series::TimeSeries;

/// Half-width of the central difference that gives joint velocities (s).
const VELOCITY_STEP: f64 = 1e-6;

#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticGaitConfig {
    /// Boundaries of the simulated stride; `cycle_end` is the recording length.
    pub events: GaitEventTimestamps,
    pub kinematics_rate_hz: f64,
    pub force_rate_hz: f64,
    /// Forward walking speed (m/s).
    pub speed: f64,
    pub pelvis_height: f64,
    /// Vertical pelvis oscillation amplitude (m).
    pub pelvis_bounce: f64,
    /// Pelvis pitch amplitude (rad).
    pub pelvis_pitch: f64,
    /// Foot angle at heel strike, toe up (rad).
    pub heel_strike_foot_angle: f64,
    /// Foot angle at toe-off, heel up (rad, negative).
    pub toe_off_foot_angle: f64,
    /// Extra ankle lift at mid-swing (m).
    pub swing_clearance: f64,
    pub marker_noise_std: f64,
    pub force_noise_std: f64,
    /// Global x of the heel at heel strike.
    pub cop_origin: f64,
    pub seed: u64,
    pub leg: LegParameters,
    pub detection: EventDetectionConfig,
}

impl Default for SyntheticGaitConfig {
    fn default() -> Self {
        Self {
            events: GaitEventTimestamps {
                heel_strike: 0.0,
                flat_foot: 0.1,
                forefoot: 0.35,
                toe_off: 0.6,
                cycle_end: 1.0,
            },
            kinematics_rate_hz: 100.0,
            force_rate_hz: 1000.0,
            speed: 1.0,
            pelvis_height: 0.86,
            pelvis_bounce: 0.015,
            pelvis_pitch: 0.05,
            heel_strike_foot_angle: 0.25,
            toe_off_foot_angle: -0.6,
            swing_clearance: 0.05,
            marker_noise_std: 0.002,
            force_noise_std: 2.0,
            cop_origin: 0.3,
            seed: 42,
            leg: LegParameters::default(),
            detection: EventDetectionConfig::default(),
        }
    }
}

/// `3s^2 - 2s^3` on `s` clamped to `[0, 1]`; zero slope at both ends.
fn smoothstep(s: f64) -> f64 {
    let s = s.clamp(0.0, 1.0);
    s * s * (3.0 - 2.0 * s)
}

fn rotate(v: Vector2<f64>, angle: f64) -> Vector2<f64> {
    let (s, c) = angle.sin_cos();
    Vector2::new(c * v.x - s * v.y, s * v.x + c * v.y)
}

impl SyntheticGaitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        GaitEventTimestamps::from_boundaries(&self.events.boundaries())
            .map_err(|e| ConfigError::invalid("events", e.to_string()))?;
        if self.events.heel_strike < 0.0 {
            return Err(ConfigError::invalid("events", "heel strike must be >= 0"));
        }
        for (field, rate) in [
            ("kinematics_rate_hz", self.kinematics_rate_hz),
            ("force_rate_hz", self.force_rate_hz),
        ] {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(ConfigError::invalid(field, "must be finite and > 0"));
            }
        }
        for (field, value) in [
            ("marker_noise_std", self.marker_noise_std),
            ("force_noise_std", self.force_noise_std),
            ("swing_clearance", self.swing_clearance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(field, "must be finite and >= 0"));
            }
        }
        for (field, value) in [
            ("speed", self.speed),
            ("pelvis_height", self.pelvis_height),
            ("pelvis_bounce", self.pelvis_bounce),
            ("pelvis_pitch", self.pelvis_pitch),
            ("heel_strike_foot_angle", self.heel_strike_foot_angle),
            ("toe_off_foot_angle", self.toe_off_foot_angle),
            ("cop_origin", self.cop_origin),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::invalid(field, "must be finite"));
            }
        }
        self.detection.validate()
    }

    fn omega(&self) -> f64 {
        2.0 * PI / self.events.cycle_duration()
    }

    fn heel_vector(&self) -> Vector2<f64> {
        Vector2::new(-self.leg.heel_offset, -self.leg.ankle_height)
    }

    fn toe_vector(&self) -> Vector2<f64> {
        Vector2::new(self.leg.toe_offset, -self.leg.ankle_height)
    }

    /// Planar ankle position and foot angle at `t`.
    ///
    /// During stance the pivot (heel, whole sole, then toe) stays fixed on
    /// the ground; the swing blends back to the next heel-strike pose one
    /// stride ahead.
    fn foot_pose(&self, t: f64) -> (Vector2<f64>, f64) {
        let e = &self.events;
        let heel = Vector2::new(self.cop_origin, 0.0);
        let toe = heel + Vector2::new(self.leg.heel_offset + self.leg.toe_offset, 0.0);
        if t <= e.flat_foot {
            let s = smoothstep((t - e.heel_strike) / (e.flat_foot - e.heel_strike));
            let angle = self.heel_strike_foot_angle * (1.0 - s);
            return (heel - rotate(self.heel_vector(), angle), angle);
        }
        if t <= e.forefoot {
            return (heel - self.heel_vector(), 0.0);
        }
        if t <= e.toe_off {
            let s = smoothstep((t - e.forefoot) / (e.toe_off - e.forefoot));
            let angle = self.toe_off_foot_angle * s;
            return (toe - rotate(self.toe_vector(), angle), angle);
        }
        let s = ((t - e.toe_off) / (e.cycle_end - e.toe_off)).clamp(0.0, 1.0);
        let blend = smoothstep(s);
        let (lift_ankle, lift_angle) = self.foot_pose(e.toe_off);
        let (strike_ankle, strike_angle) = self.foot_pose(e.heel_strike);
        let strike_ankle = strike_ankle + Vector2::new(self.speed * e.cycle_duration(), 0.0);
        let lift = self.swing_clearance * (PI * s).sin().powi(2);
        (
            lift_ankle + (strike_ankle - lift_ankle) * blend + Vector2::new(0.0, lift),
            lift_angle + (strike_angle - lift_angle) * blend,
        )
    }

    /// Generalized coordinates at `t`, or `None` when the ankle is out of
    /// the leg's reach.
    pub fn pose(&self, t: f64) -> Option<DVector<f64>> {
        let e = &self.events;
        let w = self.omega();
        let tau = t - e.heel_strike;
        // The hip passes over the ankle in the middle of flat foot.
        let mid_stance = 0.5 * (e.flat_foot + e.forefoot) - e.heel_strike;
        let x0 = self.cop_origin + self.leg.heel_offset - self.speed * mid_stance;
        let hip = Vector2::new(
            x0 + self.speed * tau,
            self.pelvis_height + self.pelvis_bounce * (2.0 * w * tau).cos(),
        );
        let pitch = self.pelvis_pitch * (w * tau).sin();

        let (ankle, foot_angle) = self.foot_pose(t);
        let (l1, l2) = (self.leg.thigh_length, self.leg.shank_length);
        let d = ankle - hip;
        let r = d.norm();
        if r >= l1 + l2 || r <= (l1 - l2).abs() {
            return None;
        }
        // Segment angles are measured from straight down, positive forwards.
        let reach = d.x.atan2(-d.y);
        let at_hip = ((l1 * l1 + r * r - l2 * l2) / (2.0 * l1 * r)).acos();
        let at_ankle = ((l2 * l2 + r * r - l1 * l1) / (2.0 * l2 * r)).acos();
        let thigh = reach + at_hip;
        let shank = reach - at_ankle;
        Some(DVector::from_vec(vec![
            hip.x,
            hip.y,
            pitch,
            thigh - pitch,
            shank - thigh,
            foot_angle - shank,
        ]))
    }

    /// Joint positions and velocities at `t`.
    pub fn kinematics(&self, t: f64) -> Option<(DVector<f64>, DVector<f64>)> {
        let q = self.pose(t)?;
        let ahead = self.pose(t + VELOCITY_STEP)?;
        let behind = self.pose(t - VELOCITY_STEP)?;
        Some((q, (ahead - behind) / (2.0 * VELOCITY_STEP)))
    }

    /// Fraction of heel-to-toe rollover at stance time `t`.
    ///
    /// Piecewise linear through the detection fractions at the flat-foot
    /// and forefoot events, reaching 1 on the last stance sample.
    fn rollover(&self, t: f64, last_stance: f64) -> f64 {
        let e = &self.events;
        let knots = [
            (e.heel_strike, 0.0),
            (e.flat_foot, self.detection.flat_foot_fraction),
            (e.forefoot, self.detection.forefoot_fraction),
            (last_stance, 1.0),
        ];
        for pair in knots.windows(2) {
            let ((t0, p0), (t1, p1)) = (pair[0], pair[1]);
            if t <= t1 {
                return p0 + (p1 - p0) * ((t - t0) / (t1 - t0)).clamp(0.0, 1.0);
            }
        }
        1.0
    }

    /// Generate the trial; events are detected from the synthetic force plate.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn generate(&self) -> Result<ExperimentalDataset, StriderError> {
        self.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let marker_noise = Normal::new(0.0, self.marker_noise_std)
            .map_err(|e| ConfigError::invalid("marker_noise_std", e.to_string()))?;
        let force_noise = Normal::new(0.0, self.force_noise_std)
            .map_err(|e| ConfigError::invalid("force_noise_std", e.to_string()))?;

        let e = &self.events;
        let model = PlanarLegModel::new(ContactConfiguration::Swing, self.leg.clone());

        let sample_count = |rate: f64| ((e.cycle_end - e.heel_strike) * rate).round() as usize + 1;
        let kin_n = sample_count(self.kinematics_rate_hz);
        let mut q = DMatrix::zeros(6, kin_n);
        let mut qdot = DMatrix::zeros(6, kin_n);
        let mut markers = DMatrix::zeros(3 * model.n_markers(), kin_n);
        for i in 0..kin_n {
            let t = e.heel_strike + i as f64 / self.kinematics_rate_hz;
            let (qi, qdi) = self.kinematics(t).ok_or_else(|| {
                ConfigError::invalid("pelvis_height", format!("ankle out of reach at t = {t:.3} s"))
            })?;
            for (m, pos) in model.markers(&qi).iter().enumerate() {
                for axis in 0..3 {
                    markers[(3 * m + axis, i)] = pos[axis] + marker_noise.sample(&mut rng);
                }
            }
            q.set_column(i, &qi);
            qdot.set_column(i, &qdi);
        }

        let rate = self.force_rate_hz;
        let force_n = sample_count(rate);
        let to_index = ((e.toe_off - e.heel_strike) * rate).round() as usize;
        let last_stance = e.heel_strike + to_index.saturating_sub(1) as f64 / rate;
        let weight = self.leg.body_mass * self.leg.gravity;
        let foot_length = self.leg.heel_offset + self.leg.toe_offset;
        let mut grf = DMatrix::zeros(3, force_n);
        let mut moment = DMatrix::zeros(3, force_n);
        let mut cop = DMatrix::zeros(3, force_n);
        for i in 0..to_index.min(force_n) {
            let t = e.heel_strike + i as f64 / rate;
            let s = (t - e.heel_strike) / (e.toe_off - e.heel_strike);
            let fx = -0.15 * weight * (2.0 * PI * s).sin() + force_noise.sample(&mut rng);
            let fz = weight * (0.2 + 0.8 * (PI * s).sin()) + force_noise.sample(&mut rng);
            let cx = self.cop_origin + foot_length * self.rollover(t, last_stance);
            grf[(0, i)] = fx;
            grf[(2, i)] = fz;
            cop[(0, i)] = cx;
            // M = c x F with c = (cx, 0, 0), F = (fx, 0, fz)
            moment[(1, i)] = -cx * fz;
        }

        let signals = RawSignals {
            q: TimeSeries::uniform("q", e.heel_strike, self.kinematics_rate_hz, q)?,
            qdot: TimeSeries::uniform("qdot", e.heel_strike, self.kinematics_rate_hz, qdot)?,
            markers: TimeSeries::uniform(
                "markers",
                e.heel_strike,
                self.kinematics_rate_hz,
                markers,
            )?,
            grf: TimeSeries::uniform("grf", e.heel_strike, rate, grf)?,
            moment: TimeSeries::uniform("moment", e.heel_strike, rate, moment)?,
            cop: TimeSeries::uniform("cop", e.heel_strike, rate, cop)?,
        };
        Ok(ExperimentalDataset::with_detected_events(signals, &self.detection)?)
    }
}
