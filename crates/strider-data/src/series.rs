//! Timestamped multi-component signals with linear resampling.

use nalgebra::{DMatrix, DVector};
use strider_core::InsufficientDataError;

/// Slack allowed when checking that a signal covers a time window (s).
pub const COVERAGE_TOLERANCE: f64 = 1e-9;

/// A sampled signal: one column per timestamp, one row per component.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries {
    name: String,
    times: Vec<f64>,
    values: DMatrix<f64>,
}

impl TimeSeries {
    /// Build a series, checking that timestamps are strictly increasing and
    /// match the number of sample columns.
    pub fn new(
        name: impl Into<String>,
        times: Vec<f64>,
        values: DMatrix<f64>,
    ) -> Result<Self, InsufficientDataError> {
        let name = name.into();
        if times.is_empty() || values.nrows() == 0 {
            return Err(InsufficientDataError::EmptyChannel { channel: name });
        }
        if times.len() != values.ncols() {
            return Err(InsufficientDataError::SampleCountMismatch {
                channel: name,
                times: times.len(),
                samples: values.ncols(),
            });
        }
        if times.windows(2).any(|w| !(w[1] > w[0])) || times.iter().any(|t| !t.is_finite()) {
            return Err(InsufficientDataError::UnsortedTimestamps { channel: name });
        }
        Ok(Self {
            name,
            times,
            values,
        })
    }

    /// Build a uniformly sampled series starting at `start`.
    #[allow(clippy::cast_precision_loss)]
    pub fn uniform(
        name: impl Into<String>,
        start: f64,
        rate_hz: f64,
        values: DMatrix<f64>,
    ) -> Result<Self, InsufficientDataError> {
        let times = (0..values.ncols())
            .map(|i| start + i as f64 / rate_hz)
            .collect();
        Self::new(name, times, values)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub const fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// Number of components per sample.
    pub fn dim(&self) -> usize {
        self.values.nrows()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn start(&self) -> f64 {
        self.times[0]
    }

    pub fn end(&self) -> f64 {
        self.times[self.times.len() - 1]
    }

    /// Whether `[t0, t1]` lies inside the sampled range.
    pub fn covers(&self, t0: f64, t1: f64) -> bool {
        t0 >= self.start() - COVERAGE_TOLERANCE && t1 <= self.end() + COVERAGE_TOLERANCE
    }

    /// Linearly interpolated sample at `t`, or `None` outside the range.
    ///
    /// Exact on sample times: a query equal to a timestamp returns that
    /// column unchanged.
    pub fn sample(&self, t: f64) -> Option<DVector<f64>> {
        if !self.covers(t, t) {
            return None;
        }
        let t = t.clamp(self.start(), self.end());
        let after = self.times.partition_point(|&ti| ti <= t);
        if after == self.times.len() {
            return Some(self.values.column(after - 1).into_owned());
        }
        let before = after - 1;
        let (t0, t1) = (self.times[before], self.times[after]);
        if t == t0 {
            return Some(self.values.column(before).into_owned());
        }
        let alpha = (t - t0) / (t1 - t0);
        let v0 = self.values.column(before);
        let v1 = self.values.column(after);
        Some(v0 + (v1 - v0) * alpha)
    }

    /// Resample at each of `times`; `None` if any query falls outside.
    pub fn resample(&self, times: &[f64]) -> Option<DMatrix<f64>> {
        let mut out = DMatrix::zeros(self.dim(), times.len());
        for (k, &t) in times.iter().enumerate() {
            out.set_column(k, &self.sample(t)?);
        }
        Some(out)
    }

    /// Values of a single component across all samples.
    pub fn component(&self, row: usize) -> Vec<f64> {
        self.values.row(row).iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp() -> TimeSeries {
        // x = 2t, y = -t sampled at 10 Hz over [0, 1]
        let values = DMatrix::from_fn(2, 11, |r, c| {
            let t = f64::from(u32::try_from(c).unwrap()) / 10.0;
            if r == 0 { 2.0 * t } else { -t }
        });
        TimeSeries::uniform("ramp", 0.0, 10.0, values).unwrap()
    }

    #[test]
    fn interpolates_between_samples() {
        let s = ramp();
        let v = s.sample(0.25).unwrap();
        assert_relative_eq!(v[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(v[1], -0.25, epsilon = 1e-12);
    }

    /// `sin(7t)` and `t^3` on an uneven grid.
    fn wave() -> TimeSeries {
        let times: Vec<f64> = vec![0.0, 0.05, 0.2, 0.23, 0.5, 0.71, 0.9, 1.0];
        let values = DMatrix::from_fn(2, times.len(), |r, c| {
            let t = times[c];
            if r == 0 { (7.0 * t).sin() } else { t * t * t }
        });
        TimeSeries::new("wave", times, values).unwrap()
    }

    #[test]
    fn exact_on_sample_times() {
        let s = wave();
        for (i, &t) in s.times().iter().enumerate() {
            let v = s.sample(t).unwrap();
            assert_eq!(v, s.values().column(i).into_owned());
        }
    }

    #[test]
    fn midpoints_use_the_enclosing_samples() {
        let s = wave();
        let times = s.times().to_vec();
        for (i, pair) in times.windows(2).enumerate() {
            let v = s.sample(0.5 * (pair[0] + pair[1])).unwrap();
            for r in 0..2 {
                let expected = 0.5 * (s.values()[(r, i)] + s.values()[(r, i + 1)]);
                assert_relative_eq!(v[r], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn endpoints_and_outside() {
        let s = ramp();
        assert_relative_eq!(s.sample(1.0).unwrap()[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(s.sample(0.0).unwrap()[0], 0.0);
        assert!(s.sample(-0.01).is_none());
        assert!(s.sample(1.01).is_none());
        assert!(s.resample(&[0.5, 1.5]).is_none());
    }

    #[test]
    fn rejects_unsorted_times() {
        let err = TimeSeries::new("bad", vec![0.0, 0.2, 0.1], DMatrix::zeros(1, 3)).unwrap_err();
        assert!(matches!(err, InsufficientDataError::UnsortedTimestamps { .. }));
    }

    #[test]
    fn rejects_count_mismatch() {
        let err = TimeSeries::new("bad", vec![0.0, 0.1], DMatrix::zeros(1, 3)).unwrap_err();
        assert!(matches!(
            err,
            InsufficientDataError::SampleCountMismatch {
                times: 2,
                samples: 3,
                ..
            }
        ));
    }

    #[test]
    fn rejects_empty() {
        let err = TimeSeries::new("empty", vec![], DMatrix::zeros(3, 0)).unwrap_err();
        assert!(matches!(err, InsufficientDataError::EmptyChannel { .. }));
    }
}
