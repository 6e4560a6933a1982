//! # Elevation Filter
//!
//! Smoothed altitude and cumulative gain/loss from noisy GPS altitudes.
//!
//! Per sample with a finite altitude:
//! 1. clamp into the plausible range
//! 2. optionally drop spikes (large vertical jump over a short horizontal run)
//! 3. running median over the last N raw values (N odd)
//! 4. exponential smoothing of the median
//! 5. horizontal gating: the sample only counts toward gain/loss once the
//!    hiker has moved far enough from the last counting sample
//! 6. leg hysteresis: a climb or descent is credited only after the smoothed
//!    signal reverses by at least S
//!
//! The same [`ElevationFilter::push`] drives live recording and batch
//! recomputation ([`ElevationFilter::replay`]), so both always agree.

use std::collections::VecDeque;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::ElevationConfig;
use crate::geo_utils::haversine_distance;
use crate::{GpsPoint, TrackPoint};

/// Current leg of the hysteresis machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Leg {
    /// No valid sample yet
    Unseeded,
    /// Direction unknown; both extremes tracked from `base`
    Flat { base: f64, high: f64, low: f64 },
    Ascending { base: f64, peak: f64 },
    Descending { base: f64, trough: f64 },
}

/// Elevation statistics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ElevationSummary {
    /// Confirmed gain plus the open leg when it already exceeds the threshold
    pub gain_m: f64,
    pub loss_m: f64,
    /// Lowest smoothed altitude seen
    pub min_altitude_m: Option<f64>,
    /// Highest smoothed altitude seen
    pub max_altitude_m: Option<f64>,
    pub last_smoothed_m: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ElevationFilter {
    config: ElevationConfig,
    window: VecDeque<f64>,
    scratch: Vec<f64>,
    smoothed: Option<f64>,
    leg: Leg,
    /// Position of the last sample that counted toward gain/loss
    anchor: Option<GpsPoint>,
    /// Last raw sample kept, for the spike predicate
    last_raw: Option<(GpsPoint, f64)>,
    gain_m: f64,
    loss_m: f64,
    min_smoothed: Option<f64>,
    max_smoothed: Option<f64>,
}

impl ElevationFilter {
    pub fn new(config: ElevationConfig) -> Self {
        let config = config.validated();
        let capacity = config.median_window;
        Self {
            config,
            window: VecDeque::with_capacity(capacity + 1),
            scratch: Vec::with_capacity(capacity + 1),
            smoothed: None,
            leg: Leg::Unseeded,
            anchor: None,
            last_raw: None,
            gain_m: 0.0,
            loss_m: 0.0,
            min_smoothed: None,
            max_smoothed: None,
        }
    }

    /// Run a fresh filter over a stored trajectory.
    ///
    /// # Example
    /// ```
    /// use trail_recorder::{ElevationConfig, ElevationFilter, TrackPoint};
    ///
    /// let points: Vec<TrackPoint> = (0..100)
    ///     .map(|i| TrackPoint::new(45.0 + i as f64 * 0.0001, 6.0, Some(1_000.0 + i as f64), i * 5_000))
    ///     .collect();
    /// let filter = ElevationFilter::replay(&points, &ElevationConfig::default());
    /// let summary = filter.summary();
    /// assert!(summary.gain_m > 94.0 && summary.gain_m <= 99.0);
    /// assert_eq!(summary.loss_m, 0.0);
    /// ```
    pub fn replay(points: &[TrackPoint], config: &ElevationConfig) -> Self {
        points.iter().fold(Self::new(config.clone()), |mut filter, p| {
            filter.push(p);
            filter
        })
    }

    pub fn config(&self) -> &ElevationConfig {
        &self.config
    }

    /// Confirmed cumulative gain. Never decreases until [`reset`](Self::reset).
    pub fn gain_m(&self) -> f64 {
        self.gain_m
    }

    /// Confirmed cumulative loss. Never decreases until [`reset`](Self::reset).
    pub fn loss_m(&self) -> f64 {
        self.loss_m
    }

    pub fn smoothed(&self) -> Option<f64> {
        self.smoothed
    }

    pub fn leg(&self) -> Leg {
        self.leg
    }

    /// Spike predicate with this filter's thresholds.
    pub fn is_spike(&self, horizontal_m: f64, vertical_jump_m: f64) -> bool {
        self.config.is_spike(horizontal_m, vertical_jump_m)
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    /// Feed one point. Returns the new smoothed altitude, or `None` when the
    /// point was ignored (no altitude, or dropped as a spike).
    pub fn push(&mut self, point: &TrackPoint) -> Option<f64> {
        let raw = point.altitude.filter(|a| a.is_finite())?;
        let altitude = raw.clamp(self.config.min_altitude_m, self.config.max_altitude_m);
        let position = point.position();

        if self.config.reject_spikes {
            if let Some((prev_position, prev_altitude)) = self.last_raw {
                let horizontal = haversine_distance(&prev_position, &position);
                if self.config.is_spike(horizontal, altitude - prev_altitude) {
                    debug!(
                        "[TrackRecorder] Altitude spike dropped: {:.1}m over {:.1}m",
                        altitude - prev_altitude,
                        horizontal
                    );
                    return None;
                }
            }
        }
        self.last_raw = Some((position, altitude));

        self.window.push_back(altitude);
        while self.window.len() > self.config.median_window {
            self.window.pop_front();
        }
        let median = self.median();

        let smoothed = match self.smoothed {
            None => median,
            Some(previous) => self.config.alpha * median + (1.0 - self.config.alpha) * previous,
        };
        self.smoothed = Some(smoothed);
        self.min_smoothed = Some(self.min_smoothed.map_or(smoothed, |m| m.min(smoothed)));
        self.max_smoothed = Some(self.max_smoothed.map_or(smoothed, |m| m.max(smoothed)));

        if self.leg == Leg::Unseeded {
            self.leg = Leg::Flat {
                base: smoothed,
                high: smoothed,
                low: smoothed,
            };
            self.anchor = Some(position);
            return Some(smoothed);
        }

        let moved = self
            .anchor
            .map_or(f64::INFINITY, |anchor| haversine_distance(&anchor, &position));
        if moved < self.config.min_horizontal_m {
            return Some(smoothed);
        }
        self.anchor = Some(position);
        self.step(smoothed);
        Some(smoothed)
    }

    fn median(&mut self) -> f64 {
        self.scratch.clear();
        self.scratch.extend(self.window.iter().copied());
        self.scratch.sort_by(|a, b| a.total_cmp(b));
        let n = self.scratch.len();
        if n % 2 == 1 {
            self.scratch[n / 2]
        } else {
            (self.scratch[n / 2 - 1] + self.scratch[n / 2]) / 2.0
        }
    }

    fn step(&mut self, s: f64) {
        let threshold = self.config.reversal_threshold_m;
        self.leg = match self.leg {
            Leg::Unseeded => Leg::Flat {
                base: s,
                high: s,
                low: s,
            },
            Leg::Flat { base, high, low } => {
                let high = high.max(s);
                let low = low.min(s);
                if high > base && high - s >= threshold {
                    self.gain_m += high - base;
                    Leg::Descending { base: s, trough: s }
                } else if low < base && s - low >= threshold {
                    self.loss_m += base - low;
                    Leg::Ascending { base: s, peak: s }
                } else {
                    Leg::Flat { base, high, low }
                }
            }
            Leg::Ascending { base, peak } => {
                if s >= peak {
                    Leg::Ascending { base, peak: s }
                } else if peak - s >= threshold {
                    self.gain_m += peak - base;
                    Leg::Descending { base: s, trough: s }
                } else {
                    Leg::Ascending { base, peak }
                }
            }
            Leg::Descending { base, trough } => {
                if s <= trough {
                    Leg::Descending { base, trough: s }
                } else if s - trough >= threshold {
                    self.loss_m += base - trough;
                    Leg::Ascending { base: s, peak: s }
                } else {
                    Leg::Descending { base, trough }
                }
            }
        };
    }

    /// Totals including the open leg once it spans at least the reversal
    /// threshold, so a finished climb counts without waiting for a reversal.
    pub fn summary(&self) -> ElevationSummary {
        let threshold = self.config.reversal_threshold_m;
        let mut gain_m = self.gain_m;
        let mut loss_m = self.loss_m;

        match self.leg {
            Leg::Unseeded => {}
            Leg::Flat { base, high, low } => {
                let up = high - base;
                let down = base - low;
                if up.max(down) >= threshold {
                    if up >= down {
                        gain_m += up;
                    } else {
                        loss_m += down;
                    }
                }
            }
            Leg::Ascending { base, peak } => {
                if peak - base >= threshold {
                    gain_m += peak - base;
                }
            }
            Leg::Descending { base, trough } => {
                if base - trough >= threshold {
                    loss_m += base - trough;
                }
            }
        }

        ElevationSummary {
            gain_m,
            loss_m,
            min_altitude_m: self.min_smoothed,
            max_altitude_m: self.max_smoothed,
            last_smoothed_m: self.smoothed,
        }
    }
}

impl Default for ElevationFilter {
    fn default() -> Self {
        Self::new(ElevationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::offset_meters;

    fn origin() -> GpsPoint {
        GpsPoint::new(45.9, 6.9)
    }

    /// Points 5 m apart heading north with the given altitudes.
    fn walk(altitudes: &[f64]) -> Vec<TrackPoint> {
        altitudes
            .iter()
            .enumerate()
            .map(|(i, &alt)| {
                let p = offset_meters(&origin(), 0.0, i as f64 * 5.0);
                TrackPoint::new(p.latitude, p.longitude, Some(alt), i as i64 * 4_000)
            })
            .collect()
    }

    fn flat_config() -> ElevationConfig {
        // Median of one sample and no smoothing lag, to exercise the legs directly
        ElevationConfig {
            median_window: 3,
            alpha: 0.9,
            ..ElevationConfig::default()
        }
    }

    #[test]
    fn test_first_sample_seeds_flat_leg() {
        let mut filter = ElevationFilter::default();
        let points = walk(&[1_200.0]);
        assert_eq!(filter.push(&points[0]), Some(1_200.0));
        assert_eq!(
            filter.leg(),
            Leg::Flat {
                base: 1_200.0,
                high: 1_200.0,
                low: 1_200.0
            }
        );
    }

    #[test]
    fn test_missing_and_nan_altitudes_ignored() {
        let mut filter = ElevationFilter::default();
        let mut p = walk(&[1_000.0])[0];
        p.altitude = None;
        assert!(filter.push(&p).is_none());
        p.altitude = Some(f64::NAN);
        assert!(filter.push(&p).is_none());
        assert_eq!(filter.leg(), Leg::Unseeded);
        assert!(filter.smoothed().is_none());
    }

    #[test]
    fn test_altitude_clamped() {
        let mut filter = ElevationFilter::default();
        let points = walk(&[12_000.0]);
        assert_eq!(filter.push(&points[0]), Some(9_000.0));
    }

    #[test]
    fn test_median_of_partial_even_window() {
        let mut filter = ElevationFilter::default();
        let points = walk(&[100.0, 110.0]);
        filter.push(&points[0]);
        // median(100, 110) = 105; smoothed = 0.35 * 105 + 0.65 * 100
        let s = filter.push(&points[1]).unwrap();
        assert!((s - 101.75).abs() < 1e-9);
    }

    #[test]
    fn test_oscillation_below_threshold_accumulates_nothing() {
        let altitudes: Vec<f64> = (0..300)
            .map(|i| if i % 2 == 0 { 1_501.2 } else { 1_498.8 })
            .collect();
        let filter = ElevationFilter::replay(&walk(&altitudes), &ElevationConfig::default());
        let summary = filter.summary();
        assert_eq!(summary.gain_m, 0.0);
        assert_eq!(summary.loss_m, 0.0);
    }

    #[test]
    fn test_stationary_noise_never_counts() {
        // Same position, large altitude swings: nothing passes horizontal gating
        let p = origin();
        let points: Vec<TrackPoint> = (0..50)
            .map(|i| {
                let alt = if (i / 5) % 2 == 0 { 1_000.0 } else { 1_030.0 };
                TrackPoint::new(p.latitude, p.longitude, Some(alt), i * 1_000)
            })
            .collect();
        let filter = ElevationFilter::replay(&points, &ElevationConfig::default());
        assert_eq!(filter.gain_m(), 0.0);
        assert_eq!(filter.loss_m(), 0.0);
        assert_eq!(filter.summary().gain_m, 0.0);
    }

    #[test]
    fn test_climb_then_descent_confirms_gain() {
        let mut altitudes: Vec<f64> = (0..=20).map(|i| 1_000.0 + i as f64 * 2.0).collect();
        altitudes.extend((1..=20).map(|i| 1_040.0 - i as f64 * 2.0));
        let filter = ElevationFilter::replay(&walk(&altitudes), &flat_config());

        assert!(filter.gain_m() > 35.0 && filter.gain_m() <= 40.0, "gain {}", filter.gain_m());
        assert!(matches!(filter.leg(), Leg::Descending { .. }));
        let summary = filter.summary();
        assert!(summary.loss_m > 30.0, "loss {}", summary.loss_m);
    }

    #[test]
    fn test_initial_descent_counts_as_loss() {
        let mut altitudes: Vec<f64> = (0..=20).map(|i| 2_000.0 - i as f64 * 2.0).collect();
        altitudes.extend((1..=10).map(|i| 1_960.0 + i as f64 * 2.0));
        let filter = ElevationFilter::replay(&walk(&altitudes), &flat_config());

        assert!(filter.loss_m() > 35.0 && filter.loss_m() <= 40.0, "loss {}", filter.loss_m());
        assert!(matches!(filter.leg(), Leg::Ascending { .. }));
    }

    #[test]
    fn test_totals_monotone_while_streaming() {
        let altitudes: Vec<f64> = (0..400)
            .map(|i| 1_000.0 + 40.0 * (i as f64 / 25.0).sin())
            .collect();
        let mut filter = ElevationFilter::default();
        let (mut gain, mut loss) = (0.0, 0.0);
        for p in walk(&altitudes) {
            filter.push(&p);
            assert!(filter.gain_m() >= gain);
            assert!(filter.loss_m() >= loss);
            gain = filter.gain_m();
            loss = filter.loss_m();
        }
        assert!(gain > 100.0);
        assert!(loss > 100.0);
    }

    #[test]
    fn test_spike_rejection_optional() {
        let mut altitudes = vec![1_000.0; 10];
        altitudes[5] = 1_080.0;
        let mut points = walk(&altitudes);
        // Spike sample sits 1 m from its predecessor
        let near = offset_meters(&points[4].position(), 0.0, 1.0);
        points[5].latitude = near.latitude;
        points[5].longitude = near.longitude;

        let config = ElevationConfig {
            reject_spikes: true,
            ..ElevationConfig::default()
        };
        let mut filter = ElevationFilter::new(config);
        let kept: Vec<bool> = points.iter().map(|p| filter.push(p).is_some()).collect();
        assert!(!kept[5]);
        let max = filter.summary().max_altitude_m.unwrap();
        assert!((max - 1_000.0).abs() < 1e-6);

        // Without rejection the median absorbs it instead
        let filter = ElevationFilter::replay(&points, &ElevationConfig::default());
        let max = filter.summary().max_altitude_m.unwrap();
        assert!((max - 1_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_reset_returns_to_cold_state() {
        let mut filter = ElevationFilter::replay(
            &walk(&(0..50).map(|i| 1_000.0 + i as f64).collect::<Vec<_>>()),
            &ElevationConfig::default(),
        );
        assert!(filter.summary().gain_m > 0.0);
        filter.reset();
        assert_eq!(filter.leg(), Leg::Unseeded);
        assert_eq!(filter.summary(), ElevationSummary::default());
    }

    #[test]
    fn test_min_max_track_smoothed_values() {
        let filter =
            ElevationFilter::replay(&walk(&[500.0, 500.0, 500.0]), &ElevationConfig::default());
        let summary = filter.summary();
        assert_eq!(summary.min_altitude_m, Some(500.0));
        assert!((summary.max_altitude_m.unwrap() - 500.0).abs() < 1e-9);
        assert!((summary.last_smoothed_m.unwrap() - 500.0).abs() < 1e-9);
    }
}
