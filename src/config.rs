//! Configuration for the recording core.
//!
//! The host application owns these values (settings screens, stored
//! preferences). Every struct deserializes with defaults for missing fields,
//! and `validated()` clamps whatever the host hands over into the ranges the
//! algorithms rely on.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Fix gating thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Fixes reporting a worse accuracy are dropped.
    /// Default: 50.0 meters
    pub max_accuracy_m: f64,

    /// Maximum implied speed between the two cold-start fixes.
    /// Default: 6.0 m/s
    pub max_start_speed_mps: f64,

    /// Cold-start pairs closer than this are accepted regardless of speed.
    /// Default: 50.0 meters
    pub max_start_jump_m: f64,

    /// Before the first point is accepted, older fixes are stale.
    /// Default: 20 000 ms
    pub max_first_fix_age_ms: i64,

    /// Silence longer than this re-baselines the trajectory on the next fix.
    /// Default: 120 000 ms
    pub long_gap_ms: i64,

    /// Minimum distance from the last accepted point to extend the trajectory.
    /// Default: 5.0 meters
    pub min_distance_m: f64,

    /// Accept fixes from the network provider. Default: false
    pub accept_network_fixes: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: 50.0,
            max_start_speed_mps: 6.0,
            max_start_jump_m: 50.0,
            max_first_fix_age_ms: 20_000,
            long_gap_ms: 120_000,
            min_distance_m: 5.0,
            accept_network_fixes: false,
        }
    }
}

impl GateConfig {
    /// Clamp into usable ranges.
    pub fn validated(self) -> Self {
        let d = Self::default();
        Self {
            max_accuracy_m: positive_or(self.max_accuracy_m, d.max_accuracy_m),
            max_start_speed_mps: positive_or(self.max_start_speed_mps, d.max_start_speed_mps),
            max_start_jump_m: non_negative_or(self.max_start_jump_m, d.max_start_jump_m),
            max_first_fix_age_ms: self.max_first_fix_age_ms.max(0),
            long_gap_ms: self.long_gap_ms.max(1),
            min_distance_m: non_negative_or(self.min_distance_m, d.min_distance_m),
            accept_network_fixes: self.accept_network_fixes,
        }
    }
}

/// Delivery parameters requested from the positioning subsystem for a tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierCadence {
    /// Minimum time between fixes (ms)
    pub min_time_ms: u64,
    /// Minimum displacement between fixes (meters)
    pub min_distance_m: f64,
}

impl TierCadence {
    pub const fn new(min_time_ms: u64, min_distance_m: f64) -> Self {
        Self {
            min_time_ms,
            min_distance_m,
        }
    }

    fn validated(self, fallback: TierCadence) -> Self {
        Self {
            min_time_ms: self.min_time_ms.max(1),
            min_distance_m: non_negative_or(self.min_distance_m, fallback.min_distance_m),
        }
    }
}

/// Adaptive sampling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// When false the controller always requests the Active tier.
    /// Default: true
    pub battery_saver: bool,

    /// Default: 1 000 ms / 3 m
    pub active: TierCadence,

    /// Default: 5 000 ms / 10 m
    pub slow: TierCadence,

    /// Default: 30 000 ms / 25 m
    pub idle: TierCadence,

    /// Speed at or above which the hiker counts as moving.
    /// Default: 1.0 m/s
    pub active_speed_mps: f64,

    /// Time without movement before dropping to the Idle tier.
    /// Default: 30 000 ms
    pub idle_window_ms: i64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            battery_saver: true,
            active: TierCadence::new(1_000, 3.0),
            slow: TierCadence::new(5_000, 10.0),
            idle: TierCadence::new(30_000, 25.0),
            active_speed_mps: 1.0,
            idle_window_ms: 30_000,
        }
    }
}

impl SamplingConfig {
    /// Clamp into usable ranges.
    pub fn validated(self) -> Self {
        let d = Self::default();
        Self {
            battery_saver: self.battery_saver,
            active: self.active.validated(d.active),
            slow: self.slow.validated(d.slow),
            idle: self.idle.validated(d.idle),
            active_speed_mps: non_negative_or(self.active_speed_mps, d.active_speed_mps),
            idle_window_ms: self.idle_window_ms.max(0),
        }
    }
}

/// Elevation smoothing and gain/loss accumulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationConfig {
    /// Median window size. Forced odd, at least 3.
    /// Default: 5
    pub median_window: usize,

    /// Exponential smoothing factor, clamped to 0.1..=0.9.
    /// Default: 0.35
    pub alpha: f64,

    /// Pullback/rebound required to confirm a leg (S).
    /// Default: 3.0 meters
    pub reversal_threshold_m: f64,

    /// Horizontal travel required before a sample may count toward gain/loss.
    /// Default: 1.5 meters
    pub min_horizontal_m: f64,

    /// Plausible altitude range; raw samples are clamped into it.
    /// Default: -500.0 .. 9000.0 meters
    pub min_altitude_m: f64,
    pub max_altitude_m: f64,

    /// Spike predicate: horizontal run below this...
    /// Default: 5.0 meters
    pub spike_max_horizontal_m: f64,

    /// ...with a vertical jump above this.
    /// Default: 20.0 meters
    pub spike_min_jump_m: f64,

    /// Drop raw samples matching the spike predicate. Default: false
    pub reject_spikes: bool,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            median_window: 5,
            alpha: 0.35,
            reversal_threshold_m: 3.0,
            min_horizontal_m: 1.5,
            min_altitude_m: -500.0,
            max_altitude_m: 9_000.0,
            spike_max_horizontal_m: 5.0,
            spike_min_jump_m: 20.0,
            reject_spikes: false,
        }
    }
}

impl ElevationConfig {
    /// Clamp into usable ranges (odd window, alpha in 0.1..=0.9, ...).
    pub fn validated(self) -> Self {
        let d = Self::default();
        let mut median_window = self.median_window.max(3);
        if median_window % 2 == 0 {
            median_window += 1;
        }
        let alpha = if self.alpha.is_finite() {
            self.alpha.clamp(0.1, 0.9)
        } else {
            d.alpha
        };
        let (min_altitude_m, max_altitude_m) = if self.min_altitude_m.is_finite()
            && self.max_altitude_m.is_finite()
            && self.min_altitude_m < self.max_altitude_m
        {
            (self.min_altitude_m, self.max_altitude_m)
        } else {
            (d.min_altitude_m, d.max_altitude_m)
        };

        let validated = Self {
            median_window,
            alpha,
            reversal_threshold_m: finite_or(self.reversal_threshold_m, d.reversal_threshold_m)
                .max(0.5),
            min_horizontal_m: finite_or(self.min_horizontal_m, d.min_horizontal_m).max(0.5),
            min_altitude_m,
            max_altitude_m,
            spike_max_horizontal_m: finite_or(self.spike_max_horizontal_m, d.spike_max_horizontal_m)
                .max(0.5),
            spike_min_jump_m: finite_or(self.spike_min_jump_m, d.spike_min_jump_m).max(1.0),
            reject_spikes: self.reject_spikes,
        };
        if validated != self {
            warn!(
                "[TrackRecorder] Elevation config clamped: window {} -> {}, alpha {} -> {}",
                self.median_window, validated.median_window, self.alpha, validated.alpha
            );
        }
        validated
    }

    /// Auxiliary spike predicate: a large vertical jump over a short
    /// horizontal run.
    pub fn is_spike(&self, horizontal_m: f64, vertical_jump_m: f64) -> bool {
        horizontal_m < self.spike_max_horizontal_m && vertical_jump_m.abs() > self.spike_min_jump_m
    }
}

/// Off-trail alerting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffTrailConfig {
    /// Master switch. Default: true
    pub enabled: bool,

    /// Distance from the plan beyond which the hiker is outside.
    /// Default: 40.0 meters
    pub threshold_m: f64,

    /// An excursion must last this long before it alerts.
    /// Default: 15 000 ms
    pub min_duration_ms: i64,

    /// Poll timer period. Default: 2 000 ms
    pub poll_interval_ms: u64,
}

impl Default for OffTrailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_m: 40.0,
            min_duration_ms: 15_000,
            poll_interval_ms: 2_000,
        }
    }
}

impl OffTrailConfig {
    /// Clamp into usable ranges.
    pub fn validated(self) -> Self {
        let d = Self::default();
        Self {
            enabled: self.enabled,
            threshold_m: positive_or(self.threshold_m, d.threshold_m),
            min_duration_ms: self.min_duration_ms.max(0),
            poll_interval_ms: self.poll_interval_ms.max(100),
        }
    }
}

/// All tunables of the recording core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub gate: GateConfig,
    pub sampling: SamplingConfig,
    pub elevation: ElevationConfig,
    pub off_trail: OffTrailConfig,
}

impl TrackerConfig {
    /// Parse from JSON (missing fields take defaults) and validate.
    ///
    /// # Example
    /// ```
    /// use trail_recorder::TrackerConfig;
    ///
    /// let config = TrackerConfig::from_json(r#"{"elevation": {"median_window": 4}}"#).unwrap();
    /// assert_eq!(config.elevation.median_window, 5);
    /// assert_eq!(config.gate.min_distance_m, 5.0);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        Ok(config.validated())
    }

    /// Validate every section.
    pub fn validated(self) -> Self {
        Self {
            gate: self.gate.validated(),
            sampling: self.sampling.validated(),
            elevation: self.elevation.validated(),
            off_trail: self.off_trail.validated(),
        }
    }

    /// Serialize to JSON for the host's settings store.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn positive_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

fn non_negative_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.gate.max_accuracy_m, 50.0);
        assert_eq!(config.gate.long_gap_ms, 120_000);
        assert_eq!(config.sampling.slow.min_distance_m, 10.0);
        assert_eq!(config.elevation.median_window, 5);
        assert_eq!(config.off_trail.threshold_m, 40.0);
    }

    #[test]
    fn test_median_window_forced_odd() {
        for (input, expected) in [(0, 3), (1, 3), (4, 5), (5, 5), (8, 9), (11, 11)] {
            let config = ElevationConfig {
                median_window: input,
                ..ElevationConfig::default()
            }
            .validated();
            assert_eq!(config.median_window, expected, "input {input}");
        }
    }

    #[test]
    fn test_alpha_clamped() {
        let low = ElevationConfig {
            alpha: 0.01,
            ..ElevationConfig::default()
        }
        .validated();
        let high = ElevationConfig {
            alpha: 2.0,
            ..ElevationConfig::default()
        }
        .validated();
        let nan = ElevationConfig {
            alpha: f64::NAN,
            ..ElevationConfig::default()
        }
        .validated();
        assert_eq!(low.alpha, 0.1);
        assert_eq!(high.alpha, 0.9);
        assert_eq!(nan.alpha, 0.35);
    }

    #[test]
    fn test_inverted_altitude_range_falls_back() {
        let config = ElevationConfig {
            min_altitude_m: 100.0,
            max_altitude_m: 50.0,
            ..ElevationConfig::default()
        }
        .validated();
        assert_eq!(config.min_altitude_m, -500.0);
        assert_eq!(config.max_altitude_m, 9_000.0);
    }

    #[test]
    fn test_spike_predicate() {
        let config = ElevationConfig::default();
        assert!(config.is_spike(2.0, 25.0));
        assert!(config.is_spike(2.0, -25.0));
        assert!(!config.is_spike(10.0, 25.0));
        assert!(!config.is_spike(2.0, 15.0));
    }

    #[test]
    fn test_from_json_partial() {
        let config = TrackerConfig::from_json(
            r#"{"gate": {"min_distance_m": 8.0}, "sampling": {"battery_saver": false}}"#,
        )
        .unwrap();
        assert_eq!(config.gate.min_distance_m, 8.0);
        assert_eq!(config.gate.max_accuracy_m, 50.0);
        assert!(!config.sampling.battery_saver);
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(TrackerConfig::from_json("[1, 2").is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_values() {
        let mut config = TrackerConfig::default();
        config.off_trail.threshold_m = 75.0;
        let parsed = TrackerConfig::from_json(&config.to_json()).unwrap();
        assert_eq!(parsed, config);
    }
}
