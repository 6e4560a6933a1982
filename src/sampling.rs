//! # Adaptive Sampling
//!
//! Classifies movement into a tier and asks the positioning subsystem for a
//! matching delivery cadence.
//!
//! - Moving (speed at or above the active threshold, or a step of at least the
//!   Slow tier's distance): Active
//! - Not moving for longer than the idle window: Idle
//! - Otherwise: Slow
//!
//! With battery saver off the controller pins the Active tier.

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::{SamplingConfig, TierCadence};
use crate::geo_utils::haversine_distance;
use crate::{Fix, TrackPoint};

/// Sampling cadence regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum SamplingTier {
    Active,
    Slow,
    Idle,
}

/// Delivery parameters for the positioning subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct CadenceRequest {
    pub tier: SamplingTier,
    pub min_time_ms: u64,
    pub min_distance_m: f64,
}

#[derive(Debug, Clone)]
pub struct AdaptiveSamplingController {
    config: SamplingConfig,
    tier: SamplingTier,
    last_move_ms: i64,
}

impl AdaptiveSamplingController {
    /// Start in the Active tier, treating `now_ms` as the last movement.
    pub fn new(config: SamplingConfig, now_ms: i64) -> Self {
        Self {
            config,
            tier: SamplingTier::Active,
            last_move_ms: now_ms,
        }
    }

    pub fn tier(&self) -> SamplingTier {
        self.tier
    }

    pub fn battery_saver(&self) -> bool {
        self.config.battery_saver
    }

    pub fn last_move_ms(&self) -> i64 {
        self.last_move_ms
    }

    pub fn cadence(&self, tier: SamplingTier) -> TierCadence {
        match tier {
            SamplingTier::Active => self.config.active,
            SamplingTier::Slow => self.config.slow,
            SamplingTier::Idle => self.config.idle,
        }
    }

    /// Request for the tier currently in force.
    pub fn current_request(&self) -> CadenceRequest {
        self.request_for(self.tier)
    }

    fn request_for(&self, tier: SamplingTier) -> CadenceRequest {
        let cadence = self.cadence(tier);
        CadenceRequest {
            tier,
            min_time_ms: cadence.min_time_ms,
            min_distance_m: cadence.min_distance_m,
        }
    }

    /// Observe a gate-visible fix. Returns a request when the tier changes.
    ///
    /// `previous` is the point the gate measured the fix against, if any.
    pub fn observe(
        &mut self,
        fix: &Fix,
        previous: Option<&TrackPoint>,
        now_ms: i64,
    ) -> Option<CadenceRequest> {
        let moved_m = previous
            .map(|prev| haversine_distance(&prev.position(), &fix.position()))
            .unwrap_or(0.0);
        let speed = match (fix.speed.filter(|s| s.is_finite()), previous) {
            (Some(speed), _) => speed,
            (None, Some(prev)) => {
                let dt_s = (fix.timestamp_ms - prev.timestamp_ms).max(1) as f64 / 1000.0;
                moved_m / dt_s
            }
            (None, None) => 0.0,
        };

        let moving =
            speed >= self.config.active_speed_mps || moved_m >= self.config.slow.min_distance_m;
        if moving {
            self.last_move_ms = now_ms;
        }
        if !self.config.battery_saver {
            return self.switch_to(SamplingTier::Active);
        }

        let target = if moving {
            SamplingTier::Active
        } else if now_ms - self.last_move_ms > self.config.idle_window_ms {
            SamplingTier::Idle
        } else {
            SamplingTier::Slow
        };
        self.switch_to(target)
    }

    /// Toggle battery saver. Turning it off forces Active; turning it on
    /// drops to Idle right away if nothing moved within the idle window.
    pub fn set_battery_saver(&mut self, enabled: bool, now_ms: i64) -> Option<CadenceRequest> {
        self.config.battery_saver = enabled;
        if !enabled {
            return self.switch_to(SamplingTier::Active);
        }
        if now_ms - self.last_move_ms > self.config.idle_window_ms {
            self.switch_to(SamplingTier::Idle)
        } else {
            None
        }
    }

    fn switch_to(&mut self, target: SamplingTier) -> Option<CadenceRequest> {
        if target == self.tier {
            return None;
        }
        info!("[TrackRecorder] Sampling tier {:?} -> {:?}", self.tier, target);
        self.tier = target;
        Some(self.request_for(target))
    }
}
