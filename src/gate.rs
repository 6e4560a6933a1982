//! # Location Ingest Gate
//!
//! Decides whether a raw fix extends the trajectory.
//!
//! Checks, in order:
//! - provider (network fixes are dropped unless configured)
//! - coordinate validity
//! - reported accuracy
//! - staleness, only before the first point is accepted
//! - cold start: the first fix waits for a second, consistent one
//! - ordering against the last accepted point
//! - long gap: the first fix after a long silence becomes a silent baseline
//! - minimum movement
//!
//! Every rejection is an expected outcome reported through [`IngestOutcome`].
//! The gate never touches trajectory storage itself; it hands admitted points
//! back to the caller, which owns the trajectory.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::GateConfig;
use crate::geo_utils::haversine_distance;
use crate::{Fix, FixSource, TrackPoint};

/// Diagnostic result of submitting one fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum IngestOutcome {
    /// Appended to the trajectory
    Accepted,
    /// First fix of the session, held until a second confirms it
    PendingStart,
    /// Cold-start pair inconsistent; the older candidate was dropped
    RejectedStartJump,
    /// Produced by a provider the session ignores
    RejectedSource,
    /// Non-finite or out-of-range coordinates
    RejectedInvalid,
    /// Reported accuracy worse than the configured maximum
    RejectedAccuracy,
    /// Too old to anchor the start of a session
    RejectedStale,
    /// Older than the last accepted point
    RejectedOutOfOrder,
    /// First fix after a long gap; became the new baseline
    RejectedGapBaseline,
    /// Too close to the last accepted point
    RejectedTooClose,
    /// Recording is paused
    Paused,
    /// No recording session
    Inactive,
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted)
    }
}

/// A point the gate lets through, with the distance it adds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Admission {
    pub fix: Fix,
    pub point: TrackPoint,
    /// Last accepted point or gap baseline, `None` for the very first point
    pub previous: Option<TrackPoint>,
    /// Distance from `previous` (meters, never negative)
    pub distance_m: f64,
}

/// What the caller should do with a fix.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Nothing to append and nothing for the sampler
    Rejected(IngestOutcome),
    /// Not appended, but still a movement signal for the sampler
    TooClose { fix: Fix, previous: TrackPoint },
    /// Append one point
    Admit(Admission),
    /// Cold start confirmed: append both points in order
    AdmitStart(Admission, Admission),
}

impl GateDecision {
    pub fn outcome(&self) -> IngestOutcome {
        match self {
            GateDecision::Rejected(outcome) => *outcome,
            GateDecision::TooClose { .. } => IngestOutcome::RejectedTooClose,
            GateDecision::Admit(_) | GateDecision::AdmitStart(..) => IngestOutcome::Accepted,
        }
    }
}

/// Fix gate for one recording session.
#[derive(Debug, Clone)]
pub struct LocationIngestGate {
    config: GateConfig,
    /// Cold-start candidate, only while nothing has been accepted
    candidate: Option<Fix>,
    /// Last accepted point or silent gap baseline
    last: Option<TrackPoint>,
}

impl LocationIngestGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            candidate: None,
            last: None,
        }
    }

    /// A gate that skips the cold-start check and measures from `point`.
    /// Used when resuming a stored trajectory.
    pub fn baselined_on(config: GateConfig, point: TrackPoint) -> Self {
        Self {
            config,
            candidate: None,
            last: Some(point),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Last accepted point (or gap baseline).
    pub fn last_point(&self) -> Option<&TrackPoint> {
        self.last.as_ref()
    }

    pub fn pending_candidate(&self) -> Option<&Fix> {
        self.candidate.as_ref()
    }

    /// Whether the cold-start gate has been passed.
    pub fn is_baselined(&self) -> bool {
        self.last.is_some()
    }

    pub fn reset(&mut self) {
        self.candidate = None;
        self.last = None;
    }

    /// Evaluate one fix. `now_ms` is the ingestion wall-clock time.
    pub fn evaluate(&mut self, fix: Fix, now_ms: i64) -> GateDecision {
        if fix.source == FixSource::Network && !self.config.accept_network_fixes {
            return GateDecision::Rejected(IngestOutcome::RejectedSource);
        }
        if !fix.position().is_valid() {
            return GateDecision::Rejected(IngestOutcome::RejectedInvalid);
        }
        if fix
            .accuracy
            .map_or(false, |accuracy| accuracy > self.config.max_accuracy_m)
        {
            debug!(
                "[TrackRecorder] Fix dropped: accuracy {:?}m > {}m",
                fix.accuracy, self.config.max_accuracy_m
            );
            return GateDecision::Rejected(IngestOutcome::RejectedAccuracy);
        }

        let mut fix = fix;
        if fix.timestamp_ms <= 0 {
            fix.timestamp_ms = now_ms;
        }

        let Some(last) = self.last else {
            if now_ms - fix.timestamp_ms > self.config.max_first_fix_age_ms {
                debug!(
                    "[TrackRecorder] Fix dropped: {}ms old before first point",
                    now_ms - fix.timestamp_ms
                );
                return GateDecision::Rejected(IngestOutcome::RejectedStale);
            }
            return self.cold_start(fix);
        };

        if fix.timestamp_ms < last.timestamp_ms {
            return GateDecision::Rejected(IngestOutcome::RejectedOutOfOrder);
        }

        let gap_ms = fix.timestamp_ms - last.timestamp_ms;
        if gap_ms > self.config.long_gap_ms {
            info!(
                "[TrackRecorder] Long gap ({}ms): fix becomes the new baseline",
                gap_ms
            );
            self.last = Some(fix.to_track_point());
            return GateDecision::Rejected(IngestOutcome::RejectedGapBaseline);
        }

        let distance_m = haversine_distance(&last.position(), &fix.position());
        if distance_m < self.config.min_distance_m {
            return GateDecision::TooClose {
                fix,
                previous: last,
            };
        }

        let point = fix.to_track_point();
        self.last = Some(point);
        GateDecision::Admit(Admission {
            fix,
            point,
            previous: Some(last),
            distance_m: distance_m.max(0.0),
        })
    }

    fn cold_start(&mut self, fix: Fix) -> GateDecision {
        let Some(candidate) = self.candidate.take() else {
            debug!("[TrackRecorder] First fix held until confirmed");
            self.candidate = Some(fix);
            return GateDecision::Rejected(IngestOutcome::PendingStart);
        };

        let distance_m = haversine_distance(&candidate.position(), &fix.position());
        let dt_s = (fix.timestamp_ms - candidate.timestamp_ms).max(1) as f64 / 1000.0;
        let speed = distance_m / dt_s;

        let consistent =
            distance_m <= self.config.max_start_jump_m || speed <= self.config.max_start_speed_mps;
        if !consistent {
            info!(
                "[TrackRecorder] Start fix rejected: {:.1}m at {:.1}m/s",
                distance_m, speed
            );
            self.candidate = Some(fix);
            return GateDecision::Rejected(IngestOutcome::RejectedStartJump);
        }

        let first = candidate.to_track_point();
        let second = fix.to_track_point();
        self.last = Some(second);
        info!(
            "[TrackRecorder] Start confirmed ({:.1}m between first fixes)",
            distance_m
        );
        GateDecision::AdmitStart(
            Admission {
                fix: candidate,
                point: first,
                previous: None,
                distance_m: 0.0,
            },
            Admission {
                fix,
                point: second,
                previous: Some(first),
                distance_m: distance_m.max(0.0),
            },
        )
    }
}
