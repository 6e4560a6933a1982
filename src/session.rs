//! # Recording Session
//!
//! [`RecordingSession`] is the state of one recording: gate, sampler,
//! elevation filter, trajectory and distance, created together at start and
//! dropped together at stop.
//!
//! [`Recorder`] wraps at most one session and talks to the host:
//! - forwards cadence requests to the positioning subsystem
//! - queues accepted points and live stats for a listener
//! - enforces strictly sequential sessions
//!
//! The process-wide [`RECORDER`] serializes fixes arriving from any thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::elevation::ElevationFilter;
use crate::error::{Result, TrackError};
use crate::gate::{Admission, GateDecision, IngestOutcome, LocationIngestGate};
use crate::geo_utils::polyline_length;
use crate::sampling::{AdaptiveSamplingController, CadenceRequest, SamplingTier};
use crate::summary::TrackSummary;
use crate::{Fix, GpsPoint, TrackPoint};

// ============================================================================
// Collaborators
// ============================================================================

/// The platform positioning subsystem.
pub trait PositioningControl: Send {
    /// Re-register for fixes with new delivery parameters.
    fn request_cadence(&self, request: &CadenceRequest) -> Result<()>;

    /// Stop delivering fixes (pause or stop).
    fn suspend(&self) -> Result<()>;
}

/// Persistence and UI consumers of the live track.
///
/// Events are delivered after the recorder that produced them is unlocked,
/// so a listener may call back into [`with_recorder`].
pub trait TrackListener: Send + Sync {
    fn on_point_accepted(&self, point: &TrackPoint, stats: &SessionStats);

    /// The session ended; live displays should clear.
    fn on_session_reset(&self);
}

// ============================================================================
// Session
// ============================================================================

/// Result of submitting one fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubmitReport {
    pub outcome: IngestOutcome,
    /// New cadence to request, when the sampling tier changed
    pub cadence: Option<CadenceRequest>,
}

impl SubmitReport {
    fn without_cadence(outcome: IngestOutcome) -> Self {
        Self {
            outcome,
            cadence: None,
        }
    }
}

/// A listener notification waiting for delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    PointAccepted {
        point: TrackPoint,
        stats: SessionStats,
    },
    SessionReset,
}

/// Deliver `events` in order.
pub fn notify(listener: &dyn TrackListener, events: &[TrackEvent]) {
    for event in events {
        match event {
            TrackEvent::PointAccepted { point, stats } => {
                listener.on_point_accepted(point, stats)
            }
            TrackEvent::SessionReset => listener.on_session_reset(),
        }
    }
}

/// Live numbers for the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct SessionStats {
    pub started_at_ms: i64,
    pub elapsed_ms: i64,
    pub point_count: u32,
    pub distance_m: f64,
    /// Confirmed gain; never decreases during a session
    pub gain_m: f64,
    pub loss_m: f64,
    pub altitude_m: Option<f64>,
    pub tier: SamplingTier,
    pub paused: bool,
}

#[derive(Debug, Clone)]
pub struct RecordingSession {
    config: TrackerConfig,
    started_at_ms: i64,
    gate: LocationIngestGate,
    sampler: AdaptiveSamplingController,
    elevation: ElevationFilter,
    track: Vec<TrackPoint>,
    distance_m: f64,
    outcomes: HashMap<IngestOutcome, u64>,
    paused: bool,
}

impl RecordingSession {
    /// Fresh session; the first fix goes through the cold-start gate.
    pub fn start(config: TrackerConfig, now_ms: i64) -> Self {
        let config = config.validated();
        Self {
            gate: LocationIngestGate::new(config.gate.clone()),
            sampler: AdaptiveSamplingController::new(config.sampling.clone(), now_ms),
            elevation: ElevationFilter::new(config.elevation.clone()),
            track: Vec::new(),
            distance_m: 0.0,
            outcomes: HashMap::new(),
            paused: false,
            started_at_ms: now_ms,
            config,
        }
    }

    /// Continue a stored trajectory.
    ///
    /// Distance and elevation are recomputed from `stored`, and the gate
    /// measures the next fix from its last point without a cold start.
    pub fn resume(config: TrackerConfig, stored: Vec<TrackPoint>, now_ms: i64) -> Self {
        let mut session = Self::start(config, now_ms);
        if let Some(last) = stored.last() {
            session.gate = LocationIngestGate::baselined_on(session.config.gate.clone(), *last);
        }
        if let Some(first) = stored.first() {
            session.started_at_ms = first.timestamp_ms;
        }

        let positions: Vec<GpsPoint> = stored.iter().map(TrackPoint::position).collect();
        session.distance_m = polyline_length(&positions);
        session.elevation = ElevationFilter::replay(&stored, &session.config.elevation);
        info!(
            "[TrackRecorder] Resumed with {} points, {:.0}m",
            stored.len(),
            session.distance_m
        );
        session.track = stored;
        session
    }

    /// Run one fix through the gate and update the session.
    pub fn submit(&mut self, fix: Fix, now_ms: i64) -> SubmitReport {
        if self.paused {
            return self.count(SubmitReport::without_cadence(IngestOutcome::Paused));
        }

        let report = match self.gate.evaluate(fix, now_ms) {
            GateDecision::Rejected(outcome) => SubmitReport::without_cadence(outcome),
            GateDecision::TooClose { fix, previous } => SubmitReport {
                outcome: IngestOutcome::RejectedTooClose,
                cadence: self.sampler.observe(&fix, Some(&previous), now_ms),
            },
            GateDecision::Admit(admission) => SubmitReport {
                outcome: IngestOutcome::Accepted,
                cadence: self.append(admission, now_ms),
            },
            GateDecision::AdmitStart(first, second) => {
                let first_cadence = self.append(first, now_ms);
                let second_cadence = self.append(second, now_ms);
                SubmitReport {
                    outcome: IngestOutcome::Accepted,
                    cadence: second_cadence.or(first_cadence),
                }
            }
        };
        debug!("[TrackRecorder] Fix -> {:?}", report.outcome);
        self.count(report)
    }

    fn append(&mut self, admission: Admission, now_ms: i64) -> Option<CadenceRequest> {
        self.track.push(admission.point);
        self.distance_m += admission.distance_m.max(0.0);
        self.elevation.push(&admission.point);
        self.sampler
            .observe(&admission.fix, admission.previous.as_ref(), now_ms)
    }

    fn count(&mut self, report: SubmitReport) -> SubmitReport {
        *self.outcomes.entry(report.outcome).or_insert(0) += 1;
        report
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume_updates(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_battery_saver(&mut self, enabled: bool, now_ms: i64) -> Option<CadenceRequest> {
        self.config.sampling.battery_saver = enabled;
        self.sampler.set_battery_saver(enabled, now_ms)
    }

    /// Cadence for the tier in force.
    pub fn current_cadence(&self) -> CadenceRequest {
        self.sampler.current_request()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn started_at_ms(&self) -> i64 {
        self.started_at_ms
    }

    pub fn track(&self) -> &[TrackPoint] {
        &self.track
    }

    pub fn last_point(&self) -> Option<&TrackPoint> {
        self.track.last()
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn elevation(&self) -> &ElevationFilter {
        &self.elevation
    }

    pub fn tier(&self) -> SamplingTier {
        self.sampler.tier()
    }

    /// How many fixes ended with `outcome`.
    pub fn outcome_count(&self, outcome: IngestOutcome) -> u64 {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    pub fn stats(&self, now_ms: i64) -> SessionStats {
        SessionStats {
            started_at_ms: self.started_at_ms,
            elapsed_ms: (now_ms - self.started_at_ms).max(0),
            point_count: self.track.len() as u32,
            distance_m: self.distance_m,
            gain_m: self.elevation.gain_m(),
            loss_m: self.elevation.loss_m(),
            altitude_m: self.elevation.smoothed(),
            tier: self.sampler.tier(),
            paused: self.paused,
        }
    }

    /// Batch statistics over the trajectory so far.
    pub fn summary(&self) -> TrackSummary {
        TrackSummary::from_points(&self.track, &self.config.elevation)
    }

    pub fn into_track(self) -> Vec<TrackPoint> {
        self.track
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// Everything a stopped session leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub struct StoppedSession {
    pub track: Vec<TrackPoint>,
    pub summary: TrackSummary,
}

/// Owns at most one session and its collaborators.
#[derive(Default)]
pub struct Recorder {
    config: TrackerConfig,
    session: Option<RecordingSession>,
    positioning: Option<Box<dyn PositioningControl>>,
    listener: Option<Arc<dyn TrackListener>>,
    pending: Vec<TrackEvent>,
}

impl Recorder {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config: config.validated(),
            ..Self::default()
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Applies to the next session.
    pub fn set_config(&mut self, config: TrackerConfig) {
        self.config = config.validated();
    }

    pub fn set_positioning(&mut self, positioning: Box<dyn PositioningControl>) {
        self.positioning = Some(positioning);
    }

    pub fn set_listener(&mut self, listener: Box<dyn TrackListener>) {
        self.listener = Some(Arc::from(listener));
    }

    /// Take queued events along with the listener they are for.
    /// Without a listener the queue is simply cleared.
    pub fn take_events(&mut self) -> Option<(Arc<dyn TrackListener>, Vec<TrackEvent>)> {
        let events = std::mem::take(&mut self.pending);
        let listener = self.listener.clone()?;
        (!events.is_empty()).then_some((listener, events))
    }

    /// Deliver queued events now. For recorders owned outside [`RECORDER`].
    pub fn flush_events(&mut self) {
        if let Some((listener, events)) = self.take_events() {
            notify(listener.as_ref(), &events);
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.session.as_ref().map_or(false, RecordingSession::is_paused)
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    /// Begin a new session.
    pub fn start(&mut self, now_ms: i64) -> Result<()> {
        self.install(RecordingSession::start(self.config.clone(), now_ms))
    }

    /// Begin a session continuing `stored`.
    pub fn resume_from(&mut self, stored: Vec<TrackPoint>, now_ms: i64) -> Result<()> {
        self.install(RecordingSession::resume(self.config.clone(), stored, now_ms))
    }

    fn install(&mut self, session: RecordingSession) -> Result<()> {
        if let Some(active) = &self.session {
            return Err(TrackError::SessionActive {
                started_at_ms: active.started_at_ms(),
            });
        }
        info!(
            "[TrackRecorder] Session started ({} stored points)",
            session.track().len()
        );
        let cadence = session.current_cadence();
        self.session = Some(session);
        self.forward_cadence(&cadence);
        Ok(())
    }

    /// End the session, discarding gate, sampler and elevation state.
    pub fn stop(&mut self) -> Result<StoppedSession> {
        let session = self.session.take().ok_or(TrackError::NoActiveSession)?;
        self.suspend_positioning();
        if self.listener.is_some() {
            self.pending.push(TrackEvent::SessionReset);
        }

        let summary = session.summary();
        info!(
            "[TrackRecorder] Session stopped: {} points, {:.0}m, +{:.0}m/-{:.0}m",
            summary.point_count, summary.distance_m, summary.elevation.gain_m, summary.elevation.loss_m
        );
        Ok(StoppedSession {
            track: session.into_track(),
            summary,
        })
    }

    pub fn pause(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(TrackError::NoActiveSession)?;
        session.pause();
        info!("[TrackRecorder] Paused");
        self.suspend_positioning();
        Ok(())
    }

    pub fn resume_updates(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(TrackError::NoActiveSession)?;
        session.resume_updates();
        let cadence = session.current_cadence();
        info!("[TrackRecorder] Resumed updates");
        self.forward_cadence(&cadence);
        Ok(())
    }

    /// Submit a fix. Without a session the outcome is `Inactive`.
    pub fn submit(&mut self, fix: Fix, now_ms: i64) -> SubmitReport {
        let Some(session) = self.session.as_mut() else {
            return SubmitReport::without_cadence(IngestOutcome::Inactive);
        };

        let before = session.track().len();
        let report = session.submit(fix, now_ms);

        if self.listener.is_some() && session.track().len() > before {
            let stats = session.stats(now_ms);
            for point in &session.track()[before..] {
                self.pending.push(TrackEvent::PointAccepted {
                    point: *point,
                    stats: stats.clone(),
                });
            }
        }
        if let Some(cadence) = report.cadence {
            self.forward_cadence(&cadence);
        }
        report
    }

    /// Change battery saver for this and future sessions.
    pub fn set_battery_saver(&mut self, enabled: bool, now_ms: i64) {
        self.config.sampling.battery_saver = enabled;
        let cadence = self
            .session
            .as_mut()
            .and_then(|session| session.set_battery_saver(enabled, now_ms));
        if let Some(cadence) = cadence {
            self.forward_cadence(&cadence);
        }
    }

    /// Latest accepted position, for off-trail polling.
    pub fn latest_position(&self) -> Option<GpsPoint> {
        self.session
            .as_ref()
            .and_then(|s| s.last_point())
            .map(TrackPoint::position)
    }

    pub fn stats(&self, now_ms: i64) -> Option<SessionStats> {
        self.session.as_ref().map(|s| s.stats(now_ms))
    }

    fn forward_cadence(&self, cadence: &CadenceRequest) {
        if let Some(positioning) = &self.positioning {
            if let Err(e) = positioning.request_cadence(cadence) {
                warn!(
                    "[TrackRecorder] Cadence request for {:?} failed: {}",
                    cadence.tier, e
                );
            }
        }
    }

    fn suspend_positioning(&self) {
        if let Some(positioning) = &self.positioning {
            if let Err(e) = positioning.suspend() {
                warn!("[TrackRecorder] Suspending positioning failed: {}", e);
            }
        }
    }
}

// ============================================================================
// Global Singleton
// ============================================================================

/// Global recorder instance.
pub static RECORDER: Lazy<Mutex<Recorder>> = Lazy::new(|| Mutex::new(Recorder::default()));

/// Run `f` with the global recorder locked, then deliver any listener
/// events it produced once the lock is released.
pub fn with_recorder<F, R>(f: F) -> R
where
    F: FnOnce(&mut Recorder) -> R,
{
    let (result, pending) = {
        let mut recorder = RECORDER.lock().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut recorder);
        (result, recorder.take_events())
    };
    if let Some((listener, events)) = pending {
        notify(listener.as_ref(), &events);
    }
    result
}
