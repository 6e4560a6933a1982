//! FFI bindings for mobile platforms (iOS/Android).
//!
//! This module provides the UniFFI bindings that expose the recorder to
//! Kotlin and Swift. The host pushes fixes in, and receives cadence changes,
//! accepted points and off-trail alerts through callback interfaces.
//! Functions that clash with the Rust API are prefixed with `ffi_`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{info, warn};
use once_cell::sync::Lazy;

use crate::error::{Result, TrackError};
use crate::off_trail::{AlertSink, OffTrailSource, OffTrailTicker, WatchContext};
use crate::session::{with_recorder, PositioningControl, SessionStats, TrackListener};
use crate::{
    init_logging, insertion_index, project_onto_path, summarize_tracks, CadenceRequest, Fix,
    GpsPoint, IngestOutcome, OffTrailAlert, OffTrailConfig, OffTrailMonitor, PathProjection,
    ReferencePath, TrackPoint, TrackSummary, TrackerConfig,
};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// Callback Interfaces (implemented in Kotlin/Swift)
// ============================================================================

/// Positioning subsystem of the host.
#[uniffi::export(callback_interface)]
pub trait PositioningCallback: Send + Sync {
    /// Re-register for fixes. Return false if the provider is unavailable.
    fn request_cadence(&self, request: CadenceRequest) -> bool;
    fn suspend(&self);
}

/// Persistence/UI consumer of the live track. Invoked after the recorder is
/// unlocked, so it may call other `recorder_*` functions.
#[uniffi::export(callback_interface)]
pub trait TrackEventCallback: Send + Sync {
    fn on_point_accepted(&self, point: TrackPoint, stats: SessionStats);
    fn on_session_reset(&self);
}

/// Receives off-trail alerts on the poll thread. May call `offtrail_stop`
/// or `offtrail_refresh`.
#[uniffi::export(callback_interface)]
pub trait OffTrailCallback: Send + Sync {
    fn on_alert(&self, alert: OffTrailAlert);
}

struct HostPositioning(Box<dyn PositioningCallback>);

impl PositioningControl for HostPositioning {
    fn request_cadence(&self, request: &CadenceRequest) -> Result<()> {
        if self.0.request_cadence(*request) {
            Ok(())
        } else {
            Err(TrackError::positioning("host refused cadence change"))
        }
    }

    fn suspend(&self) -> Result<()> {
        self.0.suspend();
        Ok(())
    }
}

struct HostListener(Box<dyn TrackEventCallback>);

impl TrackListener for HostListener {
    fn on_point_accepted(&self, point: &TrackPoint, stats: &SessionStats) {
        self.0.on_point_accepted(*point, stats.clone());
    }

    fn on_session_reset(&self) {
        self.0.on_session_reset();
    }
}

struct HostAlertSink(Box<dyn OffTrailCallback>);

impl AlertSink for HostAlertSink {
    fn on_alert(&self, alert: &OffTrailAlert) {
        self.0.on_alert(alert.clone());
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// Initialize logging and apply configuration (JSON, missing fields default).
/// Returns false if the JSON could not be parsed; defaults stay in force.
#[uniffi::export]
pub fn recorder_init(config_json: String) -> bool {
    init_logging();
    match TrackerConfig::from_json(&config_json) {
        Ok(config) => {
            with_recorder(|r| r.set_config(config.clone()));
            set_off_trail_config(config.off_trail);
            info!("[TrackRecorder] Initialized");
            true
        }
        Err(e) => {
            warn!("[TrackRecorder] {}", e);
            false
        }
    }
}

/// Default configuration as JSON, for the host's settings screen.
#[uniffi::export]
pub fn default_tracker_config_json() -> String {
    TrackerConfig::default().to_json()
}

#[uniffi::export]
pub fn recorder_set_positioning(callback: Box<dyn PositioningCallback>) {
    with_recorder(|r| r.set_positioning(Box::new(HostPositioning(callback))));
}

#[uniffi::export]
pub fn recorder_set_listener(callback: Box<dyn TrackEventCallback>) {
    with_recorder(|r| r.set_listener(Box::new(HostListener(callback))));
}

/// Start a new session. Returns false if one is already running.
#[uniffi::export]
pub fn recorder_start() -> bool {
    init_logging();
    log_failure(with_recorder(|r| r.start(now_ms())))
}

/// Start a session continuing a stored track.
#[uniffi::export]
pub fn recorder_resume(points: Vec<TrackPoint>) -> bool {
    init_logging();
    log_failure(with_recorder(|r| r.resume_from(points, now_ms())))
}

/// Stop the session and return its summary.
#[uniffi::export]
pub fn recorder_stop() -> Option<TrackSummary> {
    match with_recorder(|r| r.stop()) {
        Ok(stopped) => Some(stopped.summary),
        Err(e) => {
            warn!("[TrackRecorder] {}", e);
            None
        }
    }
}

#[uniffi::export]
pub fn recorder_pause() -> bool {
    log_failure(with_recorder(|r| r.pause()))
}

#[uniffi::export]
pub fn recorder_resume_updates() -> bool {
    log_failure(with_recorder(|r| r.resume_updates()))
}

/// Submit one fix from the positioning callback.
#[uniffi::export]
pub fn recorder_submit(fix: Fix) -> IngestOutcome {
    with_recorder(|r| r.submit(fix, now_ms()).outcome)
}

#[uniffi::export]
pub fn recorder_set_battery_saver(enabled: bool) {
    with_recorder(|r| r.set_battery_saver(enabled, now_ms()));
}

#[uniffi::export]
pub fn recorder_stats() -> Option<SessionStats> {
    with_recorder(|r| r.stats(now_ms()))
}

/// Live stats as JSON ("null" without a session).
#[uniffi::export]
pub fn recorder_stats_json() -> String {
    let stats = recorder_stats();
    serde_json::to_string(&stats).unwrap_or_else(|_| "null".to_string())
}

fn log_failure(result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("[TrackRecorder] {}", e);
            false
        }
    }
}

// ============================================================================
// Off-Trail
// ============================================================================

static OFF_TRAIL: Lazy<Arc<Mutex<OffTrailMonitor>>> =
    Lazy::new(|| Arc::new(Mutex::new(OffTrailMonitor::default())));

static TICKER: Lazy<Mutex<Option<OffTrailTicker>>> = Lazy::new(|| Mutex::new(None));

static PLAN_DRAWING: AtomicBool = AtomicBool::new(false);

fn with_off_trail<F, R>(f: F) -> R
where
    F: FnOnce(&mut OffTrailMonitor) -> R,
{
    let mut monitor = OFF_TRAIL.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut monitor)
}

fn set_off_trail_config(config: OffTrailConfig) {
    with_off_trail(|m| m.set_config(config));
}

/// Latest accepted position from the global recorder.
struct RecorderSource;

impl OffTrailSource for RecorderSource {
    fn current_position(&self) -> Option<GpsPoint> {
        with_recorder(|r| r.latest_position())
    }

    fn watch_context(&self) -> WatchContext {
        WatchContext {
            recording: with_recorder(|r| r.is_recording()),
            plan_drawing: PLAN_DRAWING.load(Ordering::Relaxed),
        }
    }
}

#[uniffi::export]
pub fn offtrail_load_path(path: ReferencePath) {
    with_off_trail(|m| m.load_path(path));
}

#[uniffi::export]
pub fn offtrail_unload_path(id: String) -> bool {
    with_off_trail(|m| m.unload_path(&id))
}

#[uniffi::export]
pub fn offtrail_clear() {
    with_off_trail(|m| m.clear());
}

/// Set (or with `None`, remove) a track's own alarm distance.
#[uniffi::export]
pub fn offtrail_set_alarm(id: String, alarm_m: Option<f64>) -> bool {
    with_off_trail(|m| m.set_alarm(&id, alarm_m))
}

#[uniffi::export]
pub fn offtrail_set_plan_drawing(drawing: bool) {
    PLAN_DRAWING.store(drawing, Ordering::Relaxed);
}

/// Start or stop the poll timer to match what is currently watched.
/// Call after recording starts/stops and after loading paths or alarms.
/// Returns whether the timer is running.
///
/// Safe to call from the alert callback. A ticker is always stopped after
/// its slot lock is released, so the ticker thread never waits on `TICKER`
/// while someone joins it.
#[uniffi::export]
pub fn offtrail_refresh(callback: Box<dyn OffTrailCallback>) -> bool {
    let watching = {
        let ctx = RecorderSource.watch_context();
        with_off_trail(|m| m.is_watching(ctx))
    };

    let (stale, running) = {
        let mut ticker = TICKER.lock().unwrap_or_else(PoisonError::into_inner);
        if !watching {
            (ticker.take(), false)
        } else if ticker.as_ref().map_or(false, OffTrailTicker::is_running) {
            (None, true)
        } else {
            let stale = ticker.take();
            *ticker = Some(OffTrailTicker::start(
                OFF_TRAIL.clone(),
                Arc::new(RecorderSource),
                Arc::new(HostAlertSink(callback)),
            ));
            (stale, true)
        }
    };

    if let Some(stale) = stale {
        stale.stop();
    }
    running
}

#[uniffi::export]
pub fn offtrail_stop() {
    let running = TICKER.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(running) = running {
        running.stop();
    }
}

// ============================================================================
// Batch Helpers
// ============================================================================

/// Statistics for a stored (possibly edited) track.
#[uniffi::export]
pub fn compute_track_summary(points: Vec<TrackPoint>) -> TrackSummary {
    let config = with_recorder(|r| r.config().elevation.clone());
    TrackSummary::from_points(&points, &config)
}

#[uniffi::export]
pub fn ffi_summarize_tracks(tracks: Vec<Vec<TrackPoint>>) -> Vec<TrackSummary> {
    info!("[TrackRecorder] Summarizing {} tracks", tracks.len());
    let config = with_recorder(|r| r.config().elevation.clone());
    summarize_tracks(&tracks, &config)
}

#[uniffi::export]
pub fn ffi_project_onto_path(query: GpsPoint, path: Vec<GpsPoint>) -> Option<PathProjection> {
    project_onto_path(&query, &path)
}

/// Where to insert `query` into `path` when editing a trace.
#[uniffi::export]
pub fn ffi_insertion_index(query: GpsPoint, path: Vec<GpsPoint>) -> Option<u32> {
    insertion_index(&query, &path).map(|i| i as u32)
}
