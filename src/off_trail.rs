//! # Off-Trail Alerts
//!
//! Debounced alerts when the hiker strays from a reference path.
//!
//! Each loaded path carries its own phase:
//! - `Inside` until a poll measures at least the alarm distance
//! - `OutsidePending` while the excursion is younger than the minimum duration
//! - `Alerted` once it has lasted long enough; exactly one alert per excursion
//!
//! Any poll back within the alarm distance returns the path to `Inside`
//! immediately.
//!
//! [`OffTrailTicker`] drives polling on a background thread while at least
//! one path is watched.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::OffTrailConfig;
use crate::projection::distance_to_path;
use crate::GpsPoint;

// ============================================================================
// Types
// ============================================================================

/// Role of a reference path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum PathKind {
    /// The planned route being followed while recording
    Plan,
    /// Another loaded track; only watched when it has its own alarm
    Track,
}

/// A polyline the hiker may be asked to stay close to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ReferencePath {
    pub id: String,
    pub kind: PathKind,
    pub points: Vec<GpsPoint>,
    /// Per-path alarm distance (meters)
    pub alarm_m: Option<f64>,
}

impl ReferencePath {
    pub fn plan(id: impl Into<String>, points: Vec<GpsPoint>) -> Self {
        Self {
            id: id.into(),
            kind: PathKind::Plan,
            points,
            alarm_m: None,
        }
    }

    pub fn track(id: impl Into<String>, points: Vec<GpsPoint>, alarm_m: Option<f64>) -> Self {
        Self {
            id: id.into(),
            kind: PathKind::Track,
            points,
            alarm_m: sanitize_alarm(alarm_m),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffTrailPhase {
    Inside,
    OutsidePending { since_ms: i64 },
    Alerted { since_ms: i64 },
}

/// One confirmed excursion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct OffTrailAlert {
    pub path_id: String,
    pub kind: PathKind,
    /// Distance to the path when the alert fired (meters)
    pub distance_m: f64,
    /// How long the hiker had been outside (ms)
    pub excursion_ms: i64,
    pub at_ms: i64,
}

/// Host state that decides which paths are watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct WatchContext {
    pub recording: bool,
    /// The plan is being drawn or edited
    pub plan_drawing: bool,
}

/// Where the ticker reads the latest position and host state.
pub trait OffTrailSource: Send + Sync {
    fn current_position(&self) -> Option<GpsPoint>;
    fn watch_context(&self) -> WatchContext;
}

/// Receives confirmed excursions.
pub trait AlertSink: Send + Sync {
    fn on_alert(&self, alert: &OffTrailAlert);
}

fn sanitize_alarm(alarm_m: Option<f64>) -> Option<f64> {
    alarm_m.filter(|m| m.is_finite() && *m > 0.0)
}

// ============================================================================
// Monitor
// ============================================================================

#[derive(Debug, Clone)]
struct WatchedPath {
    path: ReferencePath,
    phase: OffTrailPhase,
}

/// Off-trail state for every loaded reference path.
#[derive(Debug, Clone, Default)]
pub struct OffTrailMonitor {
    config: OffTrailConfig,
    paths: Vec<WatchedPath>,
}

impl OffTrailMonitor {
    pub fn new(config: OffTrailConfig) -> Self {
        Self {
            config: config.validated(),
            paths: Vec::new(),
        }
    }

    pub fn config(&self) -> &OffTrailConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: OffTrailConfig) {
        self.config = config.validated();
    }

    /// Load a path, replacing any path with the same id. Starts `Inside`.
    pub fn load_path(&mut self, mut path: ReferencePath) {
        path.alarm_m = sanitize_alarm(path.alarm_m);
        info!(
            "[OffTrail] Loaded {:?} '{}' ({} points)",
            path.kind,
            path.id,
            path.points.len()
        );
        let watched = WatchedPath {
            path,
            phase: OffTrailPhase::Inside,
        };
        match self.paths.iter_mut().find(|w| w.path.id == watched.path.id) {
            Some(existing) => *existing = watched,
            None => self.paths.push(watched),
        }
    }

    pub fn unload_path(&mut self, id: &str) -> bool {
        let before = self.paths.len();
        self.paths.retain(|w| w.path.id != id);
        before != self.paths.len()
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }

    /// Set or remove a path's own alarm distance. Non-positive removes it.
    pub fn set_alarm(&mut self, id: &str, alarm_m: Option<f64>) -> bool {
        match self.paths.iter_mut().find(|w| w.path.id == id) {
            Some(watched) => {
                watched.path.alarm_m = sanitize_alarm(alarm_m);
                watched.phase = OffTrailPhase::Inside;
                true
            }
            None => false,
        }
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    pub fn phase(&self, id: &str) -> Option<OffTrailPhase> {
        self.paths
            .iter()
            .find(|w| w.path.id == id)
            .map(|w| w.phase)
    }

    /// Alarm distance in force for a path, if it alerts at all.
    pub fn threshold_for(&self, path: &ReferencePath) -> Option<f64> {
        match path.kind {
            PathKind::Plan => Some(path.alarm_m.unwrap_or(self.config.threshold_m)),
            PathKind::Track => path.alarm_m,
        }
    }

    fn is_eligible(&self, path: &ReferencePath, ctx: WatchContext) -> bool {
        if !self.config.enabled || path.points.len() < 2 || self.threshold_for(path).is_none() {
            return false;
        }
        match path.kind {
            PathKind::Plan => ctx.recording && !ctx.plan_drawing,
            PathKind::Track => true,
        }
    }

    /// Whether any path is watched, i.e. whether a poll timer should run.
    pub fn is_watching(&self, ctx: WatchContext) -> bool {
        self.paths.iter().any(|w| self.is_eligible(&w.path, ctx))
    }

    /// Measure `position` against every path and advance their phases.
    pub fn poll(&mut self, position: &GpsPoint, ctx: WatchContext, now_ms: i64) -> Vec<OffTrailAlert> {
        let mut alerts = Vec::new();
        let min_duration_ms = self.config.min_duration_ms;

        for i in 0..self.paths.len() {
            let eligible = self.is_eligible(&self.paths[i].path, ctx);
            let threshold = self.threshold_for(&self.paths[i].path);
            let watched = &mut self.paths[i];

            let (Some(threshold), true) = (threshold, eligible) else {
                watched.phase = OffTrailPhase::Inside;
                continue;
            };
            let Some(distance_m) = distance_to_path(position, &watched.path.points) else {
                watched.phase = OffTrailPhase::Inside;
                continue;
            };

            if distance_m < threshold {
                if watched.phase != OffTrailPhase::Inside {
                    debug!("[OffTrail] Back on '{}' ({:.0}m)", watched.path.id, distance_m);
                }
                watched.phase = OffTrailPhase::Inside;
                continue;
            }

            watched.phase = match watched.phase {
                OffTrailPhase::Alerted { since_ms } => OffTrailPhase::Alerted { since_ms },
                OffTrailPhase::Inside | OffTrailPhase::OutsidePending { .. } => {
                    let since_ms = match watched.phase {
                        OffTrailPhase::OutsidePending { since_ms } => since_ms,
                        _ => now_ms,
                    };
                    let excursion_ms = now_ms - since_ms;
                    if excursion_ms >= min_duration_ms {
                        info!(
                            "[OffTrail] Off '{}' by {:.0}m for {}ms",
                            watched.path.id, distance_m, excursion_ms
                        );
                        alerts.push(OffTrailAlert {
                            path_id: watched.path.id.clone(),
                            kind: watched.path.kind,
                            distance_m,
                            excursion_ms,
                            at_ms: now_ms,
                        });
                        OffTrailPhase::Alerted { since_ms }
                    } else {
                        OffTrailPhase::OutsidePending { since_ms }
                    }
                }
            };
        }

        alerts
    }

    /// Forget every excursion in progress.
    pub fn reset_phases(&mut self) {
        for watched in &mut self.paths {
            watched.phase = OffTrailPhase::Inside;
        }
    }
}

// ============================================================================
// Background Ticker
// ============================================================================

/// Polls an [`OffTrailMonitor`] on a background thread.
///
/// The thread exits on [`stop`](Self::stop), on drop, or by itself once
/// nothing is watched. Either way all phases are reset.
pub struct OffTrailTicker {
    stop_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl OffTrailTicker {
    /// Start polling now and every `poll_interval_ms` after.
    pub fn start(
        monitor: Arc<Mutex<OffTrailMonitor>>,
        source: Arc<dyn OffTrailSource>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let interval = Duration::from_millis(
            monitor
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .config()
                .poll_interval_ms,
        );
        info!("[OffTrail] Ticker started ({:?})", interval);

        let handle = thread::spawn(move || loop {
            let ctx = source.watch_context();
            let position = source.current_position();
            let (alerts, watching) = {
                let mut guard = monitor.lock().unwrap_or_else(PoisonError::into_inner);
                let now_ms = chrono::Utc::now().timestamp_millis();
                let alerts = match position {
                    Some(position) => guard.poll(&position, ctx, now_ms),
                    None => Vec::new(),
                };
                (alerts, guard.is_watching(ctx))
            };
            for alert in &alerts {
                sink.on_alert(alert);
            }

            let stop = !watching
                || !matches!(stop_rx.recv_timeout(interval), Err(RecvTimeoutError::Timeout));
            if stop {
                monitor
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .reset_phases();
                info!("[OffTrail] Ticker stopped");
                break;
            }
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Start only if some path is currently watched.
    pub fn start_if_watching(
        monitor: Arc<Mutex<OffTrailMonitor>>,
        source: Arc<dyn OffTrailSource>,
        sink: Arc<dyn AlertSink>,
    ) -> Option<Self> {
        let watching = monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_watching(source.watch_context());
        watching.then(|| Self::start(monitor, source, sink))
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Stop and wait for the thread to exit.
    ///
    /// Called from an [`AlertSink`] on the ticker thread itself, this only
    /// signals; the thread exits once the sink returns.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.send(());
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        let _ = handle.join();
    }
}

impl Drop for OffTrailTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::offset_meters;
    use std::time::Instant;

    const T0: i64 = 1_700_000_000_000;

    const RECORDING: WatchContext = WatchContext {
        recording: true,
        plan_drawing: false,
    };

    fn origin() -> GpsPoint {
        GpsPoint::new(46.2, 7.3)
    }

    /// 1 km straight north.
    fn plan() -> ReferencePath {
        let o = origin();
        ReferencePath::plan("plan", vec![o, offset_meters(&o, 0.0, 1_000.0)])
    }

    fn at_east(meters: f64) -> GpsPoint {
        offset_meters(&origin(), meters, 500.0)
    }

    /// Poll every 2 s from `start` for `duration_ms` at the given offset.
    fn poll_for(
        monitor: &mut OffTrailMonitor,
        east_m: f64,
        start: i64,
        duration_ms: i64,
    ) -> Vec<OffTrailAlert> {
        let mut alerts = Vec::new();
        let mut t = start;
        while t <= start + duration_ms {
            alerts.extend(monitor.poll(&at_east(east_m), RECORDING, t));
            t += 2_000;
        }
        alerts
    }

    #[test]
    fn test_short_excursion_never_alerts() {
        let mut monitor = OffTrailMonitor::new(OffTrailConfig::default());
        monitor.load_path(plan());

        let alerts = poll_for(&mut monitor, 60.0, T0, 10_000);
        assert!(alerts.is_empty());
        assert!(matches!(
            monitor.phase("plan"),
            Some(OffTrailPhase::OutsidePending { since_ms: T0 })
        ));

        let alerts = poll_for(&mut monitor, 5.0, T0 + 12_000, 0);
        assert!(alerts.is_empty());
        assert_eq!(monitor.phase("plan"), Some(OffTrailPhase::Inside));
    }

    #[test]
    fn test_sustained_excursion_alerts_once() {
        let mut monitor = OffTrailMonitor::new(OffTrailConfig::default());
        monitor.load_path(plan());

        let alerts = poll_for(&mut monitor, 60.0, T0, 20_000);
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.path_id, "plan");
        assert_eq!(alert.kind, PathKind::Plan);
        assert_eq!(alert.excursion_ms, 16_000);
        assert!((alert.distance_m - 60.0).abs() < 1.0);

        // Still outside: no repeat
        assert!(poll_for(&mut monitor, 60.0, T0 + 22_000, 20_000).is_empty());

        // Back inside, then a new excursion alerts again
        poll_for(&mut monitor, 0.0, T0 + 44_000, 0);
        let alerts = poll_for(&mut monitor, 60.0, T0 + 46_000, 20_000);
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn test_paths_evolve_independently() {
        let o = origin();
        let mut monitor = OffTrailMonitor::new(OffTrailConfig::default());
        monitor.load_path(plan());
        // Parallel track 100 m east with a wide alarm
        monitor.load_path(ReferencePath::track(
            "ridge",
            vec![
                offset_meters(&o, 100.0, 0.0),
                offset_meters(&o, 100.0, 1_000.0),
            ],
            Some(150.0),
        ));

        let alerts = poll_for(&mut monitor, 60.0, T0, 20_000);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].path_id, "plan");
        assert_eq!(monitor.phase("ridge"), Some(OffTrailPhase::Inside));
    }

    #[test]
    fn test_track_without_alarm_is_not_watched() {
        let o = origin();
        let mut monitor = OffTrailMonitor::new(OffTrailConfig::default());
        monitor.load_path(ReferencePath::track(
            "other",
            vec![o, offset_meters(&o, 0.0, 1_000.0)],
            None,
        ));
        assert!(!monitor.is_watching(RECORDING));
        assert!(poll_for(&mut monitor, 500.0, T0, 30_000).is_empty());

        assert!(monitor.set_alarm("other", Some(50.0)));
        assert!(monitor.is_watching(WatchContext::default()));
        assert!(!monitor.set_alarm("missing", Some(50.0)));
    }

    #[test]
    fn test_plan_watch_conditions() {
        let mut monitor = OffTrailMonitor::new(OffTrailConfig::default());
        monitor.load_path(plan());
        assert!(monitor.is_watching(RECORDING));
        assert!(!monitor.is_watching(WatchContext::default()));
        assert!(!monitor.is_watching(WatchContext {
            recording: true,
            plan_drawing: true,
        }));

        monitor.load_path(ReferencePath::plan("plan", vec![origin()]));
        assert_eq!(monitor.path_count(), 1);
        assert!(!monitor.is_watching(RECORDING));

        let mut disabled = OffTrailMonitor::new(OffTrailConfig {
            enabled: false,
            ..OffTrailConfig::default()
        });
        disabled.load_path(plan());
        assert!(!disabled.is_watching(RECORDING));
    }

    #[test]
    fn test_ineligible_path_resets_to_inside() {
        let mut monitor = OffTrailMonitor::new(OffTrailConfig::default());
        monitor.load_path(plan());
        poll_for(&mut monitor, 60.0, T0, 4_000);
        assert!(matches!(
            monitor.phase("plan"),
            Some(OffTrailPhase::OutsidePending { .. })
        ));

        monitor.poll(&at_east(60.0), WatchContext::default(), T0 + 6_000);
        assert_eq!(monitor.phase("plan"), Some(OffTrailPhase::Inside));
    }

    #[test]
    fn test_unload_and_clear() {
        let mut monitor = OffTrailMonitor::new(OffTrailConfig::default());
        monitor.load_path(plan());
        assert!(monitor.unload_path("plan"));
        assert!(!monitor.unload_path("plan"));
        monitor.load_path(plan());
        monitor.clear();
        assert_eq!(monitor.path_count(), 0);
        assert!(monitor.phase("plan").is_none());
    }

    // ------------------------------------------------------------------
    // Ticker
    // ------------------------------------------------------------------

    struct FixedSource {
        position: GpsPoint,
        ctx: WatchContext,
    }

    impl OffTrailSource for FixedSource {
        fn current_position(&self) -> Option<GpsPoint> {
            Some(self.position)
        }
        fn watch_context(&self) -> WatchContext {
            self.ctx
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        alerts: Mutex<Vec<OffTrailAlert>>,
    }

    impl AlertSink for CollectingSink {
        fn on_alert(&self, alert: &OffTrailAlert) {
            self.alerts.lock().unwrap().push(alert.clone());
        }
    }

    fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    #[test]
    fn test_ticker_delivers_alert_and_resets_on_stop() {
        let config = OffTrailConfig {
            min_duration_ms: 0,
            poll_interval_ms: 100,
            ..OffTrailConfig::default()
        };
        let monitor = Arc::new(Mutex::new(OffTrailMonitor::new(config)));
        monitor.lock().unwrap().load_path(plan());

        let source = Arc::new(FixedSource {
            position: at_east(80.0),
            ctx: RECORDING,
        });
        let sink = Arc::new(CollectingSink::default());

        let ticker = OffTrailTicker::start_if_watching(monitor.clone(), source, sink.clone())
            .expect("plan is watched");
        assert!(wait_until(Duration::from_secs(2), || {
            !sink.alerts.lock().unwrap().is_empty()
        }));
        thread::sleep(Duration::from_millis(250));
        ticker.stop();

        assert_eq!(sink.alerts.lock().unwrap().len(), 1);
        assert_eq!(
            monitor.lock().unwrap().phase("plan"),
            Some(OffTrailPhase::Inside)
        );
    }

    struct MovableSource {
        position: Mutex<GpsPoint>,
    }

    impl OffTrailSource for MovableSource {
        fn current_position(&self) -> Option<GpsPoint> {
            Some(*self.position.lock().unwrap())
        }
        fn watch_context(&self) -> WatchContext {
            RECORDING
        }
    }

    /// Stops the ticker it is handed from inside `on_alert`.
    #[derive(Default)]
    struct StoppingSink {
        ticker: Mutex<Option<OffTrailTicker>>,
        alerts: Mutex<u32>,
    }

    impl AlertSink for StoppingSink {
        fn on_alert(&self, _alert: &OffTrailAlert) {
            *self.alerts.lock().unwrap() += 1;
            let ticker = self.ticker.lock().unwrap().take();
            if let Some(ticker) = ticker {
                ticker.stop();
            }
        }
    }

    #[test]
    fn test_sink_can_stop_ticker_from_alert() {
        let config = OffTrailConfig {
            min_duration_ms: 0,
            poll_interval_ms: 50,
            ..OffTrailConfig::default()
        };
        let monitor = Arc::new(Mutex::new(OffTrailMonitor::new(config)));
        monitor.lock().unwrap().load_path(plan());

        let source = Arc::new(MovableSource {
            position: Mutex::new(at_east(0.0)),
        });
        let sink = Arc::new(StoppingSink::default());
        let ticker = OffTrailTicker::start(monitor.clone(), source.clone(), sink.clone());
        *sink.ticker.lock().unwrap() = Some(ticker);

        // Walk off the trail only once the sink holds the ticker
        *source.position.lock().unwrap() = at_east(80.0);
        assert!(wait_until(Duration::from_secs(2), || {
            *sink.alerts.lock().unwrap() == 1 && sink.ticker.lock().unwrap().is_none()
        }));
        assert!(wait_until(Duration::from_secs(2), || {
            monitor.lock().unwrap().phase("plan") == Some(OffTrailPhase::Inside)
        }));

        thread::sleep(Duration::from_millis(200));
        assert_eq!(*sink.alerts.lock().unwrap(), 1);
    }

    #[test]
    fn test_ticker_stops_when_nothing_watched() {
        let monitor = Arc::new(Mutex::new(OffTrailMonitor::new(OffTrailConfig {
            poll_interval_ms: 100,
            ..OffTrailConfig::default()
        })));
        monitor.lock().unwrap().load_path(plan());
        let sink = Arc::new(CollectingSink::default());

        let idle = Arc::new(FixedSource {
            position: at_east(80.0),
            ctx: WatchContext::default(),
        });
        assert!(OffTrailTicker::start_if_watching(monitor.clone(), idle.clone(), sink.clone())
            .is_none());

        let ticker = OffTrailTicker::start(monitor, idle, sink.clone());
        assert!(wait_until(Duration::from_secs(2), || !ticker.is_running()));
        assert!(sink.alerts.lock().unwrap().is_empty());
    }
}
