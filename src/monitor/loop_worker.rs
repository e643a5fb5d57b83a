use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use chrono::Utc;
use tokio::{
    sync::{watch, Mutex},
    time::Duration,
};
use tokio_util::sync::CancellationToken;

use crate::{
    alerts::{AlertNotifier, AlertOutcome, AlertStateMachine},
    db::{Database, PostureRecord},
    posture::PostureStatus,
    sensor::{PostureSource, SensorReading},
};

use super::state::{LiveState, SessionInfo};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Everything one acquisition loop needs, shared with the controller that
/// spawned it.
#[derive(Clone)]
pub struct LoopContext {
    pub source: Arc<dyn PostureSource>,
    pub db: Database,
    pub user_id: i64,
    pub poll_interval: Duration,
    pub session: watch::Receiver<SessionInfo>,
    pub live: Arc<watch::Sender<LiveState>>,
    pub alerts: Arc<Mutex<AlertStateMachine>>,
    pub alerts_enabled: Arc<AtomicBool>,
    pub notifier: Arc<dyn AlertNotifier>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Fetch failed; nothing was stored.
    Disconnected,
    /// A reading was classified and fed to the alert machine.
    Reading(AlertOutcome),
}

/// Self-paced polling: each tick awaits the fetch (bounded by the client
/// timeout), handles it, then sleeps the poll interval. Ticks never overlap.
pub async fn acquisition_loop(ctx: LoopContext, cancel_token: CancellationToken) {
    log_info!(
        "acquisition loop started: source={}, interval={:?}",
        ctx.source.describe(),
        ctx.poll_interval
    );

    loop {
        let fetched = tokio::select! {
            result = ctx.source.fetch() => result,
            _ = cancel_token.cancelled() => break,
        };

        ingest(&ctx, fetched, Utc::now().timestamp_millis()).await;

        tokio::select! {
            _ = tokio::time::sleep(ctx.poll_interval) => {}
            _ = cancel_token.cancelled() => break,
        }
    }

    log_info!("acquisition loop shutting down");
}

/// One fetch → classify → persist → alert cycle stamped with `captured_at`.
pub async fn poll_once(ctx: &LoopContext, captured_at: i64) -> PollOutcome {
    let fetched = ctx.source.fetch().await;
    ingest(ctx, fetched, captured_at).await
}

async fn ingest(ctx: &LoopContext, fetched: Result<SensorReading>, captured_at: i64) -> PollOutcome {
    let reading = match fetched {
        Ok(reading) => reading,
        Err(err) => {
            log_warn!("posture poll failed ({}): {err:#}", ctx.source.describe());
            ctx.live.send_modify(LiveState::apply_failure);
            return PollOutcome::Disconnected;
        }
    };

    let session_id = ctx.session.borrow().id.clone();
    let record = PostureRecord::capture(ctx.user_id, session_id, reading.angle, captured_at);
    cross_check_device(&reading, &record);

    if let Err(err) = ctx.db.insert_posture_record(&record).await {
        log_error!("failed to persist posture record at {captured_at}: {err:?}");
    }

    // Machine transition, notifier call and live publish happen under one
    // lock so a concurrent dismiss or reset cannot be overwritten.
    let enabled = ctx.alerts_enabled.load(Ordering::SeqCst);
    let mut machine = ctx.alerts.lock().await;
    let outcome = machine.observe(record.is_good_posture(), record.angle, captured_at);

    match &outcome {
        AlertOutcome::Fired(alert) if enabled => ctx.notifier.notify(alert),
        AlertOutcome::Fired(alert) => {
            machine.dismiss();
            log_debug!("alert at {} suppressed, alerts disabled", alert.fired_at)
        }
        AlertOutcome::Recovered => ctx.notifier.cancel(),
        AlertOutcome::Unchanged => {}
    }

    ctx.live.send_modify(|live| {
        live.apply_reading(record.angle, record.classification(), captured_at);
        live.alert_active = machine.is_alert_visible();
    });
    drop(machine);

    PollOutcome::Reading(outcome)
}

/// The stored classification always comes from the local classifier; the
/// device's own verdict is only compared.
fn cross_check_device(reading: &SensorReading, record: &PostureRecord) {
    let device_status = reading.posture_status.parse::<PostureStatus>().ok();
    if device_status != Some(record.status()) || reading.is_good_posture != record.is_good_posture() {
        log_debug!(
            "device says {}/{} for {:.1}°, local classification is {}/{}",
            reading.posture_status,
            reading.is_good_posture,
            reading.angle,
            record.status(),
            record.is_good_posture()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::PostureAlert;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    const T0: i64 = 1_700_000_000_000;

    /// Replays queued angles; `None` entries fail like a dropped connection.
    struct ScriptedSource {
        script: StdMutex<VecDeque<Option<f64>>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Option<f64>>) -> Self {
            Self {
                script: StdMutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl PostureSource for ScriptedSource {
        async fn fetch(&self) -> Result<SensorReading> {
            match self.script.lock().unwrap().pop_front().flatten() {
                Some(angle) => Ok(SensorReading {
                    angle,
                    posture_status: "Regular".into(),
                    is_good_posture: false,
                    timestamp: 0,
                }),
                None => Err(anyhow!("connection refused")),
            }
        }

        async fn calibrate(&self) -> Result<()> {
            Ok(())
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        fired: StdMutex<Vec<PostureAlert>>,
        cancels: StdMutex<u32>,
    }

    impl AlertNotifier for RecordingNotifier {
        fn notify(&self, alert: &PostureAlert) {
            self.fired.lock().unwrap().push(alert.clone());
        }

        fn cancel(&self) {
            *self.cancels.lock().unwrap() += 1;
        }
    }

    struct Harness {
        ctx: LoopContext,
        notifier: Arc<RecordingNotifier>,
        live_rx: watch::Receiver<LiveState>,
        _session_tx: watch::Sender<SessionInfo>,
        _tmp_dir: TempDir,
    }

    fn harness(script: Vec<Option<f64>>) -> Harness {
        let tmp_dir = TempDir::new().unwrap();
        let db = Database::new(tmp_dir.path().join("loop.sqlite3")).unwrap();
        let (session_tx, session_rx) = watch::channel(SessionInfo {
            id: "SESSION".into(),
            started_at: T0,
        });
        let (live_tx, live_rx) = watch::channel(LiveState::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let ctx = LoopContext {
            source: Arc::new(ScriptedSource::new(script)),
            db,
            user_id: 1,
            poll_interval: Duration::from_millis(10),
            session: session_rx,
            live: Arc::new(live_tx),
            alerts: Arc::new(Mutex::new(AlertStateMachine::default())),
            alerts_enabled: Arc::new(AtomicBool::new(true)),
            notifier: notifier.clone(),
        };

        Harness {
            ctx,
            notifier,
            live_rx,
            _session_tx: session_tx,
            _tmp_dir: tmp_dir,
        }
    }

    #[tokio::test]
    async fn fifteen_bad_readings_alert_once_at_ten_seconds() {
        let h = harness(vec![Some(30.0); 15]);

        let mut fired_at = Vec::new();
        for i in 0..15 {
            if let PollOutcome::Reading(AlertOutcome::Fired(_)) = poll_once(&h.ctx, T0 + i * 1_000).await {
                fired_at.push(i);
            }
        }

        assert_eq!(fired_at, vec![10]);
        let fired = h.notifier.fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].bad_duration_secs, 10);
        assert_eq!(fired[0].angle, 30.0);

        let records = h.ctx.db.get_session_records(1, "SESSION").await.unwrap();
        assert_eq!(records.len(), 15);
        assert!(h.live_rx.borrow().alert_active);
    }

    #[tokio::test]
    async fn failed_poll_stores_nothing_and_keeps_last_angle() {
        let h = harness(vec![Some(12.0), None]);

        assert!(matches!(poll_once(&h.ctx, T0).await, PollOutcome::Reading(_)));
        assert_eq!(poll_once(&h.ctx, T0 + 1_000).await, PollOutcome::Disconnected);

        let live = h.live_rx.borrow().clone();
        assert!(!live.connected);
        assert_eq!(live.angle, Some(12.0));
        assert_eq!(live.status, Some(PostureStatus::Excellent));
        assert_eq!(h.ctx.db.get_all_records(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn disconnection_does_not_count_as_bad_posture() {
        let h = harness(vec![None; 20]);

        for i in 0..20 {
            poll_once(&h.ctx, T0 + i * 1_000).await;
        }

        assert!(h.notifier.fired.lock().unwrap().is_empty());
        assert_eq!(h.ctx.alerts.lock().await.state(), crate::alerts::AlertState::Normal);
    }

    #[tokio::test]
    async fn good_reading_cancels_visible_alert() {
        let mut script = vec![Some(40.0); 11];
        script.push(Some(10.0));
        let h = harness(script);

        for i in 0..12 {
            poll_once(&h.ctx, T0 + i * 1_000).await;
        }

        assert_eq!(h.notifier.fired.lock().unwrap().len(), 1);
        assert_eq!(*h.notifier.cancels.lock().unwrap(), 1);
        assert!(!h.live_rx.borrow().alert_active);
        assert_eq!(h.live_rx.borrow().status_text, "Excellent");
    }

    #[tokio::test]
    async fn disabled_alerts_track_silently() {
        let h = harness(vec![Some(40.0); 12]);
        h.ctx.alerts_enabled.store(false, Ordering::SeqCst);

        for i in 0..12 {
            poll_once(&h.ctx, T0 + i * 1_000).await;
        }

        assert!(h.notifier.fired.lock().unwrap().is_empty());
        assert!(!h.live_rx.borrow().alert_active);
        assert!(matches!(
            h.ctx.alerts.lock().await.state(),
            crate::alerts::AlertState::Alerting { .. }
        ));
    }

    #[tokio::test]
    async fn live_flag_is_published_under_alert_lock() {
        let h = harness(vec![Some(40.0); 11]);
        for i in 0..10 {
            poll_once(&h.ctx, T0 + i * 1_000).await;
        }

        // While another holder owns the machine, the tick cannot publish.
        let guard = h.ctx.alerts.lock().await;
        let ctx = h.ctx.clone();
        let tick = tokio::spawn(async move { poll_once(&ctx, T0 + 10_000).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!h.live_rx.borrow().alert_active);
        assert_eq!(h.live_rx.borrow().last_reading_at, Some(T0 + 9_000));
        drop(guard);

        assert!(matches!(
            tick.await.unwrap(),
            PollOutcome::Reading(AlertOutcome::Fired(_))
        ));
        assert!(h.live_rx.borrow().alert_active);

        // A dismiss after the tick sticks.
        let mut machine = h.ctx.alerts.lock().await;
        assert!(machine.dismiss());
        h.ctx.live.send_modify(|live| live.alert_active = machine.is_alert_visible());
        drop(machine);
        assert!(!h.live_rx.borrow().alert_active);
    }

    #[tokio::test]
    async fn loop_stops_on_cancel() {
        let h = harness(vec![Some(10.0); 1_000]);
        let token = CancellationToken::new();
        let handle = tokio::spawn(acquisition_loop(h.ctx.clone(), token.clone()));

        let mut live_rx = h.live_rx.clone();
        tokio::time::timeout(Duration::from_secs(5), live_rx.wait_for(|live| live.connected))
            .await
            .unwrap()
            .unwrap();

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!h.ctx.db.get_all_records(1).await.unwrap().is_empty());
    }
}
