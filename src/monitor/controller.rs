use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use chrono::Utc;
use log::{info, warn};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Duration},
};

use crate::{
    alerts::{AlertConfig, AlertNotifier, AlertStateMachine},
    db::Database,
    sensor::PostureSource,
};

use super::{
    acquisition::AcquisitionController,
    loop_worker::LoopContext,
    state::{
        LiveState, MonitorSnapshot, SessionInfo, STATUS_CALIBRATED, STATUS_CALIBRATION_FAILED,
    },
};

const SESSION_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub user_id: i64,
    pub poll_interval: Duration,
    pub alert: AlertConfig,
    pub alerts_enabled: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            user_id: 1,
            poll_interval: Duration::from_secs(1),
            alert: AlertConfig::default(),
            alerts_enabled: true,
        }
    }
}

/// Command and event surface of the monitoring pipeline.
///
/// Owns the current session, the alert state machine and the acquisition
/// task. Observers subscribe to [`LiveState`] and to the session's elapsed
/// seconds through `watch` channels. Clones share everything.
#[derive(Clone)]
pub struct MonitorController {
    db: Database,
    source: Arc<dyn PostureSource>,
    notifier: Arc<dyn AlertNotifier>,
    config: MonitorConfig,
    session_tx: Arc<watch::Sender<SessionInfo>>,
    live_tx: Arc<watch::Sender<LiveState>>,
    elapsed_tx: Arc<watch::Sender<u64>>,
    alerts: Arc<Mutex<AlertStateMachine>>,
    alerts_enabled: Arc<AtomicBool>,
    acquisition: Arc<Mutex<AcquisitionController>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MonitorController {
    pub fn new(
        db: Database,
        source: Arc<dyn PostureSource>,
        notifier: Arc<dyn AlertNotifier>,
        config: MonitorConfig,
    ) -> Self {
        let (session_tx, _) = watch::channel(SessionInfo::new(Utc::now().timestamp_millis()));
        let (live_tx, _) = watch::channel(LiveState::default());
        let (elapsed_tx, _) = watch::channel(0);

        Self {
            db,
            source,
            notifier,
            config,
            session_tx: Arc::new(session_tx),
            live_tx: Arc::new(live_tx),
            elapsed_tx: Arc::new(elapsed_tx),
            alerts: Arc::new(Mutex::new(AlertStateMachine::new(config.alert))),
            alerts_enabled: Arc::new(AtomicBool::new(config.alerts_enabled)),
            acquisition: Arc::new(Mutex::new(AcquisitionController::new())),
            ticker: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let ctx = LoopContext {
            source: self.source.clone(),
            db: self.db.clone(),
            user_id: self.config.user_id,
            poll_interval: self.config.poll_interval,
            session: self.session_tx.subscribe(),
            live: self.live_tx.clone(),
            alerts: self.alerts.clone(),
            alerts_enabled: self.alerts_enabled.clone(),
            notifier: self.notifier.clone(),
        };

        self.acquisition.lock().await.start(ctx)?;
        self.spawn_ticker().await;
        info!(
            "monitoring started for user {} in session {}",
            self.config.user_id,
            self.session_tx.borrow().id
        );
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        self.acquisition.lock().await.stop().await?;
        self.cancel_ticker().await;
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.acquisition.lock().await.is_active()
    }

    /// Starts a new session: fresh id and start time, alert machine back to
    /// `Normal`, any shown alert withdrawn. Acquisition keeps running.
    pub async fn reset_session(&self) -> SessionInfo {
        let session = SessionInfo::new(Utc::now().timestamp_millis());
        self.session_tx.send_replace(session.clone());
        self.elapsed_tx.send_replace(0);

        let mut machine = self.alerts.lock().await;
        machine.reset();
        self.notifier.cancel();
        self.live_tx.send_modify(|live| live.alert_active = false);
        drop(machine);

        info!("new monitoring session {}", session.id);
        session
    }

    /// Hides the current alert without touching the bad-posture timer.
    pub async fn dismiss_alert(&self) {
        let mut machine = self.alerts.lock().await;
        if machine.dismiss() {
            self.notifier.cancel();
        }
        self.live_tx.send_modify(|live| live.alert_active = false);
    }

    /// Runs one calibrate request. The outcome only changes the status text.
    pub async fn calibrate(&self) -> bool {
        let ok = match self.source.calibrate().await {
            Ok(()) => {
                info!("sensor calibrated ({})", self.source.describe());
                true
            }
            Err(err) => {
                warn!("calibration failed ({}): {err:#}", self.source.describe());
                false
            }
        };

        let text = if ok { STATUS_CALIBRATED } else { STATUS_CALIBRATION_FAILED };
        self.live_tx.send_modify(|live| live.status_text = text.to_string());
        ok
    }

    pub async fn set_alerts_enabled(&self, enabled: bool) {
        self.alerts_enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.dismiss_alert().await;
        }
        info!("posture alerts {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn alerts_enabled(&self) -> bool {
        self.alerts_enabled.load(Ordering::SeqCst)
    }

    pub fn session(&self) -> SessionInfo {
        self.session_tx.borrow().clone()
    }

    pub fn live(&self) -> LiveState {
        self.live_tx.borrow().clone()
    }

    pub fn subscribe_live(&self) -> watch::Receiver<LiveState> {
        self.live_tx.subscribe()
    }

    pub fn subscribe_elapsed(&self) -> watch::Receiver<u64> {
        self.elapsed_tx.subscribe()
    }

    pub async fn snapshot(&self) -> MonitorSnapshot {
        let session = self.session();
        let elapsed_secs = session.elapsed_secs(Utc::now().timestamp_millis());
        MonitorSnapshot {
            running: self.is_running().await,
            live: self.live(),
            session,
            elapsed_secs,
            alert_state: self.alerts.lock().await.state(),
            alerts_enabled: self.alerts_enabled(),
        }
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let session_rx = self.session_tx.subscribe();
        let elapsed_tx = self.elapsed_tx.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(SESSION_TICK);
            loop {
                interval.tick().await;
                let elapsed = session_rx
                    .borrow()
                    .elapsed_secs(Utc::now().timestamp_millis());
                elapsed_tx.send_if_modified(|current| {
                    let changed = *current != elapsed;
                    *current = elapsed;
                    changed
                });
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::PostureAlert;
    use crate::sensor::SensorReading;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use tempfile::TempDir;

    struct FixedSource {
        angle: f64,
        calibrate_ok: bool,
    }

    #[async_trait]
    impl PostureSource for FixedSource {
        async fn fetch(&self) -> Result<SensorReading> {
            Ok(SensorReading {
                angle: self.angle,
                posture_status: "Mala".into(),
                is_good_posture: false,
                timestamp: 0,
            })
        }

        async fn calibrate(&self) -> Result<()> {
            if self.calibrate_ok {
                Ok(())
            } else {
                Err(anyhow!("HTTP 500"))
            }
        }

        fn describe(&self) -> String {
            "fixed".into()
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        notified: AtomicU32,
        cancelled: AtomicU32,
    }

    impl AlertNotifier for CountingNotifier {
        fn notify(&self, _alert: &PostureAlert) {
            self.notified.fetch_add(1, Ordering::SeqCst);
        }

        fn cancel(&self) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn controller(
        tmp_dir: &TempDir,
        calibrate_ok: bool,
        config: MonitorConfig,
    ) -> (MonitorController, Arc<CountingNotifier>) {
        let db = Database::new(tmp_dir.path().join("monitor.sqlite3")).unwrap();
        let notifier = Arc::new(CountingNotifier::default());
        let source = Arc::new(FixedSource {
            angle: 40.0,
            calibrate_ok,
        });
        (
            MonitorController::new(db, source, notifier.clone(), config),
            notifier,
        )
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let tmp_dir = TempDir::new().unwrap();
        let (monitor, _) = controller(&tmp_dir, true, MonitorConfig::default());

        monitor.start().await.unwrap();
        assert!(monitor.is_running().await);
        assert!(monitor.start().await.is_err());

        monitor.stop().await.unwrap();
        assert!(!monitor.is_running().await);
        // Stopping twice is harmless.
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn calibration_only_changes_status_text() {
        let tmp_dir = TempDir::new().unwrap();
        let (monitor, _) = controller(&tmp_dir, true, MonitorConfig::default());
        assert!(monitor.calibrate().await);
        assert_eq!(monitor.live().status_text, STATUS_CALIBRATED);
        assert!(!monitor.live().connected);

        let tmp_dir = TempDir::new().unwrap();
        let (monitor, _) = controller(&tmp_dir, false, MonitorConfig::default());
        assert!(!monitor.calibrate().await);
        assert_eq!(monitor.live().status_text, STATUS_CALIBRATION_FAILED);
    }

    #[tokio::test]
    async fn reset_starts_new_session_and_clears_alert_state() {
        let tmp_dir = TempDir::new().unwrap();
        let (monitor, notifier) = controller(&tmp_dir, true, MonitorConfig::default());
        let before = monitor.session();

        {
            let mut machine = monitor.alerts.lock().await;
            machine.observe(false, 40.0, 0);
            machine.observe(false, 40.0, 10_000);
            assert!(machine.is_alert_visible());
        }

        let after = monitor.reset_session().await;
        assert_ne!(before.id, after.id);
        assert_eq!(monitor.session(), after);
        assert_eq!(notifier.cancelled.load(Ordering::SeqCst), 1);

        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot.alert_state, crate::alerts::AlertState::Normal);
        assert!(!snapshot.live.alert_active);
    }

    #[tokio::test]
    async fn alerts_reach_notifier_while_running() {
        let tmp_dir = TempDir::new().unwrap();
        let config = MonitorConfig {
            poll_interval: Duration::from_millis(10),
            alert: AlertConfig {
                threshold_ms: 50,
                cooldown_ms: 60_000,
            },
            ..MonitorConfig::default()
        };
        let (monitor, notifier) = controller(&tmp_dir, true, config);

        let mut live_rx = monitor.subscribe_live();
        monitor.start().await.unwrap();
        time::timeout(Duration::from_secs(5), live_rx.wait_for(|live| live.alert_active))
            .await
            .unwrap()
            .unwrap();

        monitor.dismiss_alert().await;
        assert!(!monitor.live().alert_active);
        monitor.stop().await.unwrap();

        assert_eq!(notifier.notified.load(Ordering::SeqCst), 1);
        assert!(notifier.cancelled.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn dismissed_alert_stays_hidden_across_ticks() {
        let tmp_dir = TempDir::new().unwrap();
        let config = MonitorConfig {
            poll_interval: Duration::from_millis(5),
            alert: AlertConfig {
                threshold_ms: 20,
                cooldown_ms: 60_000,
            },
            ..MonitorConfig::default()
        };
        let (monitor, _) = controller(&tmp_dir, true, config);

        let mut live_rx = monitor.subscribe_live();
        monitor.start().await.unwrap();
        time::timeout(Duration::from_secs(5), live_rx.wait_for(|live| live.alert_active))
            .await
            .unwrap()
            .unwrap();

        monitor.dismiss_alert().await;
        let mut seen = monitor.live().last_reading_at.unwrap();
        for _ in 0..5 {
            let mut rx = monitor.subscribe_live();
            time::timeout(
                Duration::from_secs(5),
                rx.wait_for(|live| live.last_reading_at.map_or(false, |at| at > seen)),
            )
            .await
            .unwrap()
            .unwrap();
            assert!(!monitor.live().alert_active);
            assert!(!monitor.alerts.lock().await.is_alert_visible());
            seen = monitor.live().last_reading_at.unwrap();
        }
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn disabling_alerts_hides_visible_alert() {
        let tmp_dir = TempDir::new().unwrap();
        let (monitor, notifier) = controller(&tmp_dir, true, MonitorConfig::default());
        {
            let mut machine = monitor.alerts.lock().await;
            machine.observe(false, 40.0, 0);
            machine.observe(false, 40.0, 10_000);
        }

        monitor.set_alerts_enabled(false).await;
        assert!(!monitor.alerts_enabled());
        assert_eq!(notifier.cancelled.load(Ordering::SeqCst), 1);
        assert!(!monitor.alerts.lock().await.is_alert_visible());
    }
}
