use serde::Serialize;

use crate::alerts::AlertState;
use crate::posture::{Classification, PostureStatus};

pub const STATUS_WAITING: &str = "Waiting for data...";
pub const STATUS_CONNECTION_ERROR: &str = "Connection error";
pub const STATUS_CALIBRATED: &str = "Calibration successful";
pub const STATUS_CALIBRATION_FAILED: &str = "Calibration failed";

/// What the presentation layer shows while monitoring.
///
/// A failed poll only flips `connected` and the status text; the last angle
/// and status stay on screen until the next successful reading.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveState {
    pub connected: bool,
    pub angle: Option<f64>,
    pub status: Option<PostureStatus>,
    pub is_good_posture: Option<bool>,
    pub status_text: String,
    pub alert_active: bool,
    /// Capture time of the last stored reading.
    pub last_reading_at: Option<i64>,
}

impl Default for LiveState {
    fn default() -> Self {
        Self {
            connected: false,
            angle: None,
            status: None,
            is_good_posture: None,
            status_text: STATUS_WAITING.to_string(),
            alert_active: false,
            last_reading_at: None,
        }
    }
}

impl LiveState {
    pub fn apply_reading(&mut self, angle: f64, classification: Classification, captured_at: i64) {
        self.connected = true;
        self.angle = Some(angle);
        self.status = Some(classification.status);
        self.is_good_posture = Some(classification.is_good_posture);
        self.status_text = classification.status.as_str().to_string();
        self.last_reading_at = Some(captured_at);
    }

    pub fn apply_failure(&mut self) {
        self.connected = false;
        self.status_text = STATUS_CONNECTION_ERROR.to_string();
    }
}

/// The current monitoring session. Not stored as a row; records carry its id.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub started_at: i64,
}

impl SessionInfo {
    pub fn new(started_at: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at,
        }
    }

    pub fn elapsed_secs(&self, now: i64) -> u64 {
        u64::try_from(now.saturating_sub(self.started_at) / 1_000).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub running: bool,
    pub live: LiveState,
    pub session: SessionInfo,
    pub elapsed_secs: u64,
    pub alert_state: AlertState,
    pub alerts_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posture::classify;

    #[test]
    fn starts_waiting_and_disconnected() {
        let state = LiveState::default();
        assert!(!state.connected);
        assert_eq!(state.status_text, STATUS_WAITING);
        assert_eq!(state.angle, None);
    }

    #[test]
    fn failure_keeps_last_classification() {
        let mut state = LiveState::default();
        state.apply_reading(30.0, classify(30.0), 5_000);
        state.apply_failure();

        assert!(!state.connected);
        assert_eq!(state.status_text, STATUS_CONNECTION_ERROR);
        assert_eq!(state.angle, Some(30.0));
        assert_eq!(state.status, Some(PostureStatus::Fair));
        assert_eq!(state.is_good_posture, Some(false));
        assert_eq!(state.last_reading_at, Some(5_000));
    }

    #[test]
    fn session_elapsed_never_negative() {
        let session = SessionInfo::new(10_000);
        assert_eq!(session.elapsed_secs(10_999), 0);
        assert_eq!(session.elapsed_secs(75_000), 65);
        assert_eq!(session.elapsed_secs(0), 0);
        assert_ne!(session.id, SessionInfo::new(10_000).id);
    }
}
