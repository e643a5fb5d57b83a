use log::{info, warn};

use super::PostureAlert;

/// Vibration pattern used for posture alerts: wait, buzz, pause, buzz (ms).
pub const ALERT_VIBRATION_PATTERN_MS: [u64; 4] = [0, 500, 200, 500];

/// Delivery of alerts to the user (banner, vibration, sound).
///
/// Implementations must not block; the acquisition loop calls them inline.
pub trait AlertNotifier: Send + Sync {
    fn notify(&self, alert: &PostureAlert);

    /// Withdraw any alert currently shown.
    fn cancel(&self);
}

#[derive(Debug, Clone, Copy)]
pub struct NotificationPreferences {
    pub vibration_enabled: bool,
    pub sound_enabled: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            vibration_enabled: true,
            sound_enabled: true,
        }
    }
}

/// Headless notifier that reports alerts through the log.
pub struct LogNotifier {
    preferences: NotificationPreferences,
}

impl LogNotifier {
    pub fn new(preferences: NotificationPreferences) -> Self {
        Self { preferences }
    }
}

impl AlertNotifier for LogNotifier {
    fn notify(&self, alert: &PostureAlert) {
        warn!("{}", banner_text(alert));
        if self.preferences.vibration_enabled {
            info!("vibrate {:?}", ALERT_VIBRATION_PATTERN_MS);
        }
        if self.preferences.sound_enabled {
            info!("play alert sound");
        }
    }

    fn cancel(&self) {
        info!("posture alert withdrawn");
    }
}

pub fn banner_text(alert: &PostureAlert) -> String {
    format!(
        "Fix your posture! Back tilted {}° for {}s",
        alert.angle.round() as i64,
        alert.bad_duration_secs
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_rounds_angle() {
        let alert = PostureAlert {
            angle: 31.6,
            bad_since: 0,
            fired_at: 12_000,
            bad_duration_secs: 12,
        };
        assert_eq!(banner_text(&alert), "Fix your posture! Back tilted 32° for 12s");
    }
}
