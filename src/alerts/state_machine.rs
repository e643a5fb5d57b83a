//! Sustained-bad-posture alerting.
//!
//! ```text
//!            bad                 bad, held >= threshold
//! Normal ─────────▶ Accumulating ───────────────────────▶ Alerting ──┐
//!   ▲                    │                                   │  ▲    │ bad, cooldown elapsed
//!   │        good        │               good                │  └────┘ (re-emit)
//!   └────────────────────┴───────────────────────────────────┘
//! ```
//!
//! The cooldown clock (time of the last alert) lives outside the state and
//! survives recovery: a brief good reading restarts accumulation but does not
//! make the next alert due any sooner. Only [`AlertStateMachine::reset`]
//! clears it.
//!
//! Time is supplied by the caller (milliseconds since epoch), so the machine
//! is a pure function of its inputs. It never blocks and never fails.

use serde::Serialize;

pub const ALERT_THRESHOLD_SECS: i64 = 10;
pub const ALERT_COOLDOWN_MS: i64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertConfig {
    /// Continuous bad posture required before the first alert.
    pub threshold_ms: i64,
    /// Minimum spacing between any two alerts of a session.
    pub cooldown_ms: i64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            threshold_ms: ALERT_THRESHOLD_SECS * 1_000,
            cooldown_ms: ALERT_COOLDOWN_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum AlertState {
    Normal,
    Accumulating { since: i64 },
    Alerting { since: i64 },
}

/// Payload handed to the notifier when an alert fires.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostureAlert {
    pub angle: f64,
    pub bad_since: i64,
    pub fired_at: i64,
    pub bad_duration_secs: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    Unchanged,
    Fired(PostureAlert),
    /// A good reading ended a bad stretch; any visible alert is cleared.
    Recovered,
}

#[derive(Debug, Clone)]
pub struct AlertStateMachine {
    config: AlertConfig,
    state: AlertState,
    last_alert_at: Option<i64>,
    alert_visible: bool,
}

impl AlertStateMachine {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            state: AlertState::Normal,
            last_alert_at: None,
            alert_visible: false,
        }
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    /// When the last alert of this session fired, if any.
    pub fn last_alert_at(&self) -> Option<i64> {
        self.last_alert_at
    }

    pub fn is_alert_visible(&self) -> bool {
        self.alert_visible
    }

    pub fn config(&self) -> AlertConfig {
        self.config
    }

    /// Feed one classified reading captured at `now`.
    pub fn observe(&mut self, is_good: bool, angle: f64, now: i64) -> AlertOutcome {
        if is_good {
            return match self.state {
                AlertState::Normal => AlertOutcome::Unchanged,
                AlertState::Accumulating { .. } | AlertState::Alerting { .. } => {
                    self.state = AlertState::Normal;
                    self.alert_visible = false;
                    AlertOutcome::Recovered
                }
            };
        }

        let since = match self.state {
            AlertState::Normal => {
                self.state = AlertState::Accumulating { since: now };
                now
            }
            AlertState::Accumulating { since } | AlertState::Alerting { since } => since,
        };

        if self.threshold_reached(since, now) && self.cooldown_elapsed(now) {
            self.fire(since, now, angle)
        } else {
            AlertOutcome::Unchanged
        }
    }

    /// Hide the current alert. The bad-posture timer and cooldown clock keep
    /// running, so a persistent slouch re-alerts once the cooldown elapses.
    pub fn dismiss(&mut self) -> bool {
        std::mem::replace(&mut self.alert_visible, false)
    }

    /// Forget everything: back to `Normal` with no cooldown pending.
    pub fn reset(&mut self) {
        self.state = AlertState::Normal;
        self.last_alert_at = None;
        self.alert_visible = false;
    }

    fn threshold_reached(&self, since: i64, now: i64) -> bool {
        now.saturating_sub(since) >= self.config.threshold_ms
    }

    fn cooldown_elapsed(&self, now: i64) -> bool {
        self.last_alert_at
            .map_or(true, |last| now.saturating_sub(last) >= self.config.cooldown_ms)
    }

    fn fire(&mut self, since: i64, now: i64, angle: f64) -> AlertOutcome {
        self.state = AlertState::Alerting { since };
        self.last_alert_at = Some(now);
        self.alert_visible = true;
        AlertOutcome::Fired(PostureAlert {
            angle,
            bad_since: since,
            fired_at: now,
            bad_duration_secs: now.saturating_sub(since) / 1_000,
        })
    }
}

impl Default for AlertStateMachine {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}
