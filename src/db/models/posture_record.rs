//! Posture record data model.
//!
//! One classified sensor sample captured by the acquisition loop.

use serde::Serialize;

use crate::posture::{classify, Classification, PostureStatus};

/// A single classified posture sample.
///
/// `status` and `is_good_posture` are always derived from `angle`; the only
/// way to build a record is [`PostureRecord::capture`], which runs the
/// classifier. Records are immutable once written.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostureRecord {
    pub id: Option<i64>,
    pub user_id: i64,
    pub session_id: String,
    pub angle: f64,
    status: PostureStatus,
    is_good_posture: bool,
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl PostureRecord {
    pub fn capture(user_id: i64, session_id: impl Into<String>, angle: f64, timestamp: i64) -> Self {
        let classification = classify(angle);
        Self {
            id: None,
            user_id,
            session_id: session_id.into(),
            angle,
            status: classification.status,
            is_good_posture: classification.is_good_posture,
            timestamp,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn status(&self) -> PostureStatus {
        self.status
    }

    pub fn is_good_posture(&self) -> bool {
        self.is_good_posture
    }

    pub fn classification(&self) -> Classification {
        Classification {
            status: self.status,
            is_good_posture: self.is_good_posture,
        }
    }
}

/// Count/extreme summary over a user's records in a time window.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordAggregate {
    pub total: u64,
    pub good_count: u64,
    pub bad_count: u64,
    /// Zero when the window has no records.
    pub avg_angle: f64,
    pub min_angle: f64,
    pub max_angle: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_derives_classification() {
        let record = PostureRecord::capture(7, "SESSION_1", 30.0, 1_700_000_000_000);
        assert_eq!(record.status(), PostureStatus::Fair);
        assert!(!record.is_good_posture());
        assert_eq!(record.id, None);
        assert_eq!(record.with_id(3).id, Some(3));
    }
}
