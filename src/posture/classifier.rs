//! Angle → posture classification.
//!
//! Two independent scales are derived from the same tilt angle:
//! - a four-bucket status (`Excellent`, `Good`, `Fair`, `Poor`)
//! - a binary good/bad flag used by alerting and statistics
//!
//! The good/bad cut currently coincides with the `Good`/`Fair` boundary but is
//! kept as its own constant; the two scales are allowed to drift apart.
//!
//! Thresholds are inclusive upper bounds, so a boundary angle lands in the
//! lower bucket. Negative angles are not clamped: they compare below every
//! threshold and classify as `Excellent` / good. `NaN` compares false against
//! every threshold and classifies as `Poor` / not good.

use std::{fmt, str::FromStr};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Upper bound (inclusive) of the `Excellent` bucket, in degrees.
pub const EXCELLENT_MAX_ANGLE: f64 = 15.0;
/// Upper bound (inclusive) of the `Good` bucket, in degrees.
pub const GOOD_MAX_ANGLE: f64 = 25.0;
/// Upper bound (inclusive) of the `Fair` bucket, in degrees.
pub const FAIR_MAX_ANGLE: f64 = 35.0;

/// Upper bound (inclusive) of "good posture" for the binary flag.
pub const GOOD_POSTURE_MAX_ANGLE: f64 = 25.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum PostureStatus {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl PostureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostureStatus::Excellent => "Excellent",
            PostureStatus::Good => "Good",
            PostureStatus::Fair => "Fair",
            PostureStatus::Poor => "Poor",
        }
    }

    /// Label shown by the Spanish-language device firmware and mobile app.
    pub fn label_es(&self) -> &'static str {
        match self {
            PostureStatus::Excellent => "Excelente",
            PostureStatus::Good => "Buena",
            PostureStatus::Fair => "Regular",
            PostureStatus::Poor => "Mala",
        }
    }
}

impl fmt::Display for PostureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostureStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "Excellent" | "Excelente" => Ok(PostureStatus::Excellent),
            "Good" | "Buena" => Ok(PostureStatus::Good),
            "Fair" | "Regular" => Ok(PostureStatus::Fair),
            "Poor" | "Mala" => Ok(PostureStatus::Poor),
            other => Err(anyhow!("unknown posture status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub status: PostureStatus,
    pub is_good_posture: bool,
}

pub fn classify(angle: f64) -> Classification {
    Classification {
        status: status_for(angle),
        is_good_posture: is_good_posture(angle),
    }
}

pub fn status_for(angle: f64) -> PostureStatus {
    if angle <= EXCELLENT_MAX_ANGLE {
        PostureStatus::Excellent
    } else if angle <= GOOD_MAX_ANGLE {
        PostureStatus::Good
    } else if angle <= FAIR_MAX_ANGLE {
        PostureStatus::Fair
    } else {
        PostureStatus::Poor
    }
}

pub fn is_good_posture(angle: f64) -> bool {
    angle <= GOOD_POSTURE_MAX_ANGLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_fall_into_lower_bucket() {
        assert_eq!(status_for(15.0), PostureStatus::Excellent);
        assert_eq!(status_for(25.0), PostureStatus::Good);
        assert_eq!(status_for(35.0), PostureStatus::Fair);
        assert_eq!(status_for(35.01), PostureStatus::Poor);
    }

    #[test]
    fn buckets_between_boundaries() {
        assert_eq!(status_for(0.0), PostureStatus::Excellent);
        assert_eq!(status_for(15.5), PostureStatus::Good);
        assert_eq!(status_for(30.0), PostureStatus::Fair);
        assert_eq!(status_for(80.0), PostureStatus::Poor);
    }

    #[test]
    fn good_flag_follows_its_own_threshold() {
        for angle in [0.0, 10.0, 15.0, 20.0, 25.0] {
            assert!(classify(angle).is_good_posture, "{angle} should be good");
        }
        for angle in [25.001, 30.0, 35.0, 60.0] {
            assert!(!classify(angle).is_good_posture, "{angle} should be bad");
        }
    }

    #[test]
    fn fair_is_never_good_posture() {
        let c = classify(30.0);
        assert_eq!(c.status, PostureStatus::Fair);
        assert!(!c.is_good_posture);
    }

    #[test]
    fn negative_and_nan_inputs() {
        let negative = classify(-40.0);
        assert_eq!(negative.status, PostureStatus::Excellent);
        assert!(negative.is_good_posture);

        let nan = classify(f64::NAN);
        assert_eq!(nan.status, PostureStatus::Poor);
        assert!(!nan.is_good_posture);
    }

    #[test]
    fn parses_english_and_spanish_labels() {
        assert_eq!("Regular".parse::<PostureStatus>().unwrap(), PostureStatus::Fair);
        assert_eq!("Poor".parse::<PostureStatus>().unwrap(), PostureStatus::Poor);
        assert!("Meh".parse::<PostureStatus>().is_err());
    }
}
