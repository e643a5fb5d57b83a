//! Sensor transport.
//!
//! The acquisition loop talks to the wearable through [`PostureSource`];
//! [`SensorClient`] is the HTTP implementation used in production.

pub mod client;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::SensorClient;

/// One decoded `GET /api/posture` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorReading {
    pub angle: f64,
    /// Status label computed by the device firmware.
    pub posture_status: String,
    /// Good/bad flag computed by the device firmware.
    pub is_good_posture: bool,
    /// Device clock, milliseconds.
    pub timestamp: i64,
}

#[async_trait]
pub trait PostureSource: Send + Sync {
    /// Fetch the current reading. Any transport, status or payload problem is
    /// an `Err`; callers treat all of them as "no data this tick".
    async fn fetch(&self) -> Result<SensorReading>;

    /// Ask the device to re-zero its angle.
    async fn calibrate(&self) -> Result<()>;

    /// Human-readable endpoint, for logging.
    fn describe(&self) -> String;
}
