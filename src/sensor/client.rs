//! HTTP client for the SpineBand sensor.
//!
//! ## Endpoints
//!
//! - `GET  {base}/api/posture`   → `{"angle", "posture_status", "is_good_posture", "timestamp"}`
//! - `POST {base}/api/calibrate` → any 2xx is success, body ignored
//! - `GET  {base}`               → reachability check
//!
//! Every request is bounded by the configured timeout. Timeouts are failures,
//! never retried here; the acquisition loop's cadence is the retry.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};

use super::{PostureSource, SensorReading};

pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

#[derive(Clone)]
pub struct SensorClient {
    base_url: String,
    client: reqwest::Client,
}

impl SensorClient {
    /// `host` is a bare host/IP (`10.0.0.5`, `sensor.local:8080`) or a full
    /// `http(s)://` base URL.
    pub fn new(host: &str, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(host)?;
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("failed to build sensor HTTP client")?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Pings the device root. Never errors; unreachable is `false`.
    pub async fn ping(&self) -> bool {
        match self.client.get(&self.base_url).send().await {
            Ok(response) => {
                let ok = response.status().is_success();
                info!("Sensor at {} answered {}", self.base_url, response.status());
                ok
            }
            Err(err) => {
                warn!("Sensor at {} unreachable: {err}", self.base_url);
                false
            }
        }
    }
}

#[async_trait]
impl PostureSource for SensorClient {
    async fn fetch(&self) -> Result<SensorReading> {
        let url = format!("{}/api/posture", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("GET {url} returned HTTP {status}");
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read body from {url}"))?;
        debug!("sensor payload: {body}");

        parse_payload(&body)
    }

    async fn calibrate(&self) -> Result<()> {
        let url = format!("{}/api/calibrate", self.base_url);
        let response = self
            .client
            .post(&url)
            .body("")
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("POST {url} returned HTTP {status}");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

pub fn parse_payload(body: &str) -> Result<SensorReading> {
    let reading: SensorReading =
        serde_json::from_str(body).context("sensor payload missing posture fields")?;
    if !reading.angle.is_finite() {
        return Err(anyhow!("sensor reported non-finite angle {}", reading.angle));
    }
    Ok(reading)
}

fn normalize_base_url(host: &str) -> Result<String> {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        bail!("sensor host is empty");
    }

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("http://{trimmed}"))
    }
}
