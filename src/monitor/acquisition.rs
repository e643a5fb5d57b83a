use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{acquisition_loop, LoopContext};

/// Owns the single acquisition task of a monitoring run.
#[derive(Default)]
pub struct AcquisitionController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl AcquisitionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn start(&mut self, ctx: LoopContext) -> Result<()> {
        if self.is_active() {
            bail!("acquisition already active");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(acquisition_loop(ctx, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        info!("acquisition started");
        Ok(())
    }

    /// Cancels the loop; an in-flight fetch is dropped, not awaited.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("acquisition loop task failed to join")?;
            info!("acquisition stopped");
        }
        Ok(())
    }
}
