pub mod alerts;
pub mod cli;
pub mod db;
pub mod maintenance;
pub mod monitor;
pub mod posture;
pub mod sensor;
pub mod settings;
pub mod stats;
mod utils;

use std::{fs, sync::Arc};

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Utc};
use clap::Parser;
use log::{info, warn};
use serde_json::json;

use alerts::LogNotifier;
use cli::{Cli, Command, ConfigAction};
use db::Database;
use monitor::{LiveState, MonitorController};
use sensor::SensorClient;
use settings::{MonitorSettings, SettingsStore, DB_FILE_NAME, SETTINGS_FILE_NAME};
use stats::StatsService;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG still wins; SPINEBAND_DEBUG only raises the default.
    let default_level = if settings::debug_enabled() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();

    info!("SpineBand starting up...");

    let data_dir = settings::resolve_data_dir()?;
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings_store = SettingsStore::new(data_dir.join(SETTINGS_FILE_NAME))?;
    if let Command::Config { action } = cli.command() {
        return run_config(&settings_store, action.unwrap_or(ConfigAction::Show));
    }

    let mut settings = settings_store.current().with_env_overrides();
    if let Some(host) = cli.host.clone() {
        settings.sensor_host = host;
    }

    let database = Database::new(data_dir.join(DB_FILE_NAME))?;

    match cli.command() {
        Command::Monitor => run_monitor(database, &settings).await,
        Command::Calibrate => run_calibrate(database, &settings).await,
        Command::Stats { month } => {
            maintenance::prune_expired_records(
                &database,
                settings.retention_policy(),
                Utc::now().timestamp_millis(),
            )
            .await?;
            print_stats(database, &settings, month.as_deref()).await
        }
        Command::Config { .. } => Ok(()),
    }
}

/// Works on the stored file only; env and `--host` overrides are not saved.
fn run_config(store: &SettingsStore, action: ConfigAction) -> Result<()> {
    let settings = match action {
        ConfigAction::Show => store.current(),
        ConfigAction::Set { key, value } => {
            let mut candidate = store.current();
            candidate.set_field(&key, &value)?;
            let saved = store.update(|settings| *settings = candidate)?;
            info!("Saved {key} to {}", store.path().display());
            saved
        }
    };

    println!("# {}", store.path().display());
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

fn build_controller(database: Database, settings: &MonitorSettings) -> Result<(MonitorController, SensorClient)> {
    let client = SensorClient::new(&settings.sensor_host, settings.request_timeout())?;
    let notifier = Arc::new(LogNotifier::new(settings.notification_preferences()));
    let controller = MonitorController::new(
        database,
        Arc::new(client.clone()),
        notifier,
        settings.monitor_config(),
    );
    Ok((controller, client))
}

async fn run_monitor(database: Database, settings: &MonitorSettings) -> Result<()> {
    let retention = maintenance::spawn_retention_task(database.clone(), settings.retention_policy());
    let (controller, client) = build_controller(database, settings)?;

    if !client.ping().await {
        warn!("Sensor not reachable yet; polling anyway");
    }

    let mut live_rx = controller.subscribe_live();
    controller.start().await?;
    info!("Monitoring session {}; press Ctrl-C to stop", controller.session().id);

    let mut last = LiveState::default();
    loop {
        tokio::select! {
            changed = live_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = live_rx.borrow_and_update().clone();
                log_live_change(&last, &current);
                last = current;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("Shutting down");
                break;
            }
        }
    }

    controller.stop().await?;
    retention.abort();

    let snapshot = controller.snapshot().await;
    info!(
        "Session {} ran for {}s",
        snapshot.session.id, snapshot.elapsed_secs
    );
    Ok(())
}

fn log_live_change(previous: &LiveState, current: &LiveState) {
    if previous.connected != current.connected {
        if current.connected {
            info!("Sensor connected");
        } else {
            warn!("Sensor disconnected: {}", current.status_text);
        }
    }
    if previous.status != current.status {
        if let (Some(status), Some(angle)) = (current.status, current.angle) {
            info!("Posture {status} ({angle:.1}°)");
        }
    }
    if previous.alert_active && !current.alert_active {
        info!("Alert cleared");
    }
    if let Some(angle) = current.angle {
        log::debug!("angle={angle:.1} status_text={}", current.status_text);
    }
}

async fn run_calibrate(database: Database, settings: &MonitorSettings) -> Result<()> {
    let (controller, _) = build_controller(database, settings)?;
    if !controller.calibrate().await {
        bail!("calibration failed for sensor {}", settings.sensor_host);
    }
    println!("{}", controller.live().status_text);
    Ok(())
}

async fn print_stats(database: Database, settings: &MonitorSettings, month: Option<&str>) -> Result<()> {
    let service = StatsService::local(database);
    let user_id = settings.user_id;
    let today = service.today();

    let (year, month) = match month {
        Some(value) => match cli::parse_month(value) {
            Some(parsed) => parsed,
            None => bail!("invalid month '{value}', expected YYYY-MM"),
        },
        None => (today.year(), today.month()),
    };

    let report = json!({
        "today": service.today_overview(user_id, today).await?,
        "day": service.day_stats(user_id, today).await?,
        "week": service.week_summary(user_id, today).await?,
        "month": service.month_stats(user_id, year, month, today).await?,
        "allTime": service.all_time_stats(user_id, today).await?,
    });

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
