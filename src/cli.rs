use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "spineband", version, about = "Posture monitoring for the SpineBand sensor")]
pub struct Cli {
    /// Sensor host or base URL; overrides settings and SPINEBAND_SENSOR_HOST.
    #[arg(long, global = true)]
    pub host: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Poll the sensor and raise alerts until Ctrl-C (default).
    Monitor,
    /// Ask the sensor to re-zero its angle.
    Calibrate,
    /// Print today / week / month / all-time statistics as JSON.
    Stats {
        /// Month to report as `YYYY-MM`; defaults to the current month.
        #[arg(long)]
        month: Option<String>,
    },
    /// Show or change the persisted settings.
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Debug, Clone, Subcommand, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the settings file path and values (default).
    Show,
    /// Set one setting by its file key, e.g. `config set alerts_enabled false`.
    Set { key: String, value: String },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Monitor)
    }
}

/// Parses `YYYY-MM`.
pub fn parse_month(value: &str) -> Option<(i32, u32)> {
    let (year, month) = value.split_once('-')?;
    let year = year.parse().ok()?;
    let month = month.parse().ok()?;
    (1..=12).contains(&month).then_some((year, month))
}
