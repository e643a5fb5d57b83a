pub mod aggregator;
pub mod calendar;
pub mod service;
pub mod types;

pub use service::StatsService;
pub use types::{AllTimeStats, DayStats, TodayOverview, Trend, WeekSummary};
