pub mod acquisition;
pub mod controller;
pub mod loop_worker;
pub mod state;

pub use controller::{MonitorConfig, MonitorController};
pub use loop_worker::{poll_once, LoopContext, PollOutcome};
pub use state::{LiveState, MonitorSnapshot, SessionInfo};
