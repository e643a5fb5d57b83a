pub mod notifier;
pub mod state_machine;

pub use notifier::{AlertNotifier, LogNotifier, NotificationPreferences};
pub use state_machine::{
    AlertConfig, AlertOutcome, AlertState, AlertStateMachine, PostureAlert,
};
