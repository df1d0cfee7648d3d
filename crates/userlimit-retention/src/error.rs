use thiserror::Error;
use userlimit_options::OptionsError;
use userlimit_scheduler::SchedulerError;
use userlimit_users::UserError;

/// Errors surfaced by lifecycle calls and eviction runs. Each wraps the
/// failing subsystem's own error unchanged.
#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("Settings error: {0}")]
    Options(#[from] OptionsError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("User store error: {0}")]
    Users(#[from] UserError),
}

pub type Result<T> = std::result::Result<T, RetentionError>;
