pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use config::UserLimitConfig;
pub use error::{Result, UserLimitError};
pub use types::{OptionKey, RetentionSettings, ScheduleInterval};
