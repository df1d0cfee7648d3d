//! `userlimit-retention`: keeps the user table at a configured size.
//!
//! [`RetentionExecutor`] performs one "keep the N oldest, delete the rest"
//! pass. [`UserLimiter`] is what the host drives: activation, deactivation,
//! settings changes and status. [`run_worker`] executes scheduler firings one
//! at a time.

pub mod error;
pub mod executor;
pub mod limiter;
pub mod worker;

pub use error::{Result, RetentionError};
pub use executor::{EvictionResult, RetentionExecutor};
pub use limiter::{JobCheck, LimiterStatus, UserLimiter};
pub use worker::run_worker;
