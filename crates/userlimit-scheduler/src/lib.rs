//! `userlimit-scheduler`: recurring jobs with SQLite persistence.
//!
//! # Overview
//!
//! Jobs live in a `jobs` table keyed by hook name, at most one per hook.
//! [`SchedulerHandle`] creates, replaces and cancels them;
//! [`SchedulerEngine`] polls for due jobs, advances them by their interval
//! and forwards each firing over an mpsc channel.
//!
//! A firing is never executed here. The receiver decides what the hook means
//! and is expected to process firings one at a time.
//!
//! # Intervals
//!
//! | Token          | Period     |
//! |----------------|------------|
//! | `every_15_min` | 15 minutes |
//! | `hourly`       | 1 hour     |
//! | `daily`        | 24 hours   |
//! | `weekly`       | 7 days     |

pub mod db;
pub mod engine;
pub mod error;
pub mod handle;
pub mod types;

pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use handle::SchedulerHandle;
pub use types::Job;
