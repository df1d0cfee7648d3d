//! `userlimit-options`: the runtime settings store.
//!
//! A small key-value table holding the retention count and the schedule
//! interval. Reads never fail (absent or unreadable values fall back to
//! defaults); writes are validated and rejected without touching the row.
//! The same table carries the activation marker that gates scheduled runs.

pub mod db;
pub mod error;
pub mod store;

pub use error::{OptionsError, Result};
pub use store::{OptionChange, OptionsStore};
