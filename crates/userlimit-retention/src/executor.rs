use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use userlimit_options::OptionsStore;
use userlimit_users::UserStore;

use crate::error::Result;

/// Summary of one eviction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EvictionResult {
    /// Keep count read from the settings at the start of the run.
    pub keep_count: i64,
    pub retained_count: usize,
    pub deleted_count: usize,
    /// True when the retained set came back empty and nothing was deleted.
    pub skipped: bool,
}

impl EvictionResult {
    fn skipped(keep_count: i64) -> Self {
        Self {
            keep_count,
            skipped: true,
            ..Self::default()
        }
    }
}

/// Enforces "keep the N earliest-registered users".
///
/// The retained set is read first and the delete issued second. A user
/// created between the two steps is not in the snapshot and may be deleted;
/// that race is accepted.
pub struct RetentionExecutor {
    options: Arc<OptionsStore>,
    users: Arc<dyn UserStore>,
}

impl RetentionExecutor {
    pub fn new(options: Arc<OptionsStore>, users: Arc<dyn UserStore>) -> Self {
        Self { options, users }
    }

    #[instrument(skip(self))]
    pub fn run(&self) -> Result<EvictionResult> {
        let keep_count = self.options.keep_count();
        let keep = self.users.list_oldest(keep_count)?;

        // Never delete without a keep-list: an empty set here would otherwise
        // mean "delete every user".
        if keep.is_empty() {
            if keep_count < 1 {
                warn!(keep_count, "keep count below 1, skipping deletion");
            } else {
                debug!(keep_count, "user table empty, nothing to do");
            }
            return Ok(EvictionResult::skipped(keep_count));
        }

        let deleted = self.users.delete_all_except(&keep)?;
        info!(keep_count, retained = keep.len(), deleted, "eviction run complete");
        Ok(EvictionResult {
            keep_count,
            retained_count: keep.len(),
            deleted_count: deleted,
            skipped: false,
        })
    }
}
