use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use userlimit_core::types::USER_CHECK_HOOK;
use userlimit_scheduler::Job;

use crate::limiter::UserLimiter;

/// Consume scheduler firings and run the eviction for each, one at a time.
///
/// Each run is awaited before the next firing is received, so runs never
/// overlap. A firing whose job was cancelled or replaced after it was queued
/// is dropped without a run. A failed run is logged and the loop carries on. Returns once the
/// channel closes and any in-flight run has finished.
pub async fn run_worker(limiter: Arc<UserLimiter>, mut fired_rx: mpsc::Receiver<Job>) {
    info!("retention worker started");
    while let Some(job) = fired_rx.recv().await {
        if job.hook != USER_CHECK_HOOK {
            warn!(job_id = %job.id, hook = %job.hook, "unexpected hook, ignoring");
            continue;
        }

        let limiter = Arc::clone(&limiter);
        let fired = job.clone();
        match tokio::task::spawn_blocking(move || limiter.run_fired(&fired)).await {
            Ok(Ok(None)) => {
                info!(job_id = %job.id, "job cancelled or replaced since firing, run dropped");
            }
            Ok(Ok(Some(result))) if result.skipped => {
                debug!(job_id = %job.id, run = job.run_count, "eviction skipped");
            }
            Ok(Ok(Some(result))) => {
                info!(
                    job_id = %job.id,
                    run = job.run_count,
                    retained = result.retained_count,
                    deleted = result.deleted_count,
                    "scheduled eviction finished"
                );
            }
            Ok(Err(e)) => error!(job_id = %job.id, error = %e, "scheduled eviction failed"),
            Err(e) => error!(job_id = %job.id, error = %e, "eviction task panicked"),
        }
    }
    info!("retention worker stopped");
}
