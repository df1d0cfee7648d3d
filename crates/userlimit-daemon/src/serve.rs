use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use userlimit_retention::{run_worker, JobCheck};
use userlimit_scheduler::{Job, SchedulerEngine};

use crate::app::App;

/// Run the engine and worker until Ctrl-C.
///
/// On startup the eviction job is recreated if it has gone missing, or
/// realigned if its interval drifted from the stored setting. A deactivated
/// limiter schedules nothing and the engine idles until `activate`. On
/// shutdown the engine stops first; the worker finishes any in-flight run and
/// exits when the fired-job channel closes.
pub async fn serve(app: App) -> anyhow::Result<()> {
    match app.limiter.ensure_scheduled()? {
        JobCheck::Inactive => warn!("user limiter not activated, no evictions will run"),
        JobCheck::Unchanged => {}
        JobCheck::Created(job) => {
            warn!(job_id = %job.id, next_run = %job.next_run, "eviction job was missing, recreated");
        }
        JobCheck::Rescheduled { job, previous } => warn!(
            job_id = %job.id,
            %previous,
            interval = %job.interval,
            "eviction job realigned with stored interval"
        ),
    }

    // Capacity 1: at most one firing waits while a run is in progress.
    let (fired_tx, fired_rx) = mpsc::channel::<Job>(1);
    let engine = SchedulerEngine::new(
        app.connection()?,
        fired_tx,
        app.config.scheduler.poll_interval(),
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_task = tokio::spawn(engine.run(shutdown_rx));
    let worker_task = tokio::spawn(run_worker(Arc::clone(&app.limiter), fired_rx));

    let status = app.limiter.status()?;
    info!(
        active = status.active,
        keep_count = status.settings.keep_count,
        interval = %status.settings.schedule_interval,
        next_run = ?status.job.as_ref().map(|j| j.next_run),
        "userlimit service running"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    // signal scheduler to stop
    let _ = shutdown_tx.send(true);
    engine_task.await?;
    worker_task.await?;
    info!("userlimit service stopped");
    Ok(())
}
