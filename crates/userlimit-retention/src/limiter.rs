use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use userlimit_core::config::DefaultsConfig;
use userlimit_core::types::{OptionKey, RetentionSettings, ScheduleInterval, USER_CHECK_HOOK};
use userlimit_options::{OptionChange, OptionsStore};
use userlimit_scheduler::{Job, SchedulerHandle};
use userlimit_users::UserStore;

use crate::error::Result;
use crate::executor::{EvictionResult, RetentionExecutor};

/// Current settings plus the scheduled job, if any.
#[derive(Debug, Clone, Serialize)]
pub struct LimiterStatus {
    pub active: bool,
    pub settings: RetentionSettings,
    pub job: Option<Job>,
}

/// What the startup self-heal did to the eviction job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobCheck {
    /// Not activated; no job was created.
    Inactive,
    /// A job with the stored interval already existed.
    Unchanged,
    /// The job was missing and has been created.
    Created(Job),
    /// The job ran on a stale interval and has been replaced.
    Rescheduled { job: Job, previous: ScheduleInterval },
}

/// The component a host drives.
///
/// Owns the settings store, the scheduler handle and the executor, and keeps
/// them consistent: after any interval change returns, the scheduled job's
/// interval matches the stored one.
pub struct UserLimiter {
    options: Arc<OptionsStore>,
    scheduler: SchedulerHandle,
    executor: RetentionExecutor,
    defaults: DefaultsConfig,
    // held across activation changes and scheduled runs
    lifecycle: Mutex<()>,
}

impl UserLimiter {
    pub fn new(
        options: Arc<OptionsStore>,
        scheduler: SchedulerHandle,
        users: Arc<dyn UserStore>,
        defaults: DefaultsConfig,
    ) -> Self {
        let executor = RetentionExecutor::new(Arc::clone(&options), users);
        Self {
            options,
            scheduler,
            executor,
            defaults,
            lifecycle: Mutex::new(()),
        }
    }

    /// Seed missing settings and make sure the eviction job exists.
    #[instrument(skip(self))]
    pub fn on_activate(&self) -> Result<()> {
        let _guard = self.lifecycle();
        self.options.initialize_defaults(
            self.defaults.keep_count(),
            self.defaults.schedule_interval,
        )?;
        self.options.mark_active()?;
        self.sync_job()?;
        info!("user limiter activated");
        Ok(())
    }

    /// Cancel the eviction job and forget both settings. Stays inactive,
    /// across restarts too, until the next [`on_activate`](Self::on_activate).
    #[instrument(skip(self))]
    pub fn on_deactivate(&self) -> Result<()> {
        let _guard = self.lifecycle();
        self.options.mark_inactive()?;
        self.scheduler.cancel(USER_CHECK_HOOK)?;
        self.options.clear()?;
        info!("user limiter deactivated");
        Ok(())
    }

    /// React to a stored setting having changed. Only the interval matters;
    /// the keep count is read fresh by every run.
    pub fn on_config_changed(&self, key: OptionKey, new_value: &str) -> Result<()> {
        if key == OptionKey::ScheduleInterval {
            info!(interval = %new_value, "schedule interval changed, rescheduling");
            self.reschedule()?;
        }
        Ok(())
    }

    /// Validate and store a setting, then apply its side effects before returning.
    pub fn update_option(&self, key: &str, value: &str) -> Result<OptionChange> {
        let change = self.options.set(key, value)?;
        if change.changed {
            self.on_config_changed(change.key, &change.new)?;
        }
        Ok(change)
    }

    /// Replace the eviction job using the currently stored interval.
    pub fn reschedule(&self) -> Result<Job> {
        let interval = self.options.schedule_interval();
        Ok(self.scheduler.reschedule(USER_CHECK_HOOK, interval)?)
    }

    /// Startup self-heal. Call on every start.
    ///
    /// Does nothing unless activated. Otherwise recreates a missing job and
    /// replaces one whose interval no longer matches the stored setting.
    #[instrument(skip(self))]
    pub fn ensure_scheduled(&self) -> Result<JobCheck> {
        let _guard = self.lifecycle();
        if !self.options.is_active()? {
            debug!("limiter not activated, nothing to schedule");
            return Ok(JobCheck::Inactive);
        }
        self.sync_job()
    }

    /// Run one eviction pass immediately.
    pub fn run_now(&self) -> Result<EvictionResult> {
        self.executor.run()
    }

    /// Whether `job` is still the live eviction job: the limiter is active and
    /// the stored job carries the same id.
    pub fn is_current(&self, job: &Job) -> Result<bool> {
        if !self.options.is_active()? {
            return Ok(false);
        }
        let current = self.scheduler.job(USER_CHECK_HOOK)?;
        Ok(current.is_some_and(|current| current.id == job.id))
    }

    /// Run the eviction for a scheduler firing. Returns `None` without
    /// touching users when the firing is stale (job cancelled or replaced).
    pub fn run_fired(&self, job: &Job) -> Result<Option<EvictionResult>> {
        let _guard = self.lifecycle();
        if !self.is_current(job)? {
            return Ok(None);
        }
        self.executor.run().map(Some)
    }

    pub fn status(&self) -> Result<LimiterStatus> {
        Ok(LimiterStatus {
            active: self.options.is_active()?,
            settings: self.options.snapshot(),
            job: self.scheduler.job(USER_CHECK_HOOK)?,
        })
    }

    pub fn options(&self) -> &OptionsStore {
        &self.options
    }

    fn sync_job(&self) -> Result<JobCheck> {
        let interval = self.options.schedule_interval();
        match self.scheduler.job(USER_CHECK_HOOK)? {
            Some(job) if job.interval == interval => Ok(JobCheck::Unchanged),
            Some(job) => {
                warn!(
                    job_id = %job.id,
                    scheduled = %job.interval,
                    stored = %interval,
                    "job interval out of step with settings, rescheduling"
                );
                let previous = job.interval;
                let job = self.scheduler.reschedule(USER_CHECK_HOOK, interval)?;
                Ok(JobCheck::Rescheduled { job, previous })
            }
            None => Ok(self
                .scheduler
                .ensure_scheduled(USER_CHECK_HOOK, interval)?
                .map_or(JobCheck::Unchanged, JobCheck::Created)),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
