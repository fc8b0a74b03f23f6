//! Cron-driven job runner.
//!
//! Every tick checks each job's schedule against the local wall clock and
//! runs the due sweeps one after another. A job never fires twice in the
//! same minute slot, however short the tick.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use procura_core::config::SchedulerConfig;
use procura_core::{CronSchedule, JobName, ReminderScheduler, SweepReport};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobConfigError {
    #[error("invalid cron expression for {job}: {reason}")]
    Cron { job: JobName, reason: String },
}

pub struct JobRunner {
    scheduler: ReminderScheduler,
    offset: FixedOffset,
    tick: Duration,
    schedules: Vec<(JobName, CronSchedule)>,
}

impl JobRunner {
    pub fn from_config(
        config: &SchedulerConfig,
        scheduler: ReminderScheduler,
    ) -> Result<Self, JobConfigError> {
        let mut schedules = Vec::with_capacity(JobName::ALL.len());
        for job in JobName::ALL {
            let schedule = CronSchedule::parse(config.cron_for(job))
                .map_err(|reason| JobConfigError::Cron { job, reason })?;
            schedules.push((job, schedule));
        }
        Ok(Self {
            offset: scheduler.calendar().offset(),
            scheduler,
            tick: Duration::from_secs(config.tick_secs.max(1)),
            schedules,
        })
    }

    /// Runs every job due at `now` and returns their reports.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Vec<SweepReport> {
        let mut reports = Vec::new();
        for (job, schedule) in &mut self.schedules {
            if !schedule.should_fire(now, self.offset) {
                continue;
            }
            schedule.mark_fired(now);
            info!(event_name = "scheduler.job_fired", job = %job, correlation_id = %job, "scheduled job due");

            let report = self.scheduler.run_job(*job, now).await;
            if !report.success {
                error!(
                    event_name = "scheduler.job_failed",
                    job = %job,
                    error = report.error.as_deref().unwrap_or("unknown"),
                    "scheduled job could not start"
                );
            }
            reports.push(report);
        }
        reports
    }

    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(
                event_name = "scheduler.started",
                correlation_id = "bootstrap",
                tick_secs = self.tick.as_secs(),
                jobs = self.schedules.len(),
                "job runner started"
            );
            loop {
                interval.tick().await;
                self.tick(Utc::now()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use procura_core::calendar::BusinessCalendar;
    use procura_core::config::AppConfig;
    use procura_core::ports::memory::MemoryPorts;
    use procura_core::{JobName, Notifier, ReminderScheduler};

    use super::{JobConfigError, JobRunner};

    fn scheduler() -> ReminderScheduler {
        let ports = MemoryPorts::default().ports();
        let notifier = Notifier::from_ports(&ports).expect("notifier");
        ReminderScheduler::new(ports, notifier, BusinessCalendar::default())
    }

    #[tokio::test]
    async fn due_jobs_fire_once_per_minute_slot() {
        let config = AppConfig::default().scheduler;
        let mut runner = JobRunner::from_config(&config, scheduler()).expect("runner");

        // 09:00 in UTC+2: delivery-delay and quote-conflict are both due.
        let nine_local = Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 10).unwrap();
        let jobs: Vec<JobName> = runner.tick(nine_local).await.into_iter().map(|report| report.job).collect();
        assert_eq!(jobs, vec![JobName::DeliveryDelayCheck, JobName::QuoteConflictReminder]);

        assert!(runner.tick(nine_local + Duration::seconds(30)).await.is_empty());
        assert!(runner.tick(nine_local + Duration::minutes(1)).await.is_empty());
        assert_eq!(runner.tick(nine_local + Duration::days(1)).await.len(), 2);
    }

    #[test]
    fn invalid_cron_is_reported_with_its_job() {
        let mut config = AppConfig::default().scheduler;
        config.urgent_reminders = "0 25 * * *".to_string();

        let error = JobRunner::from_config(&config, scheduler()).err().expect("invalid");
        assert!(matches!(error, JobConfigError::Cron { job: JobName::UrgentReminders, .. }));
    }
}
