use chrono::{DateTime, Utc};
use procura_core::calendar::BusinessCalendar;
use procura_core::config::{AppConfig, LoadOptions};
use procura_core::notifications::dispatcher_from_config;
use procura_core::{JobName, Notifier, ReminderScheduler};
use procura_db::{connect_with_config, migrations, sql_ports};

use crate::commands::{runtime, CommandResult};

/// Runs one sweep against the configured database and dispatcher.
///
/// Item failures still exit 0; the report lists them. Only a sweep that
/// could not load its working set exits non-zero.
pub fn run(job: JobName, now: DateTime<Utc>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "sweep",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match runtime("sweep") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let dispatcher = dispatcher_from_config(&config.notifications)
            .map_err(|error| ("dispatcher", error.to_string(), 2u8))?;
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let ports = sql_ports(pool.clone(), dispatcher);
        let notifier =
            Notifier::from_ports(&ports).map_err(|error| ("templates", error.to_string(), 6u8))?;
        let calendar = BusinessCalendar::with_offset_hours(config.scheduler.utc_offset_hours);
        let report = ReminderScheduler::new(ports, notifier, calendar).run_job(job, now).await;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(report)
    });

    let report = match result {
        Ok(report) => report,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("sweep", error_class, message, exit_code);
        }
    };

    let details = serde_json::to_value(&report).ok();
    let summary = format!(
        "{job}: scanned {}, notified {}, skipped {}, deactivated {}, errors {}",
        report.stats.scanned,
        report.stats.notified,
        report.stats.skipped,
        report.stats.deactivated,
        report.stats.errors.len()
    );
    if report.success {
        CommandResult::success_with_details("sweep", summary, details)
    } else {
        let message = report.error.clone().unwrap_or(summary);
        CommandResult::failure_with_details("sweep", "sweep_start", message, 7, details)
    }
}
