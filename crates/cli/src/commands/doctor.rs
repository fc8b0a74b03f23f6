use procura_core::config::{AppConfig, LoadOptions};
use procura_core::notifications::dispatcher_from_config;
use procura_core::{CronSchedule, JobName};
use procura_db::{connect_with_config, migrations};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_notification_dispatcher(&config));
            checks.push(check_job_schedules(&config));
            checks.push(check_database_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["notification_dispatcher", "job_schedules", "database_connectivity"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_notification_dispatcher(config: &AppConfig) -> DoctorCheck {
    match dispatcher_from_config(&config.notifications) {
        Ok(_) => DoctorCheck {
            name: "notification_dispatcher",
            status: CheckStatus::Pass,
            details: format!(
                "{:?} dispatcher ready, sending as `{}`",
                config.notifications.provider, config.notifications.from_address
            ),
        },
        Err(error) => DoctorCheck {
            name: "notification_dispatcher",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_job_schedules(config: &AppConfig) -> DoctorCheck {
    let invalid: Vec<String> = JobName::ALL
        .into_iter()
        .filter_map(|job| {
            CronSchedule::parse(config.scheduler.cron_for(job))
                .err()
                .map(|reason| format!("{job}: {reason}"))
        })
        .collect();

    if !invalid.is_empty() {
        return DoctorCheck {
            name: "job_schedules",
            status: CheckStatus::Fail,
            details: invalid.join("; "),
        };
    }

    let state = if config.scheduler.enabled { "enabled" } else { "disabled" };
    DoctorCheck {
        name: "job_schedules",
        status: CheckStatus::Pass,
        details: format!(
            "{} schedules parsed, scheduler {state} at UTC{:+}",
            JobName::ALL.len(),
            config.scheduler.utc_offset_hours
        ),
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!(
                "connected using `{}`; {} embedded migration(s)",
                config.database.url,
                migrations::known_versions().len()
            ),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
