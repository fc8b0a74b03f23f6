use std::sync::Arc;

use procura_core::audit::TracingAuditSink;
use procura_core::calendar::BusinessCalendar;
use procura_core::config::{AppConfig, ConfigError, LoadOptions};
use procura_core::notifications::{dispatcher_from_config, NotifyError};
use procura_core::ports::{DispatchError, Ports};
use procura_core::{Notifier, ReminderScheduler, VendorApprovalLifecycle, VendorService, WorkflowService};
use procura_db::{connect_with_config, migrations, sql_ports, DbPool};
use thiserror::Error;
use tracing::info;

/// Everything the server runs, wired from one loaded config.
pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub ports: Ports,
    pub workflow: WorkflowService,
    pub scheduler: ReminderScheduler,
    pub vendors: VendorService,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("notification dispatcher setup failed: {0}")]
    Dispatcher(#[from] DispatchError),
    #[error("notification templates failed to load: {0}")]
    Templates(#[from] NotifyError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let dispatcher = dispatcher_from_config(&config.notifications)?;
    info!(
        event_name = "system.bootstrap.dispatcher_ready",
        correlation_id = "bootstrap",
        provider = ?config.notifications.provider,
        "notification dispatcher configured"
    );

    let ports = sql_ports(db_pool.clone(), dispatcher);
    let notifier = Notifier::from_ports(&ports)?;
    let calendar = BusinessCalendar::with_offset_hours(config.scheduler.utc_offset_hours);
    let lifecycle = VendorApprovalLifecycle::new(calendar);

    let workflow = WorkflowService::new(ports.clone(), notifier.clone(), Arc::new(TracingAuditSink))
        .with_lifecycle(lifecycle);
    let scheduler = ReminderScheduler::new(ports.clone(), notifier, calendar);
    let vendors = VendorService::new(ports.clone(), lifecycle);

    Ok(Application { config, db_pool, ports, workflow, scheduler, vendors })
}

#[cfg(test)]
mod tests {
    use procura_core::config::{ConfigOverrides, LoadOptions, NotificationProvider};
    use procura_core::domain::purchase_request::{PrStatus, PurchaseRequest, PurchaseRequestId};
    use procura_core::domain::organization::OrganizationId;
    use procura_core::domain::user::UserId;
    use procura_core::JobName;

    use crate::bootstrap::bootstrap;

    fn options(database_url: &str, provider: NotificationProvider) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                notification_provider: Some(provider),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_when_http_provider_lacks_endpoint() {
        let result = bootstrap(options("sqlite::memory:", NotificationProvider::Http)).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("notifications.endpoint"), "unexpected message: {message}");
    }

    #[tokio::test]
    async fn bootstrap_wires_sqlite_stores_into_services() {
        let app = bootstrap(options("sqlite::memory:", NotificationProvider::Log))
            .await
            .expect("bootstrap should succeed with log provider");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('purchase_requests', 'vendors', 'notification_logs')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("document tables should exist after bootstrap");
        assert_eq!(table_count, 3);

        let draft = PurchaseRequest::draft(
            PurchaseRequestId("pr-1".to_string()),
            "PR-0001",
            OrganizationId("org-1".to_string()),
            UserId("requestor".to_string()),
            chrono::Utc::now(),
        );
        app.ports.purchase_requests.insert(draft).await.expect("insert");
        let loaded = app.workflow.get(&PurchaseRequestId("pr-1".to_string())).await.expect("get");
        assert_eq!(loaded.status, PrStatus::Draft);

        let report = app.scheduler.run_job(JobName::DailyReminders, chrono::Utc::now()).await;
        assert!(report.success);

        app.db_pool.close().await;
    }
}
