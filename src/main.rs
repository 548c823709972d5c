//! Quill background worker service.
//!
//! Wires the storage layer, task queue, event processors, and pipelines
//! together, then runs the worker pool until shutdown is signaled.

mod config;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use config::Config;
use quill_core::{storage::Storage, RealClock};
use quill_delivery::{
    DeliverWebhookTask, PostgresDeliveryStore, WebhookClient, WebhookProcessor,
};
use quill_pipelines::{
    ExportTask, ExportsProcessor, ImportCleanupTask, ImportTask, ImportsProcessor,
    LocalFileStore, PostgresPipelineStore,
};
use quill_processors::{
    BacklinksProcessor, DispatchEventTask, EventBus, NotificationsProcessor,
    PostgresWorkspaceStore, ProcessEventTask, ProcessorRegistry, RevisionsProcessor,
    UserLifecycleProcessor,
};
use quill_queue::{PostgresQueue, TaskEngine, TaskRegistry, TaskScheduler};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("starting Quill worker service");

    let config = Config::load()?;
    info!(
        database_url = %config.database_url_masked(),
        worker_count = config.worker_count,
        batch_size = config.worker_batch_size,
        "configuration loaded"
    );

    let pool = create_database_pool(&config).await?;
    run_migrations(&pool).await?;
    info!("database ready");

    let clock = Arc::new(RealClock::new());
    let storage = Arc::new(Storage::new(pool.clone()));
    let queue = Arc::new(PostgresQueue::new(pool.clone()));
    let scheduler = TaskScheduler::new(queue.clone(), clock.clone());
    let bus = EventBus::new(scheduler.clone());

    let workspace_store = Arc::new(PostgresWorkspaceStore::new(storage.clone()));
    let delivery_store = Arc::new(PostgresDeliveryStore::new(storage.clone()));
    let pipeline_store = Arc::new(PostgresPipelineStore::new(storage.clone()));
    let file_store = Arc::new(LocalFileStore::new(&config.file_storage_root));
    let webhook_client = Arc::new(
        WebhookClient::new(config.to_client_config())
            .context("failed to build webhook client")?,
    );

    let mut processors = ProcessorRegistry::new();
    processors.register(Arc::new(RevisionsProcessor::with_debounce_delay(
        workspace_store.clone(),
        bus.clone(),
        config.debounce_delay(),
    )));
    processors.register(Arc::new(BacklinksProcessor::new(workspace_store.clone())));
    processors.register(Arc::new(NotificationsProcessor::new(workspace_store.clone())));
    processors.register(Arc::new(UserLifecycleProcessor::new(workspace_store.clone())));
    processors.register(Arc::new(WebhookProcessor::new(
        delivery_store.clone(),
        scheduler.clone(),
    )));
    processors.register(Arc::new(ImportsProcessor::new(scheduler.clone())));
    processors.register(Arc::new(ExportsProcessor::new(scheduler.clone())));
    let processors = Arc::new(processors);
    info!(processors = ?processors.processor_names(), "processors registered");

    let mut tasks = TaskRegistry::new();
    tasks.register(DispatchEventTask::new(processors.clone(), scheduler.clone()));
    tasks.register(ProcessEventTask::new(processors.clone()));
    tasks.register(DeliverWebhookTask::new(
        delivery_store.clone(),
        webhook_client,
        clock.clone(),
    ));
    tasks.register(ImportTask::new(
        pipeline_store.clone(),
        file_store.clone(),
        scheduler.clone(),
        clock.clone(),
    ));
    tasks.register(ImportCleanupTask::new(
        pipeline_store.clone(),
        file_store.clone(),
        clock.clone(),
    ));
    tasks.register(ExportTask::new(pipeline_store.clone(), file_store, clock.clone()));
    tasks.register(quill_pipelines::CleanupDeletedDocumentsTask::new(
        pipeline_store,
        clock.clone(),
    ));

    let mut engine =
        TaskEngine::new(queue, Arc::new(tasks), config.to_worker_config(), clock);
    engine.start().await.context("failed to start task engine")?;

    info!("Quill worker is processing jobs");

    shutdown_signal().await;
    info!("shutdown signal received, draining workers");

    engine.shutdown().await.context("graceful shutdown failed")?;
    pool.close().await;

    info!("Quill worker shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,quill=debug"))
        .expect("invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with startup retry.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("failed to verify database connection")?;
                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(attempt = retries, max_retries = MAX_RETRIES, "database not ready, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("failed to create database connection pool");
            },
        }
    }
}

/// Ensures the schema this subsystem needs exists.
async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            active_user_count INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            team_id UUID NOT NULL REFERENCES teams(id),
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            suspended_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            id UUID PRIMARY KEY,
            team_id UUID NOT NULL REFERENCES teams(id),
            name TEXT NOT NULL,
            source_id TEXT,
            import_id UUID,
            created_by UUID NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            deleted_at TIMESTAMPTZ,
            UNIQUE(import_id, source_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id UUID PRIMARY KEY,
            team_id UUID NOT NULL REFERENCES teams(id),
            collection_id UUID NOT NULL REFERENCES collections(id),
            title TEXT NOT NULL,
            text TEXT NOT NULL,
            source_id TEXT,
            import_id UUID,
            created_by UUID NOT NULL,
            published_at TIMESTAMPTZ,
            deleted_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE(import_id, source_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS revisions (
            id UUID PRIMARY KEY,
            document_id UUID NOT NULL REFERENCES documents(id),
            title TEXT NOT NULL,
            text TEXT NOT NULL,
            created_by UUID NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS relationships (
            id UUID PRIMARY KEY,
            document_id UUID NOT NULL,
            target_document_id UUID NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE(document_id, target_document_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL,
            actor_id UUID,
            document_id UUID,
            kind TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS webhook_subscriptions (
            id UUID PRIMARY KEY,
            team_id UUID NOT NULL REFERENCES teams(id),
            created_by UUID NOT NULL,
            url TEXT NOT NULL,
            secret TEXT,
            events TEXT[] NOT NULL,
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            deleted_at TIMESTAMPTZ
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS webhook_deliveries (
            id UUID PRIMARY KEY,
            subscription_id UUID NOT NULL REFERENCES webhook_subscriptions(id),
            status TEXT NOT NULL,
            status_code INTEGER,
            request_body JSONB NOT NULL,
            response_body TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS imports (
            id UUID PRIMARY KEY,
            team_id UUID NOT NULL REFERENCES teams(id),
            created_by UUID NOT NULL,
            state TEXT NOT NULL,
            input_key TEXT NOT NULL,
            error TEXT,
            document_count INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS file_operations (
            id UUID PRIMARY KEY,
            team_id UUID NOT NULL REFERENCES teams(id),
            user_id UUID NOT NULL,
            state TEXT NOT NULL,
            key TEXT NOT NULL,
            size BIGINT NOT NULL DEFAULT 0,
            error TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS attachments (
            id UUID PRIMARY KEY,
            team_id UUID NOT NULL REFERENCES teams(id),
            document_id UUID,
            import_id UUID,
            key TEXT NOT NULL,
            content_type TEXT NOT NULL,
            size BIGINT NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            task_name TEXT NOT NULL,
            props JSONB NOT NULL,
            priority SMALLINT NOT NULL,
            attempt INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL,
            base_delay_ms BIGINT NOT NULL,
            max_delay_ms BIGINT NOT NULL,
            jitter_factor DOUBLE PRECISION NOT NULL,
            backoff_strategy TEXT NOT NULL,
            scheduled_at TIMESTAMPTZ NOT NULL,
            state TEXT NOT NULL,
            last_error TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_jobs_claim
        ON jobs(priority DESC, scheduled_at ASC)
        WHERE state = 'pending'
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_webhook_deliveries_subscription
        ON webhook_deliveries(subscription_id, created_at DESC)
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_documents_deleted
        ON documents(deleted_at)
        WHERE deleted_at IS NOT NULL
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await.context("migration statement failed")?;
    }

    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received CTRL+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
