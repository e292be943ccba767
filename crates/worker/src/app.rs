use std::sync::Arc;

use anyhow::Context;

use taskboard_infra::config::WorkerConfig;
use taskboard_infra::document_store::{DocumentStore, InMemoryDocumentStore, PostgresDocumentStore};
use taskboard_infra::notifications::{
    ListenerHandle, ListenerStats, MemberAddedNotifier, NotificationDispatcher, TracingDispatcher,
};
use taskboard_infra::penalties::{EnforcementJob, SchedulerHandle, SchedulerStats};

/// Open the document store selected by `config`.
///
/// With `DATABASE_URL` set this connects to Postgres, creates the schema and
/// starts forwarding created-document notifications for the life of the
/// process; otherwise it falls back to an in-memory store that is lost on exit.
pub async fn connect_store(config: &WorkerConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresDocumentStore::connect(url, config.database_max_connections)
                .await
                .context("failed to connect to Postgres")?;
            store
                .ensure_schema()
                .await
                .context("failed to create document schema")?;
            store
                .listen_for_changes()
                .await
                .context("failed to listen for created documents")?;
            tracing::info!("using Postgres document store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory document store");
            Ok(Arc::new(InMemoryDocumentStore::new()))
        }
    }
}

/// Running worker: the penalty scheduler and the member-added listener.
#[derive(Debug)]
pub struct Worker {
    scheduler: SchedulerHandle,
    notifications: ListenerHandle,
}

impl Worker {
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub fn notification_stats(&self) -> ListenerStats {
        self.notifications.stats()
    }

    /// Stop both loops, waiting for in-flight penalty runs.
    pub async fn shutdown(self) {
        self.notifications.shutdown().await;
        self.scheduler.shutdown().await;
    }
}

/// Start the worker, delivering notifications through the log.
pub fn start(config: &WorkerConfig, store: Arc<dyn DocumentStore>) -> Worker {
    start_with_dispatcher(config, store, Arc::new(TracingDispatcher))
}

/// Start the penalty scheduler and the member-added listener.
pub fn start_with_dispatcher(
    config: &WorkerConfig,
    store: Arc<dyn DocumentStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
) -> Worker {
    let created = store.subscribe_created();
    let notifications =
        Arc::new(MemberAddedNotifier::new(store.clone(), dispatcher)).spawn_listener(created);

    let job = EnforcementJob::new(store).with_config(config.job_config());
    let scheduler = config.scheduler().spawn(Arc::new(job));

    Worker {
        scheduler,
        notifications,
    }
}
