use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::document_store::{CreatedDocuments, DocumentStore};
use crate::penalties::records;

use super::dispatcher::NotificationDispatcher;
use super::member_added::{MemberAddedNotifier, NotificationOutcome};

/// Cumulative listener statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListenerStats {
    /// Member documents seen on the feed
    pub members_added: u64,
    pub sent: u64,
    /// User missing, opted out, no token, or delivery failed
    pub not_sent: u64,
    /// Store reads failed before an outcome was reached
    pub errors: u64,
    /// Feed events dropped because the listener fell behind
    pub missed: u64,
}

/// Handle for a running member-added listener.
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: Arc<Notify>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<ListenerStats>>,
}

impl ListenerHandle {
    /// Stop listening once the notification in progress, if any, is done.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                error!(error = %e, "member-added listener ended abnormally");
            }
        }
    }

    pub fn stats(&self) -> ListenerStats {
        lock(&self.stats).clone()
    }
}

impl<S, D> MemberAddedNotifier<S, D>
where
    S: DocumentStore + ?Sized + 'static,
    D: NotificationDispatcher + ?Sized + 'static,
{
    /// Run the trigger for every `members_details` document on `created`.
    ///
    /// Events are handled one at a time in feed order; other paths are ignored.
    pub fn spawn_listener(self: Arc<Self>, created: CreatedDocuments) -> ListenerHandle {
        let shutdown = Arc::new(Notify::new());
        let stats = Arc::new(Mutex::new(ListenerStats::default()));

        let join = tokio::spawn(listen(self, created, shutdown.clone(), stats.clone()));

        ListenerHandle {
            shutdown,
            join: Some(join),
            stats,
        }
    }
}

async fn listen<S, D>(
    notifier: Arc<MemberAddedNotifier<S, D>>,
    mut created: CreatedDocuments,
    shutdown: Arc<Notify>,
    stats: Arc<Mutex<ListenerStats>>,
) where
    S: DocumentStore + ?Sized,
    D: NotificationDispatcher + ?Sized,
{
    info!("member-added listener started");

    loop {
        let path = tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            event = created.recv() => match event {
                Ok(path) => path,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "member-added listener fell behind the change feed");
                    lock(&stats).missed += skipped;
                    continue;
                }
                Err(RecvError::Closed) => {
                    info!("change feed closed");
                    break;
                }
            },
        };

        let Some((board_id, member_id)) = records::parse_member_path(&path) else {
            debug!(path = %path, "ignoring created document");
            continue;
        };

        lock(&stats).members_added += 1;
        let outcome = notifier.on_member_added(&board_id, &member_id).await;

        let mut counts = lock(&stats);
        match outcome {
            Ok(NotificationOutcome::Sent) => counts.sent += 1,
            Ok(_) => counts.not_sent += 1,
            Err(e) => {
                error!(board_id = %board_id, member_id = %member_id, error = %e, "member-added trigger failed");
                counts.errors += 1;
            }
        }
    }

    info!("member-added listener stopped");
}

fn lock(stats: &Mutex<ListenerStats>) -> std::sync::MutexGuard<'_, ListenerStats> {
    stats.lock().unwrap_or_else(|e| e.into_inner())
}
