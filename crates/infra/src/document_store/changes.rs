//! Document-created notifications.
//!
//! Stores publish the path of every document a commit creates. The feed is a
//! lossy broadcast: a subscriber that falls more than `CAPACITY` events behind
//! sees `RecvError::Lagged` and skips ahead. Updates to existing documents are
//! not published.

use tokio::sync::broadcast;

use super::path::DocumentPath;

/// Receiving end of a change feed.
pub type CreatedDocuments = broadcast::Receiver<DocumentPath>;

/// Fan-out of created-document paths to every subscriber.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<DocumentPath>,
}

impl ChangeFeed {
    pub const CAPACITY: usize = 1024;

    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(Self::CAPACITY);
        Self { tx }
    }

    /// Publish a created path. Dropped when nobody is subscribed.
    pub fn publish_created(&self, path: DocumentPath) {
        let _ = self.tx.send(path);
    }

    /// Receive paths created after this call.
    pub fn subscribe(&self) -> CreatedDocuments {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_each_path() {
        let feed = ChangeFeed::new();
        let mut first = feed.subscribe();
        let mut second = feed.subscribe();

        let path = DocumentPath::parse("boards/b1/members_details/m1").unwrap();
        feed.publish_created(path.clone());

        assert_eq!(first.recv().await.unwrap(), path);
        assert_eq!(second.recv().await.unwrap(), path);
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        ChangeFeed::new().publish_created(DocumentPath::parse("tasks/t1").unwrap());
    }
}
