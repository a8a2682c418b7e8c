use tokio::sync::mpsc;

use crate::app::SyncError;
use crate::domain::Post;

/// Receives the results of a sync run.
///
/// Callbacks arrive one at a time from the run's task, in page order.
/// Calling [`Syncer::stop`](super::Syncer::stop) from inside a callback is
/// allowed.
pub trait SyncDelegate: Send + Sync {
    fn on_post_fetched(&self, post: Post);
    fn on_sync_completed(&self);
    fn on_sync_stopped(&self);
    fn on_sync_failed(&self, error: SyncError);
}

#[derive(Debug)]
pub enum SyncEvent {
    PostFetched(Post),
    Completed,
    Stopped,
    Failed(SyncError),
}

impl SyncEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncEvent::PostFetched(_))
    }
}

/// Forwards every callback into an unbounded channel.
pub struct ChannelDelegate {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelDelegate {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SyncEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Sync event receiver dropped");
        }
    }
}

impl SyncDelegate for ChannelDelegate {
    fn on_post_fetched(&self, post: Post) {
        self.send(SyncEvent::PostFetched(post));
    }

    fn on_sync_completed(&self) {
        self.send(SyncEvent::Completed);
    }

    fn on_sync_stopped(&self) {
        self.send(SyncEvent::Stopped);
    }

    fn on_sync_failed(&self, error: SyncError) {
        self.send(SyncEvent::Failed(error));
    }
}
