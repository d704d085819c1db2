use futures::{future::BoxFuture, stream, Stream};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::warn;

use crate::error::AppError;

const FEED_CAPACITY: usize = 256;

/// A committed write that may change what a live query returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Trips { owner_id: String },
    Activities { trip_id: String },
}

/// Process-wide fan-out of committed changes. Repositories publish after
/// every commit; live queries listen and re-read.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<Change>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, change: Change) {
        // No receivers simply means nobody is watching right now.
        let _ = self.sender.send(change);
    }

    pub fn listen(&self) -> broadcast::Receiver<Change> {
        self.sender.subscribe()
    }

    pub fn watchers(&self) -> usize {
        self.sender.receiver_count()
    }
}

type Loader<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, AppError>> + Send + Sync>;
type Filter = Box<dyn Fn(&Change) -> bool + Send + Sync>;

/// A live query: the current snapshot first, then a fresh snapshot after
/// every relevant change, in publication order.
pub struct Subscription<T> {
    receiver: Option<broadcast::Receiver<Change>>,
    relevant: Filter,
    load: Loader<T>,
    primed: bool,
}

impl<T: Send + 'static> Subscription<T> {
    pub fn new<F, L>(feed: &ChangeFeed, relevant: F, load: L) -> Self
    where
        F: Fn(&Change) -> bool + Send + Sync + 'static,
        L: Fn() -> BoxFuture<'static, Result<T, AppError>> + Send + Sync + 'static,
    {
        Self {
            receiver: Some(feed.listen()),
            relevant: Box::new(relevant),
            load: Box::new(load),
            primed: false,
        }
    }

    /// Waits for the next snapshot. `None` once unsubscribed or when the feed
    /// is gone.
    pub async fn next(&mut self) -> Option<Result<T, AppError>> {
        let receiver = self.receiver.as_mut()?;
        if !self.primed {
            self.primed = true;
            return Some((self.load)().await);
        }
        loop {
            match receiver.recv().await {
                Ok(change) if (self.relevant)(&change) => return Some((self.load)().await),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    // One fresh read supersedes everything still queued.
                    let mut drained = 0usize;
                    loop {
                        match receiver.try_recv() {
                            Ok(_) => drained += 1,
                            Err(TryRecvError::Lagged(more)) => drained += more as usize,
                            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                        }
                    }
                    warn!(skipped, drained, "live query lagged behind the change feed");
                    return Some((self.load)().await);
                }
                Err(RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }

    /// Stops listening. Dropping the subscription has the same effect.
    pub fn unsubscribe(&mut self) {
        self.receiver = None;
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<T, AppError>> + Send + 'static {
        stream::unfold(self, |mut subscription| async move {
            subscription
                .next()
                .await
                .map(|snapshot| (snapshot, subscription))
        })
    }
}
