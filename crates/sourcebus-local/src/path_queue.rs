// ABOUTME: Per-path FIFO ordering for filesystem operations
// ABOUTME: Each operation waits for the previous operation on the same path, in issue order

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

struct Tail {
    ticket: u64,
    done: oneshot::Receiver<()>,
}

/// Queue position taken synchronously when a request is issued.
///
/// Dropping the turn releases the path, whether or not the operation ran.
pub(crate) struct Turn {
    queue: Arc<PathQueue>,
    path: PathBuf,
    ticket: u64,
    previous: Option<Tail>,
    // Dropped with the turn, which wakes the next turn on this path
    _done: oneshot::Sender<()>,
}

impl Turn {
    /// Wait until every earlier operation on this path has finished
    pub(crate) async fn wait(&mut self) {
        if let Some(previous) = self.previous.as_mut() {
            // A dropped sender also means the earlier operation is over
            let _ = (&mut previous.done).await;
        }
        self.previous = None;
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        let mut tails = self.queue.tails.lock();
        // Nothing queued behind this turn
        if tails.get(&self.path).is_some_and(|tail| tail.ticket == self.ticket) {
            match self.previous.take() {
                // Cancelled before its turn came: later turns wait on the earlier one
                Some(mut previous) => {
                    if matches!(previous.done.try_recv(), Err(TryRecvError::Empty)) {
                        tails.insert(self.path.clone(), previous);
                    } else {
                        tails.remove(&self.path);
                    }
                }
                None => {
                    tails.remove(&self.path);
                }
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct PathQueue {
    tails: Mutex<HashMap<PathBuf, Tail>>,
    next_ticket: AtomicU64,
}

impl PathQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn enter(self: &Arc<Self>, path: &Path) -> Turn {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (done, receiver) = oneshot::channel();
        let previous = self.tails.lock().insert(
            path.to_path_buf(),
            Tail {
                ticket,
                done: receiver,
            },
        );

        Turn {
            queue: self.clone(),
            path: path.to_path_buf(),
            ticket,
            previous,
            _done: done,
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_paths(&self) -> usize {
        self.tails.lock().len()
    }
}
