// ABOUTME: Tick queue that marshals provider results back onto the host's execution context
// ABOUTME: Tracks in-flight requests, delivers completions only at ticks, and expires overdue requests

use parking_lot::Mutex;
use sourcebus_events::{Notification, NotificationChannel};
use sourcebus_logging::{debug, error, trace, warn};
use sourcebus_types::{FileStatusInfo, SettingInfo, SourceControlFlags, SourceControlStatus};
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use crate::config::BusConfig;

/// Identifies one issued request until its handler has fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One-shot continuation for file operations
pub type FileHandler = Box<dyn FnOnce(bool, FileStatusInfo) + Send + 'static>;

/// One-shot continuation for setting queries and updates
pub type SettingHandler = Box<dyn FnOnce(SettingInfo) + Send + 'static>;

/// The file operations a command provider answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileOperation {
    GetFileInfo,
    RequestEdit { allow_multi_checkout: bool },
    RequestDelete,
    RequestRevert,
}

impl FileOperation {
    pub fn name(self) -> &'static str {
        match self {
            Self::GetFileInfo => "get_file_info",
            Self::RequestEdit { .. } => "request_edit",
            Self::RequestDelete => "request_delete",
            Self::RequestRevert => "request_revert",
        }
    }
}

/// Who produced a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Provider,
    /// No provider was bound when the request was issued
    Unbound,
    /// The provider dropped its responder without answering
    Dropped,
}

pub(crate) enum Completion {
    File {
        id: RequestId,
        success: bool,
        info: FileStatusInfo,
        origin: Origin,
    },
    Setting {
        id: RequestId,
        info: SettingInfo,
        origin: Origin,
    },
    Notify(Notification),
}

/// Thread-safe queue that responders and notifiers push into from any thread
pub(crate) struct Inbox {
    queue: Mutex<VecDeque<Completion>>,
    wake: Notify,
}

impl Inbox {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
        }
    }

    pub(crate) fn push(&self, completion: Completion) {
        self.queue.lock().push_back(completion);
        self.wake.notify_one();
    }

    fn drain(&self, limit: Option<usize>) -> Vec<Completion> {
        let mut queue = self.queue.lock();
        let count = limit.map_or(queue.len(), |limit| limit.min(queue.len()));
        queue.drain(..count).collect()
    }

    fn len(&self) -> usize {
        self.queue.lock().len()
    }
}

/// Requests whose answer is queued but not yet delivered
fn queued_answers(queue: &VecDeque<Completion>) -> HashSet<RequestId> {
    queue
        .iter()
        .filter_map(|completion| match completion {
            Completion::File { id, .. } | Completion::Setting { id, .. } => Some(*id),
            Completion::Notify(_) => None,
        })
        .collect()
}

struct Pending<H> {
    handler: H,
    deadline: Option<Instant>,
    label: String,
}

struct PendingFile {
    path: PathBuf,
    operation: FileOperation,
}

/// Counts of what a single tick delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// Handlers completed with a provider's answer
    pub responses: usize,
    /// Handlers completed by the channel because no provider answered
    /// (unbound channel or dropped responder)
    pub synthesized: usize,
    /// Handlers completed with `ProviderError` after their deadline passed
    pub expired: usize,
    /// Provider answers that arrived after their request had already completed
    pub discarded: usize,
    /// Notifications broadcast to listeners
    pub notifications: usize,
}

impl TickReport {
    /// Number of handlers invoked during the tick
    pub fn handlers_fired(&self) -> usize {
        self.responses + self.synthesized + self.expired
    }

    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

pub(crate) struct Scheduler {
    inbox: Arc<Inbox>,
    files: Mutex<HashMap<RequestId, Pending<(FileHandler, PendingFile)>>>,
    settings: Mutex<HashMap<RequestId, Pending<SettingHandler>>>,
    next_id: AtomicU64,
    request_timeout: Option<Duration>,
    max_per_tick: Option<usize>,
}

impl Scheduler {
    pub(crate) fn new(config: &BusConfig) -> Self {
        Self {
            inbox: Arc::new(Inbox::new()),
            files: Mutex::new(HashMap::new()),
            settings: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            request_timeout: config.request_timeout(),
            max_per_tick: config.max_completions_per_tick,
        }
    }

    pub(crate) fn inbox(&self) -> Arc<Inbox> {
        self.inbox.clone()
    }

    fn next_id(&self) -> RequestId {
        RequestId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn deadline(&self) -> Option<Instant> {
        self.request_timeout.map(|timeout| Instant::now() + timeout)
    }

    pub(crate) fn register_file(
        &self,
        path: PathBuf,
        operation: FileOperation,
        handler: FileHandler,
    ) -> RequestId {
        let id = self.next_id();
        let pending = Pending {
            label: path.display().to_string(),
            handler: (handler, PendingFile { path, operation }),
            deadline: self.deadline(),
        };
        self.files.lock().insert(id, pending);
        id
    }

    pub(crate) fn register_setting(&self, key: &str, handler: SettingHandler) -> RequestId {
        let id = self.next_id();
        let pending = Pending {
            handler,
            deadline: self.deadline(),
            label: key.to_string(),
        };
        self.settings.lock().insert(id, pending);
        id
    }

    pub(crate) fn pending_requests(&self) -> usize {
        self.files.lock().len() + self.settings.lock().len()
    }

    pub(crate) fn queued(&self) -> usize {
        self.inbox.len()
    }

    fn next_deadline(&self) -> Option<Instant> {
        let files = self.files.lock().values().filter_map(|p| p.deadline).min();
        let settings = self.settings.lock().values().filter_map(|p| p.deadline).min();
        files.into_iter().chain(settings).min()
    }

    fn has_work_due(&self) -> bool {
        self.queued() > 0 || self.next_deadline().is_some_and(|d| d <= Instant::now())
    }

    /// Deliver everything queued before this call, then expire overdue requests.
    ///
    /// Completions queued while handlers run are left for the next tick.
    pub(crate) fn tick(&self, notifications: &NotificationChannel) -> TickReport {
        let mut report = TickReport::default();

        for completion in self.inbox.drain(self.max_per_tick) {
            match completion {
                Completion::File {
                    id,
                    success,
                    info,
                    origin,
                } => {
                    let Some(pending) = self.files.lock().remove(&id) else {
                        debug!(request_id = %id, status = %info.status, "Discarding late file response");
                        report.discarded += 1;
                        continue;
                    };
                    let (handler, file) = pending.handler;
                    trace!(
                        request_id = %id,
                        operation = file.operation.name(),
                        path = %file.path.display(),
                        success,
                        status = %info.status,
                        "Delivering file response"
                    );
                    count_origin(&mut report, origin);
                    run_isolated(id, || handler(success, info));
                }
                Completion::Setting { id, info, origin } => {
                    let Some(pending) = self.settings.lock().remove(&id) else {
                        debug!(request_id = %id, "Discarding late setting response");
                        report.discarded += 1;
                        continue;
                    };
                    trace!(request_id = %id, key = %pending.label, status = ?info.status, "Delivering setting response");
                    count_origin(&mut report, origin);
                    let handler = pending.handler;
                    run_isolated(id, || handler(info));
                }
                Completion::Notify(notification) => {
                    let broadcast = notifications.broadcast(&notification);
                    debug!(
                        kind = notification.kind(),
                        delivered = broadcast.delivered,
                        panicked = broadcast.panicked,
                        "Delivered queued notification"
                    );
                    report.notifications += 1;
                }
            }
        }

        report.expired = self.expire_overdue(Instant::now());
        report
    }

    /// An answer still waiting in the inbox, held back by the per-tick limit,
    /// keeps its request alive until a later tick delivers it.
    fn expire_overdue(&self, now: Instant) -> usize {
        let (overdue_files, overdue_settings) = {
            // Held so no answer lands between the check and the removal
            let queue = self.inbox.queue.lock();
            let answered = queued_answers(&queue);
            (
                take_overdue(&mut *self.files.lock(), now, &answered),
                take_overdue(&mut *self.settings.lock(), now, &answered),
            )
        };
        let expired = overdue_files.len() + overdue_settings.len();

        for (id, pending) in overdue_files {
            let (handler, file) = pending.handler;
            warn!(
                request_id = %id,
                operation = file.operation.name(),
                path = %pending.label,
                "Provider did not answer before the deadline"
            );
            let info = FileStatusInfo::with_status(
                file.path,
                SourceControlStatus::ProviderError,
                SourceControlFlags::empty(),
            );
            run_isolated(id, || handler(false, info));
        }

        for (id, pending) in overdue_settings {
            warn!(request_id = %id, key = %pending.label, "Provider did not answer setting request before the deadline");
            let handler = pending.handler;
            run_isolated(id, || handler(SettingInfo::invalid()));
        }

        expired
    }

    /// Wait until something is queued or a deadline passes, then tick.
    pub(crate) async fn tick_when_ready(&self, notifications: &NotificationChannel) -> TickReport {
        loop {
            let notified = self.inbox.wake.notified();
            if self.has_work_due() {
                return self.tick(notifications);
            }

            match self.next_deadline() {
                Some(deadline) => {
                    let deadline = tokio::time::Instant::from_std(deadline);
                    let _ = tokio::time::timeout_at(deadline, notified).await;
                }
                None => notified.await,
            }
        }
    }
}

fn take_overdue<H>(
    pending: &mut HashMap<RequestId, Pending<H>>,
    now: Instant,
    answered: &HashSet<RequestId>,
) -> Vec<(RequestId, Pending<H>)> {
    let mut overdue: Vec<RequestId> = pending
        .iter()
        .filter(|(id, p)| {
            p.deadline.is_some_and(|deadline| deadline <= now) && !answered.contains(*id)
        })
        .map(|(id, _)| *id)
        .collect();
    // Oldest request first
    overdue.sort();
    overdue
        .into_iter()
        .filter_map(|id| pending.remove(&id).map(|p| (id, p)))
        .collect()
}

fn count_origin(report: &mut TickReport, origin: Origin) {
    match origin {
        Origin::Provider => report.responses += 1,
        Origin::Unbound | Origin::Dropped => report.synthesized += 1,
    }
}

/// A panicking handler must not take the rest of the tick down with it
fn run_isolated(id: RequestId, handler: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(handler)).is_err() {
        error!(request_id = %id, "Response handler panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn scheduler(timeout_ms: u64) -> Scheduler {
        Scheduler::new(&BusConfig {
            request_timeout_ms: timeout_ms,
            ..Default::default()
        })
    }

    #[test]
    fn test_completion_waits_for_tick() {
        let scheduler = scheduler(0);
        let channel = NotificationChannel::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        let id = scheduler.register_file(
            PathBuf::from("/a"),
            FileOperation::GetFileInfo,
            Box::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        scheduler.inbox().push(Completion::File {
            id,
            success: true,
            info: FileStatusInfo::new("/a"),
            origin: Origin::Provider,
        });

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending_requests(), 1);

        let report = scheduler.tick(&channel);
        assert_eq!(report.responses, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending_requests(), 0);
    }

    #[test]
    fn test_duplicate_completion_is_discarded() {
        let scheduler = scheduler(0);
        let channel = NotificationChannel::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        let id = scheduler.register_setting(
            "port",
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        for _ in 0..2 {
            scheduler.inbox().push(Completion::Setting {
                id,
                info: SettingInfo::invalid(),
                origin: Origin::Provider,
            });
        }

        let report = scheduler.tick(&channel);
        assert_eq!(report.responses, 1);
        assert_eq!(report.discarded, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_per_tick_limit_leaves_rest_queued() {
        let scheduler = Scheduler::new(&BusConfig {
            max_completions_per_tick: Some(1),
            ..Default::default()
        });
        let channel = NotificationChannel::new();

        for _ in 0..3 {
            scheduler
                .inbox()
                .push(Completion::Notify(Notification::request_trust("AA")));
        }

        assert_eq!(scheduler.tick(&channel).notifications, 1);
        assert_eq!(scheduler.queued(), 2);
        assert_eq!(scheduler.tick(&channel).notifications, 1);
        assert_eq!(scheduler.tick(&channel).notifications, 1);
        assert!(scheduler.tick(&channel).is_idle());
    }

    #[test]
    fn test_overdue_request_expires_with_provider_error() {
        let scheduler = scheduler(5);
        let channel = NotificationChannel::new();
        let result = Arc::new(Mutex::new(None));

        let slot = result.clone();
        scheduler.register_file(
            PathBuf::from("/slow.txt"),
            FileOperation::RequestDelete,
            Box::new(move |success, info| {
                *slot.lock() = Some((success, info));
            }),
        );

        assert!(scheduler.tick(&channel).is_idle());
        std::thread::sleep(Duration::from_millis(20));

        let report = scheduler.tick(&channel);
        assert_eq!(report.expired, 1);
        let (success, info) = result.lock().take().unwrap();
        assert!(!success);
        assert_eq!(info.status, SourceControlStatus::ProviderError);
        assert_eq!(info.path, PathBuf::from("/slow.txt"));
    }

    #[test]
    fn test_answer_held_back_by_tick_limit_is_not_expired() {
        let scheduler = Scheduler::new(&BusConfig {
            request_timeout_ms: 10,
            max_completions_per_tick: Some(1),
            ..Default::default()
        });
        let channel = NotificationChannel::new();
        let results = Arc::new(Mutex::new(Vec::new()));

        for path in ["/a", "/b"] {
            let slot = results.clone();
            let id = scheduler.register_file(
                PathBuf::from(path),
                FileOperation::RequestDelete,
                Box::new(move |success, info: FileStatusInfo| {
                    slot.lock().push((success, info.status));
                }),
            );
            scheduler.inbox().push(Completion::File {
                id,
                success: true,
                info: FileStatusInfo::with_status(
                    path,
                    SourceControlStatus::NotTracked,
                    SourceControlFlags::empty(),
                ),
                origin: Origin::Provider,
            });
        }
        std::thread::sleep(Duration::from_millis(30));

        let first = scheduler.tick(&channel);
        assert_eq!(first.responses, 1);
        assert_eq!(first.expired, 0);
        let second = scheduler.tick(&channel);
        assert_eq!(second.responses, 1);
        assert_eq!(second.expired, 0);
        assert_eq!(second.discarded, 0);

        assert_eq!(
            *results.lock(),
            vec![(true, SourceControlStatus::NotTracked); 2]
        );
        assert_eq!(scheduler.pending_requests(), 0);
    }

    #[test]
    fn test_panicking_handler_does_not_block_others() {
        let scheduler = scheduler(0);
        let channel = NotificationChannel::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let first = scheduler.register_setting("a", Box::new(|_| panic!("handler failure")));
        let counter = fired.clone();
        let second = scheduler.register_setting(
            "b",
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        for id in [first, second] {
            scheduler.inbox().push(Completion::Setting {
                id,
                info: SettingInfo::invalid(),
                origin: Origin::Provider,
            });
        }

        let report = scheduler.tick(&channel);
        assert_eq!(report.responses, 2);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
