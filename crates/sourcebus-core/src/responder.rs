// ABOUTME: Send-able handles providers use to answer requests and push notifications
// ABOUTME: Answers are queued for the next tick; a responder dropped unanswered reports ProviderDown

use sourcebus_events::Notification;
use sourcebus_logging::debug;
use sourcebus_types::{
    ConnectionState, FileStatusInfo, SettingInfo, SourceControlFlags, SourceControlStatus,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::scheduler::{Completion, FileOperation, Inbox, Origin, RequestId};

/// Answers exactly one file request.
///
/// Consumed by [`respond`](Self::respond). If it is dropped without an
/// answer the request completes with `success = false` and `ProviderDown`.
pub struct FileResponder {
    id: RequestId,
    path: PathBuf,
    operation: FileOperation,
    inbox: Arc<Inbox>,
    answered: bool,
}

impl FileResponder {
    pub(crate) fn new(
        id: RequestId,
        path: PathBuf,
        operation: FileOperation,
        inbox: Arc<Inbox>,
    ) -> Self {
        Self {
            id,
            path,
            operation,
            inbox,
            answered: false,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.id
    }

    /// The path the request was issued for
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn operation(&self) -> FileOperation {
        self.operation
    }

    /// Queue the answer for delivery at the next tick
    pub fn respond(mut self, success: bool, info: FileStatusInfo) {
        self.answered = true;
        self.inbox.push(Completion::File {
            id: self.id,
            success,
            info,
            origin: Origin::Provider,
        });
    }

    /// Answer with `success = false` and the given error status for this path
    pub fn fail(self, status: SourceControlStatus) {
        debug_assert!(status.is_error(), "fail() expects an error status");
        let info = FileStatusInfo::with_status(self.path.clone(), status, SourceControlFlags::empty());
        self.respond(false, info);
    }
}

impl Drop for FileResponder {
    fn drop(&mut self) {
        if self.answered {
            return;
        }
        debug!(
            request_id = %self.id,
            operation = self.operation.name(),
            path = %self.path.display(),
            "File responder dropped without an answer"
        );
        self.inbox.push(Completion::File {
            id: self.id,
            success: false,
            info: FileStatusInfo::new(std::mem::take(&mut self.path)),
            origin: Origin::Dropped,
        });
    }
}

impl std::fmt::Debug for FileResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileResponder")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("operation", &self.operation)
            .finish()
    }
}

/// Answers exactly one setting request. Dropped unanswered, the request
/// completes with an `Invalid` setting.
pub struct SettingResponder {
    id: RequestId,
    key: String,
    inbox: Arc<Inbox>,
    answered: bool,
}

impl SettingResponder {
    pub(crate) fn new(id: RequestId, key: String, inbox: Arc<Inbox>) -> Self {
        Self {
            id,
            key,
            inbox,
            answered: false,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Queue the answer for delivery at the next tick
    pub fn respond(mut self, info: SettingInfo) {
        self.answered = true;
        self.inbox.push(Completion::Setting {
            id: self.id,
            info,
            origin: Origin::Provider,
        });
    }
}

impl Drop for SettingResponder {
    fn drop(&mut self) {
        if self.answered {
            return;
        }
        debug!(request_id = %self.id, key = %self.key, "Setting responder dropped without an answer");
        self.inbox.push(Completion::Setting {
            id: self.id,
            info: SettingInfo::invalid(),
            origin: Origin::Dropped,
        });
    }
}

impl std::fmt::Debug for SettingResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingResponder")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}

/// Provider-side handle for pushing notifications from any thread.
///
/// Notifications are broadcast to listeners at the next tick, on the
/// execution context that drives the bus.
#[derive(Clone)]
pub struct Notifier {
    inbox: Arc<Inbox>,
}

impl Notifier {
    pub(crate) fn new(inbox: Arc<Inbox>) -> Self {
        Self { inbox }
    }

    pub fn notify(&self, notification: Notification) {
        self.inbox.push(Completion::Notify(notification));
    }

    pub fn request_trust(&self, fingerprint: impl Into<String>) {
        self.notify(Notification::request_trust(fingerprint));
    }

    pub fn connectivity_state_changed(&self, state: ConnectionState) {
        self.notify(Notification::connectivity_state_changed(state));
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}
