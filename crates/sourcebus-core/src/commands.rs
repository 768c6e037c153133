// ABOUTME: Command channel for file status queries and checkout/delete/revert requests
// ABOUTME: At most one provider answers; results reach callers only when the bus ticks

use parking_lot::RwLock;
use sourcebus_logging::{debug, instrument};
use sourcebus_types::FileStatusInfo;
use std::path::Path;
use std::sync::Arc;

use crate::error::{BusError, ChannelKind};
use crate::responder::FileResponder;
use crate::response::{FileResponse, Response, file_channel};
use crate::scheduler::{Completion, FileHandler, FileOperation, Origin, RequestId, Scheduler};

/// Implemented by the version control backend that answers file requests.
///
/// Every method receives a [`FileResponder`] that must be answered exactly
/// once, from any thread. Methods are called on the issuing thread and should
/// hand slow work off instead of blocking.
pub trait SourceControlCommands: Send + Sync {
    fn get_file_info(&self, path: &Path, responder: FileResponder);

    /// Make the file writable (check it out)
    fn request_edit(&self, path: &Path, allow_multi_checkout: bool, responder: FileResponder);

    fn request_delete(&self, path: &Path, responder: FileResponder);

    fn request_revert(&self, path: &Path, responder: FileResponder);
}

pub struct CommandChannel {
    provider: RwLock<Option<Arc<dyn SourceControlCommands>>>,
    scheduler: Arc<Scheduler>,
}

impl CommandChannel {
    pub(crate) fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            provider: RwLock::new(None),
            scheduler,
        }
    }

    pub(crate) fn bind(&self, provider: Arc<dyn SourceControlCommands>) -> Result<(), BusError> {
        let mut slot = self.provider.write();
        if slot.is_some() {
            return Err(BusError::AlreadyBound {
                channel: ChannelKind::Commands,
            });
        }
        *slot = Some(provider);
        Ok(())
    }

    pub(crate) fn unbind(&self) -> Result<Arc<dyn SourceControlCommands>, BusError> {
        self.provider.write().take().ok_or(BusError::NotBound {
            channel: ChannelKind::Commands,
        })
    }

    pub fn is_bound(&self) -> bool {
        self.provider.read().is_some()
    }

    #[instrument(skip(self, handler), fields(path = %path.display()))]
    pub fn get_file_info(
        &self,
        path: &Path,
        handler: impl FnOnce(bool, FileStatusInfo) + Send + 'static,
    ) -> RequestId {
        self.issue(path, FileOperation::GetFileInfo, Box::new(handler))
    }

    #[instrument(skip(self, handler), fields(path = %path.display()))]
    pub fn request_edit(
        &self,
        path: &Path,
        allow_multi_checkout: bool,
        handler: impl FnOnce(bool, FileStatusInfo) + Send + 'static,
    ) -> RequestId {
        self.issue(
            path,
            FileOperation::RequestEdit {
                allow_multi_checkout,
            },
            Box::new(handler),
        )
    }

    #[instrument(skip(self, handler), fields(path = %path.display()))]
    pub fn request_delete(
        &self,
        path: &Path,
        handler: impl FnOnce(bool, FileStatusInfo) + Send + 'static,
    ) -> RequestId {
        self.issue(path, FileOperation::RequestDelete, Box::new(handler))
    }

    #[instrument(skip(self, handler), fields(path = %path.display()))]
    pub fn request_revert(
        &self,
        path: &Path,
        handler: impl FnOnce(bool, FileStatusInfo) + Send + 'static,
    ) -> RequestId {
        self.issue(path, FileOperation::RequestRevert, Box::new(handler))
    }

    pub fn file_info(&self, path: &Path) -> Response<FileResponse> {
        self.issue_awaitable(path, FileOperation::GetFileInfo)
    }

    pub fn edit(&self, path: &Path, allow_multi_checkout: bool) -> Response<FileResponse> {
        self.issue_awaitable(
            path,
            FileOperation::RequestEdit {
                allow_multi_checkout,
            },
        )
    }

    pub fn delete(&self, path: &Path) -> Response<FileResponse> {
        self.issue_awaitable(path, FileOperation::RequestDelete)
    }

    pub fn revert(&self, path: &Path) -> Response<FileResponse> {
        self.issue_awaitable(path, FileOperation::RequestRevert)
    }

    fn issue_awaitable(&self, path: &Path, operation: FileOperation) -> Response<FileResponse> {
        let (handler, into_response) = file_channel();
        let id = self.issue(path, operation, handler);
        into_response(id)
    }

    fn issue(&self, path: &Path, operation: FileOperation, handler: FileHandler) -> RequestId {
        let id = self
            .scheduler
            .register_file(path.to_path_buf(), operation, handler);

        // Release the lock before calling out so a provider may use the bus
        let provider = self.provider.read().clone();
        let Some(provider) = provider else {
            debug!(request_id = %id, operation = operation.name(), "No command provider bound");
            self.scheduler.inbox().push(Completion::File {
                id,
                success: false,
                info: FileStatusInfo::new(path),
                origin: Origin::Unbound,
            });
            return id;
        };

        let responder = FileResponder::new(id, path.to_path_buf(), operation, self.scheduler.inbox());
        debug!(request_id = %id, operation = operation.name(), "Dispatching to command provider");
        match operation {
            FileOperation::GetFileInfo => provider.get_file_info(path, responder),
            FileOperation::RequestEdit {
                allow_multi_checkout,
            } => provider.request_edit(path, allow_multi_checkout, responder),
            FileOperation::RequestDelete => provider.request_delete(path, responder),
            FileOperation::RequestRevert => provider.request_revert(path, responder),
        }
        id
    }
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("bound", &self.is_bound())
            .finish()
    }
}
