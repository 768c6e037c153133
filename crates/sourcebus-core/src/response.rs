// ABOUTME: Awaitable form of bus requests
// ABOUTME: Resolves when a tick delivers the result, so some task must keep ticking the bus

use sourcebus_types::{FileStatusInfo, SettingInfo};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use crate::error::BusError;
use crate::scheduler::{FileHandler, RequestId, SettingHandler};

/// Result of a file operation as delivered to a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResponse {
    pub success: bool,
    pub info: FileStatusInfo,
}

/// Future for one request's result.
///
/// Resolves with [`BusError::ResponseLost`] if the bus is dropped before the
/// request completes.
#[must_use = "a response does nothing unless awaited"]
pub struct Response<T> {
    id: RequestId,
    receiver: oneshot::Receiver<T>,
}

impl<T> Response<T> {
    pub fn request_id(&self) -> RequestId {
        self.id
    }
}

impl<T> Future for Response<T> {
    type Output = Result<T, BusError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| BusError::ResponseLost))
    }
}

impl<T> std::fmt::Debug for Response<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response").field("id", &self.id).finish()
    }
}

/// Handler that forwards a file result into a oneshot sender
pub(crate) fn file_channel() -> (FileHandler, impl FnOnce(RequestId) -> Response<FileResponse>) {
    let (tx, rx) = oneshot::channel();
    let handler: FileHandler = Box::new(move |success, info| {
        // The receiver may already be gone; nothing to do then
        let _ = tx.send(FileResponse { success, info });
    });
    (handler, move |id| Response { id, receiver: rx })
}

pub(crate) fn setting_channel() -> (SettingHandler, impl FnOnce(RequestId) -> Response<SettingInfo>) {
    let (tx, rx) = oneshot::channel();
    let handler: SettingHandler = Box::new(move |info| {
        let _ = tx.send(info);
    });
    (handler, move |id| Response { id, receiver: rx })
}
