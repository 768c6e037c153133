// ABOUTME: Fallback provider that answers from the local filesystem when no VCS backend is configured
// ABOUTME: File work runs on tokio tasks, serialized per path; connectivity follows the workspace root

use parking_lot::RwLock;
use sourcebus_core::{
    BusError, ConnectionState, ConnectionStateTracker, FileResponder, FileStatusInfo, Notifier,
    SettingInfo, SettingResponder, SettingStatus, SourceControlBus, SourceControlCommands,
    SourceControlConnection, SourceControlFlags, SourceControlStatus,
};
use sourcebus_logging::{debug, info};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::fs_ops::{self, Outcome};
use crate::path_queue::PathQueue;

/// The one connection setting this provider understands
pub const WORKSPACE_ROOT_KEY: &str = "workspace_root";

const SETTING_CONTEXT: &str = "local";

pub struct LocalFileProvider {
    runtime: Handle,
    tracker: ConnectionStateTracker,
    workspace_root: RwLock<Option<PathBuf>>,
    queue: Arc<PathQueue>,
}

impl LocalFileProvider {
    /// File operations are spawned on `runtime`
    pub fn new(notifier: Notifier, runtime: Handle) -> Self {
        Self {
            runtime,
            tracker: ConnectionStateTracker::new(notifier),
            workspace_root: RwLock::new(None),
            queue: Arc::new(PathQueue::new()),
        }
    }

    pub fn with_workspace_root(self, root: impl Into<PathBuf>) -> Self {
        *self.workspace_root.write() = Some(root.into());
        self
    }

    /// Create a provider for `bus`, bind it to both channels and enable it
    pub fn install(
        bus: &SourceControlBus,
        runtime: Handle,
        root: impl Into<PathBuf>,
    ) -> Result<Arc<Self>, BusError> {
        let provider = Arc::new(Self::new(bus.notifier(), runtime).with_workspace_root(root));
        bus.bind_provider(provider.clone())?;
        provider.enable_source_control(true);
        Ok(provider)
    }

    pub fn workspace_root(&self) -> Option<PathBuf> {
        self.workspace_root.read().clone()
    }

    fn config_valid(&self) -> bool {
        self.workspace_root
            .read()
            .as_deref()
            .is_some_and(Path::is_dir)
    }

    fn in_workspace(&self, path: &Path) -> bool {
        self.workspace_root
            .read()
            .as_deref()
            .is_some_and(|root| path.starts_with(root))
    }

    /// Run `operation` for `path` after earlier operations on the same path.
    ///
    /// Paths outside the workspace root are answered `NotTracked` untouched.
    fn schedule<F, Fut>(&self, path: &Path, responder: FileResponder, operation: F)
    where
        F: FnOnce(PathBuf) -> Fut + Send + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        if !self.tracker.state().is_active() {
            debug!(
                path = %path.display(),
                state = %self.tracker.state(),
                "Local provider not active"
            );
            responder.fail(SourceControlStatus::ProviderDown);
            return;
        }

        if !self.in_workspace(path) {
            debug!(path = %path.display(), "Path is outside the local workspace");
            responder.respond(
                true,
                FileStatusInfo::with_status(
                    path,
                    SourceControlStatus::NotTracked,
                    SourceControlFlags::empty(),
                ),
            );
            return;
        }

        let mut turn = self.queue.enter(path);
        let path = path.to_path_buf();
        self.runtime.spawn(async move {
            turn.wait().await;
            let (success, info) = operation(path).await;
            drop(turn);
            responder.respond(success, info);
        });
    }

    fn root_setting(&self) -> SettingInfo {
        let info = match self.workspace_root() {
            Some(root) => SettingInfo::new(SettingStatus::Set, root.display().to_string()),
            None => SettingInfo::new(SettingStatus::Unset, ""),
        };
        info.with_context(SETTING_CONTEXT)
    }
}

impl SourceControlCommands for LocalFileProvider {
    fn get_file_info(&self, path: &Path, responder: FileResponder) {
        self.schedule(path, responder, |path| async move {
            fs_ops::inspect(&path).await
        });
    }

    fn request_edit(&self, path: &Path, allow_multi_checkout: bool, responder: FileResponder) {
        self.schedule(path, responder, move |path| async move {
            fs_ops::make_writable(&path, allow_multi_checkout).await
        });
    }

    fn request_delete(&self, path: &Path, responder: FileResponder) {
        self.schedule(path, responder, |path| async move {
            fs_ops::remove(&path).await
        });
    }

    /// Nothing to revert without history; answers the file's current status
    fn request_revert(&self, path: &Path, responder: FileResponder) {
        self.schedule(path, responder, |path| async move {
            fs_ops::inspect(&path).await
        });
    }
}

impl SourceControlConnection for LocalFileProvider {
    fn enable_source_control(&self, enable: bool) {
        let valid = self.config_valid();
        if enable && !valid {
            info!(root = ?self.workspace_root(), "Local provider workspace root is not a directory");
        }
        self.tracker.apply_enable(enable, valid);
    }

    fn is_active(&self) -> bool {
        self.tracker.state().is_active()
    }

    fn enable_trust(&self, enable: bool, fingerprint: &str) {
        debug!(enable, fingerprint, "Local provider has no certificates to trust");
    }

    fn has_trust_issue(&self) -> bool {
        false
    }

    fn set_connection_setting(&self, key: &str, value: &str, responder: SettingResponder) {
        if key != WORKSPACE_ROOT_KEY {
            responder.respond(SettingInfo::invalid().with_context(SETTING_CONTEXT));
            return;
        }

        let root = (!value.is_empty()).then(|| PathBuf::from(value));
        info!(root = ?root, "Local provider workspace root changed");
        *self.workspace_root.write() = root;
        self.tracker.revalidate(self.config_valid());
        responder.respond(self.root_setting());
    }

    fn get_connection_setting(&self, key: &str, responder: SettingResponder) {
        let info = if key == WORKSPACE_ROOT_KEY {
            self.root_setting()
        } else {
            SettingInfo::invalid().with_context(SETTING_CONTEXT)
        };
        responder.respond(info);
    }

    fn source_control_state(&self) -> ConnectionState {
        self.tracker.state()
    }
}

impl std::fmt::Debug for LocalFileProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFileProvider")
            .field("workspace_root", &self.workspace_root())
            .field("state", &self.tracker.state())
            .finish()
    }
}
