// ABOUTME: Connection channel for enabling the backend, trust and connection settings
// ABOUTME: Also provides ConnectionStateTracker, which broadcasts only real state transitions

use parking_lot::{Mutex, RwLock};
use sourcebus_logging::{debug, info, instrument};
use sourcebus_types::{ConnectionState, SettingInfo};
use std::sync::Arc;

use crate::error::{BusError, ChannelKind};
use crate::responder::{Notifier, SettingResponder};
use crate::response::{Response, setting_channel};
use crate::scheduler::{Completion, Origin, RequestId, Scheduler, SettingHandler};

/// Implemented by the backend that owns connectivity, trust and settings.
///
/// The boolean and state queries are answered from local state and must not
/// block. Setting requests are answered through the [`SettingResponder`].
pub trait SourceControlConnection: Send + Sync {
    fn enable_source_control(&self, enable: bool);

    fn is_active(&self) -> bool;

    /// Accept or reject the server certificate with the given fingerprint
    fn enable_trust(&self, enable: bool, fingerprint: &str);

    fn has_trust_issue(&self) -> bool;

    fn set_connection_setting(&self, key: &str, value: &str, responder: SettingResponder);

    /// Unknown keys should answer `SettingStatus::Invalid`
    fn get_connection_setting(&self, key: &str, responder: SettingResponder);

    fn source_control_state(&self) -> ConnectionState {
        ConnectionState::Disabled
    }
}

pub struct ConnectionChannel {
    provider: RwLock<Option<Arc<dyn SourceControlConnection>>>,
    scheduler: Arc<Scheduler>,
}

impl ConnectionChannel {
    pub(crate) fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            provider: RwLock::new(None),
            scheduler,
        }
    }

    pub(crate) fn bind(&self, provider: Arc<dyn SourceControlConnection>) -> Result<(), BusError> {
        let mut slot = self.provider.write();
        if slot.is_some() {
            return Err(BusError::AlreadyBound {
                channel: ChannelKind::Connection,
            });
        }
        *slot = Some(provider);
        Ok(())
    }

    pub(crate) fn unbind(&self) -> Result<Arc<dyn SourceControlConnection>, BusError> {
        self.provider.write().take().ok_or(BusError::NotBound {
            channel: ChannelKind::Connection,
        })
    }

    pub fn is_bound(&self) -> bool {
        self.provider.read().is_some()
    }

    fn provider(&self) -> Option<Arc<dyn SourceControlConnection>> {
        self.provider.read().clone()
    }

    #[instrument(skip(self))]
    pub fn enable_source_control(&self, enable: bool) {
        match self.provider() {
            Some(provider) => provider.enable_source_control(enable),
            None => debug!(enable, "No connection provider bound; ignoring enable request"),
        }
    }

    pub fn is_active(&self) -> bool {
        self.provider().is_some_and(|p| p.is_active())
    }

    #[instrument(skip(self))]
    pub fn enable_trust(&self, enable: bool, fingerprint: &str) {
        match self.provider() {
            Some(provider) => provider.enable_trust(enable, fingerprint),
            None => debug!(enable, "No connection provider bound; ignoring trust decision"),
        }
    }

    pub fn has_trust_issue(&self) -> bool {
        self.provider().is_some_and(|p| p.has_trust_issue())
    }

    pub fn source_control_state(&self) -> ConnectionState {
        self.provider()
            .map_or(ConnectionState::Disabled, |p| p.source_control_state())
    }

    #[instrument(skip(self, value, handler))]
    pub fn set_connection_setting(
        &self,
        key: &str,
        value: &str,
        handler: impl FnOnce(SettingInfo) + Send + 'static,
    ) -> RequestId {
        self.issue(key, Some(value), Box::new(handler))
    }

    #[instrument(skip(self, handler))]
    pub fn get_connection_setting(
        &self,
        key: &str,
        handler: impl FnOnce(SettingInfo) + Send + 'static,
    ) -> RequestId {
        self.issue(key, None, Box::new(handler))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Response<SettingInfo> {
        let (handler, into_response) = setting_channel();
        into_response(self.issue(key, Some(value), handler))
    }

    pub fn setting(&self, key: &str) -> Response<SettingInfo> {
        let (handler, into_response) = setting_channel();
        into_response(self.issue(key, None, handler))
    }

    /// `value` is `Some` for updates and `None` for queries
    fn issue(&self, key: &str, value: Option<&str>, handler: SettingHandler) -> RequestId {
        let id = self.scheduler.register_setting(key, handler);

        let Some(provider) = self.provider() else {
            debug!(request_id = %id, key, "No connection provider bound");
            self.scheduler.inbox().push(Completion::Setting {
                id,
                info: SettingInfo::default(),
                origin: Origin::Unbound,
            });
            return id;
        };

        let responder = SettingResponder::new(id, key.to_string(), self.scheduler.inbox());
        match value {
            Some(value) => provider.set_connection_setting(key, value, responder),
            None => provider.get_connection_setting(key, responder),
        }
        id
    }
}

impl std::fmt::Debug for ConnectionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionChannel")
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Connection state holder for providers.
///
/// Each real transition queues a `ConnectivityStateChanged` notification;
/// setting the current state again does nothing.
#[derive(Debug)]
pub struct ConnectionStateTracker {
    state: Mutex<ConnectionState>,
    notifier: Notifier,
}

impl ConnectionStateTracker {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disabled),
            notifier,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Returns true if the state changed
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if *state == next {
            return false;
        }
        let previous = std::mem::replace(&mut *state, next);
        info!(from = %previous, to = %next, "Source control connectivity changed");
        // Queue while holding the lock so concurrent transitions broadcast in order
        self.notifier.connectivity_state_changed(next);
        true
    }

    /// Apply an enable/disable request given whether the configuration is usable
    pub fn apply_enable(&self, enable: bool, config_valid: bool) -> bool {
        self.transition(match (enable, config_valid) {
            (false, _) => ConnectionState::Disabled,
            (true, true) => ConnectionState::Active,
            (true, false) => ConnectionState::ConfigurationInvalid,
        })
    }

    /// Re-check the configuration of an enabled connection. Does nothing while disabled.
    pub fn revalidate(&self, config_valid: bool) -> bool {
        if self.state() == ConnectionState::Disabled {
            return false;
        }
        self.apply_enable(true, config_valid)
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}
