// ABOUTME: Outgoing source control notifications and the listener trait that receives them
// ABOUTME: Every listener method defaults to a no-op so partial listeners stay small

use sourcebus_types::ConnectionState;

/// Unsolicited messages a provider pushes to every registered listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The provider hit a server certificate it does not trust yet
    RequestTrust { fingerprint: String },

    /// The provider moved to a new connectivity state
    ConnectivityStateChanged { state: ConnectionState },
}

impl Notification {
    pub fn request_trust(fingerprint: impl Into<String>) -> Self {
        Self::RequestTrust {
            fingerprint: fingerprint.into(),
        }
    }

    pub fn connectivity_state_changed(state: ConnectionState) -> Self {
        Self::ConnectivityStateChanged { state }
    }

    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestTrust { .. } => "request_trust",
            Self::ConnectivityStateChanged { .. } => "connectivity_state_changed",
        }
    }

    /// Invoke the matching listener method
    pub fn dispatch(&self, listener: &dyn SourceControlNotifications) {
        match self {
            Self::RequestTrust { fingerprint } => listener.request_trust(fingerprint),
            Self::ConnectivityStateChanged { state } => listener.connectivity_state_changed(*state),
        }
    }
}

/// Listener for source control notifications.
///
/// Listeners are shared between the channel and their owner, so methods take
/// `&self`; keep any state behind a lock or atomic.
pub trait SourceControlNotifications: Send + Sync {
    /// Request to trust the server key with the given fingerprint.
    ///
    /// Resolve it by calling `enable_trust` on the connection channel.
    fn request_trust(&self, _fingerprint: &str) {}

    /// The provider's connectivity state changed
    fn connectivity_state_changed(&self, _state: ConnectionState) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct TrustOnly {
        fingerprints: Mutex<Vec<String>>,
    }

    impl SourceControlNotifications for TrustOnly {
        fn request_trust(&self, fingerprint: &str) {
            self.fingerprints.lock().push(fingerprint.to_string());
        }
    }

    #[test]
    fn test_dispatch_routes_to_listener_method() {
        let listener = TrustOnly::default();

        Notification::request_trust("AB:CD:EF").dispatch(&listener);
        // Not overridden, falls through to the default no-op
        Notification::connectivity_state_changed(ConnectionState::Active).dispatch(&listener);

        assert_eq!(*listener.fingerprints.lock(), vec!["AB:CD:EF".to_string()]);
    }

    #[test]
    fn test_notification_kind() {
        assert_eq!(Notification::request_trust("x").kind(), "request_trust");
        assert_eq!(
            Notification::connectivity_state_changed(ConnectionState::Disabled).kind(),
            "connectivity_state_changed"
        );
    }
}
