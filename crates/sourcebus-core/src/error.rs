// ABOUTME: Error types for bus configuration and binding mistakes
// ABOUTME: Request failures travel as FileStatusInfo/SettingInfo data, never through these

use std::fmt;

/// The single-provider channels of the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Commands,
    Connection,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commands => f.write_str("command"),
            Self::Connection => f.write_str("connection"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// Replacing a bound provider would orphan its in-flight requests
    #[error("the {channel} channel already has a provider bound")]
    AlreadyBound { channel: ChannelKind },

    #[error("the {channel} channel has no provider bound")]
    NotBound { channel: ChannelKind },

    /// The bus was dropped while a response was still pending
    #[error("the bus shut down before the response was delivered")]
    ResponseLost,
}
