// ABOUTME: Source control bus: command and connection channels over a tick-driven scheduler
// ABOUTME: Providers answer through Send responders; handlers fire only when the host ticks

pub mod bus;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod responder;
pub mod response;
pub mod scheduler;


pub use bus::SourceControlBus;
pub use commands::{CommandChannel, SourceControlCommands};
pub use config::{BusConfig, DEFAULT_REQUEST_TIMEOUT_MS, SourcebusConfig};
pub use connection::{ConnectionChannel, ConnectionStateTracker, SourceControlConnection};
pub use error::{BusError, ChannelKind};
pub use responder::{FileResponder, Notifier, SettingResponder};
pub use response::{FileResponse, Response};
pub use scheduler::{FileHandler, FileOperation, RequestId, SettingHandler, TickReport};

// Lower layers, so hosts and providers can depend on this crate alone
pub use sourcebus_events::{
    BroadcastReport, ListenerId, Notification, NotificationChannel, SourceControlNotifications,
};
pub use sourcebus_types::{
    ConnectionState, FileStatusInfo, SettingInfo, SettingStatus, SourceControlFlags,
    SourceControlStatus,
};
