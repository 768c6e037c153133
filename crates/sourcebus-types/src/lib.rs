// ABOUTME: Pure data types with no cross-crate dependencies
// ABOUTME: Foundation layer for all other sourcebus crates

pub mod connection;
pub mod setting;
pub mod status;

// Re-export commonly used types
pub use connection::ConnectionState;
pub use setting::{SettingInfo, SettingStatus};
pub use status::{FileStatusInfo, SourceControlFlags, SourceControlStatus};
