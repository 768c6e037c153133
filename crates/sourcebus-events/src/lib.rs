// ABOUTME: Source control notification definitions and the broadcast channel
// ABOUTME: Providers push trust requests and connectivity changes to any number of listeners

pub mod channel;
pub mod notification;

pub use channel::{BroadcastReport, ListenerId, NotificationChannel};
pub use notification::{Notification, SourceControlNotifications};
