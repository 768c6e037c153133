// ABOUTME: Host-owned registry tying the command, connection and notification channels together
// ABOUTME: The host binds providers here and drives delivery by ticking the bus

use sourcebus_events::{ListenerId, NotificationChannel, SourceControlNotifications};
use sourcebus_logging::{debug, info};
use sourcebus_types::ConnectionState;
use std::sync::Arc;

use crate::commands::{CommandChannel, SourceControlCommands};
use crate::config::BusConfig;
use crate::connection::{ConnectionChannel, SourceControlConnection};
use crate::error::BusError;
use crate::responder::Notifier;
use crate::scheduler::{Scheduler, TickReport};

/// The source control bus.
///
/// Owned by the host and shared by `Arc`. Requests may be issued from any
/// thread, but handlers and listeners run only inside [`tick`](Self::tick),
/// on whichever thread calls it.
pub struct SourceControlBus {
    config: BusConfig,
    scheduler: Arc<Scheduler>,
    commands: CommandChannel,
    connection: ConnectionChannel,
    notifications: NotificationChannel,
}

impl SourceControlBus {
    pub fn new(config: BusConfig) -> Self {
        let scheduler = Arc::new(Scheduler::new(&config));
        Self {
            commands: CommandChannel::new(scheduler.clone()),
            connection: ConnectionChannel::new(scheduler.clone()),
            notifications: NotificationChannel::new(),
            scheduler,
            config,
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn commands(&self) -> &CommandChannel {
        &self.commands
    }

    pub fn connection(&self) -> &ConnectionChannel {
        &self.connection
    }

    pub fn notifications(&self) -> &NotificationChannel {
        &self.notifications
    }

    /// Handle providers use to queue notifications for the next tick
    pub fn notifier(&self) -> Notifier {
        Notifier::new(self.scheduler.inbox())
    }

    pub fn bind_commands(&self, provider: Arc<dyn SourceControlCommands>) -> Result<(), BusError> {
        self.commands.bind(provider)?;
        info!("Command provider bound");
        Ok(())
    }

    pub fn bind_connection(
        &self,
        provider: Arc<dyn SourceControlConnection>,
    ) -> Result<(), BusError> {
        let state = provider.source_control_state();
        self.connection.bind(provider)?;
        info!(state = %state, "Connection provider bound");
        if self.config.announce_initial_state {
            self.notifier().connectivity_state_changed(state);
        }
        Ok(())
    }

    /// Bind one provider to both single-provider channels.
    ///
    /// Either both bindings succeed or neither is kept.
    pub fn bind_provider<P>(&self, provider: Arc<P>) -> Result<(), BusError>
    where
        P: SourceControlCommands + SourceControlConnection + 'static,
    {
        self.bind_commands(provider.clone())?;
        if let Err(err) = self.bind_connection(provider) {
            let _ = self.commands.unbind();
            return Err(err);
        }
        Ok(())
    }

    /// Requests already handed to the provider stay in flight until they are
    /// answered, their responder is dropped, or they expire.
    pub fn unbind_commands(&self) -> Result<Arc<dyn SourceControlCommands>, BusError> {
        let provider = self.commands.unbind()?;
        info!("Command provider unbound");
        Ok(provider)
    }

    /// Listeners are told the connection is now `Disabled` if the provider
    /// was enabled when it was removed.
    pub fn unbind_connection(&self) -> Result<Arc<dyn SourceControlConnection>, BusError> {
        let provider = self.connection.unbind()?;
        let last_state = provider.source_control_state();
        info!(last_state = %last_state, "Connection provider unbound");
        if self.config.announce_initial_state && last_state != ConnectionState::Disabled {
            self.notifier()
                .connectivity_state_changed(ConnectionState::Disabled);
        }
        Ok(provider)
    }

    pub fn register_listener(&self, listener: Arc<dyn SourceControlNotifications>) -> ListenerId {
        self.notifications.register(listener)
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.notifications.unregister(id)
    }

    /// Deliver queued responses and notifications, then expire overdue requests
    pub fn tick(&self) -> TickReport {
        let report = self.scheduler.tick(&self.notifications);
        if !report.is_idle() {
            debug!(
                responses = report.responses,
                synthesized = report.synthesized,
                expired = report.expired,
                discarded = report.discarded,
                notifications = report.notifications,
                "Bus tick"
            );
        }
        report
    }

    /// Wait for queued work or the next deadline, then tick
    pub async fn tick_when_ready(&self) -> TickReport {
        self.scheduler.tick_when_ready(&self.notifications).await
    }

    /// Requests whose handlers have not fired yet
    pub fn pending_requests(&self) -> usize {
        self.scheduler.pending_requests()
    }

    /// Responses and notifications waiting for the next tick
    pub fn queued(&self) -> usize {
        self.scheduler.queued()
    }
}

impl Default for SourceControlBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl std::fmt::Debug for SourceControlBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceControlBus")
            .field("config", &self.config)
            .field("commands", &self.commands)
            .field("connection", &self.connection)
            .field("listeners", &self.notifications.listener_count())
            .field("pending_requests", &self.pending_requests())
            .finish()
    }
}
