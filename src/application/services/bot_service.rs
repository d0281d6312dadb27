//! Bot service - the event loop
//!
//! Events are dispatched one at a time: the next event's fan-out starts
//! only after every branch of the current one has settled. Control
//! requests from plugins and the console are handled between events.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::application::errors::BotError;
use crate::application::messaging::Dispatcher;
use crate::application::services::AuthGate;
use crate::domain::entities::{ChatEvent, ControlRequest};
use crate::domain::traits::Transport;
use crate::infrastructure::plugins::PluginRuntime;

pub struct BotService {
    dispatcher: Arc<Dispatcher>,
    plugins: Arc<PluginRuntime>,
    auth: Arc<AuthGate>,
    transport: Arc<dyn Transport>,
}

impl BotService {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        plugins: Arc<PluginRuntime>,
        auth: Arc<AuthGate>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            dispatcher,
            plugins,
            auth,
            transport,
        }
    }

    /// Join the configured channels and every persisted one
    pub async fn join_startup_channels(&self, configured: &[String]) -> Result<(), BotError> {
        let mut channels: Vec<String> = configured.to_vec();
        for channel in self.auth.channels() {
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }

        for channel in &channels {
            self.transport.join(channel).await?;
            tracing::info!("Joined {}", channel);
        }
        Ok(())
    }

    /// Run until the event stream closes
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<ChatEvent>,
        mut control: mpsc::UnboundedReceiver<ControlRequest>,
    ) -> Result<(), BotError> {
        let mut control_open = true;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        self.dispatcher.dispatch(event).await;
                    }
                    None => break,
                },
                request = control.recv(), if control_open => match request {
                    Some(request) => self.handle_control(request).await,
                    None => control_open = false,
                },
            }
        }

        tracing::info!("Event stream closed, stopping");
        Ok(())
    }

    pub async fn handle_control(&self, request: ControlRequest) {
        match request {
            ControlRequest::Reload => match self.plugins.reload().await {
                Ok(report) => tracing::info!("Reload finished: {}", report),
                Err(e) => tracing::error!("Reload failed, keeping previous plugins: {}", e),
            },
            ControlRequest::Join(channel) => {
                if let Err(e) = self.transport.join(&channel).await {
                    tracing::warn!("{}", e);
                }
            }
            ControlRequest::Part(channel) => {
                if let Err(e) = self.transport.part(&channel).await {
                    tracing::warn!("{}", e);
                }
            }
        }
    }
}
