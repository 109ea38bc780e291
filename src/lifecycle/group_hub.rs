use crate::framework::{Handler, HubClient, HubError, Registry};
use crate::lifecycle::config::HubConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// The runtime orchestrator for a routing hub.
///
/// `GroupHub` is responsible for:
/// - **Startup**: building the [`Registry`] from a [`HubConfig`] and spawning its loop
/// - **Access**: handing out [`HubClient`]s to transport code
/// - **Shutdown**: signalling connection loops, stopping every group and awaiting the registry
///
/// # Example
///
/// ```ignore
/// let hub = GroupHub::start(EchoHandler, HubConfig::default());
///
/// // Hand a client to each new connection
/// tokio::spawn(serve_connection(hub.client(), reader, writer, Some("u1".into()), context));
///
/// // Gracefully shut down when done
/// hub.shutdown().await?;
/// ```
pub struct GroupHub<H: Handler> {
    client: HubClient<H::Context>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl<H: Handler> GroupHub<H> {
    /// Spawns the registry loop. Must be called inside a Tokio runtime.
    pub fn start(handler: H, config: HubConfig) -> Self {
        let (shutdown, signal) = watch::channel(false);
        let (registry, client) = Registry::new(handler, config.registry_settings(), signal);
        let handle = tokio::spawn(registry.run());
        info!(default_group = %config.default_group, handler_timeout = ?config.handler_timeout, "Hub started");
        Self {
            client,
            shutdown,
            handle,
        }
    }

    pub fn client(&self) -> HubClient<H::Context> {
        self.client.clone()
    }

    /// Gracefully shuts down the hub.
    ///
    /// 1. Signals every connection loop to exit (each still notifies its close)
    /// 2. Asks the registry to stop all groups and leave its loop
    /// 3. Waits for the registry task; errors if it panicked
    pub async fn shutdown(self) -> Result<(), HubError> {
        info!("Shutting down hub...");

        let _ = self.shutdown.send(true);
        self.client.shutdown().await?;
        drop(self.client);

        if let Err(e) = self.handle.await {
            error!("Registry task failed: {:?}", e);
            return Err(HubError::TaskFailed(e.to_string()));
        }

        info!("Hub shutdown complete.");
        Ok(())
    }
}
