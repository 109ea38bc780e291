//! # Hub Client
//!
//! Typed, cloneable front door to the registry. Transport code and tests never
//! touch the registry mailbox directly; they go through [`HubClient`].

use crate::framework::connection::ConnectionHandle;
use crate::framework::error::HubError;
use crate::framework::message::{GroupId, InboundMessage, RegistryRequest};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::instrument;

/// A type-safe client for the registry loop.
///
/// Every send waits for room in the registry mailbox; that wait is the
/// backpressure a slow group propagates back to its readers.
#[derive(Clone, Debug)]
pub struct HubClient<C> {
    sender: mpsc::Sender<RegistryRequest<C>>,
    default_group: GroupId,
    outbound_capacity: usize,
    shutdown: watch::Receiver<bool>,
}

impl<C> HubClient<C> {
    pub fn new(
        sender: mpsc::Sender<RegistryRequest<C>>,
        default_group: GroupId,
        outbound_capacity: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sender,
            default_group,
            outbound_capacity,
            shutdown,
        }
    }

    pub fn default_group(&self) -> &GroupId {
        &self.default_group
    }

    pub fn outbound_capacity(&self) -> usize {
        self.outbound_capacity
    }

    /// Receiver that changes once the hub starts shutting down.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }

    #[instrument(skip_all, fields(group = %group, connection = %connection.id()))]
    pub async fn register(&self, group: GroupId, connection: ConnectionHandle) -> Result<(), HubError> {
        self.sender
            .send(RegistryRequest::Register { group, connection })
            .await
            .map_err(|_| HubError::RegistryClosed)
    }

    /// Routes `message` to its group; dropped silently when the group does not exist.
    #[instrument(skip_all, fields(group = %message.group(), connection = %message.origin().id()))]
    pub async fn submit(&self, message: InboundMessage<C>) -> Result<(), HubError> {
        self.sender
            .send(RegistryRequest::Submit { message })
            .await
            .map_err(|_| HubError::RegistryClosed)
    }

    #[instrument(skip_all, fields(group = %group, connection = %connection.id()))]
    pub async fn close(&self, group: GroupId, connection: ConnectionHandle) -> Result<(), HubError> {
        self.sender
            .send(RegistryRequest::Close { group, connection })
            .await
            .map_err(|_| HubError::RegistryClosed)
    }

    /// Number of live groups in the registry mapping.
    pub async fn group_count(&self) -> Result<usize, HubError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(RegistryRequest::GroupCount { respond_to })
            .await
            .map_err(|_| HubError::RegistryClosed)?;
        response.await.map_err(|_| HubError::RegistryDropped)
    }

    /// Current membership size of `group`, or `None` when the group is absent.
    pub async fn member_count(&self, group: impl Into<GroupId>) -> Result<Option<usize>, HubError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(RegistryRequest::MemberCount {
                group: group.into(),
                respond_to,
            })
            .await
            .map_err(|_| HubError::RegistryClosed)?;
        // A group that retires before answering drops the reply sender.
        Ok(response.await.unwrap_or(None))
    }

    pub async fn contains_group(&self, group: impl Into<GroupId>) -> Result<bool, HubError> {
        Ok(self.member_count(group).await?.is_some())
    }

    /// Asks the registry to stop every group and exit its loop.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(RegistryRequest::Shutdown { respond_to })
            .await
            .map_err(|_| HubError::RegistryClosed)?;
        response.await.map_err(|_| HubError::RegistryDropped)
    }
}
