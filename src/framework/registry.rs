//! # Registry
//!
//! The [`Registry`] is the hub's top-level router. It owns the mapping from
//! [`GroupId`] to group actor and is the only place that mapping changes: every
//! structural change is a case of its single loop, totally ordered by arrival.
//!
//! ## Group lifecycle
//!
//! - The first registration for an unseen identifier spawns a [`GroupActor`].
//! - When a group's membership empties it raises [`GroupEvent::Empty`]. The
//!   registry retires the group only if the signal comes from the live actor
//!   and no registration is still in flight to it; retiring removes the entry
//!   and sends `Stop`, so the actor's task ends instead of idling forever.
//! - A stale signal is ignored; the actor signals again the next time it empties.

use crate::framework::client::HubClient;
use crate::framework::connection::ConnectionHandle;
use crate::framework::group::{GroupActor, GroupSettings};
use crate::framework::handler::Handler;
use crate::framework::message::{
    GroupCommand, GroupEvent, GroupId, InboundMessage, RegistryRequest, Response,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tunables the registry is built with.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub mailbox_capacity: usize,
    pub outbound_capacity: usize,
    pub default_group: GroupId,
    pub group: GroupSettings,
}

struct GroupEntry<C> {
    mailbox: mpsc::Sender<GroupCommand<C>>,
    task: JoinHandle<()>,
    generation: u64,
    registrations: u64,
}

/// The single-consumer loop owning the group mapping.
pub struct Registry<H: Handler> {
    receiver: mpsc::Receiver<RegistryRequest<H::Context>>,
    events: mpsc::UnboundedReceiver<GroupEvent>,
    events_tx: mpsc::UnboundedSender<GroupEvent>,
    groups: HashMap<GroupId, GroupEntry<H::Context>>,
    handler: Arc<H>,
    settings: GroupSettings,
    next_generation: u64,
}

impl<H: Handler> Registry<H> {
    /// Creates the registry and a client for it.
    ///
    /// `shutdown` is handed to clients so connection loops can observe hub shutdown.
    pub fn new(
        handler: H,
        settings: RegistrySettings,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, HubClient<H::Context>) {
        let (sender, receiver) = mpsc::channel(settings.mailbox_capacity.max(1));
        let (events_tx, events) = mpsc::unbounded_channel();
        let registry = Self {
            receiver,
            events,
            events_tx,
            groups: HashMap::new(),
            handler: Arc::new(handler),
            settings: settings.group,
            next_generation: 1,
        };
        let client = HubClient::new(
            sender,
            settings.default_group,
            settings.outbound_capacity,
            shutdown,
        );
        (registry, client)
    }

    /// Runs the loop until a `Shutdown` request arrives or every client is dropped.
    pub async fn run(mut self) {
        info!("Registry started");

        let mut shutdown_reply: Option<Response<()>> = None;
        loop {
            tokio::select! {
                biased;
                Some(event) = self.events.recv() => self.on_event(event).await,
                request = self.receiver.recv() => match request {
                    Some(RegistryRequest::Shutdown { respond_to }) => {
                        shutdown_reply = Some(respond_to);
                        break;
                    }
                    Some(request) => self.on_request(request).await,
                    None => break,
                },
            }
        }

        self.stop_all().await;
        info!("Registry shutdown");
        if let Some(respond_to) = shutdown_reply {
            let _ = respond_to.send(());
        }
    }

    async fn on_request(&mut self, request: RegistryRequest<H::Context>) {
        match request {
            RegistryRequest::Register { group, connection } => self.register(group, connection).await,
            RegistryRequest::Submit { message } => self.submit(message).await,
            RegistryRequest::Close { group, connection } => self.close(group, connection).await,
            RegistryRequest::GroupCount { respond_to } => {
                let _ = respond_to.send(self.groups.len());
            }
            RegistryRequest::MemberCount { group, respond_to } => match self.groups.get(&group) {
                // The group answers on its own turn; the registry does not wait.
                Some(entry) => {
                    let _ = entry.mailbox.send(GroupCommand::MemberCount(respond_to)).await;
                }
                None => {
                    let _ = respond_to.send(None);
                }
            },
            RegistryRequest::Shutdown { .. } => {}
        }
    }

    async fn register(&mut self, group: GroupId, connection: ConnectionHandle) {
        if self.groups.get(&group).is_some_and(|entry| entry.mailbox.is_closed()) {
            warn!(group = %group, "Group actor gone, respawning");
            self.groups.remove(&group);
        }
        if !self.groups.contains_key(&group) {
            let entry = self.spawn_group(&group);
            self.groups.insert(group.clone(), entry);
        }
        let Some(entry) = self.groups.get_mut(&group) else {
            return;
        };

        entry.registrations += 1;
        if entry.mailbox.send(GroupCommand::Register(connection)).await.is_err() {
            warn!(group = %group, "Group actor gone, registration lost");
            self.groups.remove(&group);
        }
    }

    async fn submit(&mut self, message: InboundMessage<H::Context>) {
        let group = message.group().clone();
        let Some(entry) = self.groups.get(&group) else {
            debug!(group = %group, "Submit for unknown group, dropped");
            return;
        };
        if entry.mailbox.send(GroupCommand::Message(message)).await.is_err() {
            warn!(group = %group, "Group actor gone, message dropped");
            self.groups.remove(&group);
        }
    }

    async fn close(&mut self, group: GroupId, connection: ConnectionHandle) {
        let Some(entry) = self.groups.get(&group) else {
            debug!(group = %group, connection = %connection.id(), "Close for unknown group");
            return;
        };
        if entry.mailbox.send(GroupCommand::Close(connection.id())).await.is_err() {
            warn!(group = %group, "Group actor gone on close");
            self.groups.remove(&group);
        }
    }

    async fn on_event(&mut self, event: GroupEvent) {
        match event {
            GroupEvent::Empty {
                group,
                generation,
                registrations,
            } => {
                let live = self.groups.get(&group).is_some_and(|entry| {
                    entry.generation == generation && entry.registrations == registrations
                });
                if !live {
                    debug!(group = %group, generation, "Stale empty signal ignored");
                    return;
                }
                if let Some(entry) = self.groups.remove(&group) {
                    // Everything forwarded earlier sits ahead of Stop in the mailbox.
                    let _ = entry.mailbox.send(GroupCommand::Stop).await;
                    info!(group = %group, generation, size = self.groups.len(), "Group retired");
                }
            }
        }
    }

    fn spawn_group(&mut self, group: &GroupId) -> GroupEntry<H::Context> {
        let generation = self.next_generation;
        self.next_generation += 1;
        let (actor, mailbox) = GroupActor::new(
            group.clone(),
            generation,
            Arc::clone(&self.handler),
            self.events_tx.clone(),
            &self.settings,
        );
        let task = tokio::spawn(actor.run());
        info!(group = %group, generation, size = self.groups.len() + 1, "Group spawned");
        GroupEntry {
            mailbox,
            task,
            generation,
            registrations: 0,
        }
    }

    async fn stop_all(&mut self) {
        for (group, entry) in self.groups.drain() {
            let _ = entry.mailbox.send(GroupCommand::Stop).await;
            if let Err(e) = entry.task.await {
                warn!(group = %group, error = %e, "Group task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::connection::ConnectionId;
    use crate::framework::error::HubError;
    use crate::framework::handler::Broadcaster;
    use crate::framework::message::Frame;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        type Context = ();
        type Error = HubError;

        async fn handle(&self, message: InboundMessage<()>, broadcast: &Broadcaster) -> Result<(), HubError> {
            broadcast.send(message.payload().clone())
        }
    }

    fn registry() -> Registry<Echo> {
        let settings = RegistrySettings {
            mailbox_capacity: 8,
            outbound_capacity: 8,
            default_group: GroupId::default(),
            group: GroupSettings {
                mailbox_capacity: 8,
                broadcast_capacity: None,
                handler_timeout: None,
            },
        };
        let (_, signal) = watch::channel(false);
        Registry::new(Echo, settings, signal).0
    }

    fn connection() -> (ConnectionHandle, mpsc::Receiver<Frame>) {
        let (sender, receiver) = mpsc::channel(8);
        (ConnectionHandle::new(ConnectionId::next(), sender), receiver)
    }

    #[tokio::test]
    async fn empty_signal_with_registration_in_flight_is_ignored() {
        let mut registry = registry();
        let group = GroupId::from("u1");
        let (a, _a_rx) = connection();

        registry.register(group.clone(), a).await;
        let generation = registry.groups[&group].generation;

        // The actor emptied before processing the registration forwarded above.
        registry
            .on_event(GroupEvent::Empty {
                group: group.clone(),
                generation,
                registrations: 0,
            })
            .await;
        assert!(registry.groups.contains_key(&group));

        registry
            .on_event(GroupEvent::Empty {
                group: group.clone(),
                generation,
                registrations: 1,
            })
            .await;
        assert!(!registry.groups.contains_key(&group));
    }

    #[tokio::test]
    async fn signal_from_previous_generation_is_ignored() {
        let mut registry = registry();
        let group = GroupId::from("u1");
        let (a, _a_rx) = connection();
        let (b, _b_rx) = connection();

        registry.register(group.clone(), a).await;
        let first = registry.groups[&group].generation;
        registry
            .on_event(GroupEvent::Empty {
                group: group.clone(),
                generation: first,
                registrations: 1,
            })
            .await;

        registry.register(group.clone(), b).await;
        let second = registry.groups[&group].generation;
        assert_ne!(first, second);

        registry
            .on_event(GroupEvent::Empty {
                group: group.clone(),
                generation: first,
                registrations: 1,
            })
            .await;
        assert!(registry.groups.contains_key(&group));
        assert_eq!(registry.groups.len(), 1);
    }

    #[tokio::test]
    async fn submit_to_unknown_group_spawns_nothing() {
        let mut registry = registry();
        let (a, mut a_rx) = connection();

        registry
            .submit(InboundMessage::new(GroupId::from("ghost"), "hi".into(), (), a))
            .await;

        assert!(registry.groups.is_empty());
        assert!(a_rx.try_recv().is_err());
    }
}
