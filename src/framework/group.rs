//! # Group Actor
//!
//! One [`GroupActor`] runs per live group identifier. It exclusively owns the
//! group's membership and serializes registrations, closes, handler calls and
//! fan-out through a single loop, so none of that state needs a lock.
//!
//! Fan-out only queues frames on each member's outbound queue; the network
//! writes happen in the members' writer tasks, outside this loop's turn.

use crate::framework::connection::{ConnectionHandle, ConnectionId, Delivery};
use crate::framework::handler::{broadcast_queue, BroadcastQueue, Broadcaster, Handler};
use crate::framework::message::{Frame, GroupCommand, GroupEvent, GroupId, InboundMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Tunables a group actor is spawned with.
#[derive(Debug, Clone)]
pub struct GroupSettings {
    pub mailbox_capacity: usize,
    pub broadcast_capacity: Option<usize>,
    pub handler_timeout: Option<Duration>,
}

/// The single-consumer loop owning one group's membership.
pub struct GroupActor<H: Handler> {
    group: GroupId,
    generation: u64,
    receiver: mpsc::Receiver<GroupCommand<H::Context>>,
    fanout: BroadcastQueue,
    broadcaster: Broadcaster,
    members: HashMap<ConnectionId, ConnectionHandle>,
    handler: Arc<H>,
    events: mpsc::UnboundedSender<GroupEvent>,
    handler_timeout: Option<Duration>,
    registrations: u64,
}

impl<H: Handler> GroupActor<H> {
    /// Creates the actor and the sender side of its mailbox.
    ///
    /// `events` is the registry's signal channel; it is unbounded so the actor
    /// never waits on the registry.
    pub fn new(
        group: GroupId,
        generation: u64,
        handler: Arc<H>,
        events: mpsc::UnboundedSender<GroupEvent>,
        settings: &GroupSettings,
    ) -> (Self, mpsc::Sender<GroupCommand<H::Context>>) {
        let (sender, receiver) = mpsc::channel(settings.mailbox_capacity.max(1));
        let (broadcaster, fanout) = broadcast_queue(group.clone(), settings.broadcast_capacity);
        let actor = Self {
            group,
            generation,
            receiver,
            fanout,
            broadcaster,
            members: HashMap::new(),
            handler,
            events,
            handler_timeout: settings.handler_timeout,
            registrations: 0,
        };
        (actor, sender)
    }

    /// Runs the loop until a `Stop` command arrives or the mailbox closes.
    ///
    /// Pending broadcasts are always drained before the next command, so a
    /// handler's output goes out before the next handler call and before `Stop`.
    pub async fn run(mut self) {
        info!(group = %self.group, generation = self.generation, "Group started");

        loop {
            tokio::select! {
                biased;
                Some(frame) = self.fanout.recv() => self.fan_out(frame),
                command = self.receiver.recv() => match command {
                    Some(GroupCommand::Register(connection)) => self.register(connection),
                    Some(GroupCommand::Message(message)) => self.dispatch(message).await,
                    Some(GroupCommand::Close(connection)) => self.close(connection),
                    Some(GroupCommand::MemberCount(respond_to)) => {
                        let _ = respond_to.send(Some(self.members.len()));
                    }
                    Some(GroupCommand::Stop) | None => break,
                },
            }
        }

        info!(group = %self.group, generation = self.generation, size = self.members.len(), "Group stopped");
    }

    fn register(&mut self, connection: ConnectionHandle) {
        self.registrations += 1;
        let id = connection.id();
        self.members.insert(id, connection);
        debug!(group = %self.group, connection = %id, size = self.members.len(), "Registered");
    }

    fn close(&mut self, connection: ConnectionId) {
        if self.members.remove(&connection).is_none() {
            debug!(group = %self.group, %connection, "Close for unknown member");
            return;
        }
        debug!(group = %self.group, %connection, size = self.members.len(), "Closed");
        if self.members.is_empty() {
            self.notify_empty();
        }
    }

    async fn dispatch(&mut self, message: InboundMessage<H::Context>) {
        let origin = message.origin().clone();
        debug!(group = %self.group, connection = %origin.id(), bytes = message.payload().len(), "Message");

        let call = self.handler.handle(message, &self.broadcaster);
        let outcome = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err("handler timed out".to_string()),
            },
            None => call.await.map_err(|e| e.to_string()),
        };

        if let Err(reason) = outcome {
            warn!(group = %self.group, connection = %origin.id(), error = %reason, "Handler failed");
            // Reported to the originator only; the group keeps running.
            if origin.deliver(Frame::error(&reason)) != Delivery::Queued {
                debug!(group = %self.group, connection = %origin.id(), "Error frame not delivered");
            }
        }
    }

    fn fan_out(&mut self, frame: Frame) {
        let mut gone = Vec::new();
        for (id, member) in &self.members {
            match member.deliver(frame.clone()) {
                Delivery::Queued => {}
                Delivery::Dropped => {
                    warn!(group = %self.group, connection = %id, "Outbound queue full, dropping frame")
                }
                Delivery::Gone => gone.push(*id),
            }
        }
        debug!(group = %self.group, size = self.members.len(), bytes = frame.len(), "Broadcast");

        if gone.is_empty() {
            return;
        }
        for id in gone {
            self.members.remove(&id);
            info!(group = %self.group, connection = %id, size = self.members.len(), "Evicted dead member");
        }
        if self.members.is_empty() {
            self.notify_empty();
        }
    }

    fn notify_empty(&self) {
        debug!(group = %self.group, generation = self.generation, "Empty");
        let event = GroupEvent::Empty {
            group: self.group.clone(),
            generation: self.generation,
            registrations: self.registrations,
        };
        if self.events.send(event).is_err() {
            debug!(group = %self.group, "Registry gone before empty signal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::error::HubError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::oneshot;

    struct Shout;

    #[derive(Debug, thiserror::Error)]
    enum ShoutError {
        #[error("empty payload")]
        Empty,
        #[error(transparent)]
        Hub(#[from] HubError),
    }

    #[async_trait]
    impl Handler for Shout {
        type Context = ();
        type Error = ShoutError;

        async fn handle(&self, message: InboundMessage<()>, broadcast: &Broadcaster) -> Result<(), ShoutError> {
            if message.payload().is_empty() {
                return Err(ShoutError::Empty);
            }
            let text = String::from_utf8_lossy(message.payload()).to_uppercase();
            broadcast.send(text.clone())?;
            broadcast.send(format!("{text}!"))?;
            Ok(())
        }
    }

    fn settings() -> GroupSettings {
        GroupSettings {
            mailbox_capacity: 8,
            broadcast_capacity: None,
            handler_timeout: None,
        }
    }

    fn member() -> (ConnectionHandle, mpsc::Receiver<Frame>) {
        let (sender, receiver) = mpsc::channel(8);
        (ConnectionHandle::new(ConnectionId::next(), sender), receiver)
    }

    fn message(origin: &ConnectionHandle, payload: &'static str) -> InboundMessage<()> {
        InboundMessage::new(GroupId::from("g"), Bytes::from_static(payload.as_bytes()), (), origin.clone())
    }

    #[tokio::test]
    async fn broadcasts_reach_members_in_issue_order() {
        let (events, _events_rx) = mpsc::unbounded_channel();
        let (actor, mailbox) = GroupActor::new(GroupId::from("g"), 1, Arc::new(Shout), events, &settings());
        let task = tokio::spawn(actor.run());

        let (a, mut a_rx) = member();
        let (b, mut b_rx) = member();
        mailbox.send(GroupCommand::Register(a.clone())).await.unwrap();
        mailbox.send(GroupCommand::Register(b.clone())).await.unwrap();
        mailbox.send(GroupCommand::Message(message(&a, "hi"))).await.unwrap();

        for rx in [&mut a_rx, &mut b_rx] {
            assert_eq!(rx.recv().await, Some(Frame::from("HI")));
            assert_eq!(rx.recv().await, Some(Frame::from("HI!")));
        }

        mailbox.send(GroupCommand::Stop).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn handler_error_goes_to_origin_only() {
        let (events, _events_rx) = mpsc::unbounded_channel();
        let (actor, mailbox) = GroupActor::new(GroupId::from("g"), 1, Arc::new(Shout), events, &settings());
        let task = tokio::spawn(actor.run());

        let (a, mut a_rx) = member();
        let (b, mut b_rx) = member();
        mailbox.send(GroupCommand::Register(a.clone())).await.unwrap();
        mailbox.send(GroupCommand::Register(b.clone())).await.unwrap();
        mailbox.send(GroupCommand::Message(message(&a, ""))).await.unwrap();
        mailbox.send(GroupCommand::Message(message(&b, "ok"))).await.unwrap();

        assert_eq!(a_rx.recv().await, Some(Frame::error("empty payload")));
        assert_eq!(a_rx.recv().await, Some(Frame::from("OK")));
        assert_eq!(b_rx.recv().await, Some(Frame::from("OK")));

        mailbox.send(GroupCommand::Stop).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn last_close_signals_empty_with_registration_count() {
        let (events, mut events_rx) = mpsc::unbounded_channel();
        let (actor, mailbox) = GroupActor::new(GroupId::from("g"), 7, Arc::new(Shout), events, &settings());
        let task = tokio::spawn(actor.run());

        let (a, _a_rx) = member();
        let (b, _b_rx) = member();
        mailbox.send(GroupCommand::Register(a.clone())).await.unwrap();
        mailbox.send(GroupCommand::Register(b.clone())).await.unwrap();
        mailbox.send(GroupCommand::Close(a.id())).await.unwrap();
        mailbox.send(GroupCommand::Close(b.id())).await.unwrap();

        let event = events_rx.recv().await.unwrap();
        assert_eq!(
            event,
            GroupEvent::Empty {
                group: GroupId::from("g"),
                generation: 7,
                registrations: 2,
            }
        );

        mailbox.send(GroupCommand::Stop).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn full_outbound_queue_drops_frame_but_keeps_member() {
        let (events, mut events_rx) = mpsc::unbounded_channel();
        let (actor, mailbox) = GroupActor::new(GroupId::from("g"), 1, Arc::new(Shout), events, &settings());
        let task = tokio::spawn(actor.run());

        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let slow = ConnectionHandle::new(ConnectionId::next(), slow_tx);
        let (b, mut b_rx) = member();
        mailbox.send(GroupCommand::Register(slow.clone())).await.unwrap();
        mailbox.send(GroupCommand::Register(b.clone())).await.unwrap();

        // Two broadcasts; the slow member only has room for the first.
        mailbox.send(GroupCommand::Message(message(&b, "x"))).await.unwrap();
        assert_eq!(b_rx.recv().await, Some(Frame::from("X")));
        assert_eq!(b_rx.recv().await, Some(Frame::from("X!")));

        let (respond_to, response) = oneshot::channel();
        mailbox.send(GroupCommand::MemberCount(respond_to)).await.unwrap();
        assert_eq!(response.await.unwrap(), Some(2));
        assert!(events_rx.try_recv().is_err());

        assert_eq!(slow_rx.recv().await, Some(Frame::from("X")));
        assert!(slow_rx.try_recv().is_err());

        // Once drained, the slow member receives again.
        mailbox.send(GroupCommand::Message(message(&b, "y"))).await.unwrap();
        assert_eq!(slow_rx.recv().await, Some(Frame::from("Y")));

        mailbox.send(GroupCommand::Stop).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn dead_member_is_evicted_on_fan_out() {
        let (events, mut events_rx) = mpsc::unbounded_channel();
        let (actor, mailbox) = GroupActor::new(GroupId::from("g"), 1, Arc::new(Shout), events, &settings());
        let task = tokio::spawn(actor.run());

        let (a, a_rx) = member();
        let (b, mut b_rx) = member();
        mailbox.send(GroupCommand::Register(a.clone())).await.unwrap();
        mailbox.send(GroupCommand::Register(b.clone())).await.unwrap();
        drop(a_rx);
        mailbox.send(GroupCommand::Message(message(&b, "x"))).await.unwrap();
        assert_eq!(b_rx.recv().await, Some(Frame::from("X")));

        let (respond_to, response) = oneshot::channel();
        mailbox.send(GroupCommand::MemberCount(respond_to)).await.unwrap();
        assert_eq!(response.await.unwrap(), Some(1));
        assert!(events_rx.try_recv().is_err());

        mailbox.send(GroupCommand::Stop).await.unwrap();
        task.await.unwrap();
    }
}
