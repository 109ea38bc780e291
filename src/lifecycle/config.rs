//! Hub configuration.

use crate::framework::{GroupId, GroupSettings, RegistrySettings};
use std::time::Duration;

/// Capacities and limits the hub is started with.
///
/// Registry and group mailboxes are bounded and senders wait when they are
/// full. Per-connection outbound queues drop the newest frame when full. The
/// fan-out queue is unbounded unless `broadcast_capacity` is set, in which case
/// [`Broadcaster::send`](crate::framework::Broadcaster::send) rejects when full.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub registry_capacity: usize,
    pub group_capacity: usize,
    pub outbound_capacity: usize,
    pub broadcast_capacity: Option<usize>,
    pub handler_timeout: Option<Duration>,
    pub default_group: GroupId,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            registry_capacity: 64,
            group_capacity: 32,
            outbound_capacity: 256,
            broadcast_capacity: None,
            handler_timeout: None,
            default_group: GroupId::default(),
        }
    }
}

impl HubConfig {
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    pub fn with_default_group(mut self, group: impl Into<GroupId>) -> Self {
        self.default_group = group.into();
        self
    }

    pub(crate) fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            mailbox_capacity: self.registry_capacity,
            outbound_capacity: self.outbound_capacity,
            default_group: self.default_group.clone(),
            group: GroupSettings {
                mailbox_capacity: self.group_capacity,
                broadcast_capacity: self.broadcast_capacity,
                handler_timeout: self.handler_timeout,
            },
        }
    }
}
