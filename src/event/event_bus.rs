// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Publish/subscribe bus with isolated handler invocation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::Error;

use super::{DeviceEvent, EventKind};

/// Unique identifier for a bus subscription.
///
/// Returned by [`EventBus::subscribe`] and used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

type Handler = Arc<dyn Fn(&DeviceEvent) -> Result<(), Error> + Send + Sync>;

/// In-process pub/sub bus.
///
/// Handlers for a kind run in registration order on the publisher's task.
/// A handler that returns an error is logged and skipped; it never aborts
/// delivery to the remaining handlers and never reaches the publisher.
/// There is no persistence, no replay, and no cross-process delivery.
///
/// # Examples
///
/// ```
/// use roomlink_lib::event::{DeviceEvent, EventBus, EventKind};
/// use roomlink_lib::state::DeviceState;
///
/// let bus = EventBus::new();
/// let id = bus.subscribe(EventKind::StateUpdated, |event| {
///     println!("update for {}", event.device_id());
///     Ok(())
/// });
///
/// bus.publish(&DeviceEvent::state_updated("proj-1", DeviceState::new()));
/// bus.unsubscribe(EventKind::StateUpdated, id);
/// ```
pub struct EventBus {
    next_id: AtomicU64,
    /// Registration-ordered handler list per kind.
    handlers: RwLock<HashMap<EventKind, Vec<(SubscriptionId, Handler)>>>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a handler for an event kind.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&DeviceEvent) -> Result<(), Error> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes a handler by identity.
    ///
    /// Returns `true` if the subscription existed.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sub_id, _)| *sub_id != id);
        before != list.len()
    }

    /// Returns the number of handlers registered for a kind.
    #[must_use]
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Delivers an event to every handler registered for its kind.
    ///
    /// The handler list is snapshotted before delivery, so a handler that
    /// subscribes or unsubscribes during dispatch affects the next publish,
    /// not the running one.
    pub fn publish(&self, event: &DeviceEvent) {
        let snapshot: Vec<(SubscriptionId, Handler)> = self
            .handlers
            .read()
            .get(&event.kind())
            .map(Clone::clone)
            .unwrap_or_default();

        for (id, handler) in snapshot {
            if let Err(err) = handler(event) {
                tracing::error!(
                    subscription = %id,
                    device_id = %event.device_id(),
                    error = %err,
                    "event handler failed"
                );
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        f.debug_struct("EventBus")
            .field(
                "handlers",
                &handlers
                    .iter()
                    .map(|(kind, list)| (*kind, list.len()))
                    .collect::<HashMap<_, _>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::state::DeviceState;
    use std::sync::Mutex;

    fn update(device_id: &str) -> DeviceEvent {
        DeviceEvent::state_updated(device_id, DeviceState::new())
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.subscribe(EventKind::StateUpdated, move |_| {
                order.lock().unwrap().push(tag);
                Ok(())
            });
        }

        bus.publish(&update("proj-1"));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn failing_handler_does_not_abort_siblings() {
        let bus = EventBus::new();
        let delivered = Arc::new(AtomicU64::new(0));

        bus.subscribe(EventKind::StateUpdated, |_| {
            Err(Error::Driver(DriverError::AuthenticationFailed))
        });
        let counter = Arc::clone(&delivered);
        bus.subscribe(EventKind::StateUpdated, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(&update("proj-1"));
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_by_identity() {
        let bus = EventBus::new();
        let delivered = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&delivered);
        let id = bus.subscribe(EventKind::StateUpdated, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(bus.unsubscribe(EventKind::StateUpdated, id));
        assert!(!bus.unsubscribe(EventKind::StateUpdated, id));

        bus.publish(&update("proj-1"));
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn kinds_are_independent() {
        let bus = EventBus::new();
        let delivered = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&delivered);
        bus.subscribe(EventKind::ConnectionChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(&update("proj-1"));
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        assert_eq!(bus.handler_count(EventKind::ConnectionChanged), 1);
        assert_eq!(bus.handler_count(EventKind::StateUpdated), 0);
    }
}
