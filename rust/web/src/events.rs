use continental_engine::events::{Dispatch, Event};
use continental_engine::player::PlayerId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

use crate::tables::TableId;

// Slow subscribers lose events rather than stall the table.
const EVENT_CHANNEL_BUFFER: usize = 1000;

pub type EventSender = mpsc::Sender<Event>;
pub type EventReceiver = mpsc::Receiver<Event>;

/// A player's live feed of one table. Dropping it unsubscribes.
#[derive(Debug)]
pub struct EventSubscription {
    bus: EventBus,
    table_id: TableId,
    subscriber_id: usize,
    pub receiver: EventReceiver,
}

impl EventSubscription {
    pub fn receiver(&mut self) -> &mut EventReceiver {
        &mut self.receiver
    }

    pub fn table_id(&self) -> &TableId {
        &self.table_id
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.table_id, self.subscriber_id);
    }
}

#[derive(Debug)]
struct Subscriber {
    id: usize,
    player_id: PlayerId,
    sender: EventSender,
}

/// Routes engine notifications to the subscribers of a table, honouring
/// each notification's audience.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

#[derive(Debug, Default)]
struct EventBusInner {
    subscribers: RwLock<HashMap<TableId, Vec<Subscriber>>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, table_id: TableId, player_id: PlayerId) -> EventSubscription {
        let (subscriber_id, receiver) = self.subscribe_raw(table_id.clone(), player_id);
        EventSubscription {
            bus: self.clone(),
            table_id,
            subscriber_id,
            receiver,
        }
    }

    fn subscribe_raw(&self, table_id: TableId, player_id: PlayerId) -> (usize, EventReceiver) {
        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let id = self.inner.next_id.fetch_add(1, Ordering::AcqRel);
        tracing::info!(
            table_id = %table_id,
            player_id = %player_id,
            subscriber_id = id,
            "player subscribed to table events"
        );
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(table_id)
            .or_default()
            .push(Subscriber {
                id,
                player_id,
                sender,
            });
        (id, receiver)
    }

    /// Delivers each dispatch, in order, to the subscribers its audience covers.
    pub fn publish(&self, table_id: &TableId, dispatches: &[Dispatch]) {
        let guard = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(list) = guard.get(table_id) else {
            tracing::trace!(table_id = %table_id, "no subscribers for table");
            return;
        };

        let mut failed = Vec::new();
        for dispatch in dispatches {
            tracing::debug!(
                table_id = %table_id,
                event = dispatch.event.name(),
                audience = ?dispatch.audience,
                "publishing table event"
            );
            for subscriber in list {
                if !dispatch.audience.includes(&subscriber.player_id) || failed.contains(&subscriber.id) {
                    continue;
                }
                if let Err(err) = subscriber.sender.try_send(dispatch.event.clone()) {
                    tracing::warn!(
                        table_id = %table_id,
                        player_id = %subscriber.player_id,
                        subscriber_id = subscriber.id,
                        error = %err,
                        "dropping subscriber that cannot keep up"
                    );
                    failed.push(subscriber.id);
                }
            }
        }
        drop(guard);
        if !failed.is_empty() {
            self.remove_subscribers(table_id, |s| failed.contains(&s.id));
        }
    }

    pub fn send_to(&self, table_id: &TableId, player_id: &str, event: Event) {
        self.publish(table_id, &[Dispatch::to(player_id, event)]);
    }

    pub fn unsubscribe(&self, table_id: &TableId, subscriber_id: usize) {
        self.remove_subscribers(table_id, |s| s.id == subscriber_id);
    }

    /// Closes every stream a player holds on a table.
    pub fn drop_player(&self, table_id: &TableId, player_id: &str) {
        self.remove_subscribers(table_id, |s| s.player_id == player_id);
    }

    pub fn drop_table(&self, table_id: &TableId) {
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(table_id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    fn remove_subscribers(&self, table_id: &TableId, doomed: impl Fn(&Subscriber) -> bool) {
        let mut guard = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = guard.get_mut(table_id) {
            list.retain(|s| !doomed(s));
            if list.is_empty() {
                guard.remove(table_id);
            }
        }
    }
}
