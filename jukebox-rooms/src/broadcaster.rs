use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};

use dashmap::DashMap;
use futures_util::Stream;
use parking_lot::Mutex;

use jukebox_core::Id;

use crate::{PrimaryKey, RoomEvent};

pub type SubscriptionId = Id<Subscription>;

/// Fans domain events out to the current subscribers of each room.
///
/// Publishing hands the event to every subscriber's mailbox and returns, so
/// the mutation path never waits on delivery. Within one room events reach
/// each subscriber in publish order; across rooms no order is promised.
///
/// This is an explicitly constructed component with its subscriber sets
/// scoped per room, passed to whoever needs to emit.
#[derive(Default)]
pub struct EventBroadcaster {
    channels: DashMap<PrimaryKey, Arc<RoomChannel>>,
}

/// The fan-out set of a single room.
struct RoomChannel {
    me: Weak<RoomChannel>,
    subscribers: Mutex<Vec<RoomSubscriber>>,
}

struct RoomSubscriber {
    id: SubscriptionId,
    user_id: PrimaryKey,
    mailbox: Arc<Mutex<VecDeque<RoomEvent>>>,
    waker: Arc<Mutex<Option<Waker>>>,
}

/// The receiving half of a room subscription, handed to a transport layer.
///
/// Yields events in publish order. Dropping the subscription detaches it
/// from the room, which is what keeps the fan-out set from accumulating
/// dead subscribers after disconnects.
pub struct Subscription {
    id: SubscriptionId,
    user_id: PrimaryKey,
    mailbox: Arc<Mutex<VecDeque<RoomEvent>>>,
    waker: Arc<Mutex<Option<Waker>>>,
    channel: Weak<RoomChannel>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Default::default()
    }

    /// Hands the event to every subscriber of the room and returns.
    /// Fire-and-forget: a room without subscribers swallows the event.
    pub fn publish(&self, room_id: PrimaryKey, event: RoomEvent) {
        if let Some(channel) = self.channels.get(&room_id) {
            channel.publish(event);
        }
    }

    /// Adds the identity to the room's fan-out set.
    pub fn subscribe(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Subscription {
        let channel = self
            .channels
            .entry(room_id)
            .or_insert_with(RoomChannel::new)
            .clone();

        channel.connect(user_id)
    }

    /// Detaches every subscription the identity holds on the room. Used when
    /// a member leaves or is found unresponsive; normal disconnects detach
    /// themselves when the [Subscription] drops.
    pub fn unsubscribe(&self, room_id: PrimaryKey, user_id: PrimaryKey) {
        if let Some(channel) = self.channels.get(&room_id) {
            channel.disconnect_user(user_id);
        }
    }

    /// Drops the room's entire fan-out set, ending all its subscriptions.
    pub fn remove_room(&self, room_id: PrimaryKey) {
        self.channels.remove(&room_id);
    }

    pub fn subscriber_count(&self, room_id: PrimaryKey) -> usize {
        self.channels
            .get(&room_id)
            .map(|c| c.subscribers.lock().len())
            .unwrap_or_default()
    }
}

impl RoomChannel {
    fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            subscribers: Default::default(),
        })
    }

    fn publish(&self, event: RoomEvent) {
        let subscribers = self.subscribers.lock();

        for subscriber in subscribers.iter() {
            subscriber.send(event.clone());
        }
    }

    fn connect(&self, user_id: PrimaryKey) -> Subscription {
        let subscriber = RoomSubscriber {
            id: SubscriptionId::new(),
            user_id,
            mailbox: Default::default(),
            waker: Default::default(),
        };

        let subscription = Subscription {
            id: subscriber.id,
            user_id,
            mailbox: subscriber.mailbox.clone(),
            waker: subscriber.waker.clone(),
            channel: self.me.clone(),
        };

        self.subscribers.lock().push(subscriber);
        subscription
    }

    fn disconnect(&self, id: SubscriptionId) {
        self.subscribers.lock().retain(|s| s.id != id);
    }

    fn disconnect_user(&self, user_id: PrimaryKey) {
        let mut subscribers = self.subscribers.lock();

        for subscriber in subscribers.iter().filter(|s| s.user_id == user_id) {
            // Wake the handle so it observes the detachment
            if let Some(waker) = subscriber.waker.lock().take() {
                waker.wake();
            }
        }

        subscribers.retain(|s| s.user_id != user_id);
    }

    fn is_attached(&self, id: SubscriptionId) -> bool {
        self.subscribers.lock().iter().any(|s| s.id == id)
    }
}

impl RoomSubscriber {
    fn send(&self, event: RoomEvent) {
        self.mailbox.lock().push_back(event);

        if let Some(waker) = self.waker.lock().take() {
            waker.wake();
        }
    }
}

impl Subscription {
    pub fn user_id(&self) -> PrimaryKey {
        self.user_id
    }
}

impl Stream for Subscription {
    type Item = RoomEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // Register the waker before inspecting the mailbox, so an event
        // arriving between the two cannot be missed. Only one lock is held
        // at a time here, since publishers take them in their own order.
        *self.waker.lock() = Some(cx.waker().clone());

        if let Some(event) = self.mailbox.lock().pop_front() {
            return Poll::Ready(Some(event));
        }

        // The stream ends when the room or this subscriber is gone
        let attached = self
            .channel
            .upgrade()
            .map(|c| c.is_attached(self.id))
            .unwrap_or_default();

        if !attached {
            return Poll::Ready(None);
        }

        Poll::Pending
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.upgrade() {
            channel.disconnect(self.id);
        }
    }
}
