//! Subscription manager (ยง4.3): server-push subscription registry that
//! multiplexes volatile and persistent subscriptions onto user callbacks,
//! symmetric in shape to the operation manager but confirmation-gated and
//! with at-most-once drop semantics.

use super::types::{
    DispatchMessage, SubscriptionConfirmation, SubscriptionEntry, SubscriptionKind, SubscriptionState,
};
use crate::{error::DropReason, package::Package, wire_messages};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy)]
pub struct SubscriptionCounters {
    pub confirmed: u64,
    pub events_delivered: u64,
    pub dropped: u64,
}

/// A subscription request not yet sent to the server, queued the same way
/// the operation manager queues unsent operations.
pub struct PendingSubscribe {
    pub entry: SubscriptionEntry,
    pub to_package: Box<dyn FnOnce(Uuid) -> Package + Send>,
}

pub struct SubscriptionManager {
    waiting: VecDeque<PendingSubscribe>,
    /// Keyed by the wire correlation id of the subscription's current dispatch
    /// -- a fresh id every time it is (re-)sent to the server, per ยง4.1.
    active: HashMap<Uuid, SubscriptionEntry>,
    /// Maps the stable, user-facing `subscription_id` (returned from
    /// `subscribe`/`connectToPersistentSubscription` and used by callers for
    /// `unsubscribe`/`ack`/`nak`) to its current entry's wire correlation id.
    id_index: HashMap<Uuid, Uuid>,
    counters: SubscriptionCounters,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self { waiting: VecDeque::new(), active: HashMap::new(), id_index: HashMap::new(), counters: SubscriptionCounters::default() }
    }

    pub fn counters(&self) -> SubscriptionCounters {
        self.counters
    }

    pub fn enqueue(&mut self, pending: PendingSubscribe) -> Uuid {
        let id = pending.entry.subscription_id;
        self.waiting.push_back(pending);
        id
    }

    /// Sends every waiting subscribe request, symmetric to the operation
    /// manager's `scheduleWaiting` but unbounded (subscriptions don't share
    /// the operation concurrency cap). Each dispatch gets a fresh wire
    /// correlation id, per ยง4.1, distinct from the entry's stable
    /// user-facing `subscription_id`.
    pub fn schedule_waiting(&mut self) -> Vec<Package> {
        let mut ready = Vec::new();
        while let Some(pending) = self.waiting.pop_front() {
            let user_id = pending.entry.subscription_id;
            let correlation_id = Uuid::new_v4();
            let pkg = (pending.to_package)(correlation_id);
            self.id_index.insert(user_id, correlation_id);
            self.active.insert(correlation_id, pending.entry);
            ready.push(pkg);
        }
        ready
    }

    /// Dispatches a server frame by wire correlation id. Returns `true` if
    /// the id belonged to a subscription.
    pub fn handle_frame(&mut self, correlation_id: Uuid, package: &Package) -> bool {
        use crate::package::CommandTag::*;
        let Some(entry) = self.active.get_mut(&correlation_id) else {
            return false;
        };

        match package.command {
            SubscriptionConfirmation | PersistentSubscriptionConfirmation => {
                entry.state = SubscriptionState::Subscribed;
                self.counters.confirmed += 1;
                let confirmation = decode_confirmation(package);
                let _ = entry.dispatch.unbounded_send(DispatchMessage::Confirmed(confirmation));
            }
            StreamEventAppeared | PersistentSubscriptionStreamEventAppeared => {
                if entry.state != SubscriptionState::Subscribed {
                    warn!(%correlation_id, "event delivered before confirmation; ignoring");
                    return true;
                }
                if let Some(resolved) = decode_event(package) {
                    entry.last_event_number = Some(resolved.original_event_number);
                    entry.last_position = resolved.original_position.or(entry.last_position);
                    if let SubscriptionKind::Persistent(details) = &mut entry.kind {
                        details.outstanding.insert(resolved.event.event_id);
                    }
                    self.counters.events_delivered += 1;
                    let _ = entry.dispatch.unbounded_send(DispatchMessage::Event(resolved));
                }
            }
            SubscriptionDropped => {
                let (reason, error) = decode_drop_reason(package);
                self.drop_subscription(correlation_id, reason, error);
            }
            _ => {
                debug!(%correlation_id, command = ?package.command, "unexpected frame for subscription");
            }
        }
        true
    }

    /// Fires the drop callback at most once, per ยง4.3/ยง9, then removes the
    /// entry from the active map and its user-facing id from the index.
    pub fn drop_subscription(&mut self, correlation_id: Uuid, reason: DropReason, error: Option<String>) {
        if let Some(mut entry) = self.active.remove(&correlation_id) {
            self.id_index.remove(&entry.subscription_id);
            if !entry.dropped {
                entry.dropped = true;
                self.counters.dropped += 1;
                let _ = entry.dispatch.unbounded_send(DispatchMessage::Dropped(reason, error));
            }
        }
    }

    pub fn unsubscribe(&mut self, subscription_id: Uuid) {
        if let Some(&correlation_id) = self.id_index.get(&subscription_id) {
            self.drop_subscription(correlation_id, DropReason::Unsubscribed, None);
        }
    }

    /// Acknowledges or NAKs a persistent-subscription event by id, per ยง4.3.
    /// `subscription_id` is the stable user-facing id; resolved to the
    /// entry's current wire correlation id via the index.
    pub fn ack(&mut self, subscription_id: Uuid, event_id: Uuid) {
        let Some(&correlation_id) = self.id_index.get(&subscription_id) else { return };
        if let Some(entry) = self.active.get_mut(&correlation_id) {
            if let SubscriptionKind::Persistent(details) = &mut entry.kind {
                details.outstanding.remove(&event_id);
            }
        }
    }

    pub fn nak(&mut self, subscription_id: Uuid, event_id: Uuid) {
        let Some(&correlation_id) = self.id_index.get(&subscription_id) else { return };
        if let Some(entry) = self.active.get_mut(&correlation_id) {
            if let SubscriptionKind::Persistent(details) = &mut entry.kind {
                details.outstanding.remove(&event_id);
            }
        }
    }

    /// On entering `Reconnecting` (ยง4.3): active subscriptions move back to
    /// waiting, preserving their last observed position so the server
    /// resumes correctly, and keeping the same user-facing subscription id so
    /// the caller never observes an identity change. The wire correlation id
    /// used for the resend is regenerated fresh once the subscription is
    /// redispatched by `schedule_waiting`, per ยง4.1 -- the index is cleared
    /// here and rebuilt there.
    pub fn on_reconnecting<F>(&mut self, mut to_package: F)
    where
        F: FnMut(&SubscriptionEntry) -> Box<dyn FnOnce(Uuid) -> Package + Send>,
    {
        let active: Vec<SubscriptionEntry> = self.active.drain().map(|(_, e)| e).collect();
        self.id_index.clear();
        for mut entry in active {
            entry.state = SubscriptionState::Subscribing;
            let pkg_fn = to_package(&entry);
            self.waiting.push_front(PendingSubscribe { entry, to_package: pkg_fn });
        }
    }

    /// On entering `Closed`: every waiting and active subscription is dropped
    /// with `ConnectionClosed`.
    pub fn on_closed(&mut self) {
        let ids: Vec<Uuid> = self.active.keys().copied().collect();
        for id in ids {
            self.drop_subscription(id, DropReason::ConnectionClosed, None);
        }
        for pending in self.waiting.drain(..) {
            let mut entry = pending.entry;
            entry.dropped = true;
            let _ = entry.dispatch.unbounded_send(DispatchMessage::Dropped(DropReason::ConnectionClosed, None));
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_confirmation(package: &Package) -> SubscriptionConfirmation {
    wire_messages::decode::<wire_messages::SubscriptionConfirmationDto>(&package.payload)
        .map(|dto| SubscriptionConfirmation {
            last_commit_position: dto.last_commit_position,
            last_event_number: dto.last_event_number,
        })
        .unwrap_or_default()
}

fn decode_drop_reason(package: &Package) -> (DropReason, Option<String>) {
    match wire_messages::decode::<wire_messages::SubscriptionDroppedDto>(&package.payload) {
        Ok(dto) => (map_drop_reason(&dto.reason), dto.error),
        Err(_) => (DropReason::ServerError, None),
    }
}

fn map_drop_reason(reason: &str) -> DropReason {
    match reason {
        "unsubscribed" => DropReason::Unsubscribed,
        "access_denied" => DropReason::AccessDenied,
        "not_found" => DropReason::NotFound,
        "persistent_subscription_deleted" => DropReason::PersistentSubscriptionDeleted,
        "subscriber_max_count_reached" => DropReason::SubscriberMaxCountReached,
        _ => DropReason::ServerError,
    }
}

fn decode_event(package: &Package) -> Option<super::types::ResolvedEvent> {
    wire_messages::decode::<wire_messages::ResolvedEventDto>(&package.payload)
        .ok()
        .map(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        package::CommandTag,
        subscriptions::types::{SubscriptionEntry, SubscriptionListener},
    };
    use std::sync::{Arc, Mutex};

    struct RecordingListener {
        confirmed: Arc<Mutex<bool>>,
        dropped: Arc<Mutex<Option<DropReason>>>,
    }

    impl SubscriptionListener for RecordingListener {
        fn on_confirmed(&mut self, _c: SubscriptionConfirmation) {
            *self.confirmed.lock().unwrap() = true;
        }
        fn on_dropped(&mut self, reason: DropReason, _error: Option<String>) {
            *self.dropped.lock().unwrap() = Some(reason);
        }
    }

    #[tokio::test]
    async fn confirmation_then_close_drops_exactly_once() {
        let confirmed = Arc::new(Mutex::new(false));
        let dropped = Arc::new(Mutex::new(None));
        let listener = RecordingListener { confirmed: confirmed.clone(), dropped: dropped.clone() };
        let entry = SubscriptionEntry::new_volatile(Some("a".into()), true, Box::new(listener));
        let id = entry.subscription_id;

        let mut mgr = SubscriptionManager::new();
        mgr.enqueue(PendingSubscribe {
            entry,
            to_package: Box::new(move |id| Package::new(CommandTag::SubscribeToStream, id, vec![])),
        });
        let sent = mgr.schedule_waiting();
        let correlation_id = sent[0].correlation_id;
        assert_ne!(correlation_id, id, "wire correlation id must be freshly generated, not the user-facing subscription id");

        let confirm_pkg = Package::new(CommandTag::SubscriptionConfirmation, correlation_id, vec![]);
        assert!(mgr.handle_frame(correlation_id, &confirm_pkg));

        mgr.on_closed();
        mgr.on_closed(); // idempotent: nothing left to drop twice

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(*confirmed.lock().unwrap());
        assert_eq!(*dropped.lock().unwrap(), Some(DropReason::ConnectionClosed));
    }

    /// `unsubscribe`/`ack`/`nak` are called with the stable, user-facing
    /// subscription id, which must resolve through the index to whatever
    /// wire correlation id is currently active -- even after a reconnect
    /// regenerates it.
    #[tokio::test]
    async fn user_facing_id_resolves_across_reconnect() {
        let dropped = Arc::new(Mutex::new(None));
        let listener = RecordingListener { confirmed: Arc::new(Mutex::new(false)), dropped: dropped.clone() };
        let entry = SubscriptionEntry::new_volatile(Some("a".into()), true, Box::new(listener));
        let user_id = entry.subscription_id;

        let mut mgr = SubscriptionManager::new();
        mgr.enqueue(PendingSubscribe {
            entry,
            to_package: Box::new(move |id| Package::new(CommandTag::SubscribeToStream, id, vec![])),
        });
        let first_dispatch = mgr.schedule_waiting();
        let first_correlation_id = first_dispatch[0].correlation_id;

        mgr.on_reconnecting(|entry| {
            let stream = entry.stream.clone();
            Box::new(move |id| Package::new(CommandTag::SubscribeToStream, id, wire_messages::encode(&stream)))
        });
        let second_dispatch = mgr.schedule_waiting();
        let second_correlation_id = second_dispatch[0].correlation_id;
        assert_ne!(first_correlation_id, second_correlation_id, "reconnect must regenerate the wire correlation id");

        // A frame keyed by the old correlation id is no longer routable.
        let stale_pkg = Package::new(CommandTag::SubscriptionConfirmation, first_correlation_id, vec![]);
        assert!(!mgr.handle_frame(first_correlation_id, &stale_pkg));

        // unsubscribe by the stable user-facing id still resolves to the
        // freshly dispatched entry.
        mgr.unsubscribe(user_id);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(*dropped.lock().unwrap(), Some(DropReason::Unsubscribed));
        assert!(!mgr.handle_frame(second_correlation_id, &stale_pkg));
    }
}
