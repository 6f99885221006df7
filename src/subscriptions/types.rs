//! Subscription value types (ยง3/ยง4.3): events as delivered to user callbacks,
//! and the registry entries the subscription manager tracks.

use crate::{
    connection::{ConnectionHandle, Instruction},
    error::DropReason,
    position::Position,
};
use futures_channel::mpsc;
use std::collections::HashSet;
use uuid::Uuid;

/// One event as stored, independent of how it was read or pushed.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub event_id: Uuid,
    pub event_stream_id: String,
    pub event_number: u64,
    pub event_type: String,
    pub data: Vec<u8>,
    pub metadata: Vec<u8>,
    pub is_json: bool,
}

/// {original event, link event (optional), original stream id, original event
/// number, original position}, per ยง3.
#[derive(Debug, Clone)]
pub struct ResolvedEvent {
    pub event: RecordedEvent,
    pub link: Option<RecordedEvent>,
    pub original_stream_id: String,
    pub original_event_number: u64,
    pub original_position: Option<Position>,
}

impl ResolvedEvent {
    /// The event a reader cares about: the link's target if this is a
    /// resolved link event, otherwise the event itself.
    pub fn original_event(&self) -> &RecordedEvent {
        self.link.as_ref().unwrap_or(&self.event)
    }
}

/// What the server confirmed when a subscription transitioned Subscribing ->
/// Subscribed (ยง4.3.1): last commit position (all-stream subscriptions) and/or
/// last event number (stream subscriptions).
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriptionConfirmation {
    pub last_commit_position: Option<i64>,
    pub last_event_number: Option<u64>,
}

/// Callback surface for a live subscription. All methods default to no-ops so
/// callers only implement what they need; dispatched from a dedicated task,
/// never from the connection driver, per ยง5's reactor-isolation rule.
pub trait SubscriptionListener: Send + 'static {
    fn on_confirmed(&mut self, _confirmation: SubscriptionConfirmation) {}
    fn on_event(&mut self, _event: ResolvedEvent) {}
    fn on_live_processing_started(&mut self) {}
    fn on_dropped(&mut self, _reason: DropReason, _error: Option<String>) {}
}

/// Tagged message sent from the subscription manager to a subscription's
/// dedicated dispatch task (ยง5 / ยง9: callbacks invoked on a channel, never on
/// the driver task that owns the socket).
pub enum DispatchMessage {
    Confirmed(SubscriptionConfirmation),
    Event(ResolvedEvent),
    LiveProcessingStarted,
    Dropped(DropReason, Option<String>),
}

/// Ties a persistent subscription's dispatch task back to the driver so it
/// can auto-ack/nak on the user's behalf, per ยง4.3's `autoAck` contract.
pub struct AutoAck {
    pub subscription_id: Uuid,
    pub handle: ConnectionHandle,
}

/// Spawns the task that owns `listener` and drains tagged messages onto it in
/// order. Returns the sender the manager uses to push messages; dropping the
/// sender (or the task observing a `Dropped` message) ends the task.
///
/// When `auto_ack` is set, an event is acked after `on_event` returns without
/// panicking, or NAK'd with reason `"handler-exception"` (then the panic is
/// resumed) if it does.
pub fn spawn_listener_task(
    mut listener: Box<dyn SubscriptionListener>,
    auto_ack: Option<AutoAck>,
) -> mpsc::UnboundedSender<DispatchMessage> {
    let (tx, mut rx) = mpsc::unbounded();
    tokio::spawn(async move {
        use futures_util::StreamExt;
        while let Some(msg) = rx.next().await {
            let terminal = matches!(msg, DispatchMessage::Dropped(..));
            match msg {
                DispatchMessage::Confirmed(c) => listener.on_confirmed(c),
                DispatchMessage::Event(e) => {
                    if let Some(auto) = &auto_ack {
                        let event_id = e.original_event().event_id;
                        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener.on_event(e)));
                        match outcome {
                            Ok(()) => {
                                let _ = auto.handle.send(Instruction::Ack { subscription_id: auto.subscription_id, event_id });
                            }
                            Err(payload) => {
                                let _ = auto.handle.send(Instruction::Nak {
                                    subscription_id: auto.subscription_id,
                                    event_id,
                                    reason: "handler-exception".into(),
                                });
                                std::panic::resume_unwind(payload);
                            }
                        }
                    } else {
                        listener.on_event(e);
                    }
                }
                DispatchMessage::LiveProcessingStarted => listener.on_live_processing_started(),
                DispatchMessage::Dropped(reason, err) => listener.on_dropped(reason, err),
            }
            if terminal {
                break;
            }
        }
    });
    tx
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Subscribing,
    Subscribed,
    Unsubscribed,
}

/// What distinguishes a persistent subscription entry from a plain volatile
/// one, per ยง4.3.
pub struct PersistentDetails {
    pub group: String,
    pub buffer_size: u32,
    pub auto_ack: bool,
    pub max_retries: Option<u32>,
    /// Event ids pushed to the user but not yet acked or nak'd.
    pub outstanding: HashSet<Uuid>,
}

pub enum SubscriptionKind {
    Volatile,
    Persistent(PersistentDetails),
}

/// One subscription registry entry, per ยง3/ยง4.3.
pub struct SubscriptionEntry {
    pub subscription_id: Uuid,
    pub stream: Option<String>,
    pub resolve_link_tos: bool,
    pub kind: SubscriptionKind,
    pub state: SubscriptionState,
    pub last_event_number: Option<u64>,
    pub last_position: Option<Position>,
    pub(crate) dispatch: mpsc::UnboundedSender<DispatchMessage>,
    /// Set exactly once, the first time a drop reason is observed, per ยง9's
    /// "at-most-once drop" guarantee.
    pub(crate) dropped: bool,
}

impl SubscriptionEntry {
    pub fn new_volatile(
        stream: Option<String>,
        resolve_link_tos: bool,
        listener: Box<dyn SubscriptionListener>,
    ) -> Self {
        Self {
            subscription_id: Uuid::new_v4(),
            stream,
            resolve_link_tos,
            kind: SubscriptionKind::Volatile,
            state: SubscriptionState::Subscribing,
            last_event_number: None,
            last_position: None,
            dispatch: spawn_listener_task(listener, None),
            dropped: false,
        }
    }

    pub fn new_persistent(
        stream: String,
        group: String,
        buffer_size: u32,
        auto_ack: bool,
        max_retries: Option<u32>,
        listener: Box<dyn SubscriptionListener>,
        handle: ConnectionHandle,
    ) -> Self {
        let subscription_id = Uuid::new_v4();
        let auto_ack_ctx = auto_ack.then(|| AutoAck { subscription_id, handle });
        Self {
            subscription_id,
            stream: Some(stream),
            resolve_link_tos: true,
            kind: SubscriptionKind::Persistent(PersistentDetails {
                group,
                buffer_size,
                auto_ack,
                max_retries,
                outstanding: HashSet::new(),
            }),
            state: SubscriptionState::Subscribing,
            last_event_number: None,
            last_position: None,
            dispatch: spawn_listener_task(listener, auto_ack_ctx),
            dropped: false,
        }
    }

    pub fn is_all_stream(&self) -> bool {
        self.stream.is_none()
    }
}
