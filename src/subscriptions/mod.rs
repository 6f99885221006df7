//! Subscription registry (ยง3/ยง4.3): volatile and persistent server-push
//! subscriptions, multiplexed onto user callbacks off the I/O reactor task.

mod manager;
mod types;

pub use manager::{PendingSubscribe, SubscriptionCounters, SubscriptionManager};
pub use types::{
    DispatchMessage, PersistentDetails, RecordedEvent, ResolvedEvent, SubscriptionConfirmation,
    SubscriptionEntry, SubscriptionKind, SubscriptionListener, SubscriptionState,
};
