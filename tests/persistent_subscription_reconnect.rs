#[path = "common/mod.rs"]
mod common;

use eventstore_client::{
    client::EventStoreClient,
    config::ClientSettings,
    error::DropReason,
    package::{CommandTag, Package},
    wire_messages::{self, CreatePersistentSubscriptionRequest},
    ResolvedEvent, SubscriptionConfirmation, SubscriptionListener,
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

struct RecordingListener {
    confirmed: Arc<Mutex<bool>>,
}

impl SubscriptionListener for RecordingListener {
    fn on_confirmed(&mut self, _confirmation: SubscriptionConfirmation) {
        *self.confirmed.lock().unwrap() = true;
    }
    fn on_event(&mut self, _event: ResolvedEvent) {}
    fn on_dropped(&mut self, _reason: DropReason, _error: Option<String>) {}
}

/// The first connection is dropped before it confirms the subscription. ยง4.3
/// requires the resubscribe sent on the second connection to still carry the
/// subscription's own kind: a persistent subscription must come back as
/// `ConnectToPersistentSubscription` with its group/buffer_size/auto_ack
/// intact, not be silently downgraded to a generic `SubscribeToStream`.
#[tokio::test]
async fn persistent_subscription_resubscribes_with_its_own_kind_after_reconnect() {
    let (listener, port) = common::listener().await;
    let seen_request = Arc::new(Mutex::new(None));
    let seen_request_srv = seen_request.clone();

    tokio::spawn(async move {
        common::accept_and_drop(&listener).await;
        common::serve_once(listener, move |pkg: Package| -> Vec<Package> {
            match pkg.command {
                CommandTag::ConnectToPersistentSubscription => {
                    let req: CreatePersistentSubscriptionRequest = wire_messages::decode(&pkg.payload).unwrap();
                    *seen_request_srv.lock().unwrap() = Some(req);
                    let confirmation = wire_messages::SubscriptionConfirmationDto {
                        last_commit_position: None,
                        last_event_number: Some(0),
                    };
                    vec![Package::new(CommandTag::PersistentSubscriptionConfirmation, pkg.correlation_id, wire_messages::encode(&confirmation))]
                }
                _ => vec![],
            }
        })
        .await;
    });

    let settings = ClientSettings::builder()
        .static_endpoint("127.0.0.1", port)
        .operation_timeout(Duration::from_secs(5))
        .reconnection_delay(Duration::from_millis(20))
        .require_master(false)
        .build()
        .unwrap();
    let client = EventStoreClient::connect(settings).await.unwrap();

    let confirmed = Arc::new(Mutex::new(false));
    let listener_impl = RecordingListener { confirmed: confirmed.clone() };
    client
        .connect_to_persistent_subscription("orders-1", "group-a", Box::new(listener_impl))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(*confirmed.lock().unwrap(), "subscription should confirm on the second connection");
    let req = seen_request.lock().unwrap().clone().expect("server should have seen a CreatePersistentSubscriptionRequest");
    assert_eq!(req.stream, "orders-1");
    assert_eq!(req.group, "group-a");

    client.shutdown();
}
