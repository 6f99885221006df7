#[path = "common/mod.rs"]
mod common;

use eventstore_client::{
    client::EventStoreClient,
    config::ClientSettings,
    error::DropReason,
    package::{CommandTag, Package},
    wire_messages::{self, RecordedEventDto, ResolvedEventDto},
    ResolvedEvent, SubscriptionConfirmation, SubscriptionListener,
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

struct RecordingListener {
    events: Arc<Mutex<Vec<ResolvedEvent>>>,
}

impl SubscriptionListener for RecordingListener {
    fn on_confirmed(&mut self, _confirmation: SubscriptionConfirmation) {}
    fn on_event(&mut self, event: ResolvedEvent) {
        self.events.lock().unwrap().push(event);
    }
    fn on_dropped(&mut self, _reason: DropReason, _error: Option<String>) {}
}

/// With `persistentSubscriptionAutoAckEnabled` (the default), a successfully
/// delivered event is acked back to the server without the caller calling
/// `ack()` itself, per ยง4.3's `autoAck` contract.
#[tokio::test]
async fn persistent_subscription_auto_acks_delivered_event() {
    let (listener, port) = common::listener().await;
    let acked_ids = Arc::new(Mutex::new(Vec::new()));
    let acked_ids_srv = acked_ids.clone();
    let event_id = uuid::Uuid::new_v4();

    tokio::spawn(common::serve_once(listener, move |pkg: Package| -> Vec<Package> {
        match pkg.command {
            CommandTag::ConnectToPersistentSubscription => {
                let confirmation = wire_messages::SubscriptionConfirmationDto {
                    last_commit_position: None,
                    last_event_number: Some(0),
                };
                let event = ResolvedEventDto {
                    event: RecordedEventDto {
                        event_id,
                        event_stream_id: "orders-1".into(),
                        event_number: 0,
                        event_type: "OrderPlaced".into(),
                        data: b"{}".to_vec(),
                        metadata: vec![],
                        is_json: true,
                    },
                    link: None,
                    original_stream_id: "orders-1".into(),
                    original_event_number: 0,
                    original_commit: 5,
                    original_prepare: 5,
                };
                vec![
                    Package::new(CommandTag::PersistentSubscriptionConfirmation, pkg.correlation_id, wire_messages::encode(&confirmation)),
                    Package::new(CommandTag::PersistentSubscriptionStreamEventAppeared, pkg.correlation_id, wire_messages::encode(&event)),
                ]
            }
            CommandTag::PersistentSubscriptionAck => {
                let ack: wire_messages::AckEventsRequest = wire_messages::decode(&pkg.payload).unwrap();
                acked_ids_srv.lock().unwrap().extend(ack.event_ids);
                vec![]
            }
            _ => vec![],
        }
    }));

    let settings = ClientSettings::builder()
        .static_endpoint("127.0.0.1", port)
        .operation_timeout(Duration::from_secs(2))
        .require_master(false)
        .build()
        .unwrap();
    let client = EventStoreClient::connect(settings).await.unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let listener_impl = RecordingListener { events: events.clone() };
    client
        .connect_to_persistent_subscription("orders-1", "group-a", Box::new(listener_impl))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(events.lock().unwrap().len(), 1);
    assert_eq!(*acked_ids.lock().unwrap(), vec![event_id]);

    client.shutdown();
}
