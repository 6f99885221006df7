#[path = "common/mod.rs"]
mod common;

use eventstore_client::{
    client::EventStoreClient,
    config::ClientSettings,
    error::DropReason,
    package::{CommandTag, Package},
    wire_messages::{self, RecordedEventDto, ResolvedEventDto, SubscriptionDroppedDto},
    ResolvedEvent, SubscriptionConfirmation, SubscriptionListener,
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

struct RecordingListener {
    confirmed: Arc<Mutex<Vec<SubscriptionConfirmation>>>,
    events: Arc<Mutex<Vec<ResolvedEvent>>>,
    dropped: Arc<Mutex<Option<DropReason>>>,
}

impl SubscriptionListener for RecordingListener {
    fn on_confirmed(&mut self, confirmation: SubscriptionConfirmation) {
        self.confirmed.lock().unwrap().push(confirmation);
    }
    fn on_event(&mut self, event: ResolvedEvent) {
        self.events.lock().unwrap().push(event);
    }
    fn on_dropped(&mut self, reason: DropReason, _error: Option<String>) {
        *self.dropped.lock().unwrap() = Some(reason);
    }
}

/// A volatile subscription's confirmation, one pushed event and a server
/// drop all reach the caller's listener exactly once each, per ยง4.3/ยง9.
#[tokio::test]
async fn volatile_subscription_delivers_confirm_event_and_drop() {
    let (listener, port) = common::listener().await;

    tokio::spawn(common::serve_once(listener, |pkg: Package| -> Vec<Package> {
        match pkg.command {
            CommandTag::SubscribeToStream => {
                let confirmation = wire_messages::SubscriptionConfirmationDto {
                    last_commit_position: None,
                    last_event_number: Some(0),
                };
                let event = ResolvedEventDto {
                    event: RecordedEventDto {
                        event_id: uuid::Uuid::new_v4(),
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
                let dropped = SubscriptionDroppedDto { reason: "unsubscribed".into(), error: None };
                vec![
                    Package::new(CommandTag::SubscriptionConfirmation, pkg.correlation_id, wire_messages::encode(&confirmation)),
                    Package::new(CommandTag::StreamEventAppeared, pkg.correlation_id, wire_messages::encode(&event)),
                    Package::new(CommandTag::SubscriptionDropped, pkg.correlation_id, wire_messages::encode(&dropped)),
                ]
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

    let confirmed = Arc::new(Mutex::new(Vec::new()));
    let events = Arc::new(Mutex::new(Vec::new()));
    let dropped = Arc::new(Mutex::new(None));
    let listener_impl = RecordingListener { confirmed: confirmed.clone(), events: events.clone(), dropped: dropped.clone() };

    client.subscribe(Some("orders-1".into()), true, Box::new(listener_impl)).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(confirmed.lock().unwrap().len(), 1);
    let delivered = events.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].event.event_type, "OrderPlaced");
    assert_eq!(*dropped.lock().unwrap(), Some(DropReason::Unsubscribed));

    client.shutdown();
}

