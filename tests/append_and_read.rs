#[path = "common/mod.rs"]
mod common;

use eventstore_client::{
    client::EventStoreClient,
    config::ClientSettings,
    package::{CommandTag, Package},
    position::ExpectedVersion,
    wire_messages::{self, AppendResponse, ReadStreamResponse, RecordedEventDto, ResolvedEventDto},
    EventData,
};
use std::time::Duration;

#[tokio::test]
async fn append_then_read_stream_forward() {
    let (listener, port) = common::listener().await;

    tokio::spawn(common::serve_once(listener, |pkg: Package| -> Vec<Package> {
        match pkg.command {
            CommandTag::AppendToStream => {
                let response = AppendResponse {
                    success: true,
                    next_expected_version: 0,
                    commit_position: 10,
                    prepare_position: 10,
                    current_version: None,
                };
                vec![Package::new(CommandTag::AppendToStreamCompleted, pkg.correlation_id, wire_messages::encode(&response))]
            }
            CommandTag::ReadStreamEventsForward => {
                let response = ReadStreamResponse {
                    events: vec![ResolvedEventDto {
                        event: RecordedEventDto {
                            event_id: uuid::Uuid::new_v4(),
                            event_stream_id: "orders-1".into(),
                            event_number: 7,
                            event_type: "OrderPlaced".into(),
                            data: b"{}".to_vec(),
                            metadata: vec![],
                            is_json: true,
                        },
                        link: None,
                        original_stream_id: "orders-1".into(),
                        original_event_number: 7,
                        original_commit: 11,
                        original_prepare: 11,
                    }],
                    next_event_number: 8,
                    is_end_of_stream: true,
                };
                vec![Package::new(CommandTag::ReadStreamEventsForwardCompleted, pkg.correlation_id, wire_messages::encode(&response))]
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

    let write = client
        .append_to_stream("orders-1", ExpectedVersion::Any, vec![EventData::json("OrderPlaced", &b"{}"[..])])
        .await
        .unwrap();
    assert_eq!(write.next_expected_version, 0);
    assert_eq!(write.position.commit, 10);

    let slice = client.read_stream_forward("orders-1", 0, 10, true).await.unwrap();
    assert!(slice.is_end_of_stream);
    assert_eq!(slice.next_event_number, 8);
    assert_eq!(slice.events.len(), 1);
    assert_eq!(slice.events[0].event.event_type, "OrderPlaced");
    assert_eq!(slice.events[0].original_event_number, 7);
    assert_eq!(slice.events[0].original_stream_id, "orders-1");
    assert_eq!(slice.events[0].original_position, Some(eventstore_client::position::Position::new(11, 11)));

    client.shutdown();
}
