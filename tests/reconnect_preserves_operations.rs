#[path = "common/mod.rs"]
mod common;

use eventstore_client::{
    client::EventStoreClient,
    config::ClientSettings,
    package::{CommandTag, Package},
    position::ExpectedVersion,
    wire_messages::{self, AppendResponse},
};
use std::time::Duration;

/// The first connection attempt is accepted then dropped before answering,
/// simulating a server restart mid-operation. ยง4.2 requires the waiting
/// operation to survive reconnection and complete once the second connection
/// answers it, rather than failing the caller.
#[tokio::test]
async fn operation_survives_one_reconnect() {
    let (listener, port) = common::listener().await;

    tokio::spawn(async move {
        common::accept_and_drop(&listener).await;
        common::serve_once(listener, |pkg: Package| -> Vec<Package> {
            match pkg.command {
                CommandTag::AppendToStream => {
                    let response = AppendResponse {
                        success: true,
                        next_expected_version: 0,
                        commit_position: 1,
                        prepare_position: 1,
                        current_version: None,
                    };
                    vec![Package::new(CommandTag::AppendToStreamCompleted, pkg.correlation_id, wire_messages::encode(&response))]
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

    let write = client.append_to_stream("orders-1", ExpectedVersion::Any, vec![]).await.unwrap();
    assert_eq!(write.next_expected_version, 0);

    client.shutdown();
}
