//! Facade (ยง2 "Facade (operation factories)"): the public API. Each method
//! builds an [`Operation`] with a response-inspection closure, enqueues it
//! through the connection driver, and awaits its completion sink.

use crate::{
    acl::StreamAcl,
    config::ClientSettings,
    connection::{ConnectionDriver, ConnectionHandle, Instruction},
    discovery::{ClusterProber, NullProber},
    error::{ClientError, OperationError},
    operations::{Disposition, Operation},
    package::CommandTag,
    position::{ExpectedVersion, Position},
    subscriptions::{PendingSubscribe, ResolvedEvent, SubscriptionEntry, SubscriptionListener},
    wire_messages::{
        self, AppendRequest, AppendResponse, CreatePersistentSubscriptionRequest, DeleteRequest, DeleteResponse,
        GetStreamMetadataRequest, GetStreamMetadataResponse, NewEventDto, ReadAllRequest, ReadAllResponse, ReadStreamRequest,
        ReadStreamResponse, SetStreamMetadataRequest, SubscribeRequest, TransactionCommitRequest,
        TransactionCommitResponse, TransactionStartRequest, TransactionStartResponse, TransactionWriteRequest,
    },
};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

/// One event to append, as supplied by the caller; `event_id` defaults to a
/// fresh v4 if not set, matching idempotent-retry expectations.
#[derive(Debug, Clone)]
pub struct EventData {
    pub event_id: Uuid,
    pub event_type: String,
    pub data: Vec<u8>,
    pub metadata: Vec<u8>,
    pub is_json: bool,
}

impl EventData {
    pub fn json(event_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self { event_id: Uuid::new_v4(), event_type: event_type.into(), data: data.into(), metadata: Vec::new(), is_json: true }
    }

    fn into_dto(self) -> NewEventDto {
        NewEventDto { event_id: self.event_id, event_type: self.event_type, data: self.data, metadata: self.metadata, is_json: self.is_json }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WriteResult {
    pub next_expected_version: i64,
    pub position: Position,
}

#[derive(Debug, Clone)]
pub struct ReadStreamSlice {
    pub events: Vec<ResolvedEvent>,
    pub next_event_number: u64,
    pub is_end_of_stream: bool,
}

#[derive(Debug, Clone)]
pub struct ReadAllSlice {
    pub events: Vec<ResolvedEvent>,
    pub next_position: Position,
    pub is_end_of_stream: bool,
}

/// A started, uncommitted transaction. Writes go through `write` and finish
/// with `commit`; dropping without committing simply lets the server-side
/// transaction expire (ยง3 Non-goals: no cross-node transactions).
pub struct Transaction<'a> {
    client: &'a EventStoreClient,
    transaction_id: u64,
}

impl<'a> Transaction<'a> {
    pub async fn write(&self, events: Vec<EventData>) -> Result<(), OperationError> {
        let payload = wire_messages::encode(&TransactionWriteRequest {
            transaction_id: self.transaction_id,
            events: events.into_iter().map(EventData::into_dto).collect(),
        });
        let inspector = simple_ack_inspector(CommandTag::TransactionWriteCompleted);
        self.client.call(CommandTag::TransactionWrite, payload, inspector).await?;
        Ok(())
    }

    pub async fn commit(self) -> Result<WriteResult, OperationError> {
        let payload = wire_messages::encode(&TransactionCommitRequest { transaction_id: self.transaction_id });
        let inspector = move |pkg: &crate::package::Package| -> Disposition {
            if pkg.command != CommandTag::TransactionCommitCompleted {
                return Disposition::Continue;
            }
            match wire_messages::decode::<TransactionCommitResponse>(&pkg.payload) {
                Ok(r) if r.success => Disposition::Success(wire_messages::encode(&r)),
                Ok(_) => Disposition::Fail(OperationError::WrongExpectedVersion { stream: String::new() }),
                Err(e) => Disposition::Fail(e),
            }
        };
        let raw = self.client.call(CommandTag::TransactionCommit, payload, Box::new(inspector)).await?;
        let r: TransactionCommitResponse = wire_messages::decode(&raw)?;
        Ok(WriteResult { next_expected_version: r.next_expected_version, position: Position::new(r.commit_position, r.prepare_position) })
    }
}

fn simple_ack_inspector(expected: CommandTag) -> crate::operations::ResponseInspector {
    Box::new(move |pkg| {
        if pkg.command == expected {
            Disposition::Success(pkg.payload.clone())
        } else {
            Disposition::Continue
        }
    })
}

/// The public event-store client, per ยง2's facade row. Cheap to clone: all
/// clones share the same connection driver task.
#[derive(Clone)]
pub struct EventStoreClient {
    handle: ConnectionHandle,
    settings: ClientSettings,
}

impl EventStoreClient {
    pub async fn connect(settings: ClientSettings) -> Result<Self, ClientError> {
        Self::connect_with_prober(settings, Arc::new(NullProber)).await
    }

    pub async fn connect_with_prober(
        settings: ClientSettings,
        prober: Arc<dyn ClusterProber>,
    ) -> Result<Self, ClientError> {
        let (driver, handle) = ConnectionDriver::connect(settings.clone(), prober).await?;
        driver.spawn();
        Ok(Self { handle, settings })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn shutdown(&self) {
        let _ = self.handle.send(Instruction::Close);
    }

    async fn call(
        &self,
        command: CommandTag,
        payload: Vec<u8>,
        inspector: crate::operations::ResponseInspector,
    ) -> Result<Vec<u8>, OperationError> {
        let (mut op, rx) = Operation::new(command, payload, self.settings.operation_timeout, self.settings.max_operation_retries, inspector);
        if let Some(creds) = &self.settings.default_credentials {
            op = op.with_credentials(creds.clone());
        }
        self.handle
            .send(Instruction::Enqueue(op))
            .map_err(|_| OperationError::ConnectionClosed)?;
        rx.await.map_err(|_| OperationError::ConnectionClosed)?
    }

    pub async fn append_to_stream(
        &self,
        stream: impl Into<String>,
        expected_version: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Result<WriteResult, OperationError> {
        let stream = stream.into();
        let payload = wire_messages::encode(&AppendRequest {
            stream: stream.clone(),
            expected_version: expected_version.to_wire(),
            events: events.into_iter().map(EventData::into_dto).collect(),
        });
        let stream_for_err = stream.clone();
        let inspector: crate::operations::ResponseInspector = Box::new(move |pkg| {
            if pkg.command != CommandTag::AppendToStreamCompleted {
                return Disposition::Continue;
            }
            match wire_messages::decode::<AppendResponse>(&pkg.payload) {
                Ok(r) if r.success => Disposition::Success(pkg.payload.clone()),
                Ok(_) => Disposition::Fail(OperationError::WrongExpectedVersion { stream: stream_for_err.clone() }),
                Err(e) => Disposition::Fail(e),
            }
        });
        let raw = self.call(CommandTag::AppendToStream, payload, inspector).await?;
        let r: AppendResponse = wire_messages::decode(&raw)?;
        Ok(WriteResult { next_expected_version: r.next_expected_version, position: Position::new(r.commit_position, r.prepare_position) })
    }

    pub async fn delete_stream(
        &self,
        stream: impl Into<String>,
        expected_version: ExpectedVersion,
        hard_delete: bool,
    ) -> Result<Position, OperationError> {
        let stream = stream.into();
        let payload = wire_messages::encode(&DeleteRequest { stream: stream.clone(), expected_version: expected_version.to_wire(), hard_delete });
        let inspector: crate::operations::ResponseInspector = Box::new(move |pkg| {
            if pkg.command != CommandTag::DeleteStreamCompleted {
                return Disposition::Continue;
            }
            match wire_messages::decode::<DeleteResponse>(&pkg.payload) {
                Ok(r) if r.success => Disposition::Success(pkg.payload.clone()),
                Ok(_) => Disposition::Fail(OperationError::StreamDeleted(stream.clone())),
                Err(e) => Disposition::Fail(e),
            }
        });
        let raw = self.call(CommandTag::DeleteStream, payload, inspector).await?;
        let r: DeleteResponse = wire_messages::decode(&raw)?;
        Ok(Position::new(r.commit_position, r.prepare_position))
    }

    pub async fn start_transaction(
        &self,
        stream: impl Into<String>,
        expected_version: ExpectedVersion,
    ) -> Result<Transaction<'_>, OperationError> {
        let payload = wire_messages::encode(&TransactionStartRequest { stream: stream.into(), expected_version: expected_version.to_wire() });
        let inspector = simple_ack_inspector(CommandTag::TransactionStartCompleted);
        let raw = self.call(CommandTag::TransactionStart, payload, inspector).await?;
        let r: TransactionStartResponse = wire_messages::decode(&raw)?;
        Ok(Transaction { client: self, transaction_id: r.transaction_id })
    }

    pub async fn read_stream_forward(
        &self,
        stream: impl Into<String>,
        from_event_number: u64,
        max_count: u32,
        resolve_link_tos: bool,
    ) -> Result<ReadStreamSlice, OperationError> {
        self.read_stream(stream.into(), from_event_number, max_count, resolve_link_tos, true).await
    }

    pub async fn read_stream_backward(
        &self,
        stream: impl Into<String>,
        from_event_number: u64,
        max_count: u32,
        resolve_link_tos: bool,
    ) -> Result<ReadStreamSlice, OperationError> {
        self.read_stream(stream.into(), from_event_number, max_count, resolve_link_tos, false).await
    }

    async fn read_stream(
        &self,
        stream: String,
        from_event_number: u64,
        max_count: u32,
        resolve_link_tos: bool,
        forward: bool,
    ) -> Result<ReadStreamSlice, OperationError> {
        let (command, completed) = if forward {
            (CommandTag::ReadStreamEventsForward, CommandTag::ReadStreamEventsForwardCompleted)
        } else {
            (CommandTag::ReadStreamEventsBackward, CommandTag::ReadStreamEventsBackwardCompleted)
        };
        let payload = wire_messages::encode(&ReadStreamRequest {
            stream,
            from_event_number,
            max_count,
            resolve_link_tos,
            require_master: self.settings.require_master,
            forward,
        });
        let inspector = simple_ack_inspector(completed);
        let raw = self.call(command, payload, inspector).await?;
        let r: ReadStreamResponse = wire_messages::decode(&raw)?;
        Ok(ReadStreamSlice {
            events: r.events.into_iter().map(Into::into).collect(),
            next_event_number: r.next_event_number,
            is_end_of_stream: r.is_end_of_stream,
        })
    }

    pub async fn read_all_forward(&self, from: Position, max_count: u32, resolve_link_tos: bool) -> Result<ReadAllSlice, OperationError> {
        self.read_all(from, max_count, resolve_link_tos, true).await
    }

    pub async fn read_all_backward(&self, from: Position, max_count: u32, resolve_link_tos: bool) -> Result<ReadAllSlice, OperationError> {
        self.read_all(from, max_count, resolve_link_tos, false).await
    }

    async fn read_all(&self, from: Position, max_count: u32, resolve_link_tos: bool, forward: bool) -> Result<ReadAllSlice, OperationError> {
        let (command, completed) = if forward {
            (CommandTag::ReadAllEventsForward, CommandTag::ReadAllEventsForwardCompleted)
        } else {
            (CommandTag::ReadAllEventsBackward, CommandTag::ReadAllEventsBackwardCompleted)
        };
        let payload = wire_messages::encode(&ReadAllRequest {
            from_commit: from.commit,
            from_prepare: from.prepare,
            max_count,
            resolve_link_tos,
            require_master: self.settings.require_master,
            forward,
        });
        let inspector = simple_ack_inspector(completed);
        let raw = self.call(command, payload, inspector).await?;
        let r: ReadAllResponse = wire_messages::decode(&raw)?;
        Ok(ReadAllSlice {
            events: r.events.into_iter().map(Into::into).collect(),
            next_position: Position::new(r.next_commit, r.next_prepare),
            is_end_of_stream: r.is_end_of_stream,
        })
    }

    /// Subscribes to a live stream (or all-streams when `stream` is `None`),
    /// per ยง4.3. Returns the subscription id used for `unsubscribe`.
    pub fn subscribe(&self, stream: Option<String>, resolve_link_tos: bool, listener: Box<dyn SubscriptionListener>) -> Result<Uuid, ClientError> {
        let entry = SubscriptionEntry::new_volatile(stream.clone(), resolve_link_tos, listener);
        let id = entry.subscription_id;
        let pending = PendingSubscribe {
            entry,
            to_package: Box::new(move |correlation_id| {
                let payload = wire_messages::encode(&SubscribeRequest { stream, resolve_link_tos });
                crate::package::Package::new(CommandTag::SubscribeToStream, correlation_id, payload)
            }),
        };
        self.handle.send(Instruction::Subscribe(pending))?;
        Ok(id)
    }

    pub fn unsubscribe(&self, subscription_id: Uuid) -> Result<(), ClientError> {
        self.handle.send(Instruction::Unsubscribe(subscription_id))
    }

    /// Connects to a persistent subscription group, per ยง4.3.
    pub fn connect_to_persistent_subscription(
        &self,
        stream: impl Into<String>,
        group: impl Into<String>,
        listener: Box<dyn SubscriptionListener>,
    ) -> Result<Uuid, ClientError> {
        let stream = stream.into();
        let group = group.into();
        let buffer_size = self.settings.persistent_subscription_buffer_size;
        let auto_ack = self.settings.persistent_subscription_auto_ack_enabled;
        let entry = SubscriptionEntry::new_persistent(
            stream.clone(),
            group.clone(),
            buffer_size,
            auto_ack,
            self.settings.max_operation_retries,
            listener,
            self.handle.clone(),
        );
        let id = entry.subscription_id;
        let pending = PendingSubscribe {
            entry,
            to_package: Box::new(move |correlation_id| {
                let payload = wire_messages::encode(&CreatePersistentSubscriptionRequest {
                    stream,
                    group,
                    resolve_link_tos: true,
                    start_from: 0,
                    buffer_size,
                    auto_ack,
                });
                crate::package::Package::new(CommandTag::ConnectToPersistentSubscription, correlation_id, payload)
            }),
        };
        self.handle.send(Instruction::Subscribe(pending))?;
        Ok(id)
    }

    pub fn ack(&self, subscription_id: Uuid, event_id: Uuid) -> Result<(), ClientError> {
        self.handle.send(Instruction::Ack { subscription_id, event_id })
    }

    pub fn nak(&self, subscription_id: Uuid, event_id: Uuid) -> Result<(), ClientError> {
        self.handle.send(Instruction::Nak { subscription_id, event_id, reason: "client-requested".into() })
    }

    pub async fn get_stream_metadata(&self, stream: impl Into<String>) -> Result<(StreamAcl, i64), OperationError> {
        let payload = wire_messages::encode(&GetStreamMetadataRequest { stream: stream.into() });
        let inspector = simple_ack_inspector(CommandTag::GetStreamMetadataCompleted);
        let raw = self.call(CommandTag::GetStreamMetadata, payload, inspector).await?;
        let r: GetStreamMetadataResponse = wire_messages::decode(&raw)?;
        let acl: StreamAcl = serde_json::from_value(r.metadata_json)
            .map_err(|e| OperationError::BadRequest(e.to_string()))?;
        Ok((acl, r.version))
    }

    pub async fn set_stream_metadata(
        &self,
        stream: impl Into<String>,
        expected_version: ExpectedVersion,
        acl: StreamAcl,
    ) -> Result<(), OperationError> {
        let metadata_json = serde_json::to_value(&acl).map_err(|e| OperationError::BadRequest(e.to_string()))?;
        let payload = wire_messages::encode(&SetStreamMetadataRequest { stream: stream.into(), expected_version: expected_version.to_wire(), metadata_json });
        let inspector = simple_ack_inspector(CommandTag::SetStreamMetadataCompleted);
        self.call(CommandTag::SetStreamMetadata, payload, inspector).await?;
        Ok(())
    }

    pub(crate) fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub(crate) fn operation_timeout(&self) -> Duration {
        self.settings.operation_timeout
    }
}
