//! Request/response payload bodies carried inside a [`crate::package::Package`].
//!
//! ยง6 specifies only the outer frame; each operation owns its own payload
//! schema. Following the precedent already set for ACL (ยง4.5), payloads here
//! are JSON via `serde_json` rather than a second ad hoc binary format.

use crate::{position::Position, subscriptions::{RecordedEvent, ResolvedEvent}};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEventDto {
    pub event_id: Uuid,
    pub event_type: String,
    pub data: Vec<u8>,
    pub metadata: Vec<u8>,
    pub is_json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEventDto {
    pub event_id: Uuid,
    pub event_stream_id: String,
    pub event_number: u64,
    pub event_type: String,
    pub data: Vec<u8>,
    pub metadata: Vec<u8>,
    pub is_json: bool,
}

impl From<RecordedEventDto> for RecordedEvent {
    fn from(d: RecordedEventDto) -> Self {
        RecordedEvent {
            event_id: d.event_id,
            event_stream_id: d.event_stream_id,
            event_number: d.event_number,
            event_type: d.event_type,
            data: d.data,
            metadata: d.metadata,
            is_json: d.is_json,
        }
    }
}

impl From<RecordedEvent> for RecordedEventDto {
    fn from(e: RecordedEvent) -> Self {
        RecordedEventDto {
            event_id: e.event_id,
            event_stream_id: e.event_stream_id,
            event_number: e.event_number,
            event_type: e.event_type,
            data: e.data,
            metadata: e.metadata,
            is_json: e.is_json,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedEventDto {
    pub event: RecordedEventDto,
    pub link: Option<RecordedEventDto>,
    pub original_stream_id: String,
    pub original_event_number: u64,
    pub original_commit: i64,
    pub original_prepare: i64,
}

impl From<ResolvedEventDto> for ResolvedEvent {
    fn from(d: ResolvedEventDto) -> Self {
        ResolvedEvent {
            event: d.event.into(),
            link: d.link.map(Into::into),
            original_stream_id: d.original_stream_id,
            original_event_number: d.original_event_number,
            original_position: Some(Position::new(d.original_commit, d.original_prepare)),
        }
    }
}

impl From<ResolvedEvent> for ResolvedEventDto {
    fn from(e: ResolvedEvent) -> Self {
        let pos = e.original_position.unwrap_or(Position::START);
        ResolvedEventDto {
            event: e.event.into(),
            link: e.link.map(Into::into),
            original_stream_id: e.original_stream_id,
            original_event_number: e.original_event_number,
            original_commit: pos.commit,
            original_prepare: pos.prepare,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRequest {
    pub stream: String,
    pub expected_version: i64,
    pub events: Vec<NewEventDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendResponse {
    pub success: bool,
    pub next_expected_version: i64,
    pub commit_position: i64,
    pub prepare_position: i64,
    pub current_version: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub stream: String,
    pub expected_version: i64,
    pub hard_delete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub commit_position: i64,
    pub prepare_position: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStartRequest {
    pub stream: String,
    pub expected_version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStartResponse {
    pub transaction_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionWriteRequest {
    pub transaction_id: u64,
    pub events: Vec<NewEventDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionCommitRequest {
    pub transaction_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionCommitResponse {
    pub success: bool,
    pub next_expected_version: i64,
    pub commit_position: i64,
    pub prepare_position: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadStreamRequest {
    pub stream: String,
    pub from_event_number: u64,
    pub max_count: u32,
    pub resolve_link_tos: bool,
    pub require_master: bool,
    pub forward: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadStreamResponse {
    pub events: Vec<ResolvedEventDto>,
    pub next_event_number: u64,
    pub is_end_of_stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadAllRequest {
    pub from_commit: i64,
    pub from_prepare: i64,
    pub max_count: u32,
    pub resolve_link_tos: bool,
    pub require_master: bool,
    pub forward: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadAllResponse {
    pub events: Vec<ResolvedEventDto>,
    pub next_commit: i64,
    pub next_prepare: i64,
    pub is_end_of_stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub stream: Option<String>,
    pub resolve_link_tos: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePersistentSubscriptionRequest {
    pub stream: String,
    pub group: String,
    pub resolve_link_tos: bool,
    pub start_from: i64,
    pub buffer_size: u32,
    pub auto_ack: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetStreamMetadataRequest {
    pub stream: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetStreamMetadataResponse {
    pub stream: String,
    pub version: i64,
    pub metadata_json: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStreamMetadataRequest {
    pub stream: String,
    pub expected_version: i64,
    pub metadata_json: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubscriptionConfirmationDto {
    pub last_commit_position: Option<i64>,
    pub last_event_number: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionDroppedDto {
    pub reason: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckEventsRequest {
    pub event_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NakEventsRequest {
    pub event_ids: Vec<Uuid>,
    pub reason: String,
}

pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("wire message types are always serializable")
}

pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, crate::error::OperationError> {
    serde_json::from_slice(bytes)
        .map_err(|e| crate::error::OperationError::BadRequest(format!("malformed response payload: {e}")))
}
