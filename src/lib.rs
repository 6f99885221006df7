#![doc = include_str!("../README.md")]

pub mod acl;
pub mod catchup;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod operations;
pub mod package;
pub mod position;
pub mod subscriptions;
#[cfg(feature = "tls")]
pub mod tls;
pub mod wire_messages;

pub use catchup::{CatchUpSubscription, CatchUpTarget};
pub use client::{EventData, EventStoreClient, ReadAllSlice, ReadStreamSlice, Transaction, WriteResult};
pub use config::{ClientSettings, ClientSettingsBuilder, Endpoints};
pub use error::{ClientError, ConfigError, DiscoveryError, DropReason, OperationError};
pub use position::{ExpectedVersion, Position, StreamPosition};
pub use subscriptions::{RecordedEvent, ResolvedEvent, SubscriptionConfirmation, SubscriptionListener};
