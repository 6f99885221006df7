//! Wire-level package: the unit of traffic exchanged over the frame
//! transport, per ยง6 of the wire contract. The codec (ยง[`crate::codec`])
//! turns bytes on the socket into [`Package`] values and back; everything
//! above this module only ever sees `Package`.

use uuid::Uuid;

/// Maximum frame length, including the 4-byte length prefix's payload: 64 MiB.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Closed set of command tags. Each one-byte tag identifies either a client
/// request, the matching server response, or a server-pushed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandTag {
    HeartbeatRequest = 0x01,
    HeartbeatResponse = 0x02,

    Authenticate = 0x10,
    Authenticated = 0x11,
    NotAuthenticated = 0x12,

    AppendToStream = 0x20,
    AppendToStreamCompleted = 0x21,
    DeleteStream = 0x22,
    DeleteStreamCompleted = 0x23,

    TransactionStart = 0x30,
    TransactionStartCompleted = 0x31,
    TransactionWrite = 0x32,
    TransactionWriteCompleted = 0x33,
    TransactionCommit = 0x34,
    TransactionCommitCompleted = 0x35,

    ReadEvent = 0x40,
    ReadEventCompleted = 0x41,
    ReadStreamEventsForward = 0x42,
    ReadStreamEventsForwardCompleted = 0x43,
    ReadStreamEventsBackward = 0x44,
    ReadStreamEventsBackwardCompleted = 0x45,
    ReadAllEventsForward = 0x46,
    ReadAllEventsForwardCompleted = 0x47,
    ReadAllEventsBackward = 0x48,
    ReadAllEventsBackwardCompleted = 0x49,

    SubscribeToStream = 0x50,
    SubscriptionConfirmation = 0x51,
    StreamEventAppeared = 0x52,
    UnsubscribeFromStream = 0x53,
    SubscriptionDropped = 0x54,

    CreatePersistentSubscription = 0x60,
    CreatePersistentSubscriptionCompleted = 0x61,
    ConnectToPersistentSubscription = 0x62,
    PersistentSubscriptionConfirmation = 0x63,
    PersistentSubscriptionStreamEventAppeared = 0x64,
    PersistentSubscriptionAck = 0x65,
    PersistentSubscriptionNak = 0x66,
    DeletePersistentSubscription = 0x67,
    DeletePersistentSubscriptionCompleted = 0x68,

    GetStreamMetadata = 0x70,
    GetStreamMetadataCompleted = 0x71,
    SetStreamMetadata = 0x72,
    SetStreamMetadataCompleted = 0x73,

    BadRequest = 0xf0,
    NotHandled = 0xf1,
    ServerError = 0xff,
}

impl CommandTag {
    pub fn from_byte(b: u8) -> Option<Self> {
        use CommandTag::*;
        Some(match b {
            0x01 => HeartbeatRequest,
            0x02 => HeartbeatResponse,
            0x10 => Authenticate,
            0x11 => Authenticated,
            0x12 => NotAuthenticated,
            0x20 => AppendToStream,
            0x21 => AppendToStreamCompleted,
            0x22 => DeleteStream,
            0x23 => DeleteStreamCompleted,
            0x30 => TransactionStart,
            0x31 => TransactionStartCompleted,
            0x32 => TransactionWrite,
            0x33 => TransactionWriteCompleted,
            0x34 => TransactionCommit,
            0x35 => TransactionCommitCompleted,
            0x40 => ReadEvent,
            0x41 => ReadEventCompleted,
            0x42 => ReadStreamEventsForward,
            0x43 => ReadStreamEventsForwardCompleted,
            0x44 => ReadStreamEventsBackward,
            0x45 => ReadStreamEventsBackwardCompleted,
            0x46 => ReadAllEventsForward,
            0x47 => ReadAllEventsForwardCompleted,
            0x48 => ReadAllEventsBackward,
            0x49 => ReadAllEventsBackwardCompleted,
            0x50 => SubscribeToStream,
            0x51 => SubscriptionConfirmation,
            0x52 => StreamEventAppeared,
            0x53 => UnsubscribeFromStream,
            0x54 => SubscriptionDropped,
            0x60 => CreatePersistentSubscription,
            0x61 => CreatePersistentSubscriptionCompleted,
            0x62 => ConnectToPersistentSubscription,
            0x63 => PersistentSubscriptionConfirmation,
            0x64 => PersistentSubscriptionStreamEventAppeared,
            0x65 => PersistentSubscriptionAck,
            0x66 => PersistentSubscriptionNak,
            0x67 => DeletePersistentSubscription,
            0x68 => DeletePersistentSubscriptionCompleted,
            0x70 => GetStreamMetadata,
            0x71 => GetStreamMetadataCompleted,
            0x72 => SetStreamMetadata,
            0x73 => SetStreamMetadataCompleted,
            0xf0 => BadRequest,
            0xf1 => NotHandled,
            0xff => ServerError,
            _ => return None,
        })
    }
}

bitflags::bitflags! {
    /// Per-package flags. Only one bit is defined at present.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PackageFlags: u8 {
        const NONE = 0x00;
        const AUTHENTICATED = 0x01;
    }
}

/// Credentials carried inline in a package when the auth flag is set.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

/// A unit of wire traffic, per ยง3/ยง6: a command tag, flags, a client-allocated
/// correlation id the server echoes back, optional inline credentials, and an
/// opaque payload whose schema is owned by the operation/subscription that
/// produced or expects it.
#[derive(Debug, Clone)]
pub struct Package {
    pub command: CommandTag,
    pub flags: PackageFlags,
    pub correlation_id: Uuid,
    pub credentials: Option<Credentials>,
    pub payload: Vec<u8>,
}

impl Package {
    pub fn new(command: CommandTag, correlation_id: Uuid, payload: Vec<u8>) -> Self {
        Self { command, flags: PackageFlags::NONE, correlation_id, credentials: None, payload }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.flags |= PackageFlags::AUTHENTICATED;
        self.credentials = Some(credentials);
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.flags.contains(PackageFlags::AUTHENTICATED)
    }
}
