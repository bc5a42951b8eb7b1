//! Error types for meshwire.

use thiserror::Error;

/// Main error type for all meshwire operations.
#[derive(Debug, Error)]
pub enum MeshwireError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (handshake and error bodies).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Fewer than a full packet header's worth of bytes was available.
    #[error("short packet header: {0} bytes available")]
    ShortHeader(usize),

    /// Packet type byte outside the enumerated set.
    #[error("unknown packet type: {0:#04x}")]
    BadType(u8),

    /// A message header consumed more bytes than the buffer provides.
    #[error("truncated message: {0}")]
    Truncated(&'static str),

    /// Message type bits outside the enumerated set.
    #[error("unknown message type: {0}")]
    BadMessageType(u8),

    /// Route string does not match `[serverType.]service.method`.
    #[error("malformed route: {0:?}")]
    BadRoute(String),

    /// No registered service/method for the route.
    #[error("handler not found: {0}")]
    NotFound(String),

    /// Request payload could not be deserialized for the handler.
    #[error("bad request payload: {0}")]
    BadRequest(String),

    /// Session is already bound to a different user id.
    #[error("session already bound to uid {0}")]
    AlreadyBound(i64),

    /// `response` called with no request in flight on the session.
    #[error("no pending request on session")]
    NoPendingRequest,

    /// Send attempted on an agent after `close`.
    #[error("agent is closed")]
    ClosedAgent,

    /// A handler panicked; caught by the recovery barrier.
    #[error("internal handler error: {0}")]
    InternalError(String),

    /// The cluster collaborator could not complete a remote call.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// Handler registration rejected at startup.
    #[error("handler registration: {0}")]
    Registration(String),

    /// Protocol violation (oversized body, malformed frame, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl MeshwireError {
    /// Short stable code carried in error-kind response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            MeshwireError::ShortHeader(_) => "ShortHeader",
            MeshwireError::BadType(_) => "BadType",
            MeshwireError::Truncated(_) => "Truncated",
            MeshwireError::BadMessageType(_) => "BadMessageType",
            MeshwireError::BadRoute(_) => "BadRoute",
            MeshwireError::NotFound(_) => "NotFound",
            MeshwireError::BadRequest(_) => "BadRequest",
            MeshwireError::AlreadyBound(_) => "AlreadyBound",
            MeshwireError::NoPendingRequest => "NoPendingRequest",
            MeshwireError::ClosedAgent => "ClosedAgent",
            MeshwireError::RemoteUnavailable(_) => "RemoteUnavailable",
            _ => "InternalError",
        }
    }
}

/// Result type alias using MeshwireError.
pub type Result<T> = std::result::Result<T, MeshwireError>;
