use std::fmt;
use std::io;
use svcgate::CodecError;
use svcgate::frame::{FrameDecodeError, FrameEncodeError};
use thiserror::Error;

/// A raw fault raised by a transport.
///
/// Transport errors never reach stub callers directly; they are turned into a
/// [`ServiceError`] by [`crate::ErrorMapper::to_fault`] first.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("frame encode error: {0}")]
    FrameEncode(#[from] FrameEncodeError),

    #[error("frame decode error: {0}")]
    FrameDecode(#[from] FrameDecodeError),

    #[error("{0} is not supported by this transport")]
    Unsupported(&'static str),

    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

/// Errors raised while constructing or closing a client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no codec is registered for content type `{0}`")]
    UnknownContentType(String),

    #[error("content type `{content_type}` cannot be carried by the {transport} transport")]
    UnsupportedContentType {
        content_type: String,
        transport: &'static str,
    },

    #[error("method `{service}::{method}` declares `{declared}`, which is not a supported return shape")]
    UnclassifiableMethod {
        service: String,
        method: String,
        declared: String,
    },

    #[error("invalid service definition `{service}`: {reason}")]
    InvalidServiceDefinition { service: String, reason: String },

    #[error("invalid client settings: {0}")]
    InvalidSettings(String),

    #[error("failed to close transport: {0}")]
    Close(#[source] TransportError),
}

impl From<CodecError> for ClientError {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::UnknownContentType(content_type) => {
                ClientError::UnknownContentType(content_type)
            }
            other => ClientError::InvalidSettings(other.to_string()),
        }
    }
}

/// Classification of a failed call as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    ServiceUnavailable,
    Internal,
    /// The peer replied with an error whose payload could not be read.
    Unmapped,
    /// The transport failed before a reply was received.
    TransportFault,
    /// The client or its transport has been closed.
    TransportClosed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::BadRequest => "bad request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::ServiceUnavailable => "service unavailable",
            ErrorKind::Internal => "internal error",
            ErrorKind::Unmapped => "unmapped error",
            ErrorKind::TransportFault => "transport fault",
            ErrorKind::TransportClosed => "transport closed",
        };
        f.write_str(name)
    }
}

/// The error value delivered to callers of a service stub.
///
/// Produced by an [`crate::ErrorMapper`], either from an error reply sent by
/// the peer or from a transport fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    kind: ErrorKind,
    code: Option<i32>,
    message: String,
    qualifier: Option<String>,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            qualifier: None,
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Records which method the failed call targeted.
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    pub fn is_transport_closed(&self) -> bool {
        self.kind == ErrorKind::TransportClosed
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(code) = self.code {
            write!(f, " ({code})")?;
        }
        if let Some(qualifier) = &self.qualifier {
            write!(f, " calling `{qualifier}`")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for ServiceError {}
