use crate::error::{ErrorKind, ServiceError, TransportError};
use std::fmt::Debug;
use svcgate::constants::DEFAULT_CONTENT_TYPE;
use svcgate::{DataCodec, ErrorData, Message};

/// Turns error replies and transport faults into [`ServiceError`]s.
///
/// Implementations must be pure and must not panic for any input; they are
/// shared by every call made through a client.
pub trait ErrorMapper: Send + Sync + Debug + 'static {
    /// Decides whether a reply should be treated as a failure.
    fn is_error(&self, message: &Message) -> bool {
        message.is_error()
    }

    /// Builds the caller-visible error for a reply classified by
    /// [`ErrorMapper::is_error`].
    fn to_error(&self, message: &Message) -> ServiceError;

    /// Builds the caller-visible error for a transport fault raised while
    /// calling `qualifier`.
    fn to_fault(&self, error: &TransportError, qualifier: &str) -> ServiceError {
        let kind = match error {
            TransportError::Closed => ErrorKind::TransportClosed,
            _ => ErrorKind::TransportFault,
        };
        ServiceError::new(kind, error.to_string()).with_qualifier(qualifier)
    }
}

/// Reads [`ErrorData`] payloads and maps their codes onto [`ErrorKind`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorMapper;

impl DefaultErrorMapper {
    pub fn kind_for_code(code: i32) -> ErrorKind {
        match code {
            400 => ErrorKind::BadRequest,
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            500 => ErrorKind::Internal,
            503 => ErrorKind::ServiceUnavailable,
            _ => ErrorKind::Internal,
        }
    }
}

impl ErrorMapper for DefaultErrorMapper {
    fn to_error(&self, message: &Message) -> ServiceError {
        let qualifier_code = message.error_code();

        let decoded = DataCodec::for_content_type(
            message.content_type().unwrap_or(DEFAULT_CONTENT_TYPE),
        )
        .and_then(|codec| codec.decode_message::<ErrorData>(message));

        match decoded {
            Ok(data) => ServiceError::new(Self::kind_for_code(data.error_code), data.error_message)
                .with_code(data.error_code),
            Err(e) => {
                tracing::debug!(
                    "Unreadable error payload in reply `{}`: {}",
                    message.qualifier(),
                    e
                );
                let error = ServiceError::new(
                    ErrorKind::Unmapped,
                    format!("unreadable error reply `{}`", message.qualifier()),
                );
                match qualifier_code {
                    Some(code) => error.with_code(code),
                    None => error,
                }
            }
        }
    }
}
