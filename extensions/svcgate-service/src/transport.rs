use crate::error::TransportError;
use futures::stream::BoxStream;
use std::fmt::Debug;
use svcgate::Message;

/// Replies to a streaming request, terminated by end-of-stream or by an error.
pub type MessageStream = BoxStream<'static, Result<Message, TransportError>>;

/// A connection capable of carrying [`Message`]s to a remote peer.
///
/// Implementations multiplex any number of concurrent calls. Error replies
/// from the peer are returned as ordinary messages (`Ok`); only failures of
/// the transport itself are reported as `Err`.
#[async_trait::async_trait]
pub trait ClientTransport: Send + Sync + Debug + 'static {
    /// Sends `request` and waits for exactly one reply.
    async fn request_response(&self, request: Message) -> Result<Message, TransportError>;

    /// Sends `request` and returns the stream of replies.
    ///
    /// The request is not sent until the stream is first polled. Dropping the
    /// stream before it terminates cancels the call on the peer.
    fn request_stream(&self, request: Message) -> MessageStream;

    /// Releases the connection. Pending calls fail with
    /// [`TransportError::Closed`]. Calling `close` more than once is allowed.
    async fn close(&self) -> Result<(), TransportError>;
}
