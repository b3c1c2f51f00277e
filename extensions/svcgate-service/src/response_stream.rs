use crate::error::{ServiceError, TransportError};
use crate::error_mapper::ErrorMapper;
use crate::lifecycle::ClientLifecycle;
use crate::transport::MessageStream;
use futures::Stream;
use futures::StreamExt;
use futures::stream::FusedStream;
use serde::de::DeserializeOwned;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use svcgate::{CodecError, DataCodec, Message};

pub(crate) type DecodeFn<T> = fn(DataCodec, Message) -> Result<T, CodecError>;

pub(crate) fn decode_typed<T: DeserializeOwned>(
    codec: DataCodec,
    message: Message,
) -> Result<T, CodecError> {
    codec.decode_message(&message)
}

pub(crate) fn decode_raw(_codec: DataCodec, message: Message) -> Result<Message, CodecError> {
    Ok(message)
}

/// Classifies a single reply and decodes it when it is not an error.
pub(crate) fn classify_reply<T>(
    error_mapper: &dyn ErrorMapper,
    codec: DataCodec,
    qualifier: &str,
    reply: Message,
    decode: DecodeFn<T>,
) -> Result<T, ServiceError> {
    if error_mapper.is_error(&reply) {
        return Err(error_mapper.to_error(&reply).with_qualifier(qualifier));
    }

    decode(codec, reply).map_err(|e| error_mapper.to_fault(&TransportError::Codec(e), qualifier))
}

enum State {
    /// Not polled yet; the request has not been sent.
    Pending(MessageStream),
    Active(MessageStream),
    /// Fails on first poll without touching the transport.
    Failed(ServiceError),
    Done,
}

/// The lazy, single-use stream returned by streaming service methods.
///
/// Nothing is sent until the stream is first polled. Every reply passes
/// through the client's [`ErrorMapper`]: the first error reply or transport
/// fault is yielded as `Err` and ends the stream. Dropping a `ResponseStream`
/// before it ends cancels the call on the peer.
pub struct ResponseStream<T> {
    state: State,
    codec: DataCodec,
    error_mapper: Arc<dyn ErrorMapper>,
    lifecycle: Arc<ClientLifecycle>,
    qualifier: String,
    decode: DecodeFn<T>,
}

impl<T> ResponseStream<T> {
    pub(crate) fn new(
        stream: MessageStream,
        codec: DataCodec,
        error_mapper: Arc<dyn ErrorMapper>,
        lifecycle: Arc<ClientLifecycle>,
        qualifier: String,
        decode: DecodeFn<T>,
    ) -> Self {
        Self {
            state: State::Pending(stream),
            codec,
            error_mapper,
            lifecycle,
            qualifier,
            decode,
        }
    }

    pub(crate) fn failed(
        error: ServiceError,
        codec: DataCodec,
        error_mapper: Arc<dyn ErrorMapper>,
        lifecycle: Arc<ClientLifecycle>,
        qualifier: String,
        decode: DecodeFn<T>,
    ) -> Self {
        Self {
            state: State::Failed(error),
            codec,
            error_mapper,
            lifecycle,
            qualifier,
            decode,
        }
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    fn fault(&self, error: &TransportError) -> ServiceError {
        self.error_mapper.to_fault(error, &self.qualifier)
    }
}

impl<T> Stream for ResponseStream<T> {
    type Item = Result<T, ServiceError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        let mut stream = match std::mem::replace(&mut this.state, State::Done) {
            State::Done => return Poll::Ready(None),
            State::Failed(error) => return Poll::Ready(Some(Err(error))),
            State::Pending(_) if this.lifecycle.is_closed() => {
                return Poll::Ready(Some(Err(this.fault(&TransportError::Closed))));
            }
            State::Pending(stream) | State::Active(stream) => stream,
        };

        let item = match stream.poll_next_unpin(cx) {
            Poll::Pending => {
                this.state = State::Active(stream);
                return Poll::Pending;
            }
            Poll::Ready(item) => item,
        };

        match item {
            Some(Ok(reply)) => {
                let result = classify_reply(
                    this.error_mapper.as_ref(),
                    this.codec,
                    &this.qualifier,
                    reply,
                    this.decode,
                );
                if result.is_ok() {
                    this.state = State::Active(stream);
                }
                Poll::Ready(Some(result))
            }
            Some(Err(e)) => {
                tracing::debug!("Stream `{}` failed: {}", this.qualifier, e);
                Poll::Ready(Some(Err(this.fault(&e))))
            }
            None => Poll::Ready(None),
        }
    }
}

impl<T> FusedStream for ResponseStream<T> {
    fn is_terminated(&self) -> bool {
        matches!(self.state, State::Done)
    }
}

impl<T> fmt::Debug for ResponseStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Pending(_) => "pending",
            State::Active(_) => "active",
            State::Failed(_) => "failed",
            State::Done => "done",
        };
        f.debug_struct("ResponseStream")
            .field("qualifier", &self.qualifier)
            .field("state", &state)
            .finish()
    }
}
