use crate::http::HttpClientCodec;
use futures::{StreamExt, stream};
use std::fmt;
use std::sync::Arc;
use svcgate::Message;
use svcgate_service::{ClientTransport, MessageStream, TransportError};
use tokio::sync::watch;

struct Inner {
    client: reqwest::Client,
    codec: HttpClientCodec,
    closed: watch::Sender<bool>,
}

/// Request/response over HTTP: one `POST` per call.
///
/// There is no persistent connection to establish, so every call is
/// independent. Request/stream is not available on this transport.
#[derive(Clone)]
pub struct HttpTransport {
    inner: Arc<Inner>,
}

impl HttpTransport {
    pub fn new(codec: HttpClientCodec) -> Self {
        Self::with_client(reqwest::Client::new(), codec)
    }

    pub fn with_client(client: reqwest::Client, codec: HttpClientCodec) -> Self {
        let (closed, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                client,
                codec,
                closed,
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        self.inner.codec.base_url()
    }

    fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    async fn send(&self, request: Message) -> Result<Message, TransportError> {
        let codec = &self.inner.codec;
        let url = codec.url_for(request.qualifier());

        let response = codec
            .encode_request(&self.inner.client, &request)?
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    TransportError::Connect {
                        address: url.clone(),
                        reason: e.to_string(),
                    }
                } else {
                    TransportError::Protocol(e.to_string())
                }
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()))?;

        tracing::trace!("HTTP {} -> {}", url, status);

        Ok(codec.decode_response(request.qualifier(), status, &headers, body))
    }
}

#[async_trait::async_trait]
impl ClientTransport for HttpTransport {
    async fn request_response(&self, request: Message) -> Result<Message, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let mut closed = self.inner.closed.subscribe();

        tokio::select! {
            reply = self.send(request) => reply,
            _ = closed.wait_for(|closed| *closed) => Err(TransportError::Closed),
        }
    }

    fn request_stream(&self, _request: Message) -> MessageStream {
        stream::once(async { Err(TransportError::Unsupported("request-stream")) }).boxed()
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.inner.closed.send_replace(true) {
            return Ok(());
        }
        tracing::debug!("HTTP transport to {} closed", self.base_url());

        Ok(())
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url())
            .field("closed", &self.is_closed())
            .finish()
    }
}
