use crate::session::{Session, runtime_handle};
use crate::settings::ClientSettings;
use crate::websocket::WebsocketClientCodec;
use futures::{StreamExt, TryStreamExt, stream};
use futures_util::SinkExt;
use std::fmt;
use std::sync::Arc;
use svcgate::Message;
use svcgate_service::{ClientTransport, MessageStream, TransportError};
use tokio::runtime::Handle;
use tokio::sync::{OnceCell, mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

type WebsocketSession = Session<WsMessage>;

struct Inner {
    url: String,
    codec: WebsocketClientCodec,
    runtime: Option<Handle>,
    session: OnceCell<Arc<WebsocketSession>>,
    closed: watch::Sender<bool>,
}

/// Calls multiplexed over one WebSocket, one JSON text frame per message.
#[derive(Clone)]
pub struct WebsocketTransport {
    inner: Arc<Inner>,
}

impl WebsocketTransport {
    pub fn new(settings: &ClientSettings, codec: WebsocketClientCodec) -> Self {
        let scheme = if settings.secure() { "wss" } else { "ws" };

        Self {
            inner: Arc::new(Inner {
                url: format!(
                    "{scheme}://{}{}",
                    settings.address(),
                    settings.websocket_path()
                ),
                codec,
                runtime: settings.runtime().cloned(),
                session: OnceCell::new(),
                closed: watch::Sender::new(false),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.get().is_some_and(|s| s.is_open())
    }
}

impl Inner {
    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn session(&self) -> Result<Arc<WebsocketSession>, TransportError> {
        let mut closed = self.closed.subscribe();

        // A connect that never completes must not outlive `close`.
        let session = tokio::select! {
            session = self.session.get_or_try_init(|| self.connect()) => session?.clone(),
            _ = closed.wait_for(|closed| *closed) => return Err(TransportError::Closed),
        };

        if self.is_closed() {
            session.close();
            return Err(TransportError::Closed);
        }

        Ok(session)
    }

    async fn connect(&self) -> Result<Arc<WebsocketSession>, TransportError> {
        let runtime = runtime_handle(self.runtime.as_ref())?;

        tracing::debug!("Connecting websocket transport to {}", self.url);

        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                address: self.url.clone(),
                reason: e.to_string(),
            })?;
        let (mut sender, mut receiver) = ws_stream.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
        let session = Session::new(tx, WebsocketClientCodec::encode_cancel, self.url.clone());

        // Send loop
        session.attach_task(runtime.spawn({
            let session = session.clone();
            async move {
                while let Some(msg) = rx.recv().await {
                    if let Err(e) = sender.send(msg).await {
                        session.connection_lost(&e.to_string());
                        break;
                    }
                }
                let _ = sender.close().await;
            }
        }));

        // Receive loop
        session.attach_task(runtime.spawn({
            let session = session.clone();
            let codec = self.codec;
            async move {
                while let Some(msg) = receiver.next().await {
                    match msg {
                        Ok(WsMessage::Text(text)) => match codec.decode_reply(text.as_str()) {
                            Ok((stream_id, Ok(reply))) => session.dispatch(stream_id, reply),
                            Ok((stream_id, Err(e))) => session.fail(stream_id, e),
                            Err(e) => tracing::warn!("Ignoring websocket frame: {}", e),
                        },
                        Ok(WsMessage::Binary(_)) => {
                            tracing::warn!("Ignoring unexpected binary websocket frame");
                        }
                        Ok(WsMessage::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            session.connection_lost(&e.to_string());
                            return;
                        }
                    }
                }
                session.connection_lost("websocket closed by peer");
            }
        }));

        tracing::info!("Websocket transport connected to {}", self.url);

        Ok(session)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(session) = self.session.get() {
            session.close();
        }
    }
}

#[async_trait::async_trait]
impl ClientTransport for WebsocketTransport {
    async fn request_response(&self, request: Message) -> Result<Message, TransportError> {
        let session = self.inner.session().await?;
        let codec = self.inner.codec;

        session
            .request_response(|stream_id| codec.encode_request(stream_id, &request))
            .await
    }

    fn request_stream(&self, request: Message) -> MessageStream {
        let inner = self.inner.clone();

        stream::once(async move {
            let session = inner.session().await?;
            let codec = inner.codec;

            session.request_stream(|stream_id| codec.encode_request(stream_id, &request))
        })
        .try_flatten()
        .boxed()
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.inner.closed.send_replace(true) {
            return Ok(());
        }

        if let Some(session) = self.inner.session.get() {
            session.close();
        }
        tracing::debug!("Websocket transport to {} closed", self.inner.url);

        Ok(())
    }
}

impl fmt::Debug for WebsocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebsocketTransport")
            .field("url", &self.inner.url)
            .field("connected", &self.is_connected())
            .finish()
    }
}
