use crate::session::{Session, runtime_handle};
use crate::settings::ClientSettings;
use crate::stream::FrameClientCodec;
use futures::{StreamExt, TryStreamExt, stream};
use std::fmt;
use std::sync::Arc;
use svcgate::Message;
use svcgate::constants::DEFAULT_READ_BUFFER_SIZE;
use svcgate::frame::{FrameDecoder, FrameKind};
use svcgate_service::{ClientTransport, MessageStream, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{OnceCell, mpsc, watch};

type StreamSession = Session<Vec<u8>>;

struct Inner {
    address: String,
    codec: FrameClientCodec,
    runtime: Option<Handle>,
    session: OnceCell<Arc<StreamSession>>,
    closed: watch::Sender<bool>,
}

/// Multiplexed request/response and request/stream over one TCP connection.
///
/// The connection is opened by the first call; concurrent first calls share
/// the same attempt and a failed attempt is retried by the next call.
#[derive(Clone)]
pub struct StreamTransport {
    inner: Arc<Inner>,
}

impl StreamTransport {
    pub fn new(settings: &ClientSettings, codec: FrameClientCodec) -> Self {
        Self {
            inner: Arc::new(Inner {
                address: settings.address(),
                codec,
                runtime: settings.runtime().cloned(),
                session: OnceCell::new(),
                closed: watch::Sender::new(false),
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Whether a connection is established and still usable.
    pub fn is_connected(&self) -> bool {
        self.inner.session.get().is_some_and(|s| s.is_open())
    }
}

impl Inner {
    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn session(&self) -> Result<Arc<StreamSession>, TransportError> {
        let mut closed = self.closed.subscribe();

        // A connect that never completes must not outlive `close`.
        let session = tokio::select! {
            session = self.session.get_or_try_init(|| self.connect()) => session?.clone(),
            _ = closed.wait_for(|closed| *closed) => return Err(TransportError::Closed),
        };

        // `close` may have run while the connection was being established.
        if self.is_closed() {
            session.close();
            return Err(TransportError::Closed);
        }

        Ok(session)
    }

    async fn connect(&self) -> Result<Arc<StreamSession>, TransportError> {
        let runtime = runtime_handle(self.runtime.as_ref())?;

        tracing::debug!("Connecting stream transport to {}", self.address);

        let socket = TcpStream::connect(&self.address)
            .await
            .map_err(|e| TransportError::Connect {
                address: self.address.clone(),
                reason: e.to_string(),
            })?;
        socket.set_nodelay(true)?;
        let (mut reader, mut writer) = socket.into_split();

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let session = Session::new(tx, FrameClientCodec::encode_cancel, self.address.clone());

        // Send loop
        session.attach_task(runtime.spawn({
            let session = session.clone();
            async move {
                while let Some(bytes) = rx.recv().await {
                    if let Err(e) = writer.write_all(&bytes).await {
                        session.connection_lost(&e.to_string());
                        break;
                    }
                }
            }
        }));

        // Receive loop
        session.attach_task(runtime.spawn({
            let session = session.clone();
            let codec = self.codec;
            async move {
                let mut decoder = FrameDecoder::new(codec.max_frame_size());
                let mut buf = vec![0u8; DEFAULT_READ_BUFFER_SIZE];

                loop {
                    let n = match reader.read(&mut buf).await {
                        Ok(0) => {
                            session.connection_lost("peer closed the connection");
                            return;
                        }
                        Ok(n) => n,
                        Err(e) => {
                            session.connection_lost(&e.to_string());
                            return;
                        }
                    };

                    for frame in decoder.read_bytes(&buf[..n]) {
                        match frame
                            .map_err(TransportError::from)
                            .and_then(|frame| codec.decode_reply(frame))
                        {
                            Ok((stream_id, reply)) => session.dispatch(stream_id, reply),
                            Err(e) => {
                                session.connection_lost(&e.to_string());
                                return;
                            }
                        }
                    }
                }
            }
        }));

        tracing::info!("Stream transport connected to {}", self.address);

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
impl ClientTransport for StreamTransport {
    async fn request_response(&self, request: Message) -> Result<Message, TransportError> {
        let session = self.inner.session().await?;
        let codec = self.inner.codec;

        session
            .request_response(|stream_id| {
                codec.encode_request(stream_id, FrameKind::RequestResponse, &request)
            })
            .await
    }

    fn request_stream(&self, request: Message) -> MessageStream {
        let inner = self.inner.clone();

        stream::once(async move {
            let session = inner.session().await?;
            let codec = inner.codec;

            session.request_stream(|stream_id| {
                codec.encode_request(stream_id, FrameKind::RequestStream, &request)
            })
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
        tracing::debug!("Stream transport to {} closed", self.inner.address);

        Ok(())
    }
}

impl fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTransport")
            .field("address", &self.inner.address)
            .field("codec", &self.inner.codec)
            .field("connected", &self.is_connected())
            .finish()
    }
}
