use crate::http::{HttpClientCodec, HttpTransport};
use crate::settings::ClientSettings;
use crate::stream::{FrameClientCodec, StreamTransport};
use crate::websocket::{WebsocketClientCodec, WebsocketTransport};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use svcgate::{DataCodec, Message};
use svcgate_service::{
    ClientError, ClientTransport, DispatchContext, ErrorMapper, InvocationDispatcher,
    ResponseStream, ServiceError, ServiceDefinition,
};

type CachedStub = Arc<dyn Any + Send + Sync>;

/// Entry point for calling remote services.
///
/// A `Client` owns one transport and hands out typed stubs for any number of
/// service definitions. Stubs are cached per service type, so repeated calls
/// to [`Client::for_service`] return the same instance.
///
/// ```no_run
/// use example_svcgate_service_definition::Echo;
/// use svcgate_tokio_client::{Client, ClientSettings};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = ClientSettings::builder().host("localhost").port(7000).build()?;
/// let client = Client::on_stream(settings)?;
///
/// let echo = client.for_service::<Echo>()?;
/// let reply = echo.echo("hello".to_owned()).await?;
/// assert_eq!(reply, "hello");
///
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    context: DispatchContext,
    transport_name: &'static str,
    stubs: DashMap<TypeId, CachedStub>,
}

impl Client {
    /// Client over a multiplexed TCP connection using length-prefixed frames.
    pub fn on_stream(settings: ClientSettings) -> Result<Self, ClientError> {
        let codec = DataCodec::for_content_type(settings.content_type())?;
        if settings.secure() {
            return Err(ClientError::InvalidSettings(
                "the stream transport does not support TLS".into(),
            ));
        }

        let transport = StreamTransport::new(
            &settings,
            FrameClientCodec::new(codec, settings.max_frame_size()),
        );

        Ok(Self::from_settings(Arc::new(transport), "stream", codec, &settings))
    }

    /// Client over a WebSocket connection carrying JSON envelopes.
    pub fn on_websocket(settings: ClientSettings) -> Result<Self, ClientError> {
        let codec = DataCodec::for_content_type(settings.content_type())?;
        if codec != DataCodec::Json {
            return Err(ClientError::UnsupportedContentType {
                content_type: settings.content_type().to_owned(),
                transport: "websocket",
            });
        }

        let transport = WebsocketTransport::new(&settings, WebsocketClientCodec);

        Ok(Self::from_settings(Arc::new(transport), "websocket", codec, &settings))
    }

    /// Client issuing one HTTP `POST` per call. Streaming calls are not available.
    pub fn on_http(settings: ClientSettings) -> Result<Self, ClientError> {
        let codec = DataCodec::for_content_type(settings.content_type())?;
        let transport = HttpTransport::new(HttpClientCodec::new(&settings, codec));

        Ok(Self::from_settings(Arc::new(transport), "http", codec, &settings))
    }

    /// Binds a caller-supplied transport.
    pub fn new(
        transport: Arc<dyn ClientTransport>,
        codec: DataCodec,
        error_mapper: Arc<dyn ErrorMapper>,
    ) -> Self {
        Self::with_context(DispatchContext::new(transport, codec, error_mapper), "custom")
    }

    fn from_settings(
        transport: Arc<dyn ClientTransport>,
        transport_name: &'static str,
        codec: DataCodec,
        settings: &ClientSettings,
    ) -> Self {
        let context = DispatchContext::new(transport, codec, settings.error_mapper().clone())
            .with_headers(settings.headers().clone())
            .with_runtime(settings.runtime().cloned());

        tracing::debug!(
            "Created {} client for {} ({})",
            transport_name,
            settings.address(),
            codec.content_type()
        );

        Self::with_context(context, transport_name)
    }

    fn with_context(context: DispatchContext, transport_name: &'static str) -> Self {
        Self {
            context,
            transport_name,
            stubs: DashMap::new(),
        }
    }

    /// Returns the stub for `S`, building it on first use.
    pub fn for_service<S: ServiceDefinition>(&self) -> Result<Arc<S::Client>, ClientError> {
        let key = TypeId::of::<S>();

        if let Some(stub) = self.stubs.get(&key) {
            return Ok(downcast::<S>(stub.value().clone()));
        }

        // The shard stays locked while the stub is built, so a concurrent
        // first call waits here and then sees the occupied entry.
        let stub = match self.stubs.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let dispatcher = InvocationDispatcher::for_service::<S>(self.context.clone())?;
                let stub: CachedStub = Arc::new(S::client(dispatcher));
                tracing::debug!("Created stub for service `{}`", S::NAMESPACE);
                entry.insert(stub).clone()
            }
        };

        Ok(downcast::<S>(stub))
    }

    /// Builds an uncached stub for `S` whose default error mapper is `error_mapper`.
    ///
    /// The stub shares this client's transport and closed state. Methods that
    /// declare their own mapper keep using it.
    pub fn for_service_with<S: ServiceDefinition>(
        &self,
        error_mapper: Arc<dyn ErrorMapper>,
    ) -> Result<Arc<S::Client>, ClientError> {
        let dispatcher =
            InvocationDispatcher::for_service::<S>(self.context.with_error_mapper(error_mapper))?;

        Ok(Arc::new(S::client(dispatcher)))
    }

    /// Sends a prebuilt message and waits for its single reply.
    pub async fn request_response(&self, request: Message) -> Result<Message, ServiceError> {
        self.context.request_response(request).await
    }

    /// Sends a prebuilt message and streams every reply.
    pub fn request_stream(&self, request: Message) -> ResponseStream<Message> {
        self.context.request_stream(request)
    }

    /// Closes the transport. Later calls through any stub fail with
    /// [`svcgate_service::ErrorKind::TransportClosed`].
    pub async fn close(&self) -> Result<(), ClientError> {
        if !self.context.lifecycle().mark_closed() {
            return Ok(());
        }

        self.context
            .transport()
            .close()
            .await
            .map_err(ClientError::Close)?;

        tracing::info!("Closed {} client", self.transport_name);

        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.context.lifecycle().is_closed()
    }

    pub fn codec(&self) -> DataCodec {
        self.context.codec()
    }

    pub fn transport(&self) -> &Arc<dyn ClientTransport> {
        self.context.transport()
    }
}

fn downcast<S: ServiceDefinition>(stub: CachedStub) -> Arc<S::Client> {
    match stub.downcast::<S::Client>() {
        Ok(stub) => stub,
        Err(_) => unreachable!("stub cache entry does not match its service type"),
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.transport_name)
            .field("codec", &self.context.codec().content_type())
            .field("closed", &self.is_closed())
            .field("cached_stubs", &self.stubs.len())
            .finish()
    }
}
