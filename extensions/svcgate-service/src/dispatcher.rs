use crate::definition::ServiceDefinition;
use crate::descriptor::{CommunicationPattern, MethodDescriptor, MethodDescriptorTable};
use crate::error::{ClientError, ServiceError, TransportError};
use crate::error_mapper::ErrorMapper;
use crate::lifecycle::ClientLifecycle;
use crate::response_stream::{DecodeFn, ResponseStream, classify_reply, decode_raw, decode_typed};
use crate::transport::ClientTransport;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use svcgate::{CodecError, DataCodec, Message};
use tokio::runtime::Handle;

/// Everything a dispatcher needs besides the method table.
///
/// One context is shared by all stubs of a client; every clone refers to the
/// same transport and lifecycle.
#[derive(Clone)]
pub struct DispatchContext {
    transport: Arc<dyn ClientTransport>,
    codec: DataCodec,
    error_mapper: Arc<dyn ErrorMapper>,
    lifecycle: Arc<ClientLifecycle>,
    headers: BTreeMap<String, String>,
    runtime: Option<Handle>,
}

impl DispatchContext {
    pub fn new(
        transport: Arc<dyn ClientTransport>,
        codec: DataCodec,
        error_mapper: Arc<dyn ErrorMapper>,
    ) -> Self {
        Self {
            transport,
            codec,
            error_mapper,
            lifecycle: Arc::new(ClientLifecycle::new()),
            headers: BTreeMap::new(),
            runtime: None,
        }
    }

    /// Static headers attached to every request.
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Runtime used to spawn fire-and-forget sends.
    pub fn with_runtime(mut self, runtime: Option<Handle>) -> Self {
        self.runtime = runtime;
        self
    }

    /// Same transport and lifecycle, different default error mapper.
    pub fn with_error_mapper(&self, error_mapper: Arc<dyn ErrorMapper>) -> Self {
        Self {
            error_mapper,
            ..self.clone()
        }
    }

    pub fn transport(&self) -> &Arc<dyn ClientTransport> {
        &self.transport
    }

    pub fn codec(&self) -> DataCodec {
        self.codec
    }

    pub fn error_mapper(&self) -> &Arc<dyn ErrorMapper> {
        &self.error_mapper
    }

    pub fn lifecycle(&self) -> &Arc<ClientLifecycle> {
        &self.lifecycle
    }

    /// Sends a prebuilt message and classifies the reply with the context's
    /// error mapper.
    pub fn request_response(&self, request: Message) -> BoxFuture<'static, Result<Message, ServiceError>> {
        let qualifier = request.qualifier().to_owned();
        self.single_call(self.error_mapper.clone(), qualifier, Ok(request), decode_raw)
    }

    /// Streaming counterpart of [`DispatchContext::request_response`].
    pub fn request_stream(&self, request: Message) -> ResponseStream<Message> {
        let qualifier = request.qualifier().to_owned();
        self.stream_call(self.error_mapper.clone(), qualifier, Ok(request), decode_raw)
    }

    fn single_call<T>(
        &self,
        error_mapper: Arc<dyn ErrorMapper>,
        qualifier: String,
        request: Result<Message, CodecError>,
        decode: DecodeFn<T>,
    ) -> BoxFuture<'static, Result<T, ServiceError>>
    where
        T: Send + 'static,
    {
        let transport = self.transport.clone();
        let lifecycle = self.lifecycle.clone();
        let codec = self.codec;

        async move {
            if lifecycle.is_closed() {
                return Err(error_mapper.to_fault(&TransportError::Closed, &qualifier));
            }

            let request = request
                .map_err(|e| error_mapper.to_fault(&TransportError::Codec(e), &qualifier))?;

            tracing::trace!("Sending request `{}`", qualifier);

            let reply = transport.request_response(request).await.map_err(|e| {
                tracing::debug!("Request `{}` failed: {}", qualifier, e);
                error_mapper.to_fault(&e, &qualifier)
            })?;

            classify_reply(error_mapper.as_ref(), codec, &qualifier, reply, decode)
        }
        .boxed()
    }

    fn stream_call<T>(
        &self,
        error_mapper: Arc<dyn ErrorMapper>,
        qualifier: String,
        request: Result<Message, CodecError>,
        decode: DecodeFn<T>,
    ) -> ResponseStream<T> {
        match request {
            Ok(request) => ResponseStream::new(
                self.transport.request_stream(request),
                self.codec,
                error_mapper,
                self.lifecycle.clone(),
                qualifier,
                decode,
            ),
            Err(e) => ResponseStream::failed(
                error_mapper.to_fault(&TransportError::Codec(e), &qualifier),
                self.codec,
                error_mapper,
                self.lifecycle.clone(),
                qualifier,
                decode,
            ),
        }
    }
}

impl fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchContext")
            .field("transport", &self.transport)
            .field("codec", &self.codec)
            .field("error_mapper", &self.error_mapper)
            .field("closed", &self.lifecycle.is_closed())
            .finish()
    }
}

/// The outcome of [`InvocationDispatcher::invoke`], shaped by the method's
/// communication pattern.
pub enum Invocation<T> {
    Single(BoxFuture<'static, Result<T, ServiceError>>),
    Stream(ResponseStream<T>),
    /// A fire-and-forget call was handed to the transport.
    Sent,
}

impl<T> fmt::Debug for Invocation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Single(_) => f.write_str("Invocation::Single"),
            Invocation::Stream(stream) => f.debug_tuple("Invocation::Stream").field(stream).finish(),
            Invocation::Sent => f.write_str("Invocation::Sent"),
        }
    }
}

struct DispatcherInner {
    context: DispatchContext,
    table: MethodDescriptorTable,
}

/// Routes the methods of one service to a transport.
///
/// Cheap to clone; every stub holds one.
#[derive(Clone)]
pub struct InvocationDispatcher {
    inner: Arc<DispatcherInner>,
}

impl InvocationDispatcher {
    pub fn new(context: DispatchContext, table: MethodDescriptorTable) -> Self {
        Self {
            inner: Arc::new(DispatcherInner { context, table }),
        }
    }

    /// Classifies `S` and binds it to `context`.
    pub fn for_service<S: ServiceDefinition>(context: DispatchContext) -> Result<Self, ClientError> {
        Ok(Self::new(context, MethodDescriptorTable::build::<S>()?))
    }

    pub fn table(&self) -> &MethodDescriptorTable {
        &self.inner.table
    }

    pub fn context(&self) -> &DispatchContext {
        &self.inner.context
    }

    /// Calls `method`, dispatching on its classified pattern.
    pub fn invoke<A, T>(&self, method: &'static str, args: Option<A>) -> Invocation<T>
    where
        A: Serialize,
        T: DeserializeOwned + Send + 'static,
    {
        match self.lookup(method).pattern {
            CommunicationPattern::RequestResponse => {
                Invocation::Single(self.request_response(method, args))
            }
            CommunicationPattern::RequestStream => {
                Invocation::Stream(self.request_stream(method, args))
            }
            CommunicationPattern::FireAndForget => {
                self.fire_and_forget(method, args);
                Invocation::Sent
            }
        }
    }

    pub fn request_response<A, T>(
        &self,
        method: &'static str,
        args: Option<A>,
    ) -> BoxFuture<'static, Result<T, ServiceError>>
    where
        A: Serialize,
        T: DeserializeOwned + Send + 'static,
    {
        let descriptor = self.descriptor(method, CommunicationPattern::RequestResponse);
        let request = self.encode(descriptor, args);

        self.inner.context.single_call(
            self.error_mapper_for(descriptor),
            descriptor.qualifier.clone(),
            request,
            decode_typed::<T>,
        )
    }

    pub fn request_stream<A, T>(&self, method: &'static str, args: Option<A>) -> ResponseStream<T>
    where
        A: Serialize,
        T: DeserializeOwned + 'static,
    {
        let descriptor = self.descriptor(method, CommunicationPattern::RequestStream);
        let request = self.encode(descriptor, args);

        self.inner.context.stream_call(
            self.error_mapper_for(descriptor),
            descriptor.qualifier.clone(),
            request,
            decode_typed::<T>,
        )
    }

    /// Sends without awaiting a result. Failures are logged and dropped.
    pub fn fire_and_forget<A>(&self, method: &'static str, args: Option<A>)
    where
        A: Serialize,
    {
        let descriptor = self.descriptor(method, CommunicationPattern::FireAndForget);
        let context = &self.inner.context;

        if context.lifecycle.is_closed() {
            tracing::debug!("Dropping `{}`: client is closed", descriptor.qualifier);
            return;
        }

        let request = match self.encode(descriptor, args) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("Dropping `{}`: {}", descriptor.qualifier, e);
                return;
            }
        };

        let Some(runtime) = context.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            tracing::warn!(
                "Dropping `{}`: no tokio runtime available to send it",
                descriptor.qualifier
            );
            return;
        };

        let transport = context.transport.clone();
        let error_mapper = self.error_mapper_for(descriptor);
        let qualifier = descriptor.qualifier.clone();

        runtime.spawn(async move {
            match transport.request_response(request).await {
                Ok(reply) if error_mapper.is_error(&reply) => {
                    tracing::debug!(
                        "Fire-and-forget `{}` was rejected: {}",
                        qualifier,
                        error_mapper.to_error(&reply)
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("Fire-and-forget `{}` failed: {}", qualifier, e);
                }
            }
        });
    }

    fn lookup(&self, method: &str) -> &MethodDescriptor {
        match self.inner.table.get(method) {
            Some(descriptor) => descriptor,
            None => panic!(
                "method `{method}` is not declared by service `{}`",
                self.inner.table.service()
            ),
        }
    }

    fn descriptor(&self, method: &str, expected: CommunicationPattern) -> &MethodDescriptor {
        let descriptor = self.lookup(method);
        assert_eq!(
            descriptor.pattern, expected,
            "method `{method}` of service `{}` is classified as {:?}",
            self.inner.table.service(),
            descriptor.pattern
        );
        descriptor
    }

    fn error_mapper_for(&self, descriptor: &MethodDescriptor) -> Arc<dyn ErrorMapper> {
        descriptor
            .error_mapper_override
            .clone()
            .unwrap_or_else(|| self.inner.context.error_mapper.clone())
    }

    fn encode<A: Serialize>(
        &self,
        descriptor: &MethodDescriptor,
        args: Option<A>,
    ) -> Result<Message, CodecError> {
        let context = &self.inner.context;
        context
            .codec
            .encode_message(&descriptor.qualifier, &context.headers, args.as_ref())
    }
}

impl fmt::Debug for InvocationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationDispatcher")
            .field("service", &self.inner.table.service())
            .field("methods", &self.inner.table.len())
            .field("context", &self.inner.context)
            .finish()
    }
}
