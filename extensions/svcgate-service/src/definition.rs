use crate::dispatcher::InvocationDispatcher;
use crate::error::ServiceError;
use crate::error_mapper::ErrorMapper;
use crate::response_stream::ResponseStream;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

/// Declares a method that eventually yields exactly one `T` or one error.
pub struct Single<T>(PhantomData<fn() -> T>);

/// Declares a method that yields zero or more `T`s, terminated by completion
/// or by an error.
pub struct Many<T>(PhantomData<fn() -> T>);

/// The return type a method signature declares, before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredReturn {
    /// Nothing is awaited.
    Unit,
    Single(&'static str),
    Stream(&'static str),
    /// Any other return type. Only reachable from hand-written definitions and
    /// always rejected when the descriptor table is built.
    Other(&'static str),
}

impl DeclaredReturn {
    pub fn type_name(&self) -> &'static str {
        match self {
            DeclaredReturn::Unit => "()",
            DeclaredReturn::Single(name)
            | DeclaredReturn::Stream(name)
            | DeclaredReturn::Other(name) => name,
        }
    }
}

/// Links a declared return type to the value a stub method hands back.
pub trait ResponseShape {
    type Output;

    fn declared() -> DeclaredReturn;

    /// Routes a call to the dispatcher entry point matching this shape.
    ///
    /// `args` is `None` for methods without parameters.
    fn invoke<A>(
        dispatcher: &InvocationDispatcher,
        method: &'static str,
        args: Option<A>,
    ) -> Self::Output
    where
        A: Serialize;
}

impl<T> ResponseShape for Single<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = BoxFuture<'static, Result<T, ServiceError>>;

    fn declared() -> DeclaredReturn {
        DeclaredReturn::Single(type_name::<T>())
    }

    fn invoke<A>(
        dispatcher: &InvocationDispatcher,
        method: &'static str,
        args: Option<A>,
    ) -> Self::Output
    where
        A: Serialize,
    {
        dispatcher.request_response(method, args)
    }
}

impl<T> ResponseShape for Many<T>
where
    T: DeserializeOwned + 'static,
{
    type Output = ResponseStream<T>;

    fn declared() -> DeclaredReturn {
        DeclaredReturn::Stream(type_name::<T>())
    }

    fn invoke<A>(
        dispatcher: &InvocationDispatcher,
        method: &'static str,
        args: Option<A>,
    ) -> Self::Output
    where
        A: Serialize,
    {
        dispatcher.request_stream(method, args)
    }
}

impl ResponseShape for () {
    type Output = ();

    fn declared() -> DeclaredReturn {
        DeclaredReturn::Unit
    }

    fn invoke<A>(dispatcher: &InvocationDispatcher, method: &'static str, args: Option<A>)
    where
        A: Serialize,
    {
        dispatcher.fire_and_forget(method, args)
    }
}

/// One method as declared by a [`ServiceDefinition`].
#[derive(Debug, Clone)]
pub struct MethodSignature {
    pub name: &'static str,
    pub parameter_types: Vec<&'static str>,
    pub declared_return: DeclaredReturn,
    /// Overrides the default `{namespace}/{name}` qualifier.
    pub qualifier: Option<String>,
    /// Overrides the client's error mapper for this method only.
    pub error_mapper: Option<Arc<dyn ErrorMapper>>,
}

impl MethodSignature {
    pub fn new(name: &'static str, declared_return: DeclaredReturn) -> Self {
        Self {
            name,
            parameter_types: Vec::new(),
            declared_return,
            qualifier: None,
            error_mapper: None,
        }
    }

    pub fn of<R: ResponseShape>(name: &'static str) -> Self {
        Self::new(name, R::declared())
    }

    pub fn with_parameter(mut self, type_name: &'static str) -> Self {
        self.parameter_types.push(type_name);
        self
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn with_error_mapper(mut self, error_mapper: Arc<dyn ErrorMapper>) -> Self {
        self.error_mapper = Some(error_mapper);
        self
    }
}

/// A remote service interface.
///
/// Usually generated by [`crate::service!`], but may be written by hand. The
/// implementing type is a marker; callers interact with [`Self::Client`], the
/// stub that forwards each method to an [`InvocationDispatcher`].
pub trait ServiceDefinition: 'static {
    /// Prefix of every default method qualifier.
    const NAMESPACE: &'static str;

    type Client: Send + Sync + 'static;

    fn methods() -> Vec<MethodSignature>;

    fn client(dispatcher: InvocationDispatcher) -> Self::Client;
}
