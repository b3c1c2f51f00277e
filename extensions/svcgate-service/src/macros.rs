/// Declares a remote service and generates its client stub.
///
/// ```rust
/// use svcgate_service::{Many, Single, service};
///
/// service! {
///     /// Greets people.
///     pub service Greeter => GreeterClient = "greeting" {
///         /// Resolves to the greeting for `name`.
///         fn hello(name: String) -> Single<String>;
///         /// Streams `count` numbered greetings.
///         fn many_hellos(name: String, count: u32) -> Many<String> = "greeting/hellos";
///         /// Sends without waiting for a reply.
///         fn wave(name: String);
///     }
/// }
/// ```
///
/// This expands to a marker type `Greeter` implementing
/// [`ServiceDefinition`](crate::ServiceDefinition) and a cloneable
/// `GreeterClient` stub with one method per declaration. The return type
/// selects the communication pattern:
///
/// - `Single<T>` returns a future resolving to `Result<T, ServiceError>`.
/// - `Many<T>` returns a [`ResponseStream<T>`](crate::ResponseStream).
/// - no return type sends fire-and-forget.
///
/// The namespace defaults to the service name. Each method's qualifier
/// defaults to `{namespace}/{method}` unless a route literal follows the
/// declaration.
#[macro_export]
macro_rules! service {
    (
        $(#[$meta:meta])*
        $vis:vis service $name:ident => $client:ident $(= $namespace:literal)? {
            $(
                $(#[$method_meta:meta])*
                fn $method:ident ( $($arg:ident : $arg_ty:ty),* $(,)? ) $(-> $ret:ty)? $(= $route:literal)? ;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $name;

        #[derive(Debug, Clone)]
        $vis struct $client {
            dispatcher: $crate::InvocationDispatcher,
        }

        impl $crate::ServiceDefinition for $name {
            const NAMESPACE: &'static str = $crate::__service_namespace!($name $(, $namespace)?);

            type Client = $client;

            fn methods() -> ::std::vec::Vec<$crate::MethodSignature> {
                ::std::vec![
                    $(
                        $crate::MethodSignature::of::<$crate::__service_return!($($ret)?)>(
                            ::std::stringify!($method),
                        )
                        $(.with_parameter(::std::any::type_name::<$arg_ty>()))*
                        $(.with_qualifier($route))?
                    ),*
                ]
            }

            fn client(dispatcher: $crate::InvocationDispatcher) -> Self::Client {
                $client { dispatcher }
            }
        }

        impl $client {
            pub fn dispatcher(&self) -> &$crate::InvocationDispatcher {
                &self.dispatcher
            }

            $(
                $(#[$method_meta])*
                pub fn $method(
                    &self,
                    $($arg: $arg_ty),*
                ) -> <$crate::__service_return!($($ret)?) as $crate::ResponseShape>::Output {
                    <$crate::__service_return!($($ret)?) as $crate::ResponseShape>::invoke(
                        &self.dispatcher,
                        ::std::stringify!($method),
                        $crate::__service_args!($($arg),*),
                    )
                }
            )*
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __service_return {
    () => { () };
    ($ret:ty) => { $ret };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __service_args {
    () => {
        ::std::option::Option::None::<()>
    };
    ($arg:ident) => {
        ::std::option::Option::Some($arg)
    };
    ($($arg:ident),+) => {
        ::std::option::Option::Some(($($arg),+))
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __service_namespace {
    ($name:ident) => {
        ::std::stringify!($name)
    };
    ($name:ident, $namespace:literal) => {
        $namespace
    };
}
