//! Transport-agnostic invocation layer for svcgate clients.
//!
//! A service is described once, with [`service!`] or a hand-written
//! [`ServiceDefinition`]. Its methods are classified into
//! [`CommunicationPattern`]s when the [`MethodDescriptorTable`] is built, and
//! an [`InvocationDispatcher`] turns each stub call into [`svcgate::Message`]s
//! for whichever [`ClientTransport`] the client was created with.

mod definition;
mod descriptor;
mod dispatcher;
mod error;
mod error_mapper;
mod lifecycle;
mod macros;
mod response_stream;
mod transport;

pub use definition::{
    DeclaredReturn, Many, MethodSignature, ResponseShape, ServiceDefinition, Single,
};
pub use descriptor::{CommunicationPattern, MethodDescriptor, MethodDescriptorTable, ReturnShape};
pub use dispatcher::{DispatchContext, Invocation, InvocationDispatcher};
pub use error::{ClientError, ErrorKind, ServiceError, TransportError};
pub use error_mapper::{DefaultErrorMapper, ErrorMapper};
pub use lifecycle::ClientLifecycle;
pub use response_stream::ResponseStream;
pub use transport::{ClientTransport, MessageStream};
