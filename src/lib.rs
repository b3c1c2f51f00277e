//! Low-level building blocks shared by every svcgate transport.
//!
//! - [`Message`]: the wire-agnostic envelope (qualifier, headers, payload).
//! - [`codec`]: content-type codecs turning typed values into payload bytes.
//! - [`frame`]: length-prefixed framing used by the stream transport.

pub mod codec;
pub mod constants;
pub mod frame;
mod message;
pub mod utils;

pub use codec::{CodecError, DataCodec, HeadersCodec};
pub use message::{ErrorData, Message, MessageBuilder};
