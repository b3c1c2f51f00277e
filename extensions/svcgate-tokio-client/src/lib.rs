//! Tokio client for svcgate services.
//!
//! [`Client`] binds service definitions to one of three transports:
//!
//! - [`StreamTransport`]: length-prefixed frames over a multiplexed TCP connection.
//! - [`WebsocketTransport`]: JSON envelopes over a WebSocket.
//! - [`HttpTransport`]: one `POST` per call, request/response only.
//!
//! Connections are opened lazily by the first call and are never re-established
//! once lost.

mod client;
mod http;
mod session;
mod settings;
mod stream;
mod websocket;

pub use client::Client;
pub use http::{HttpClientCodec, HttpTransport};
pub use settings::{ClientSettings, ClientSettingsBuilder};
pub use stream::{FrameClientCodec, StreamTransport};
pub use websocket::{Signal, WebsocketClientCodec, WebsocketTransport};

pub use svcgate_service::{ClientError, ErrorKind, ErrorMapper, ServiceError};
