mod websocket_client_codec;
mod websocket_transport;

pub use websocket_client_codec::{Signal, WebsocketClientCodec};
pub use websocket_transport::WebsocketTransport;
