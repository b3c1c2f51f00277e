mod frame_client_codec;
mod stream_transport;

pub use frame_client_codec::FrameClientCodec;
pub use stream_transport::StreamTransport;
