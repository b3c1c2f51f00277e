mod http_client_codec;
mod http_transport;

pub use http_client_codec::HttpClientCodec;
pub use http_transport::HttpTransport;
