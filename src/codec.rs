mod codec_error;
mod data_codec;
mod headers_codec;

pub use codec_error::CodecError;
pub use data_codec::DataCodec;
pub use headers_codec::HeadersCodec;
