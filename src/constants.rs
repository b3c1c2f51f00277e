// Frame related constants
pub const FRAME_LENGTH_FIELD_SIZE: usize = 4;
pub const FRAME_STREAM_ID_OFFSET: usize = 4;
pub const FRAME_KIND_OFFSET: usize = 8;
pub const FRAME_METADATA_LENGTH_OFFSET: usize = 9;
pub const FRAME_HEADER_SIZE: usize = 11;

/// Upper bound for the body of a single frame (everything after the length field).
///
/// Frames announcing a larger body are rejected by the decoder before any payload
/// is buffered.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Size of the scratch buffer used when reading from a socket.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024 * 64;

// Message related constants

/// Qualifier prefix marking a message as an error reply. The remainder of the
/// qualifier is the numeric error code, e.g. `error/503`.
pub const ERROR_QUALIFIER_PREFIX: &str = "error/";

/// Error code used when a peer signals an error without a code of its own.
pub const DEFAULT_ERROR_CODE: i32 = 500;

/// Header carrying the content type of a message payload.
pub const CONTENT_TYPE_HEADER: &str = "content-type";

/// Key under which the qualifier travels inside encoded frame metadata.
pub const QUALIFIER_HEADER: &str = "q";

// Client defaults

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_WEBSOCKET_PATH: &str = "/";
pub const DEFAULT_HTTP_BASE_PATH: &str = "";
