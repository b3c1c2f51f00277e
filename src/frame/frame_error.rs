use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameEncodeError {
    /// The encoded headers do not fit the 16-bit metadata length field.
    #[error("frame metadata is {0} bytes, exceeding the u16 length field")]
    MetadataTooLarge(usize),

    /// The frame body exceeds the configured maximum frame size.
    #[error("frame body is {size} bytes, exceeding the limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameDecodeError {
    #[error("corrupt frame")]
    CorruptFrame,

    #[error("unknown frame kind {0}")]
    UnknownKind(u8),

    /// The length prefix announces a body larger than the decoder accepts.
    #[error("frame body of {size} bytes exceeds the limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },
}
