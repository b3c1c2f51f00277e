use crate::frame::FrameKind;

/// A single frame on a multiplexed stream connection.
///
/// Many logical streams share one connection; each frame names the stream it
/// belongs to through `stream_id`. Request frames carry the encoded qualifier
/// and headers in `metadata`, while `data` holds the payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Identifies the logical stream (one per call) on the connection.
    pub stream_id: u32,

    pub kind: FrameKind,

    /// Headers encoded by [`crate::HeadersCodec`]. Empty for control frames.
    pub metadata: Vec<u8>,

    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(stream_id: u32, kind: FrameKind, metadata: Vec<u8>, data: Vec<u8>) -> Self {
        Self {
            stream_id,
            kind,
            metadata,
            data,
        }
    }

    /// A frame with neither metadata nor data, such as `Cancel` or `Complete`.
    pub fn control(stream_id: u32, kind: FrameKind) -> Self {
        Self::new(stream_id, kind, Vec::new(), Vec::new())
    }

    /// Size of the frame body as announced by the length prefix.
    pub fn body_len(&self) -> usize {
        crate::constants::FRAME_HEADER_SIZE - crate::constants::FRAME_LENGTH_FIELD_SIZE
            + self.metadata.len()
            + self.data.len()
    }
}
