use crate::{
    constants::{
        FRAME_HEADER_SIZE, FRAME_KIND_OFFSET, FRAME_LENGTH_FIELD_SIZE,
        FRAME_METADATA_LENGTH_OFFSET, FRAME_STREAM_ID_OFFSET,
    },
    frame::{Frame, FrameDecodeError, FrameEncodeError, FrameKind},
};

/// Provides encoding and decoding functionality for frames.
///
/// The wire layout of a frame is:
///
/// ```text
/// | body length: u32 LE | stream id: u32 LE | kind: u8 | metadata length: u16 LE | metadata | data |
/// ```
///
/// The body length counts every byte after the length field itself, so a peer
/// can skip a frame without understanding it.
pub struct FrameCodec;

impl FrameCodec {
    /// Encodes a `Frame` into a byte vector.
    ///
    /// Fails if the metadata does not fit its 16-bit length field or if the
    /// frame body would exceed `max_frame_size`.
    pub fn encode(frame: &Frame, max_frame_size: usize) -> Result<Vec<u8>, FrameEncodeError> {
        let metadata_len = u16::try_from(frame.metadata.len())
            .map_err(|_| FrameEncodeError::MetadataTooLarge(frame.metadata.len()))?;

        let body_len = frame.body_len();
        if body_len > max_frame_size {
            return Err(FrameEncodeError::FrameTooLarge {
                size: body_len,
                limit: max_frame_size,
            });
        }

        let mut buf = Vec::with_capacity(FRAME_LENGTH_FIELD_SIZE + body_len);
        buf.extend(&(body_len as u32).to_le_bytes());
        buf.extend(&frame.stream_id.to_le_bytes());
        buf.push(frame.kind.into());
        buf.extend(&metadata_len.to_le_bytes());
        buf.extend(&frame.metadata);
        buf.extend(&frame.data);

        Ok(buf)
    }

    /// Encodes a frame that carries no metadata and no data.
    ///
    /// Control frames are always far below any frame size limit, so this
    /// cannot fail.
    pub fn encode_control(stream_id: u32, kind: FrameKind) -> Vec<u8> {
        let body_len = (FRAME_HEADER_SIZE - FRAME_LENGTH_FIELD_SIZE) as u32;

        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE);
        buf.extend(&body_len.to_le_bytes());
        buf.extend(&stream_id.to_le_bytes());
        buf.push(kind.into());
        buf.extend(&0u16.to_le_bytes());
        buf
    }

    /// Attempts to decode one frame from the front of `buf`.
    ///
    /// Returns:
    /// - `Ok(Some((frame, consumed)))` when a complete frame is available,
    ///   where `consumed` is the number of bytes it occupied.
    /// - `Ok(None)` when more bytes are needed.
    /// - `Err(_)` when the bytes cannot form a valid frame.
    pub fn decode(
        buf: &[u8],
        max_frame_size: usize,
    ) -> Result<Option<(Frame, usize)>, FrameDecodeError> {
        let Some(len_bytes) = buf.get(..FRAME_LENGTH_FIELD_SIZE) else {
            return Ok(None);
        };
        let body_len = u32::from_le_bytes(read_array(len_bytes)?) as usize;

        if body_len > max_frame_size {
            return Err(FrameDecodeError::FrameTooLarge {
                size: body_len,
                limit: max_frame_size,
            });
        }
        if body_len < FRAME_HEADER_SIZE - FRAME_LENGTH_FIELD_SIZE {
            return Err(FrameDecodeError::CorruptFrame);
        }

        let frame_len = FRAME_LENGTH_FIELD_SIZE + body_len;
        let Some(frame_bytes) = buf.get(..frame_len) else {
            return Ok(None);
        };

        let stream_id = u32::from_le_bytes(read_array(
            &frame_bytes[FRAME_STREAM_ID_OFFSET..FRAME_KIND_OFFSET],
        )?);

        let kind_byte = frame_bytes[FRAME_KIND_OFFSET];
        let kind =
            FrameKind::try_from(kind_byte).map_err(|_| FrameDecodeError::UnknownKind(kind_byte))?;

        let metadata_len = u16::from_le_bytes(read_array(
            &frame_bytes[FRAME_METADATA_LENGTH_OFFSET..FRAME_HEADER_SIZE],
        )?) as usize;

        let metadata_end = FRAME_HEADER_SIZE + metadata_len;
        if metadata_end > frame_len {
            return Err(FrameDecodeError::CorruptFrame);
        }

        let frame = Frame {
            stream_id,
            kind,
            metadata: frame_bytes[FRAME_HEADER_SIZE..metadata_end].to_vec(),
            data: frame_bytes[metadata_end..].to_vec(),
        };

        Ok(Some((frame, frame_len)))
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], FrameDecodeError> {
    bytes.try_into().map_err(|_| FrameDecodeError::CorruptFrame)
}
