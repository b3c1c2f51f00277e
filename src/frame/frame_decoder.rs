use crate::frame::{Frame, FrameCodec, FrameDecodeError};
use std::collections::VecDeque;

/// An incremental decoder for a continuous byte stream of frames.
///
/// Bytes arrive in arbitrarily sized chunks (a socket read may contain half a
/// frame or several frames). `FrameDecoder` buffers what it has seen and hands
/// back every frame that became complete with each call to
/// [`FrameDecoder::read_bytes`].
///
/// A decode error is fatal for the connection: once the framing is lost the
/// remaining bytes can no longer be trusted, so the buffer is discarded and the
/// error is the last item yielded for that read.
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_size: usize,
}

pub struct FrameDecoderIterator {
    queue: VecDeque<Result<Frame, FrameDecodeError>>,
}

impl Iterator for FrameDecoderIterator {
    type Item = Result<Frame, FrameDecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.queue.pop_front()
    }
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_size,
        }
    }

    /// Number of bytes held back waiting for the rest of a frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    // Appends new bytes and drains every complete frame from the buffer
    pub fn read_bytes(&mut self, data: &[u8]) -> FrameDecoderIterator {
        self.buffer.extend_from_slice(data);
        let mut queue = VecDeque::new();

        loop {
            match FrameCodec::decode(&self.buffer, self.max_frame_size) {
                Ok(Some((frame, consumed))) => {
                    self.buffer.drain(..consumed);
                    queue.push_back(Ok(frame));
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(
                        "Discarding {} buffered bytes after frame decode error: {}",
                        self.buffer.len(),
                        e
                    );
                    self.buffer.clear();
                    queue.push_back(Err(e));
                    break;
                }
            }
        }

        FrameDecoderIterator { queue }
    }
}
