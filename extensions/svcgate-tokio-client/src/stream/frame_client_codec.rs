use crate::session::Reply;
use svcgate::constants::{CONTENT_TYPE_HEADER, DEFAULT_ERROR_CODE};
use svcgate::frame::{Frame, FrameCodec, FrameKind};
use svcgate::{DataCodec, HeadersCodec, Message};
use svcgate_service::TransportError;

/// Maps [`Message`]s onto frames of the stream transport.
///
/// The qualifier and headers travel as frame metadata, the payload as frame
/// data. Replies that arrive without a content type are stamped with the
/// client's, so error payloads can still be decoded.
#[derive(Debug, Clone, Copy)]
pub struct FrameClientCodec {
    data_codec: DataCodec,
    max_frame_size: usize,
}

impl FrameClientCodec {
    pub fn new(data_codec: DataCodec, max_frame_size: usize) -> Self {
        Self {
            data_codec,
            max_frame_size,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    pub fn encode_request(
        &self,
        stream_id: u32,
        kind: FrameKind,
        message: &Message,
    ) -> Result<Vec<u8>, TransportError> {
        let metadata = HeadersCodec::encode(message.qualifier(), message.headers())?;
        let frame = Frame::new(stream_id, kind, metadata, message.data().to_vec());

        Ok(FrameCodec::encode(&frame, self.max_frame_size)?)
    }

    pub fn encode_cancel(stream_id: u32) -> Vec<u8> {
        FrameCodec::encode_control(stream_id, FrameKind::Cancel)
    }

    pub(crate) fn decode_reply(&self, frame: Frame) -> Result<(u32, Reply), TransportError> {
        let stream_id = frame.stream_id;

        let reply = match frame.kind {
            FrameKind::Next => Reply::Next(self.message_from(frame, false)?),
            FrameKind::Error => Reply::Error(self.message_from(frame, true)?),
            FrameKind::Complete => Reply::Complete,
            other => {
                return Err(TransportError::Protocol(format!(
                    "peer sent a {other:?} frame on stream {stream_id}"
                )));
            }
        };

        Ok((stream_id, reply))
    }

    fn message_from(&self, frame: Frame, is_error: bool) -> Result<Message, TransportError> {
        let (mut qualifier, mut headers) = HeadersCodec::decode(&frame.metadata)?;

        if is_error && !qualifier.starts_with(svcgate::constants::ERROR_QUALIFIER_PREFIX) {
            qualifier = Message::error_qualifier(DEFAULT_ERROR_CODE);
        }
        headers
            .entry(CONTENT_TYPE_HEADER.to_owned())
            .or_insert_with(|| self.data_codec.content_type().to_owned());

        Ok(Message::builder()
            .qualifier(qualifier)
            .headers(headers)
            .data(frame.data)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svcgate::constants::DEFAULT_MAX_FRAME_SIZE;

    #[test]
    fn error_frame_without_qualifier_is_still_an_error() {
        let codec = FrameClientCodec::new(DataCodec::Json, DEFAULT_MAX_FRAME_SIZE);
        let frame = Frame::new(4, FrameKind::Error, Vec::new(), b"{}".to_vec());

        let (stream_id, reply) = codec.decode_reply(frame).unwrap();

        assert_eq!(stream_id, 4);
        match reply {
            Reply::Error(message) => {
                assert_eq!(message.error_code(), Some(DEFAULT_ERROR_CODE));
                assert_eq!(message.content_type(), Some("application/json"));
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn request_frames_from_peer_are_rejected() {
        let codec = FrameClientCodec::new(DataCodec::Json, DEFAULT_MAX_FRAME_SIZE);
        let frame = Frame::control(1, FrameKind::RequestStream);

        assert!(matches!(
            codec.decode_reply(frame),
            Err(TransportError::Protocol(_))
        ));
    }
}
