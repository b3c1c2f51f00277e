use crate::session::Reply;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use svcgate::constants::{
    CONTENT_TYPE_HEADER, DEFAULT_CONTENT_TYPE, DEFAULT_ERROR_CODE, ERROR_QUALIFIER_PREFIX,
};
use svcgate::{CodecError, Message};
use svcgate_service::TransportError;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

/// Control signals carried in the `sig` field of an envelope.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
pub enum Signal {
    Complete = 1,
    Error = 2,
    Cancel = 3,
}

/// One message on the websocket, sent as a JSON text frame.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    q: Option<String>,
    sid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sig: Option<u8>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    h: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    d: Option<serde_json::Value>,
}

/// Maps [`Message`]s onto JSON envelopes:
///
/// ```text
/// {"q": "echo/echo", "sid": 1, "h": {"content-type": "application/json"}, "d": "hello"}
/// ```
///
/// The payload is embedded as JSON, so this codec only carries JSON payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebsocketClientCodec;

impl WebsocketClientCodec {
    pub fn encode_request(&self, stream_id: u32, message: &Message) -> Result<WsMessage, TransportError> {
        let d = if message.has_data() {
            Some(serde_json::from_slice(message.data()).map_err(|e| CodecError::Decode {
                content_type: DEFAULT_CONTENT_TYPE,
                reason: e.to_string(),
            })?)
        } else {
            None
        };

        let envelope = Envelope {
            q: Some(message.qualifier().to_owned()),
            sid: stream_id,
            sig: None,
            h: message.headers().clone(),
            d,
        };

        let text = serde_json::to_string(&envelope).map_err(|e| CodecError::Encode {
            content_type: DEFAULT_CONTENT_TYPE,
            reason: e.to_string(),
        })?;

        Ok(WsMessage::text(text))
    }

    pub fn encode_cancel(stream_id: u32) -> WsMessage {
        WsMessage::text(format!(
            r#"{{"sid":{stream_id},"sig":{}}}"#,
            u8::from(Signal::Cancel)
        ))
    }

    /// Decodes one envelope from the peer.
    ///
    /// The outer error means the frame is not addressable at all. An
    /// addressable envelope that cannot be honoured yields the stream id with
    /// the error, so only that call fails.
    pub(crate) fn decode_reply(
        &self,
        text: &str,
    ) -> Result<(u32, Result<Reply, TransportError>), TransportError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| TransportError::Protocol(format!("malformed envelope: {e}")))?;
        let stream_id = envelope.sid;

        Ok((stream_id, Self::reply_from(envelope)))
    }

    fn reply_from(envelope: Envelope) -> Result<Reply, TransportError> {
        let signal = match envelope.sig {
            Some(sig) => Some(
                Signal::try_from(sig)
                    .map_err(|_| TransportError::Protocol(format!("unknown signal {sig}")))?,
            ),
            None => None,
        };

        match signal {
            None => Ok(Reply::Next(Self::message_from(envelope, false)?)),
            Some(Signal::Error) => Ok(Reply::Error(Self::message_from(envelope, true)?)),
            Some(Signal::Complete) => Ok(Reply::Complete),
            Some(Signal::Cancel) => Err(TransportError::Protocol(format!(
                "peer cancelled stream {}",
                envelope.sid
            ))),
        }
    }

    fn message_from(envelope: Envelope, is_error: bool) -> Result<Message, TransportError> {
        let mut qualifier = envelope.q.unwrap_or_default();
        if is_error && !qualifier.starts_with(ERROR_QUALIFIER_PREFIX) {
            qualifier = Message::error_qualifier(DEFAULT_ERROR_CODE);
        }

        let data = match envelope.d {
            Some(value) => serde_json::to_vec(&value).map_err(|e| CodecError::Encode {
                content_type: DEFAULT_CONTENT_TYPE,
                reason: e.to_string(),
            })?,
            None => Vec::new(),
        };

        Ok(Message::builder()
            .qualifier(qualifier)
            .headers(envelope.h)
            .header(CONTENT_TYPE_HEADER, DEFAULT_CONTENT_TYPE)
            .data(data)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_envelope_embeds_json_payload() {
        let message = Message::builder()
            .qualifier("echo/echo")
            .header("content-type", "application/json")
            .data(&b"\"hi\""[..])
            .build();

        let frame = WebsocketClientCodec.encode_request(7, &message).unwrap();
        let json: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();

        assert_eq!(json["q"], "echo/echo");
        assert_eq!(json["sid"], 7);
        assert_eq!(json["d"], "hi");
        assert!(json.get("sig").is_none());
    }

    #[test]
    fn cancel_envelope_carries_signal() {
        let frame = WebsocketClientCodec::encode_cancel(9);
        let json: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();

        assert_eq!(json["sid"], 9);
        assert_eq!(json["sig"], 3);
    }

    #[test]
    fn error_signal_produces_error_message() {
        let (stream_id, reply) = WebsocketClientCodec
            .decode_reply(
                r#"{"q":"error/401","sid":2,"sig":2,"d":{"errorCode":401,"errorMessage":"who?"}}"#,
            )
            .unwrap();

        assert_eq!(stream_id, 2);
        match reply {
            Ok(Reply::Error(message)) => {
                assert_eq!(message.error_code(), Some(401));
                assert_eq!(message.content_type(), Some("application/json"));
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn unknown_signal_fails_only_its_stream() {
        let (stream_id, reply) = WebsocketClientCodec
            .decode_reply(r#"{"sid":2,"sig":42}"#)
            .unwrap();

        assert_eq!(stream_id, 2);
        assert!(matches!(reply, Err(TransportError::Protocol(_))));
    }

    #[test]
    fn peer_cancel_fails_only_its_stream() {
        let (stream_id, reply) = WebsocketClientCodec
            .decode_reply(r#"{"sid":5,"sig":3}"#)
            .unwrap();

        assert_eq!(stream_id, 5);
        assert!(matches!(reply, Err(TransportError::Protocol(_))));
    }

    #[test]
    fn envelope_without_stream_id_is_rejected() {
        assert!(matches!(
            WebsocketClientCodec.decode_reply(r#"{"q":"echo/echo","d":1}"#),
            Err(TransportError::Protocol(_))
        ));
    }
}
