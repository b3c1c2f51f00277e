use crate::codec::CodecError;
use crate::constants::CONTENT_TYPE_HEADER;
use crate::message::Message;
use bytes::Bytes;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};

/// Registered content types, keyed by their media type without parameters.
static CODEC_REGISTRY: Lazy<HashMap<&'static str, DataCodec>> = Lazy::new(|| {
    [DataCodec::Json, DataCodec::Bitcode]
        .into_iter()
        .map(|codec| (codec.content_type(), codec))
        .collect()
});

/// Converts typed values to and from message payload bytes for one content type.
///
/// The codec is chosen once, from the client's configured content type, and is
/// shared by every call made through that client. Both directions go through
/// `serde`, so any `Serialize`/`DeserializeOwned` type can travel as arguments
/// or results.
///
/// ```rust
/// use svcgate::DataCodec;
///
/// let codec = DataCodec::for_content_type("application/json; charset=utf-8").unwrap();
/// let bytes = codec.encode(&vec![1, 2, 3]).unwrap();
/// let back: Vec<i32> = codec.decode(&bytes).unwrap();
/// assert_eq!(back, vec![1, 2, 3]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataCodec {
    /// `application/json`, backed by `serde_json`.
    Json,
    /// `application/x-bitcode`, a compact binary encoding backed by `bitcode`.
    Bitcode,
}

impl DataCodec {
    /// Looks up the codec registered for `content_type`.
    ///
    /// Media type parameters (anything after `;`) are ignored and the lookup is
    /// case-insensitive.
    pub fn for_content_type(content_type: &str) -> Result<Self, CodecError> {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        CODEC_REGISTRY
            .get(media_type.as_str())
            .copied()
            .ok_or_else(|| CodecError::UnknownContentType(content_type.to_owned()))
    }

    /// All content types a client can be configured with.
    pub fn registered_content_types() -> Vec<&'static str> {
        let mut types: Vec<_> = CODEC_REGISTRY.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DataCodec::Json => "application/json",
            DataCodec::Bitcode => "application/x-bitcode",
        }
    }

    pub fn encode<T>(&self, value: &T) -> Result<Bytes, CodecError>
    where
        T: Serialize + ?Sized,
    {
        let encoded = match self {
            DataCodec::Json => serde_json::to_vec(value).map_err(|e| e.to_string()),
            DataCodec::Bitcode => bitcode::serialize(value).map_err(|e| e.to_string()),
        };

        encoded.map(Bytes::from).map_err(|reason| CodecError::Encode {
            content_type: self.content_type(),
            reason,
        })
    }

    /// Decodes `bytes` into `T`.
    ///
    /// An empty JSON payload is read as `null`, so unit and `Option` results
    /// decode from replies that carry no data.
    pub fn decode<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        let decoded = match self {
            DataCodec::Json if bytes.is_empty() => {
                serde_json::from_slice(b"null").map_err(|e| e.to_string())
            }
            DataCodec::Json => serde_json::from_slice(bytes).map_err(|e| e.to_string()),
            DataCodec::Bitcode => bitcode::deserialize(bytes).map_err(|e| e.to_string()),
        };

        decoded.map_err(|reason| CodecError::Decode {
            content_type: self.content_type(),
            reason,
        })
    }

    /// Builds a request message for `qualifier`.
    ///
    /// `args` of `None` produces a message with an empty payload. The codec's
    /// content type is always stamped into the headers.
    pub fn encode_message<A>(
        &self,
        qualifier: &str,
        headers: &BTreeMap<String, String>,
        args: Option<&A>,
    ) -> Result<Message, CodecError>
    where
        A: Serialize + ?Sized,
    {
        let data = match args {
            Some(args) => self.encode(args)?,
            None => Bytes::new(),
        };

        Ok(Message::builder()
            .qualifier(qualifier)
            .headers(headers.iter().map(|(k, v)| (k.clone(), v.clone())))
            .header(CONTENT_TYPE_HEADER, self.content_type())
            .data(data)
            .build())
    }

    /// Decodes the payload of `message` into `T`.
    pub fn decode_message<T>(&self, message: &Message) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        self.decode(message.data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_content_type_is_rejected() {
        let err = DataCodec::for_content_type("text/x-unknown").unwrap_err();
        assert!(matches!(err, CodecError::UnknownContentType(ct) if ct == "text/x-unknown"));
    }

    #[test]
    fn lookup_ignores_case_and_parameters() {
        assert_eq!(
            DataCodec::for_content_type("Application/JSON; charset=utf-8").unwrap(),
            DataCodec::Json
        );
        assert_eq!(
            DataCodec::for_content_type("application/x-bitcode").unwrap(),
            DataCodec::Bitcode
        );
    }

    #[test]
    fn empty_json_payload_decodes_as_null() {
        assert!(DataCodec::Json.decode::<()>(&[]).is_ok());

        let missing: Option<String> = DataCodec::Json.decode(&[]).unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn registry_lists_every_codec() {
        assert_eq!(
            DataCodec::registered_content_types(),
            vec!["application/json", "application/x-bitcode"]
        );
    }
}
