use crate::codec::CodecError;
use crate::constants::QUALIFIER_HEADER;
use std::collections::BTreeMap;

/// Encodes a message's qualifier and headers into frame metadata.
///
/// Metadata is always JSON, regardless of the payload content type, so a peer
/// can route a frame before it knows how to read the payload. The qualifier
/// travels under the [`QUALIFIER_HEADER`] key.
pub struct HeadersCodec;

impl HeadersCodec {
    pub fn encode(
        qualifier: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>, CodecError> {
        let mut metadata: BTreeMap<&str, &str> = headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        metadata.insert(QUALIFIER_HEADER, qualifier);

        serde_json::to_vec(&metadata).map_err(|e| CodecError::Headers(e.to_string()))
    }

    /// Splits metadata back into `(qualifier, headers)`.
    ///
    /// Empty metadata is valid and yields an empty qualifier; control frames
    /// such as `Complete` carry no headers at all.
    pub fn decode(bytes: &[u8]) -> Result<(String, BTreeMap<String, String>), CodecError> {
        if bytes.is_empty() {
            return Ok((String::new(), BTreeMap::new()));
        }

        let mut headers: BTreeMap<String, String> =
            serde_json::from_slice(bytes).map_err(|e| CodecError::Headers(e.to_string()))?;
        let qualifier = headers.remove(QUALIFIER_HEADER).unwrap_or_default();

        Ok((qualifier, headers))
    }
}
