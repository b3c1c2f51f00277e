use crate::settings::ClientSettings;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;
use svcgate::constants::CONTENT_TYPE_HEADER;
use svcgate::{DataCodec, ErrorData, Message};
use svcgate_service::TransportError;

/// Maps [`Message`]s onto HTTP requests and responses.
///
/// A request is a `POST` to `{base_url}/{qualifier}` carrying the message
/// headers and payload as-is. A non-2xx response becomes an `error/{status}`
/// message whose payload is always a readable [`ErrorData`].
#[derive(Debug, Clone)]
pub struct HttpClientCodec {
    base_url: String,
    data_codec: DataCodec,
}

impl HttpClientCodec {
    pub fn new(settings: &ClientSettings, data_codec: DataCodec) -> Self {
        let scheme = if settings.secure() { "https" } else { "http" };

        Self {
            base_url: format!(
                "{scheme}://{}{}",
                settings.address(),
                settings.http_base_path()
            ),
            data_codec,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, qualifier: &str) -> String {
        format!("{}/{}", self.base_url, qualifier.trim_start_matches('/'))
    }

    pub fn encode_request(
        &self,
        client: &reqwest::Client,
        message: &Message,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        let mut headers = HeaderMap::new();
        for (name, value) in message.headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Protocol(format!("invalid header `{name}`: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Protocol(format!("invalid value for `{name}`: {e}")))?;
            headers.insert(name, value);
        }

        Ok(client
            .post(self.url_for(message.qualifier()))
            .headers(headers)
            .body(message.data().clone()))
    }

    /// Builds the reply message for a response to `qualifier`.
    pub fn decode_response(
        &self,
        qualifier: &str,
        status: reqwest::StatusCode,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Message {
        let mut reply_headers: BTreeMap<String, String> = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_owned(), value.to_owned()))
            })
            .collect();

        if status.is_success() {
            return Message::builder()
                .qualifier(qualifier)
                .headers(reply_headers)
                .data(body)
                .build();
        }

        let code = i32::from(status.as_u16());
        let reply_codec = reply_headers
            .get(CONTENT_TYPE_HEADER)
            .and_then(|ct| DataCodec::for_content_type(ct).ok());

        let readable = reply_codec
            .is_some_and(|codec| codec.decode::<ErrorData>(&body).is_ok());

        let data = if readable {
            body
        } else {
            let error_message = match std::str::from_utf8(&body) {
                Ok(text) if !text.trim().is_empty() => text.trim().to_owned(),
                _ => status.canonical_reason().unwrap_or("HTTP error").to_owned(),
            };
            reply_headers.insert(
                CONTENT_TYPE_HEADER.to_owned(),
                self.data_codec.content_type().to_owned(),
            );
            self.data_codec
                .encode(&ErrorData {
                    error_code: code,
                    error_message,
                })
                .unwrap_or_default()
        };

        Message::builder()
            .qualifier(Message::error_qualifier(code))
            .headers(reply_headers)
            .data(data)
            .build()
    }
}
