use crate::constants::{CONTENT_TYPE_HEADER, ERROR_QUALIFIER_PREFIX};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The envelope exchanged between a client and a remote peer.
///
/// A `Message` is independent of any particular transport. The `qualifier`
/// names the remote method, `headers` carry content-type and routing metadata,
/// and `data` holds the payload already encoded by a [`crate::DataCodec`].
///
/// Messages are immutable once built; use [`Message::builder`] to create one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    qualifier: String,
    headers: BTreeMap<String, String>,
    data: Bytes,
}

impl Message {
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Builds the qualifier an error reply carries for the given error code.
    pub fn error_qualifier(error_code: i32) -> String {
        format!("{ERROR_QUALIFIER_PREFIX}{error_code}")
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE_HEADER)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    /// Returns `true` if the qualifier marks this message as an error reply.
    pub fn is_error(&self) -> bool {
        self.qualifier.starts_with(ERROR_QUALIFIER_PREFIX)
    }

    /// The error code embedded in an error qualifier, if any.
    ///
    /// Returns `None` for non-error messages and for error qualifiers whose
    /// suffix is not a number.
    pub fn error_code(&self) -> Option<i32> {
        self.qualifier
            .strip_prefix(ERROR_QUALIFIER_PREFIX)
            .and_then(|code| code.parse().ok())
    }
}

/// Incremental builder for [`Message`].
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    qualifier: String,
    headers: BTreeMap<String, String>,
    data: Bytes,
}

impl MessageBuilder {
    pub fn qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = qualifier.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    pub fn build(self) -> Message {
        Message {
            qualifier: self.qualifier,
            headers: self.headers,
            data: self.data,
        }
    }
}

/// Payload of an error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub error_code: i32,
    pub error_message: String,
}
