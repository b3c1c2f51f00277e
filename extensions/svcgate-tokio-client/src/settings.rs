use std::collections::BTreeMap;
use std::sync::Arc;
use svcgate::constants::{
    CONTENT_TYPE_HEADER, DEFAULT_CONTENT_TYPE, DEFAULT_HOST, DEFAULT_HTTP_BASE_PATH,
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_PORT, DEFAULT_WEBSOCKET_PATH, FRAME_HEADER_SIZE,
};
use svcgate_service::{ClientError, DefaultErrorMapper, ErrorMapper};
use tokio::runtime::Handle;

/// Immutable configuration consumed by one [`crate::Client`].
///
/// Built through [`ClientSettings::builder`]; every field has a default.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    content_type: String,
    host: String,
    port: u16,
    secure: bool,
    websocket_path: String,
    http_base_path: String,
    headers: BTreeMap<String, String>,
    error_mapper: Arc<dyn ErrorMapper>,
    runtime: Option<Handle>,
    max_frame_size: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        ClientSettingsBuilder::default().into_settings()
    }
}

impl ClientSettings {
    pub fn builder() -> ClientSettingsBuilder {
        ClientSettingsBuilder::default()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn websocket_path(&self) -> &str {
        &self.websocket_path
    }

    pub fn http_base_path(&self) -> &str {
        &self.http_base_path
    }

    /// Static headers attached to every request.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn error_mapper(&self) -> &Arc<dyn ErrorMapper> {
        &self.error_mapper
    }

    /// Runtime used for connection tasks and fire-and-forget sends. When
    /// unset, the runtime of the calling task is used.
    pub fn runtime(&self) -> Option<&Handle> {
        self.runtime.as_ref()
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// `host:port`, as used for socket connections and in log output.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettingsBuilder {
    content_type: String,
    host: String,
    port: u16,
    secure: bool,
    websocket_path: String,
    http_base_path: String,
    headers: BTreeMap<String, String>,
    error_mapper: Arc<dyn ErrorMapper>,
    runtime: Option<Handle>,
    max_frame_size: usize,
}

impl Default for ClientSettingsBuilder {
    fn default() -> Self {
        Self {
            content_type: DEFAULT_CONTENT_TYPE.to_owned(),
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            secure: false,
            websocket_path: DEFAULT_WEBSOCKET_PATH.to_owned(),
            http_base_path: DEFAULT_HTTP_BASE_PATH.to_owned(),
            headers: BTreeMap::new(),
            error_mapper: Arc::new(DefaultErrorMapper),
            runtime: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientSettingsBuilder {
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn websocket_path(mut self, path: impl Into<String>) -> Self {
        self.websocket_path = path.into();
        self
    }

    pub fn http_base_path(mut self, path: impl Into<String>) -> Self {
        self.http_base_path = path.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn error_mapper(mut self, error_mapper: Arc<dyn ErrorMapper>) -> Self {
        self.error_mapper = error_mapper;
        self
    }

    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Validates the configuration.
    ///
    /// The content type is not checked here; each client constructor checks
    /// it against the codecs its transport can carry.
    pub fn build(self) -> Result<ClientSettings, ClientError> {
        let invalid = |reason: String| Err(ClientError::InvalidSettings(reason));

        if self.host.is_empty() || self.host.contains(|c: char| c.is_whitespace() || c == '/') {
            return invalid(format!("host `{}` is not a valid host name", self.host));
        }
        if self.port == 0 {
            return invalid("port must not be 0".into());
        }
        if !self.websocket_path.starts_with('/') {
            return invalid(format!(
                "websocket path `{}` must start with `/`",
                self.websocket_path
            ));
        }
        if !self.http_base_path.is_empty()
            && (!self.http_base_path.starts_with('/') || self.http_base_path.ends_with('/'))
        {
            return invalid(format!(
                "HTTP base path `{}` must start with `/` and must not end with `/`",
                self.http_base_path
            ));
        }
        if self.max_frame_size <= FRAME_HEADER_SIZE || self.max_frame_size > u32::MAX as usize {
            return invalid(format!(
                "max frame size {} is outside {}..={}",
                self.max_frame_size,
                FRAME_HEADER_SIZE + 1,
                u32::MAX
            ));
        }
        if let Some(name) = self
            .headers
            .keys()
            .find(|name| name.is_empty() || name.eq_ignore_ascii_case(CONTENT_TYPE_HEADER))
        {
            return invalid(format!(
                "static header `{name}` is reserved or empty; the content type is set by the codec"
            ));
        }

        Ok(self.into_settings())
    }

    fn into_settings(self) -> ClientSettings {
        ClientSettings {
            content_type: self.content_type,
            host: self.host,
            port: self.port,
            secure: self.secure,
            websocket_path: self.websocket_path,
            http_base_path: self.http_base_path,
            headers: self.headers,
            error_mapper: self.error_mapper,
            runtime: self.runtime,
            max_frame_size: self.max_frame_size,
        }
    }
}
