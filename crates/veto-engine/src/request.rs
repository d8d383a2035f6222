//! Request-side data model: identifiers, stages, resource types and the
//! immutable per-request details every rule is evaluated against.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identity of the extension (or any other registrant) that owns rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrantId(String);

impl RegistrantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegistrantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RegistrantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a registrant-side callback (listener subscription or rule id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(String);

impl CallbackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallbackId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CallbackId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle phase of a request at which rules are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    #[default]
    OnBeforeRequest,
    OnBeforeSendHeaders,
    OnHeadersReceived,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::OnBeforeRequest => "onBeforeRequest",
            Stage::OnBeforeSendHeaders => "onBeforeSendHeaders",
            Stage::OnHeadersReceived => "onHeadersReceived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "onBeforeRequest" => Some(Stage::OnBeforeRequest),
            "onBeforeSendHeaders" => Some(Stage::OnBeforeSendHeaders),
            "onHeadersReceived" => Some(Stage::OnHeadersReceived),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource type of a request, named as in `chrome.webRequest.ResourceType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Object,
    #[serde(rename = "xmlhttprequest")]
    XmlHttpRequest,
    Ping,
    Media,
    #[serde(rename = "websocket")]
    WebSocket,
    #[default]
    #[serde(other)]
    Other,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::MainFrame => "main_frame",
            ResourceType::SubFrame => "sub_frame",
            ResourceType::Stylesheet => "stylesheet",
            ResourceType::Script => "script",
            ResourceType::Image => "image",
            ResourceType::Font => "font",
            ResourceType::Object => "object",
            ResourceType::XmlHttpRequest => "xmlhttprequest",
            ResourceType::Ping => "ping",
            ResourceType::Media => "media",
            ResourceType::WebSocket => "websocket",
            ResourceType::Other => "other",
        }
    }

    /// Parse a Chrome resource type name. Unknown names map to `Other`.
    pub fn parse(value: &str) -> Self {
        match value {
            "main_frame" => ResourceType::MainFrame,
            "sub_frame" => ResourceType::SubFrame,
            "stylesheet" => ResourceType::Stylesheet,
            "script" => ResourceType::Script,
            "image" => ResourceType::Image,
            "font" => ResourceType::Font,
            "object" => ResourceType::Object,
            "xmlhttprequest" => ResourceType::XmlHttpRequest,
            "ping" => ResourceType::Ping,
            "media" => ResourceType::Media,
            "websocket" => ResourceType::WebSocket,
            _ => ResourceType::Other,
        }
    }

    /// Guess the resource type of a request the host could not classify.
    ///
    /// The URL path suffix wins over the `Accept` header, because navigations
    /// send an HTML-ish `Accept` whatever they actually load. Returns `None`
    /// when neither gives a hint.
    pub fn detect(url: &Url, accept: Option<&str>) -> Option<Self> {
        Self::from_path_suffix(url.path()).or_else(|| accept.and_then(Self::from_accept))
    }

    fn from_path_suffix(path: &str) -> Option<Self> {
        let path = path.to_ascii_lowercase();
        TYPE_HINTS
            .iter()
            .find(|hint| hint.suffixes.iter().any(|suffix| path.ends_with(suffix)))
            .map(|hint| hint.resource_type)
    }

    fn from_accept(accept: &str) -> Option<Self> {
        let accept = accept.to_ascii_lowercase();
        TYPE_HINTS
            .iter()
            .find(|hint| hint.mime_fragments.iter().any(|mime| accept.contains(mime)))
            .map(|hint| hint.resource_type)
    }
}

struct TypeHint {
    resource_type: ResourceType,
    /// Substrings looked for in the `Accept` header
    mime_fragments: &'static [&'static str],
    /// URL path suffixes, leading dot included
    suffixes: &'static [&'static str],
}

/// Checked in order; the first hit wins.
const TYPE_HINTS: &[TypeHint] = &[
    TypeHint {
        resource_type: ResourceType::SubFrame,
        mime_fragments: &["text/html", "application/xhtml"],
        suffixes: &[".htm", ".html", ".jsp", ".php"],
    },
    TypeHint {
        resource_type: ResourceType::Stylesheet,
        mime_fragments: &["text/css"],
        suffixes: &[".css"],
    },
    TypeHint {
        resource_type: ResourceType::Script,
        mime_fragments: &["text/javascript", "application/javascript", "application/json"],
        suffixes: &[".js"],
    },
    TypeHint {
        resource_type: ResourceType::XmlHttpRequest,
        mime_fragments: &["application/x-www-form-urlencoded", "application/xml"],
        suffixes: &[".xml"],
    },
    TypeHint {
        resource_type: ResourceType::Image,
        mime_fragments: &["image/"],
        suffixes: &[
            ".jpg", ".jpe", ".jpeg", ".png", ".gif", ".tif", ".tiff", ".bmp", ".xbm",
        ],
    },
    TypeHint {
        resource_type: ResourceType::Font,
        mime_fragments: &["font/"],
        suffixes: &[".woff", ".woff2", ".ttf", ".otf"],
    },
    TypeHint {
        resource_type: ResourceType::Object,
        mime_fragments: &[
            "application/x-shockwave-flash",
            "application/zip",
            "application/octet-stream",
        ],
        suffixes: &[
            ".swf", ".zip", ".gz", ".tgz", ".bz2", ".rar", ".exe", ".pkg", ".apk", ".ipa",
            ".ps", ".eps",
        ],
    },
    TypeHint {
        resource_type: ResourceType::Media,
        mime_fragments: &["audio/", "video/"],
        suffixes: &[
            ".wav", ".mp3", ".mid", ".midi", ".aiff", ".aac", ".mpe", ".mpg", ".mpeg", ".avi",
            ".mp4", ".m4v", ".mov",
        ],
    },
];

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single HTTP header in Chrome's `HttpHeaders` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Ordered header list with case-insensitive lookup.
///
/// Serializes as `[{"name": ..., "value": ...}]`, the format listeners
/// receive and return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Set a header, replacing any existing header with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .0
            .iter_mut()
            .find(|h| h.name.eq_ignore_ascii_case(&name))
        {
            Some(existing) => existing.value = value,
            None => self.0.push(Header { name, value }),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self
            .0
            .iter()
            .position(|h| h.name.eq_ignore_ascii_case(name))?;
        Some(self.0.remove(idx).value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|h| (h.name.as_str(), h.value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// Immutable description of one intercepted request.
///
/// Built once per request with the `with_*` methods, then shared read-only
/// (usually as `Arc<RequestDetails>`) with every rule of the evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDetails {
    request_id: u64,
    url: Url,
    method: String,
    stage: Stage,
    resource_type: ResourceType,
    resource_type_tentative: bool,
    tab_id: Option<u64>,
    frame_id: u64,
    parent_frame_id: i64,
    request_headers: Option<Headers>,
    response_headers: Option<Headers>,
}

impl RequestDetails {
    /// Create details for a request with a fresh process-unique request id.
    pub fn new(url: Url) -> Self {
        let request_id = REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
        Self {
            request_id,
            url,
            method: "GET".to_string(),
            stage: Stage::default(),
            resource_type: ResourceType::default(),
            resource_type_tentative: false,
            tab_id: None,
            frame_id: 0,
            parent_frame_id: -1,
            request_headers: None,
            response_headers: None,
        }
    }

    /// Parse `url` and create details for it.
    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(url)?))
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_uppercase();
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = resource_type;
        self
    }

    /// Mark the resource type as a guess (e.g. inferred from the Accept header).
    pub fn with_tentative_resource_type(mut self, tentative: bool) -> Self {
        self.resource_type_tentative = tentative;
        self
    }

    /// Infer the resource type from the URL and the `Accept` request header
    /// and mark it tentative. Falls back to `Other` when nothing matches.
    ///
    /// Call after `with_request_headers` so the header can be consulted.
    pub fn with_detected_resource_type(mut self) -> Self {
        let accept = self
            .request_headers
            .as_ref()
            .and_then(|headers| headers.get("accept"));
        self.resource_type = ResourceType::detect(&self.url, accept).unwrap_or_default();
        self.resource_type_tentative = true;
        self
    }

    pub fn with_tab(mut self, tab_id: u64) -> Self {
        self.tab_id = Some(tab_id);
        self
    }

    pub fn with_frame(mut self, frame_id: u64, parent_frame_id: i64) -> Self {
        self.frame_id = frame_id;
        self.parent_frame_id = parent_frame_id;
        self
    }

    pub fn with_request_headers(mut self, headers: Headers) -> Self {
        self.request_headers = Some(headers);
        self
    }

    pub fn with_response_headers(mut self, headers: Headers) -> Self {
        self.response_headers = Some(headers);
        self
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn is_resource_type_tentative(&self) -> bool {
        self.resource_type_tentative
    }

    pub fn tab_id(&self) -> Option<u64> {
        self.tab_id
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn parent_frame_id(&self) -> i64 {
        self.parent_frame_id
    }

    pub fn request_headers(&self) -> Option<&Headers> {
        self.request_headers.as_ref()
    }

    pub fn response_headers(&self) -> Option<&Headers> {
        self.response_headers.as_ref()
    }

    /// Render the details object handed to `webRequest` listeners.
    ///
    /// Header lists are only included when the subscription asked for them;
    /// an empty list is sent rather than omitting the member.
    pub fn listener_payload(
        &self,
        include_request_headers: bool,
        include_response_headers: bool,
    ) -> Value {
        let mut payload = json!({
            "requestId": self.request_id.to_string(),
            "url": self.url.as_str(),
            "method": self.method,
            "frameId": self.frame_id,
            "parentFrameId": self.parent_frame_id,
            "tabId": self.tab_id.map(|t| t as i64).unwrap_or(-1),
            "type": self.resource_type.as_str(),
            "stage": self.stage.as_str(),
            "timeStamp": chrono::Utc::now().timestamp_millis(),
        });

        if self.resource_type_tentative {
            payload["typeTentative"] = Value::Bool(true);
        }
        if include_request_headers {
            payload["requestHeaders"] =
                serde_json::to_value(self.request_headers.clone().unwrap_or_default())
                    .unwrap_or(Value::Array(Vec::new()));
        }
        if include_response_headers {
            payload["responseHeaders"] =
                serde_json::to_value(self.response_headers.clone().unwrap_or_default())
                    .unwrap_or(Value::Array(Vec::new()));
        }
        payload
    }
}
