//! The blocking response accumulated while rules are applied to a request.

use crate::request::{Headers, Stage};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Locally served response that replaces the network load.
///
/// Serialized with a text body when it is valid UTF-8, otherwise the body
/// is base64-encoded and tagged `"mode": "binary"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "SyntheticResponseRepr", try_from = "SyntheticResponseRepr")]
pub struct SyntheticResponse {
    pub mime_type: String,
    pub body: Bytes,
}

impl SyntheticResponse {
    /// The one-space `text/plain` document served by `RedirectToEmptyDocument`.
    pub fn empty_document() -> Self {
        Self {
            mime_type: "text/plain".to_string(),
            body: Bytes::from_static(b" "),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum BodyMode {
    #[default]
    Text,
    Binary,
}

impl BodyMode {
    fn is_text(&self) -> bool {
        *self == BodyMode::Text
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyntheticResponseRepr {
    mime_type: String,
    body: String,
    #[serde(default, skip_serializing_if = "BodyMode::is_text")]
    mode: BodyMode,
}

impl From<SyntheticResponse> for SyntheticResponseRepr {
    fn from(response: SyntheticResponse) -> Self {
        let (body, mode) = match std::str::from_utf8(&response.body) {
            Ok(text) => (text.to_string(), BodyMode::Text),
            Err(_) => (STANDARD.encode(&response.body), BodyMode::Binary),
        };
        Self {
            mime_type: response.mime_type,
            body,
            mode,
        }
    }
}

impl TryFrom<SyntheticResponseRepr> for SyntheticResponse {
    type Error = base64::DecodeError;

    fn try_from(repr: SyntheticResponseRepr) -> Result<Self, Self::Error> {
        let body = match repr.mode {
            BodyMode::Text => Bytes::from(repr.body),
            BodyMode::Binary => Bytes::from(STANDARD.decode(repr.body)?),
        };
        Ok(Self {
            mime_type: repr.mime_type,
            body,
        })
    }
}

/// Blocking response as returned by a `webRequest` listener.
///
/// Only the members valid for the listener's stage are taken into account
/// when it is merged (see [`BlockingResponse::merge_listener_result`]).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerResult {
    #[serde(default)]
    pub cancel: bool,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub request_headers: Option<Headers>,
    #[serde(default)]
    pub response_headers: Option<Headers>,
}

/// Cumulative blocking decision for one request.
///
/// Owned by a single evaluation and mutated in place by successive rule
/// actions. Once `cancel` is set the response is terminal: every other
/// mutator becomes a no-op and reports `false`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingResponse {
    #[serde(default)]
    cancel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    redirect_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_headers: Option<Headers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response_headers: Option<Headers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    synthetic: Option<SyntheticResponse>,
}

impl BlockingResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
    }

    /// True once no further mutation is allowed.
    pub fn is_terminal(&self) -> bool {
        self.cancel
    }

    /// True when no rule decided anything about this request.
    pub fn is_passthrough(&self) -> bool {
        !self.cancel
            && self.redirect_url.is_none()
            && self.request_headers.is_none()
            && self.response_headers.is_none()
            && self.synthetic.is_none()
    }

    pub fn redirect_url(&self) -> Option<&str> {
        self.redirect_url.as_deref()
    }

    pub fn request_headers(&self) -> Option<&Headers> {
        self.request_headers.as_ref()
    }

    pub fn response_headers(&self) -> Option<&Headers> {
        self.response_headers.as_ref()
    }

    pub fn synthetic(&self) -> Option<&SyntheticResponse> {
        self.synthetic.as_ref()
    }

    /// Cancel the request. Idempotent.
    pub fn cancel(&mut self) {
        self.cancel = true;
    }

    pub fn set_redirect_url(&mut self, url: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.redirect_url = Some(url.into());
        true
    }

    pub fn set_request_headers(&mut self, headers: Headers) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.request_headers = Some(headers);
        true
    }

    pub fn set_response_headers(&mut self, headers: Headers) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.response_headers = Some(headers);
        true
    }

    pub fn set_synthetic(&mut self, synthetic: SyntheticResponse) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.synthetic = Some(synthetic);
        true
    }

    /// Fold a listener's blocking response into this one.
    ///
    /// `cancel` is OR-ed and never cleared. Redirect and header sets replace
    /// whatever an earlier rule put there: the most recent registration wins.
    pub fn merge_listener_result(&mut self, stage: Stage, result: ListenerResult) {
        if self.is_terminal() {
            return;
        }
        if result.cancel {
            self.cancel();
            return;
        }
        match stage {
            Stage::OnBeforeRequest => {
                if let Some(url) = result.redirect_url {
                    self.set_redirect_url(url);
                }
            }
            Stage::OnBeforeSendHeaders => {
                if let Some(headers) = result.request_headers {
                    self.set_request_headers(headers);
                }
            }
            Stage::OnHeadersReceived => {
                if let Some(url) = result.redirect_url {
                    self.set_redirect_url(url);
                }
                if let Some(headers) = result.response_headers {
                    self.set_response_headers(headers);
                }
            }
        }
    }
}
