//! Predicates over a single attribute of the request details, addressed by path.

use super::text_matcher::{StringMatcher, TextMatcher};
use crate::error::RuleError;
use crate::request::RequestDetails;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Detail path configuration: `{ "path": "resourceType", "equals": "script" }`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetailPathDefinition {
    pub path: String,
    #[serde(flatten)]
    pub matcher: StringMatcher,
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
}

fn default_case_sensitive() -> bool {
    true
}

impl DetailPathDefinition {
    pub fn equals(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            matcher: StringMatcher::Equals(value.into()),
            case_sensitive: true,
        }
    }
}

/// Attribute of [`RequestDetails`] a detail path resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailField {
    Url,
    Method,
    Stage,
    ResourceType,
    TabId,
    FrameId,
    ParentFrameId,
    RequestHeader(String),
    ResponseHeader(String),
}

impl DetailField {
    /// Resolve a path. Unknown paths are a registration error.
    pub fn parse(path: &str) -> Result<Self, RuleError> {
        let field = match path {
            "url" => DetailField::Url,
            "method" => DetailField::Method,
            "stage" => DetailField::Stage,
            "resourceType" | "resourceTypeString" | "type" => DetailField::ResourceType,
            "tabId" => DetailField::TabId,
            "frameId" => DetailField::FrameId,
            "parentFrameId" => DetailField::ParentFrameId,
            _ => {
                if let Some(name) = path.strip_prefix("requestHeaders.") {
                    if !name.is_empty() {
                        return Ok(DetailField::RequestHeader(name.to_string()));
                    }
                } else if let Some(name) = path.strip_prefix("responseHeaders.") {
                    if !name.is_empty() {
                        return Ok(DetailField::ResponseHeader(name.to_string()));
                    }
                }
                return Err(RuleError::UnknownDetailPath(path.to_string()));
            }
        };
        Ok(field)
    }

    fn extract<'a>(&self, details: &'a RequestDetails) -> Option<Cow<'a, str>> {
        match self {
            DetailField::Url => Some(Cow::Borrowed(details.url().as_str())),
            DetailField::Method => Some(Cow::Borrowed(details.method())),
            DetailField::Stage => Some(Cow::Borrowed(details.stage().as_str())),
            DetailField::ResourceType => Some(Cow::Borrowed(details.resource_type().as_str())),
            DetailField::TabId => details.tab_id().map(|t| Cow::Owned(t.to_string())),
            DetailField::FrameId => Some(Cow::Owned(details.frame_id().to_string())),
            DetailField::ParentFrameId => Some(Cow::Owned(details.parent_frame_id().to_string())),
            DetailField::RequestHeader(name) => details
                .request_headers()
                .and_then(|h| h.get(name))
                .map(Cow::Borrowed),
            DetailField::ResponseHeader(name) => details
                .response_headers()
                .and_then(|h| h.get(name))
                .map(Cow::Borrowed),
        }
    }
}

/// Compiled detail path predicate.
#[derive(Debug, Clone)]
pub struct DetailPath {
    field: DetailField,
    matcher: TextMatcher,
}

impl DetailPath {
    pub fn compile(definition: &DetailPathDefinition) -> Result<Self, RuleError> {
        Ok(Self {
            field: DetailField::parse(&definition.path)?,
            matcher: TextMatcher::compile(&definition.matcher, definition.case_sensitive)?,
        })
    }

    pub fn field(&self) -> &DetailField {
        &self.field
    }

    pub fn matches(&self, details: &RequestDetails) -> bool {
        let value = self.field.extract(details);
        self.matcher.matches(value.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ResourceType, Stage};
    use serde_json::json;

    fn details() -> RequestDetails {
        RequestDetails::parse("https://ads.example/x")
            .unwrap()
            .with_stage(Stage::OnBeforeSendHeaders)
            .with_resource_type(ResourceType::Script)
            .with_request_headers([("Referer", "https://news.example/")].into_iter().collect())
    }

    fn compile(value: serde_json::Value) -> DetailPath {
        let definition: DetailPathDefinition = serde_json::from_value(value).unwrap();
        DetailPath::compile(&definition).unwrap()
    }

    #[test]
    fn test_stage_and_resource_type() {
        assert!(compile(json!({"path": "stage", "equals": "onBeforeSendHeaders"})).matches(&details()));
        assert!(compile(json!({"path": "resourceTypeString", "equals": "script"})).matches(&details()));
        assert!(!compile(json!({"path": "resourceType", "equals": "image"})).matches(&details()));
    }

    #[test]
    fn test_header_paths_are_case_insensitive_on_name() {
        let p = compile(json!({"path": "requestHeaders.referer", "contains": "news"}));
        assert!(p.matches(&details()));

        let p = compile(json!({"path": "responseHeaders.Content-Type", "exists": false}));
        assert!(p.matches(&details()));
    }

    #[test]
    fn test_tab_id_absent() {
        let p = compile(json!({"path": "tabId", "exists": true}));
        assert!(!p.matches(&details()));
        assert!(p.matches(&details().with_tab(3)));
    }

    #[test]
    fn test_case_insensitive_option() {
        let p = compile(json!({"path": "method", "equals": "get", "caseSensitive": false}));
        assert!(p.matches(&details()));
    }

    #[test]
    fn test_unknown_path_rejected() {
        let definition = DetailPathDefinition::equals("cookies", "x");
        assert_eq!(
            DetailPath::compile(&definition).unwrap_err(),
            RuleError::UnknownDetailPath("cookies".to_string())
        );
        assert!(DetailField::parse("requestHeaders.").is_err());
    }
}
