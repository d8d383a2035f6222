//! Text comparisons shared by detail-path and URL-filter predicates.
//!
//! The operator and its case handling are fixed when the rule is compiled:
//! a case-insensitive needle is folded to lowercase once, and the request
//! value is folded at most once per comparison.

use crate::error::PatternError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;

/// Comparison as registrants write it, e.g. `{"startsWith": "/api"}`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum StringMatcher {
    Equals(String),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    /// Regex; `caseSensitive: false` makes it case-insensitive too
    Matches(String),
    /// Whether the attribute should be present at all
    Exists(bool),
}

impl Default for StringMatcher {
    fn default() -> Self {
        StringMatcher::Exists(true)
    }
}

#[derive(Debug, Clone)]
enum TextOp {
    Equals(String),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    Regex(Arc<Regex>),
    Exists(bool),
}

/// Compiled comparison against one request attribute.
#[derive(Debug, Clone)]
pub struct TextMatcher {
    op: TextOp,
    /// Fold the request value before literal comparisons
    fold_case: bool,
}

impl TextMatcher {
    pub fn compile(matcher: &StringMatcher, case_sensitive: bool) -> Result<Self, PatternError> {
        let needle = |value: &str| {
            if case_sensitive {
                value.to_string()
            } else {
                value.to_lowercase()
            }
        };
        let op = match matcher {
            StringMatcher::Equals(v) => TextOp::Equals(needle(v)),
            StringMatcher::Contains(v) => TextOp::Contains(needle(v)),
            StringMatcher::StartsWith(v) => TextOp::StartsWith(needle(v)),
            StringMatcher::EndsWith(v) => TextOp::EndsWith(needle(v)),
            StringMatcher::Matches(pattern) => {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(!case_sensitive)
                    .build()
                    .map_err(|e| PatternError::from_regex(pattern, e))?;
                TextOp::Regex(Arc::new(regex))
            }
            StringMatcher::Exists(exists) => TextOp::Exists(*exists),
        };
        Ok(Self {
            op,
            fold_case: !case_sensitive,
        })
    }

    /// `value` is `None` when the attribute is absent from the request;
    /// only `exists: false` matches that.
    pub fn matches(&self, value: Option<&str>) -> bool {
        let value = match (&self.op, value) {
            (TextOp::Exists(should_exist), v) => return *should_exist == v.is_some(),
            (_, None) => return false,
            (TextOp::Regex(regex), Some(v)) => return regex.is_match(v),
            (_, Some(v)) if self.fold_case => Cow::Owned(v.to_lowercase()),
            (_, Some(v)) => Cow::Borrowed(v),
        };

        match &self.op {
            TextOp::Equals(needle) => *value == **needle,
            TextOp::Contains(needle) => value.contains(needle.as_str()),
            TextOp::StartsWith(needle) => value.starts_with(needle.as_str()),
            TextOp::EndsWith(needle) => value.ends_with(needle.as_str()),
            TextOp::Regex(_) | TextOp::Exists(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(m: StringMatcher, case_sensitive: bool) -> TextMatcher {
        TextMatcher::compile(&m, case_sensitive).unwrap()
    }

    #[test]
    fn test_equals_respects_case_mode() {
        let strict = matcher(StringMatcher::Equals("script".into()), true);
        assert!(strict.matches(Some("script")));
        assert!(!strict.matches(Some("SCRIPT")));
        assert!(!strict.matches(None));

        let loose = matcher(StringMatcher::Equals("Script".into()), false);
        assert!(loose.matches(Some("SCRIPT")));
        assert!(loose.matches(Some("script")));
    }

    #[test]
    fn test_substring_operators() {
        let contains = matcher(StringMatcher::Contains("ads".into()), true);
        assert!(contains.matches(Some("https://ads.example/x")));
        assert!(!contains.matches(Some("https://ADS.example/x")));
        assert!(matcher(StringMatcher::Contains("ADS".into()), false)
            .matches(Some("https://ads.example/x")));

        let starts = matcher(StringMatcher::StartsWith("https://".into()), true);
        assert!(starts.matches(Some("https://a.example/")));
        assert!(!starts.matches(Some("http://a.example/")));

        let ends = matcher(StringMatcher::EndsWith(".JS".into()), false);
        assert!(ends.matches(Some("/lib.js")));
        assert!(!ends.matches(Some("/lib.css")));
    }

    #[test]
    fn test_regex_follows_case_mode() {
        let strict = matcher(StringMatcher::Matches(r"^/ad[sv]/\d+".into()), true);
        assert!(strict.matches(Some("/ads/12")));
        assert!(strict.matches(Some("/adv/3/banner")));
        assert!(!strict.matches(Some("/ADS/12")));

        let loose = matcher(StringMatcher::Matches(r"^/ad[sv]/\d+".into()), false);
        assert!(loose.matches(Some("/ADS/12")));
    }

    #[test]
    fn test_invalid_regex_is_pattern_error() {
        let err = TextMatcher::compile(&StringMatcher::Matches("(unclosed".into()), true)
            .unwrap_err();
        assert_eq!(err.pattern, "(unclosed");
    }

    #[test]
    fn test_exists() {
        let exists = matcher(StringMatcher::Exists(true), true);
        let absent = matcher(StringMatcher::Exists(false), true);

        assert!(exists.matches(Some("")));
        assert!(!exists.matches(None));
        assert!(absent.matches(None));
        assert!(!absent.matches(Some("x")));
    }

    #[test]
    fn test_string_matcher_serde() {
        let m: StringMatcher = serde_json::from_str(r#"{"startsWith": "/api"}"#).unwrap();
        assert_eq!(m, StringMatcher::StartsWith("/api".into()));

        let m: StringMatcher = serde_json::from_str(r#"{"exists": false}"#).unwrap();
        assert_eq!(m, StringMatcher::Exists(false));
    }
}
