//! URL filters in the shape of `chrome.events.UrlFilter`.

use super::text_matcher::{StringMatcher, TextMatcher};
use crate::error::PatternError;
use serde::{Deserialize, Serialize};
use url::{Position, Url};

/// A port criterion: a single port or an inclusive `[min, max]` range.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PortSpec {
    Single(u16),
    Range([u16; 2]),
}

impl PortSpec {
    fn contains(&self, port: u16) -> bool {
        match self {
            PortSpec::Single(p) => *p == port,
            PortSpec::Range([min, max]) => (*min..=*max).contains(&port),
        }
    }
}

/// URL filter configuration. Every criterion present must hold; an empty
/// filter matches every URL.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UrlFilterDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_equals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_suffix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_equals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_suffix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_equals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_suffix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_equals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_suffix: Option<String>,
    /// Regex over the URL without its fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_matches: Option<String>,
    /// Regex over the URL without query and fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_and_path_matches: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schemes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<PortSpec>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UrlComponent {
    Host,
    Path,
    Query,
    Url,
    OriginAndPath,
}

impl UrlComponent {
    fn extract<'a>(&self, url: &'a Url) -> &'a str {
        match self {
            UrlComponent::Host => url.host_str().unwrap_or(""),
            UrlComponent::Path => url.path(),
            UrlComponent::Query => url.query().unwrap_or(""),
            UrlComponent::Url => &url[..Position::AfterQuery],
            UrlComponent::OriginAndPath => &url[..Position::AfterPath],
        }
    }
}

#[derive(Debug, Clone)]
struct Criterion {
    component: UrlComponent,
    matcher: TextMatcher,
}

/// Compiled URL filter.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    criteria: Vec<Criterion>,
    schemes: Option<Vec<String>>,
    ports: Option<Vec<PortSpec>>,
}

impl UrlFilter {
    pub fn compile(definition: &UrlFilterDefinition) -> Result<Self, PatternError> {
        let mut filter = UrlFilter::default();

        type Make = fn(String) -> StringMatcher;
        use StringMatcher::{Contains, EndsWith, Equals, Matches, StartsWith};

        let d = definition;
        let criteria: [(UrlComponent, &Option<String>, Make); 18] = [
            (UrlComponent::Host, &d.host_contains, Contains),
            (UrlComponent::Host, &d.host_equals, Equals),
            (UrlComponent::Host, &d.host_prefix, StartsWith),
            (UrlComponent::Host, &d.host_suffix, EndsWith),
            (UrlComponent::Path, &d.path_contains, Contains),
            (UrlComponent::Path, &d.path_equals, Equals),
            (UrlComponent::Path, &d.path_prefix, StartsWith),
            (UrlComponent::Path, &d.path_suffix, EndsWith),
            (UrlComponent::Query, &d.query_contains, Contains),
            (UrlComponent::Query, &d.query_equals, Equals),
            (UrlComponent::Query, &d.query_prefix, StartsWith),
            (UrlComponent::Query, &d.query_suffix, EndsWith),
            (UrlComponent::Url, &d.url_contains, Contains),
            (UrlComponent::Url, &d.url_equals, Equals),
            (UrlComponent::Url, &d.url_prefix, StartsWith),
            (UrlComponent::Url, &d.url_suffix, EndsWith),
            (UrlComponent::Url, &d.url_matches, Matches),
            (UrlComponent::OriginAndPath, &d.origin_and_path_matches, Matches),
        ];

        for (component, value, make) in criteria {
            let Some(value) = value else { continue };
            // Hosts are canonicalized to lowercase; everything else is exact
            let case_sensitive = component != UrlComponent::Host;
            filter.criteria.push(Criterion {
                component,
                matcher: TextMatcher::compile(&make(value.clone()), case_sensitive)?,
            });
        }

        if let Some(ports) = &d.ports {
            for port in ports {
                if let PortSpec::Range([min, max]) = port {
                    if min > max {
                        return Err(PatternError::new(
                            format!("[{min}, {max}]"),
                            "port range minimum exceeds maximum",
                        ));
                    }
                }
            }
        }

        filter.schemes = d
            .schemes
            .as_ref()
            .map(|s| s.iter().map(|scheme| scheme.to_lowercase()).collect());
        filter.ports = d.ports.clone();
        Ok(filter)
    }

    pub fn matches_url(&self, url: &Url) -> bool {
        if let Some(schemes) = &self.schemes {
            if !schemes.iter().any(|s| s == url.scheme()) {
                return false;
            }
        }

        if let Some(ports) = &self.ports {
            match url.port_or_known_default() {
                Some(port) if ports.iter().any(|p| p.contains(port)) => {}
                _ => return false,
            }
        }

        self.criteria
            .iter()
            .all(|c| c.matcher.matches(Some(c.component.extract(url))))
    }
}
