//! Chrome extension match patterns (`<scheme>://<host><path>`).
//!
//! A pattern is compiled once into an anchored regex over a normalized view
//! of the request URL: `scheme://host[:port]` followed by the path and query.
//! Userinfo and the fragment are left out, and the port is always spelled
//! out when the scheme has a default one.
//!
//! - scheme `*` matches `http` and `https` only
//! - host `*` matches any host, `*.example.com` matches `example.com` and
//!   every subdomain; no other wildcard position is accepted in the host
//! - IPv6 hosts are written in brackets (`http://[::1]/*`)
//! - `*` in the path matches any run of characters, including the query
//! - `<all_urls>` matches every URL with a supported scheme

use crate::error::PatternError;
use regex::Regex;
use std::sync::Arc;
use url::{Position, Url};

const ALL_URLS: &str = "<all_urls>";

const SCHEMES: &[&str] = &[
    "http",
    "https",
    "ws",
    "wss",
    "ftp",
    "file",
    "chrome-extension",
];

/// Characters a host (or wildcard host prefix) may span.
const HOST_CHARS: &str = r"[^/?#:@\[\]]";

/// Any host, bracketed IPv6 literals included.
const ANY_HOST: &str = r"(?:\[[^\]/]*\]|[^/?#:@\[\]]+)";

/// Compiled Chrome match pattern.
#[derive(Debug, Clone)]
pub struct ChromeGlob {
    pattern: String,
    regex: Arc<Regex>,
}

impl ChromeGlob {
    /// Compile a match pattern. Malformed patterns are rejected here, never
    /// silently treated as non-matching.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let source = glob_to_regex(pattern)?;
        let regex = Regex::new(&source).map_err(|e| PatternError::from_regex(pattern, e))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex: Arc::new(regex),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches_url(&self, url: &Url) -> bool {
        self.regex.is_match(&match_subject(url))
    }

    /// Match a raw URL string. Unparseable input never matches.
    pub fn matches_str(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|u| self.matches_url(&u))
            .unwrap_or(false)
    }
}

/// `scheme://host[:port]/path?query`, without userinfo or fragment.
fn match_subject(url: &Url) -> String {
    let mut subject = format!("{}://{}", url.scheme(), url.host_str().unwrap_or(""));
    if let Some(port) = url.port_or_known_default() {
        subject.push(':');
        subject.push_str(&port.to_string());
    }
    subject.push_str(&url[Position::BeforePath..Position::AfterQuery]);
    subject
}

fn glob_to_regex(pattern: &str) -> Result<String, PatternError> {
    if pattern == ALL_URLS {
        let schemes: Vec<String> = SCHEMES.iter().map(|s| regex::escape(s)).collect();
        return Ok(format!("^(?:{})://.*$", schemes.join("|")));
    }

    let (scheme, rest) = pattern
        .split_once("://")
        .ok_or_else(|| PatternError::new(pattern, "missing '://' scheme separator"))?;

    let scheme_re = match scheme {
        "*" => "https?".to_string(),
        s if SCHEMES.contains(&s) => regex::escape(s),
        s => {
            return Err(PatternError::new(
                pattern,
                format!("unsupported scheme '{s}'"),
            ))
        }
    };

    let slash = rest
        .find('/')
        .ok_or_else(|| PatternError::new(pattern, "missing path"))?;
    let (authority, path) = rest.split_at(slash);

    let host_re = if authority.is_empty() {
        if scheme != "file" {
            return Err(PatternError::new(pattern, "empty host"));
        }
        String::new()
    } else {
        authority_to_regex(pattern, authority)?
    };

    let path_re = path
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    Ok(format!("^{scheme_re}://{host_re}{path_re}$"))
}

fn authority_to_regex(pattern: &str, authority: &str) -> Result<String, PatternError> {
    let (host, port) = if authority.starts_with('[') {
        let end = authority
            .find(']')
            .ok_or_else(|| PatternError::new(pattern, "unterminated IPv6 host"))?;
        let (host, rest) = authority.split_at(end + 1);
        match rest {
            "" => (host, None),
            _ => match rest.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None => {
                    return Err(PatternError::new(
                        pattern,
                        format!("unexpected '{rest}' after IPv6 host"),
                    ))
                }
            },
        }
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    let port_re = match port {
        None => r"(?::\d+)?".to_string(),
        Some("*") => r"(?::\d+)?".to_string(),
        Some(p) if !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()) => {
            format!(":{}", regex::escape(p))
        }
        Some(p) => return Err(PatternError::new(pattern, format!("invalid port '{p}'"))),
    };

    let host = host.to_lowercase();
    let host_re = if host == "*" {
        ANY_HOST.to_string()
    } else if let Some(domain) = host.strip_prefix("*.") {
        if domain.is_empty() || domain.contains('*') {
            return Err(PatternError::new(
                pattern,
                "'*' in host must be followed by a domain",
            ));
        }
        format!(r"(?:{HOST_CHARS}*\.)?{}", regex::escape(domain))
    } else if host.contains('*') {
        return Err(PatternError::new(
            pattern,
            "'*' in host is only allowed as the first label",
        ));
    } else if host.is_empty() || host == "[]" {
        return Err(PatternError::new(pattern, "empty host"));
    } else if host.starts_with('[') {
        regex::escape(&canonical_ipv6(pattern, &host)?)
    } else {
        regex::escape(&host)
    };

    Ok(format!("(?i:{host_re}){port_re}"))
}

/// Bring an IPv6 pattern host into the form `Url::host_str` produces.
fn canonical_ipv6(pattern: &str, host: &str) -> Result<String, PatternError> {
    let literal = &host[1..host.len() - 1];
    let address: std::net::Ipv6Addr = literal
        .parse()
        .map_err(|_| PatternError::new(pattern, format!("invalid IPv6 host '{host}'")))?;
    Ok(format!("[{address}]"))
}
