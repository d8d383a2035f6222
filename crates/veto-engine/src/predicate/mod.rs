//! Request conditions for rule matching.
//!
//! Leaf predicates test one aspect of a request (its URL, one attribute of
//! the request details, or the blocking response accumulated so far). Groups
//! combine them with AND / OR and are themselves conditions, so arbitrarily
//! deep trees evaluate through a single recursive `matches`.
//!
//! # Module Structure
//!
//! - `text_matcher` - equals / contains / startsWith / endsWith / matches / exists
//! - `glob` - Chrome extension match patterns compiled to regexes
//! - `url_filter` - `events.UrlFilter` criteria
//! - `detail_path` - one request attribute by path
//! - `response_state` - flags of the current blocking response
//! - `logical` - condition trees and groups
//!
//! All patterns are compiled when a rule is built; malformed input is a
//! registration error, never a silent non-match.

mod detail_path;
mod glob;
mod logical;
mod response_state;
mod text_matcher;
mod url_filter;

pub use detail_path::{DetailField, DetailPath, DetailPathDefinition};
pub use glob::ChromeGlob;
pub use logical::{Condition, ConditionDefinition, ConditionGroup, GroupOperator, Predicate};
pub use response_state::ResponseState;
pub use text_matcher::{StringMatcher, TextMatcher};
pub use url_filter::{PortSpec, UrlFilter, UrlFilterDefinition};
