//! Condition trees: leaf predicates combined by AND / OR groups.

use super::detail_path::{DetailPath, DetailPathDefinition};
use super::glob::ChromeGlob;
use super::response_state::ResponseState;
use super::url_filter::{UrlFilter, UrlFilterDefinition};
use crate::error::RuleError;
use crate::request::RequestDetails;
use crate::response::BlockingResponse;
use serde::{Deserialize, Serialize};

/// Condition configuration as registrants submit it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ConditionDefinition {
    /// Matches if ALL inner conditions match (vacuously true when empty)
    And(Vec<ConditionDefinition>),

    /// Matches if ANY inner condition matches (false when empty)
    Or(Vec<ConditionDefinition>),

    /// Chrome match pattern over the request URL
    Glob(String),

    /// `events.UrlFilter` criteria over the request URL
    UrlFilter(UrlFilterDefinition),

    /// One request attribute compared with a string matcher
    DetailPath(DetailPathDefinition),

    /// State of the blocking response accumulated so far
    ResponseState(ResponseState),
}

/// Boolean operator of a [`ConditionGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupOperator {
    And,
    Or,
}

/// A compiled leaf predicate.
#[derive(Debug, Clone)]
pub enum Predicate {
    UrlFilter(UrlFilter),
    DetailPath(DetailPath),
    ChromeGlob(ChromeGlob),
    ResponseState(ResponseState),
}

impl Predicate {
    pub fn matches(&self, details: &RequestDetails, response: &BlockingResponse) -> bool {
        match self {
            Predicate::UrlFilter(filter) => filter.matches_url(details.url()),
            Predicate::DetailPath(path) => path.matches(details),
            Predicate::ChromeGlob(glob) => glob.matches_url(details.url()),
            Predicate::ResponseState(state) => state.matches(response),
        }
    }
}

/// A compiled condition: a leaf predicate or a nested group.
#[derive(Debug, Clone)]
pub enum Condition {
    Leaf(Predicate),
    Group(ConditionGroup),
}

impl Condition {
    pub fn compile(definition: &ConditionDefinition) -> Result<Self, RuleError> {
        let condition = match definition {
            ConditionDefinition::And(children) => {
                Condition::Group(ConditionGroup::compile(GroupOperator::And, children)?)
            }
            ConditionDefinition::Or(children) => {
                Condition::Group(ConditionGroup::compile(GroupOperator::Or, children)?)
            }
            ConditionDefinition::Glob(pattern) => {
                Condition::Leaf(Predicate::ChromeGlob(ChromeGlob::compile(pattern)?))
            }
            ConditionDefinition::UrlFilter(filter) => {
                Condition::Leaf(Predicate::UrlFilter(UrlFilter::compile(filter)?))
            }
            ConditionDefinition::DetailPath(path) => {
                Condition::Leaf(Predicate::DetailPath(DetailPath::compile(path)?))
            }
            ConditionDefinition::ResponseState(state) => {
                Condition::Leaf(Predicate::ResponseState(*state))
            }
        };
        Ok(condition)
    }

    pub fn matches(&self, details: &RequestDetails, response: &BlockingResponse) -> bool {
        match self {
            Condition::Leaf(predicate) => predicate.matches(details, response),
            Condition::Group(group) => group.matches(details, response),
        }
    }
}

impl From<Predicate> for Condition {
    fn from(predicate: Predicate) -> Self {
        Condition::Leaf(predicate)
    }
}

impl From<ConditionGroup> for Condition {
    fn from(group: ConditionGroup) -> Self {
        Condition::Group(group)
    }
}

/// Group of conditions evaluated under one operator.
///
/// Groups are assembled bottom-up by value and expose no mutation once
/// built, so a tree can never reference one of its ancestors.
#[derive(Debug, Clone)]
pub struct ConditionGroup {
    operator: GroupOperator,
    children: Vec<Condition>,
}

impl ConditionGroup {
    pub fn new(operator: GroupOperator) -> Self {
        Self {
            operator,
            children: Vec::new(),
        }
    }

    pub fn and() -> Self {
        Self::new(GroupOperator::And)
    }

    pub fn or() -> Self {
        Self::new(GroupOperator::Or)
    }

    /// Append a child while the group is being built.
    pub fn with(mut self, child: impl Into<Condition>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn compile(
        operator: GroupOperator,
        children: &[ConditionDefinition],
    ) -> Result<Self, RuleError> {
        let children: Result<Vec<_>, _> = children.iter().map(Condition::compile).collect();
        Ok(Self {
            operator,
            children: children?,
        })
    }

    pub fn operator(&self) -> GroupOperator {
        self.operator
    }

    pub fn children(&self) -> &[Condition] {
        &self.children
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Short-circuiting evaluation: AND stops at the first failing child,
    /// OR at the first matching one.
    pub fn matches(&self, details: &RequestDetails, response: &BlockingResponse) -> bool {
        match self.operator {
            GroupOperator::And => self.children.iter().all(|c| c.matches(details, response)),
            GroupOperator::Or => self.children.iter().any(|c| c.matches(details, response)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ResourceType;
    use serde_json::json;

    fn details(url: &str) -> RequestDetails {
        RequestDetails::parse(url)
            .unwrap()
            .with_resource_type(ResourceType::Script)
    }

    fn compile(value: serde_json::Value) -> Condition {
        let definition: ConditionDefinition = serde_json::from_value(value).unwrap();
        Condition::compile(&definition).unwrap()
    }

    fn constant(value: bool) -> Condition {
        // An empty AND is true, an empty OR is false
        if value {
            ConditionGroup::and().into()
        } else {
            ConditionGroup::or().into()
        }
    }

    #[test]
    fn test_empty_groups() {
        let response = BlockingResponse::new();
        let d = details("https://a.example/");
        assert!(ConditionGroup::and().matches(&d, &response));
        assert!(!ConditionGroup::or().matches(&d, &response));
    }

    #[test]
    fn test_and_or_truth_tables() {
        let response = BlockingResponse::new();
        let d = details("https://a.example/");
        for a in [false, true] {
            for b in [false, true] {
                let and = ConditionGroup::and().with(constant(a)).with(constant(b));
                let or = ConditionGroup::or().with(constant(a)).with(constant(b));
                assert_eq!(and.matches(&d, &response), a && b);
                assert_eq!(or.matches(&d, &response), a || b);
            }
        }
    }

    #[test]
    fn test_nested_tree_from_definition() {
        let condition = compile(json!({
            "and": [
                {"or": [
                    {"glob": "*://*.ads.example/*"},
                    {"urlFilter": {"pathPrefix": "/banner"}}
                ]},
                {"detailPath": {"path": "resourceType", "equals": "script"}},
                {"responseState": {"cancelled": false}}
            ]
        }));
        let response = BlockingResponse::new();

        assert!(condition.matches(&details("https://cdn.ads.example/x.js"), &response));
        assert!(condition.matches(&details("https://news.example/banner/1.js"), &response));
        assert!(!condition.matches(&details("https://news.example/app.js"), &response));

        let mut cancelled = BlockingResponse::new();
        cancelled.cancel();
        assert!(!condition.matches(&details("https://cdn.ads.example/x.js"), &cancelled));
    }

    #[test]
    fn test_malformed_glob_fails_whole_tree() {
        let definition: ConditionDefinition = serde_json::from_value(json!({
            "or": [{"glob": "*://*.example.com/*"}, {"glob": "not a pattern"}]
        }))
        .unwrap();
        assert!(matches!(
            Condition::compile(&definition),
            Err(RuleError::Pattern(_))
        ));
    }

    #[test]
    fn test_group_accessors() {
        let group = ConditionGroup::or().with(constant(true));
        assert_eq!(group.operator(), GroupOperator::Or);
        assert_eq!(group.children().len(), 1);
        assert!(!group.is_empty());
    }
}
