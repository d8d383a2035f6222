//! Rules: a condition tree bound to an ordered list of actions.
//!
//! A [`RuleDefinition`] is what registrants submit; [`Rule::compile`] turns
//! it into an immutable [`Rule`], performing every validation up front so
//! that evaluation can never fail on a malformed pattern.

mod action;
mod listener;

pub use action::{
    Action, ActionContext, ActionDefinition, ActionFailure, ExtraInfo, ListenerAction,
    DEFAULT_MESSAGE_CALLBACK,
};
pub use listener::{ListenerSubscription, RequestFilter};

use crate::error::RuleError;
use crate::metrics;
use crate::predicate::{ConditionDefinition, ConditionGroup, GroupOperator};
use crate::request::{CallbackId, RegistrantId, RequestDetails};
use crate::response::BlockingResponse;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry-assigned rule identity. Increases with registration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Rule configuration as registrants submit it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    /// Optional id; acts as a callback id for `unregister_rule`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CallbackId>,
    pub registrant: RegistrantId,
    /// Combined under AND; empty matches every request
    #[serde(default)]
    pub conditions: Vec<ConditionDefinition>,
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
}

/// A compiled rule. Immutable once built; only its registry membership changes.
#[derive(Debug, Clone)]
pub struct Rule {
    pub(crate) id: RuleId,
    name: Option<CallbackId>,
    registrant: RegistrantId,
    conditions: ConditionGroup,
    actions: Vec<Action>,
}

impl Rule {
    pub fn compile(definition: &RuleDefinition) -> Result<Self, RuleError> {
        let conditions = ConditionGroup::compile(GroupOperator::And, &definition.conditions)?;
        let actions = definition
            .actions
            .iter()
            .map(Action::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: RuleId::default(),
            name: definition.id.clone(),
            registrant: definition.registrant.clone(),
            conditions,
            actions,
        })
    }

    /// Build a rule from already compiled parts.
    pub fn new(registrant: RegistrantId, conditions: ConditionGroup, actions: Vec<Action>) -> Self {
        Self {
            id: RuleId::default(),
            name: None,
            registrant,
            conditions,
            actions,
        }
    }

    pub fn with_name(mut self, name: impl Into<CallbackId>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Id assigned on registration (`#0` before that).
    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn name(&self) -> Option<&CallbackId> {
        self.name.as_ref()
    }

    pub fn registrant(&self) -> &RegistrantId {
        &self.registrant
    }

    pub fn conditions(&self) -> &ConditionGroup {
        &self.conditions
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Every callback id identifying this rule: its name plus the callback
    /// of each listener action.
    pub fn callback_ids(&self) -> impl Iterator<Item = &CallbackId> {
        self.name
            .iter()
            .chain(self.actions.iter().filter_map(Action::owned_callback_id))
    }

    pub fn owns_callback_id(&self, callback_id: &CallbackId) -> bool {
        self.callback_ids().any(|id| id == callback_id)
    }

    pub fn matches(&self, details: &RequestDetails, response: &BlockingResponse) -> bool {
        self.conditions.matches(details, response)
    }

    /// Run the actions in order and return how many of them failed.
    ///
    /// Completes once the last action has completed. Failures are logged
    /// and skipped; the remaining actions are skipped once the response is
    /// terminal.
    pub async fn apply(
        &self,
        response: &mut BlockingResponse,
        details: &Arc<RequestDetails>,
        ctx: &ActionContext,
    ) -> usize {
        let mut failures = 0;
        for action in &self.actions {
            if response.is_terminal() {
                debug!(
                    "Rule {} stops at {}: response already cancelled",
                    self.id,
                    action.name()
                );
                break;
            }
            if let Err(e) = action.apply(response, details, &self.registrant, ctx).await {
                warn!(
                    "Action {} of rule {} ({}) failed for request {}: {}",
                    action.name(),
                    self.id,
                    self.registrant,
                    details.request_id(),
                    e
                );
                metrics::record_action_failure(action.name(), e.kind());
                failures += 1;
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NoOpHost;
    use serde_json::json;
    use std::time::Duration;

    fn rule(value: serde_json::Value) -> Rule {
        let definition: RuleDefinition = serde_json::from_value(value).unwrap();
        Rule::compile(&definition).unwrap()
    }

    fn ctx() -> ActionContext {
        ActionContext::new(Arc::new(NoOpHost), Duration::from_secs(1))
    }

    #[test]
    fn test_empty_conditions_match_everything() {
        let r = rule(json!({"registrant": "ext", "actions": [{"type": "cancelRequest"}]}));
        let details = RequestDetails::parse("https://a.example/").unwrap();
        assert!(r.matches(&details, &BlockingResponse::new()));
    }

    #[test]
    fn test_conditions_are_anded() {
        let r = rule(json!({
            "registrant": "ext",
            "conditions": [
                {"urlFilter": {"hostContains": "ads"}},
                {"detailPath": {"path": "method", "equals": "POST"}}
            ],
            "actions": [{"type": "cancelRequest"}]
        }));
        let get = RequestDetails::parse("https://ads.example/").unwrap();
        let post = RequestDetails::parse("https://ads.example/").unwrap().with_method("post");
        assert!(!r.matches(&get, &BlockingResponse::new()));
        assert!(r.matches(&post, &BlockingResponse::new()));
    }

    #[test]
    fn test_callback_ids() {
        let r = rule(json!({
            "id": "rule-1",
            "registrant": "ext",
            "actions": [
                {"type": "listener", "callbackId": "cb-1", "stage": "onBeforeRequest"},
                {"type": "sendMessageToExtension", "message": "hi"}
            ]
        }));
        let ids: Vec<_> = r.callback_ids().map(|c| c.as_str()).collect();
        assert_eq!(ids, vec!["rule-1", "cb-1"]);
        assert!(r.owns_callback_id(&"cb-1".into()));
        assert!(!r.owns_callback_id(&DEFAULT_MESSAGE_CALLBACK.into()));
    }

    #[test]
    fn test_compile_rejects_bad_pattern() {
        let definition: RuleDefinition = serde_json::from_value(json!({
            "registrant": "ext",
            "conditions": [{"glob": "https://*foo.example/*"}],
            "actions": [{"type": "cancelRequest"}]
        }))
        .unwrap();
        assert!(matches!(
            Rule::compile(&definition),
            Err(RuleError::Pattern(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_runs_actions_in_order_and_stops_at_cancel() {
        let r = rule(json!({
            "registrant": "ext",
            "actions": [
                {"type": "redirectRequest", "redirectUrl": "https://first.example/"},
                {"type": "cancelRequest"},
                {"type": "redirectRequest", "redirectUrl": "https://second.example/"}
            ]
        }));
        let details = Arc::new(RequestDetails::parse("https://a.example/").unwrap());
        let mut response = BlockingResponse::new();

        let failures = r.apply(&mut response, &details, &ctx()).await;
        assert_eq!(failures, 0);
        assert!(response.is_cancelled());
        assert_eq!(response.redirect_url(), Some("https://first.example/"));
    }
}
