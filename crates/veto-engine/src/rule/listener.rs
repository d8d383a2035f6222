//! `webRequest.addListener` subscriptions expressed as rules.

use super::action::{ActionDefinition, ExtraInfo};
use super::{Rule, RuleDefinition};
use crate::error::RuleError;
use crate::predicate::{ConditionDefinition, DetailPathDefinition};
use crate::request::{CallbackId, RegistrantId, ResourceType, Stage};
use serde::{Deserialize, Serialize};

/// `webRequest.RequestFilter`: which requests a listener wants to see.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RequestFilter {
    /// Chrome match patterns; empty means every URL
    #[serde(default)]
    pub urls: Vec<String>,
    /// Resource types; empty means every type
    #[serde(default)]
    pub types: Vec<ResourceType>,
}

/// A listener registered for one stage.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListenerSubscription {
    pub registrant: RegistrantId,
    pub stage: Stage,
    pub callback_id: CallbackId,
    #[serde(default)]
    pub filter: RequestFilter,
    #[serde(default)]
    pub extra_info: Vec<ExtraInfo>,
}

impl ListenerSubscription {
    /// The rule definition this subscription stands for:
    /// `AND(stage == S, OR(urls...), OR(types...))` with empty lists left out.
    pub fn to_definition(&self) -> RuleDefinition {
        let mut conditions = vec![ConditionDefinition::DetailPath(
            DetailPathDefinition::equals("stage", self.stage.as_str()),
        )];

        if !self.filter.urls.is_empty() {
            conditions.push(ConditionDefinition::Or(
                self.filter
                    .urls
                    .iter()
                    .map(|url| ConditionDefinition::Glob(url.clone()))
                    .collect(),
            ));
        }

        if !self.filter.types.is_empty() {
            conditions.push(ConditionDefinition::Or(
                self.filter
                    .types
                    .iter()
                    .map(|t| {
                        ConditionDefinition::DetailPath(DetailPathDefinition::equals(
                            "resourceType",
                            t.as_str(),
                        ))
                    })
                    .collect(),
            ));
        }

        RuleDefinition {
            id: None,
            registrant: self.registrant.clone(),
            conditions,
            actions: vec![ActionDefinition::Listener {
                callback_id: self.callback_id.clone(),
                stage: self.stage,
                blocking: false,
                extra_info: self.extra_info.clone(),
            }],
        }
    }

    pub fn compile(&self) -> Result<Rule, RuleError> {
        Rule::compile(&self.to_definition())
    }
}
