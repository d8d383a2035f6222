//! Checks over a parsed rule document.
//!
//! A document is either a bare array of rule definitions or an object with
//! `rules` and `listeners` arrays (a full `veto` configuration file lints
//! too; its other sections are ignored).

use crate::types::{LintIssue, LintOptions, LintResult};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use veto_engine::predicate::ConditionDefinition;
use veto_engine::rule::ActionDefinition;
use veto_engine::{CallbackId, ListenerSubscription, Rule, RuleDefinition};

/// Per-document bookkeeping shared by the rule and listener passes.
#[derive(Default)]
struct DocumentState {
    /// Callback id -> location that first claimed it
    callback_ids: HashMap<CallbackId, String>,
    /// Location of the first rule that cancels every request
    blanket_cancel: Option<String>,
}

pub fn validate_document(file: &Path, document: &Value, result: &mut LintResult, options: &LintOptions) {
    let (rules, listeners) = match document {
        Value::Array(rules) => (rules.as_slice(), &[][..]),
        Value::Object(map) => {
            let rules = match section(file, map.get("rules"), "rules", result) {
                Some(rules) => rules,
                None => return,
            };
            let listeners = match section(file, map.get("listeners"), "listeners", result) {
                Some(listeners) => listeners,
                None => return,
            };
            (rules, listeners)
        }
        _ => {
            result.add_issue(
                LintIssue::error("E002", "Document is neither a rule array nor an object", file)
                    .with_suggestion("Use a top-level array of rules or an object with `rules` and `listeners`"),
            );
            return;
        }
    };

    let mut state = DocumentState::default();

    for (index, value) in rules.iter().enumerate() {
        let location = format!("rules[{index}]");
        match serde_json::from_value::<RuleDefinition>(value.clone()) {
            Ok(definition) => validate_rule(file, &definition, &location, &mut state, result),
            Err(e) => result.add_issue(
                LintIssue::error("E002", format!("Not a rule definition: {e}"), file)
                    .with_location(location),
            ),
        }
    }

    for (index, value) in listeners.iter().enumerate() {
        let location = format!("listeners[{index}]");
        match serde_json::from_value::<ListenerSubscription>(value.clone()) {
            Ok(subscription) => {
                validate_listener(file, &subscription, &location, &mut state, result)
            }
            Err(e) => result.add_issue(
                LintIssue::error("E002", format!("Not a listener subscription: {e}"), file)
                    .with_location(location),
            ),
        }
    }

    if options.verbose {
        result.add_issue(LintIssue::info(
            "I001",
            format!("{} rule(s), {} listener(s)", rules.len(), listeners.len()),
            file,
        ));
    }
}

/// A missing section is empty; anything but an array is an error.
fn section<'a>(
    file: &Path,
    value: Option<&'a Value>,
    name: &str,
    result: &mut LintResult,
) -> Option<&'a [Value]> {
    match value {
        None | Some(Value::Null) => Some(&[]),
        Some(Value::Array(items)) => Some(items.as_slice()),
        Some(_) => {
            result.add_issue(
                LintIssue::error("E002", format!("`{name}` must be an array"), file)
                    .with_location(name),
            );
            None
        }
    }
}

fn validate_rule(
    file: &Path,
    definition: &RuleDefinition,
    location: &str,
    state: &mut DocumentState,
    result: &mut LintResult,
) {
    for (index, condition) in definition.conditions.iter().enumerate() {
        check_empty_or(file, condition, &format!("{location}.conditions[{index}]"), result);
    }

    if definition.actions.is_empty() {
        result.add_issue(
            LintIssue::warning("W001", "Rule has no actions and can never change a request", file)
                .with_location(location)
                .with_suggestion("Add an action or remove the rule"),
        );
    }

    if let Some(position) = definition
        .actions
        .iter()
        .position(|action| matches!(action, ActionDefinition::CancelRequest))
    {
        if position + 1 < definition.actions.len() {
            result.add_issue(
                LintIssue::warning(
                    "W004",
                    format!(
                        "{} action(s) after cancelRequest never run",
                        definition.actions.len() - position - 1
                    ),
                    file,
                )
                .with_location(format!("{location}.actions[{}]", position + 1))
                .with_suggestion("Move cancelRequest last or drop the trailing actions"),
            );
        }
    }

    let rule = match Rule::compile(definition) {
        Ok(rule) => rule,
        Err(e) => {
            result.add_issue(
                LintIssue::error("E003", format!("Rule does not compile: {e}"), file)
                    .with_location(location),
            );
            return;
        }
    };

    check_rule(file, &rule, location, state, result);

    if state.blanket_cancel.is_none() && cancels_everything(definition) {
        state.blanket_cancel = Some(location.to_string());
    }
}

fn validate_listener(
    file: &Path,
    subscription: &ListenerSubscription,
    location: &str,
    state: &mut DocumentState,
    result: &mut LintResult,
) {
    match subscription.compile() {
        Ok(rule) => check_rule(file, &rule, location, state, result),
        Err(e) => result.add_issue(
            LintIssue::error("E003", format!("Listener filter does not compile: {e}"), file)
                .with_location(format!("{location}.filter")),
        ),
    }
}

/// Checks that need the compiled rule and the rules before it.
fn check_rule(
    file: &Path,
    rule: &Rule,
    location: &str,
    state: &mut DocumentState,
    result: &mut LintResult,
) {
    for callback_id in rule.callback_ids() {
        if let Some(first) = state.callback_ids.get(callback_id) {
            result.add_issue(
                LintIssue::error(
                    "E004",
                    format!("Callback id '{callback_id}' is already used by {first}"),
                    file,
                )
                .with_location(location)
                .with_suggestion("Callback ids must be unique across all registrants"),
            );
        } else {
            state
                .callback_ids
                .insert(callback_id.clone(), location.to_string());
        }
    }

    if let Some(blanket) = &state.blanket_cancel {
        result.add_issue(
            LintIssue::warning(
                "W003",
                format!("Unreachable: {blanket} cancels every request first"),
                file,
            )
            .with_location(location),
        );
    }
}

/// An empty OR can never match, which makes the whole rule dead when it
/// sits under an AND.
fn check_empty_or(file: &Path, condition: &ConditionDefinition, location: &str, result: &mut LintResult) {
    match condition {
        ConditionDefinition::Or(children) if children.is_empty() => {
            result.add_issue(
                LintIssue::warning("W002", "Empty `or` group never matches", file)
                    .with_location(format!("{location}.or"))
                    .with_suggestion("Add alternatives or remove the group"),
            );
        }
        ConditionDefinition::Or(children) => {
            for (index, child) in children.iter().enumerate() {
                check_empty_or(file, child, &format!("{location}.or[{index}]"), result);
            }
        }
        ConditionDefinition::And(children) => {
            for (index, child) in children.iter().enumerate() {
                check_empty_or(file, child, &format!("{location}.and[{index}]"), result);
            }
        }
        _ => {}
    }
}

fn cancels_everything(definition: &RuleDefinition) -> bool {
    definition.conditions.iter().all(is_tautology)
        && definition
            .actions
            .iter()
            .any(|action| matches!(action, ActionDefinition::CancelRequest))
}

fn is_tautology(condition: &ConditionDefinition) -> bool {
    match condition {
        ConditionDefinition::And(children) => children.iter().all(is_tautology),
        ConditionDefinition::Or(children) => children.iter().any(is_tautology),
        _ => false,
    }
}
