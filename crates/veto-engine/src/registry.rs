//! The set of live rules.
//!
//! Writers are serialized by a mutex. Readers never hold it while they work:
//! [`RuleRegistry::snapshot`] hands out the current `Arc` of the rule list
//! and writers replace the list copy-on-write, so an evaluation iterating a
//! snapshot can never observe a later `add` or `remove`.

use crate::error::RuleError;
use crate::metrics;
use crate::request::{CallbackId, RegistrantId};
use crate::rule::{Rule, RuleId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// Immutable view of the registered rules in registration order.
pub type RuleSnapshot = Arc<Vec<Arc<Rule>>>;

#[derive(Debug, Default)]
struct RegistryState {
    rules: RuleSnapshot,
    by_registrant: HashMap<RegistrantId, Vec<RuleId>>,
    by_callback: HashMap<CallbackId, RuleId>,
    next_id: u64,
    /// Set by `close`; every later add is refused
    closed: bool,
}

impl RegistryState {
    fn ensure_open(&self) -> Result<(), RuleError> {
        if self.closed {
            return Err(RuleError::ShutDown);
        }
        Ok(())
    }

    fn clear(&mut self) -> usize {
        let count = self.rules.len();
        self.rules = Arc::new(Vec::new());
        self.by_registrant.clear();
        self.by_callback.clear();
        metrics::set_registered_rules(0);
        count
    }

    fn check_callback_ids<'a>(
        &self,
        ids: impl Iterator<Item = &'a CallbackId>,
        pending: &mut HashSet<CallbackId>,
    ) -> Result<(), RuleError> {
        for id in ids {
            if self.by_callback.contains_key(id) || !pending.insert(id.clone()) {
                return Err(RuleError::DuplicateCallbackId(id.clone()));
            }
        }
        Ok(())
    }

    fn insert(&mut self, mut rule: Rule) -> RuleId {
        self.next_id += 1;
        let id = RuleId(self.next_id);
        rule.id = id;

        for callback_id in rule.callback_ids() {
            self.by_callback.insert(callback_id.clone(), id);
        }
        self.by_registrant
            .entry(rule.registrant().clone())
            .or_default()
            .push(id);
        Arc::make_mut(&mut self.rules).push(Arc::new(rule));
        id
    }

    fn remove_where(&mut self, mut doomed: impl FnMut(&Rule) -> bool) -> Vec<Arc<Rule>> {
        let (removed, kept): (Vec<_>, Vec<_>) =
            self.rules.iter().cloned().partition(|rule| doomed(rule.as_ref()));
        if removed.is_empty() {
            return removed;
        }

        for rule in &removed {
            for callback_id in rule.callback_ids() {
                self.by_callback.remove(callback_id);
            }
            if let Some(ids) = self.by_registrant.get_mut(rule.registrant()) {
                ids.retain(|id| *id != rule.id());
                if ids.is_empty() {
                    self.by_registrant.remove(rule.registrant());
                }
            }
        }
        self.rules = Arc::new(kept);
        removed
    }
}

/// Registered rules indexed by registrant and by callback id.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    state: Mutex<RegistryState>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule and return its id.
    ///
    /// Rejected when one of the rule's callback ids is already taken, or
    /// once the registry is closed.
    pub fn add(&self, rule: Rule) -> Result<RuleId, RuleError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.check_callback_ids(rule.callback_ids(), &mut HashSet::new())?;
        let id = state.insert(rule);
        metrics::set_registered_rules(state.rules.len());
        Ok(id)
    }

    /// Register several rules atomically: either all of them or none.
    pub fn add_all(&self, rules: Vec<Rule>) -> Result<Vec<RuleId>, RuleError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let mut pending = HashSet::new();
        for rule in &rules {
            state.check_callback_ids(rule.callback_ids(), &mut pending)?;
        }
        let ids = rules.into_iter().map(|rule| state.insert(rule)).collect();
        metrics::set_registered_rules(state.rules.len());
        Ok(ids)
    }

    /// Remove the rule owning `callback_id`. `None` when nothing owns it.
    pub fn remove_by_callback_id(&self, callback_id: &CallbackId) -> Option<Arc<Rule>> {
        let mut state = self.state.lock();
        let id = *state.by_callback.get(callback_id)?;
        let removed = state.remove_where(|rule| rule.id() == id).pop();
        metrics::set_registered_rules(state.rules.len());
        removed
    }

    pub fn remove_rule(&self, id: RuleId) -> Option<Arc<Rule>> {
        let mut state = self.state.lock();
        let removed = state.remove_where(|rule| rule.id() == id).pop();
        metrics::set_registered_rules(state.rules.len());
        removed
    }

    /// Remove every rule of `registrant` in one step. Returns how many went.
    pub fn remove_all_for_registrant(&self, registrant: &RegistrantId) -> usize {
        let mut state = self.state.lock();
        if !state.by_registrant.contains_key(registrant) {
            return 0;
        }
        let removed = state.remove_where(|rule| rule.registrant() == registrant);
        metrics::set_registered_rules(state.rules.len());
        info!(
            "Removed {} rule(s) of registrant {}",
            removed.len(),
            registrant
        );
        removed.len()
    }

    /// The current rule list. Later writes never show up in it.
    pub fn snapshot(&self) -> RuleSnapshot {
        Arc::clone(&self.state.lock().rules)
    }

    pub fn rules_for_registrant(&self, registrant: &RegistrantId) -> Vec<Arc<Rule>> {
        self.snapshot()
            .iter()
            .filter(|rule| rule.registrant() == registrant)
            .cloned()
            .collect()
    }

    pub fn contains_callback_id(&self, callback_id: &CallbackId) -> bool {
        self.state.lock().by_callback.contains_key(callback_id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state.lock().clear();
    }

    /// Drop every rule and refuse all further additions. Returns how many
    /// rules were dropped; closing twice drops nothing the second time.
    pub fn close(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        state.clear()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
