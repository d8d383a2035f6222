//! Evaluation of one request against a rule snapshot.
//!
//! ```text
//! Idle -> Evaluating -> Completing -> Done
//! ```
//!
//! Rules run strictly one after another in registration order, so a rule
//! sees every mutation made by the rules before it. A cancelled response
//! ends the walk immediately. [`RequestEvaluator::run`] consumes the
//! evaluator, which makes "completion happens exactly once" a property of
//! the type rather than of the caller.

use crate::metrics;
use crate::registry::RuleSnapshot;
use crate::request::RequestDetails;
use crate::response::BlockingResponse;
use crate::rule::{ActionContext, RuleId};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationState {
    Idle,
    Evaluating,
    Completing,
    Done,
}

impl fmt::Display for EvaluationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvaluationState::Idle => "idle",
            EvaluationState::Evaluating => "evaluating",
            EvaluationState::Completing => "completing",
            EvaluationState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    pub request_id: u64,
    pub response: BlockingResponse,
    /// Rules whose actions ran, in order. A rule cut short by the
    /// evaluation deadline is included, since its earlier actions stay
    /// in the response.
    pub matched_rules: Vec<RuleId>,
    /// Matched rules skipped because their registrant was inactive
    pub skipped_rules: Vec<RuleId>,
    pub action_failures: usize,
    /// A cancel ended the walk before every rule was tried
    pub cancelled_early: bool,
    /// The evaluation deadline elapsed
    pub timed_out: bool,
}

impl EvaluationReport {
    fn new(request_id: u64) -> Self {
        Self {
            request_id,
            response: BlockingResponse::new(),
            matched_rules: Vec::new(),
            skipped_rules: Vec::new(),
            action_failures: 0,
            cancelled_early: false,
            timed_out: false,
        }
    }

    /// Outcome label for logs and metrics.
    pub fn outcome(&self) -> &'static str {
        if self.response.is_cancelled() {
            "cancelled"
        } else if self.timed_out {
            "timeout"
        } else if self.response.redirect_url().is_some() || self.response.synthetic().is_some() {
            "redirected"
        } else if self.response.is_passthrough() {
            "passthrough"
        } else {
            "modified"
        }
    }
}

/// Progress of the rule walk, kept outside the walk future so it survives
/// an evaluation timeout.
#[derive(Debug, Default)]
struct Progress {
    matched: Vec<RuleId>,
    skipped: Vec<RuleId>,
    failures: usize,
    cancelled_early: bool,
}

/// Evaluates one request. One evaluator per request; never reused.
pub struct RequestEvaluator {
    details: Arc<RequestDetails>,
    snapshot: RuleSnapshot,
    ctx: ActionContext,
    evaluation_timeout: Option<Duration>,
    state: EvaluationState,
}

impl RequestEvaluator {
    /// `snapshot` is fixed for the whole evaluation.
    pub fn new(details: Arc<RequestDetails>, snapshot: RuleSnapshot, ctx: ActionContext) -> Self {
        Self {
            details,
            snapshot,
            ctx,
            evaluation_timeout: None,
            state: EvaluationState::Idle,
        }
    }

    /// Bound the whole evaluation. On expiry the response accumulated so
    /// far is delivered.
    pub fn with_evaluation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.evaluation_timeout = timeout;
        self
    }

    pub fn state(&self) -> EvaluationState {
        self.state
    }

    fn transition(&mut self, next: EvaluationState) {
        trace!(
            "Request {}: {} -> {}",
            self.details.request_id(),
            self.state,
            next
        );
        self.state = next;
    }

    /// Evaluate the snapshot, starting from `response`.
    pub async fn run(mut self, mut response: BlockingResponse) -> EvaluationReport {
        let started = Instant::now();
        self.transition(EvaluationState::Evaluating);

        let mut progress = Progress::default();
        let timed_out = match self.evaluation_timeout {
            Some(limit) => tokio::time::timeout(limit, self.walk(&mut response, &mut progress))
                .await
                .is_err(),
            None => {
                self.walk(&mut response, &mut progress).await;
                false
            }
        };
        if timed_out {
            warn!(
                "Evaluation of request {} ({}) timed out, delivering partial response",
                self.details.request_id(),
                self.details.url()
            );
        }

        self.transition(EvaluationState::Completing);
        let mut report = EvaluationReport::new(self.details.request_id());
        report.response = response;
        report.matched_rules = progress.matched;
        report.skipped_rules = progress.skipped;
        report.action_failures = progress.failures;
        report.cancelled_early = progress.cancelled_early;
        report.timed_out = timed_out;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::record_evaluation(self.details.stage().as_str(), report.outcome(), elapsed_ms);
        debug!(
            "Request {} {}: {} after {} matched rule(s)",
            self.details.request_id(),
            self.details.url(),
            report.outcome(),
            report.matched_rules.len()
        );

        self.transition(EvaluationState::Done);
        report
    }

    /// Evaluate and hand the report to `finish`, which runs exactly once.
    pub async fn run_with<F>(self, response: BlockingResponse, finish: F)
    where
        F: FnOnce(EvaluationReport),
    {
        finish(self.run(response).await);
    }

    async fn walk(&self, response: &mut BlockingResponse, progress: &mut Progress) {
        let total = self.snapshot.len();
        for (index, rule) in self.snapshot.iter().enumerate() {
            if response.is_terminal() {
                progress.cancelled_early = true;
                break;
            }
            if !rule.matches(&self.details, response) {
                continue;
            }
            if !self.ctx.host.is_registrant_active(rule.registrant()).await {
                debug!(
                    "Skipping rule {}: registrant {} is inactive",
                    rule.id(),
                    rule.registrant()
                );
                metrics::record_rule_skipped(rule.registrant().as_str());
                progress.skipped.push(rule.id());
                continue;
            }

            debug!(
                "Rule {} of {} matched request {}",
                rule.id(),
                rule.registrant(),
                self.details.request_id()
            );
            metrics::record_rule_match(rule.registrant().as_str());
            progress.matched.push(rule.id());
            progress.failures += rule.apply(response, &self.details, &self.ctx).await;

            if response.is_terminal() {
                progress.cancelled_early = index + 1 < total;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryHost;
    use crate::host::{ExtensionHost, NoOpHost};
    use crate::rule::{Rule, RuleDefinition};
    use serde_json::json;

    fn snapshot(rules: Vec<serde_json::Value>) -> RuleSnapshot {
        let rules = rules
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let definition: RuleDefinition = serde_json::from_value(value).unwrap();
                let mut rule = Rule::compile(&definition).unwrap();
                rule.id = RuleId(i as u64 + 1);
                Arc::new(rule)
            })
            .collect();
        Arc::new(rules)
    }

    fn evaluator(snapshot: RuleSnapshot, host: Arc<dyn ExtensionHost>) -> RequestEvaluator {
        let details = Arc::new(RequestDetails::parse("https://ads.example/x").unwrap());
        RequestEvaluator::new(
            details,
            snapshot,
            ActionContext::new(host, Duration::from_millis(100)),
        )
    }

    fn ads_rule(action: serde_json::Value) -> serde_json::Value {
        json!({
            "registrant": "ext",
            "conditions": [{"urlFilter": {"urlContains": "ads"}}],
            "actions": [action]
        })
    }

    #[tokio::test]
    async fn test_cancel_short_circuits_later_rules() {
        let rules = snapshot(vec![
            ads_rule(json!({"type": "cancelRequest"})),
            ads_rule(json!({"type": "redirectRequest", "redirectUrl": "https://safe.example"})),
        ]);
        let report = evaluator(rules, Arc::new(NoOpHost))
            .run(BlockingResponse::new())
            .await;

        assert!(report.response.is_cancelled());
        assert!(report.response.redirect_url().is_none());
        assert_eq!(report.matched_rules, vec![RuleId(1)]);
        assert!(report.cancelled_early);
        assert_eq!(report.outcome(), "cancelled");
    }

    #[tokio::test]
    async fn test_later_rule_sees_earlier_mutation() {
        let rules = snapshot(vec![
            ads_rule(json!({"type": "redirectRequest", "redirectUrl": "https://safe.example/"})),
            json!({
                "registrant": "ext",
                "conditions": [{"responseState": {"redirected": true}}],
                "actions": [{"type": "redirectToEmptyDocument"}]
            }),
        ]);
        let report = evaluator(rules, Arc::new(NoOpHost))
            .run(BlockingResponse::new())
            .await;

        assert_eq!(report.matched_rules, vec![RuleId(1), RuleId(2)]);
        assert!(report.response.synthetic().is_some());
        assert!(!report.cancelled_early);
    }

    #[tokio::test]
    async fn test_no_match_is_passthrough() {
        let rules = snapshot(vec![json!({
            "registrant": "ext",
            "conditions": [{"urlFilter": {"hostEquals": "tracker.example"}}],
            "actions": [{"type": "cancelRequest"}]
        })]);
        let report = evaluator(rules, Arc::new(NoOpHost))
            .run(BlockingResponse::new())
            .await;
        assert!(report.response.is_passthrough());
        assert!(report.matched_rules.is_empty());
        assert_eq!(report.outcome(), "passthrough");
    }

    #[tokio::test]
    async fn test_inactive_registrant_skipped() {
        let host = Arc::new(InMemoryHost::new());
        host.disable("ext");
        let rules = snapshot(vec![ads_rule(json!({"type": "cancelRequest"}))]);

        let report = evaluator(rules, host).run(BlockingResponse::new()).await;
        assert!(!report.response.is_cancelled());
        assert_eq!(report.skipped_rules, vec![RuleId(1)]);
    }

    #[tokio::test]
    async fn test_failed_action_does_not_abort_evaluation() {
        let host = Arc::new(InMemoryHost::new());
        host.fail_with("broken", "script error");
        let rules = snapshot(vec![
            ads_rule(json!({
                "type": "listener",
                "callbackId": "broken",
                "stage": "onBeforeRequest",
                "blocking": true
            })),
            ads_rule(json!({"type": "redirectRequest", "redirectUrl": "https://safe.example/"})),
        ]);

        let report = evaluator(rules, host).run(BlockingResponse::new()).await;
        assert_eq!(report.action_failures, 1);
        assert_eq!(report.response.redirect_url(), Some("https://safe.example/"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluation_timeout_keeps_partial_response() {
        let host = Arc::new(InMemoryHost::new());
        host.respond_after("slow", Some(json!({"cancel": true})), Duration::from_secs(30));
        let rules = snapshot(vec![
            ads_rule(json!({"type": "redirectRequest", "redirectUrl": "https://safe.example/"})),
            ads_rule(json!({
                "type": "listener",
                "callbackId": "slow",
                "stage": "onBeforeRequest",
                "blocking": true
            })),
        ]);
        let details = Arc::new(RequestDetails::parse("https://ads.example/x").unwrap());
        let report = RequestEvaluator::new(
            details,
            rules,
            ActionContext::new(host, Duration::from_secs(60)),
        )
        .with_evaluation_timeout(Some(Duration::from_secs(1)))
        .run(BlockingResponse::new())
        .await;

        assert!(report.timed_out);
        assert!(!report.response.is_cancelled());
        assert_eq!(report.response.redirect_url(), Some("https://safe.example/"));
        assert_eq!(report.matched_rules, vec![RuleId(1), RuleId(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rule_cut_short_by_deadline_is_reported() {
        let host = Arc::new(InMemoryHost::new());
        host.respond_after("slow", None, Duration::from_secs(30));
        let rules = snapshot(vec![json!({
            "registrant": "ext",
            "actions": [
                {"type": "redirectToEmptyDocument"},
                {"type": "listener", "callbackId": "slow", "stage": "onBeforeRequest", "blocking": true}
            ]
        })]);
        let details = Arc::new(RequestDetails::parse("https://ads.example/x").unwrap());
        let report = RequestEvaluator::new(
            details,
            rules,
            ActionContext::new(host, Duration::from_secs(60)),
        )
        .with_evaluation_timeout(Some(Duration::from_secs(1)))
        .run(BlockingResponse::new())
        .await;

        assert!(report.timed_out);
        assert!(report.response.synthetic().is_some());
        assert_eq!(report.matched_rules, vec![RuleId(1)]);
    }

    #[tokio::test]
    async fn test_run_with_invokes_finish_once() {
        let rules = snapshot(vec![ads_rule(json!({"type": "cancelRequest"}))]);
        let mut calls = 0;
        evaluator(rules, Arc::new(NoOpHost))
            .run_with(BlockingResponse::new(), |report| {
                calls += 1;
                assert!(report.response.is_cancelled());
            })
            .await;
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_initial_state_is_idle() {
        let e = evaluator(snapshot(vec![]), Arc::new(NoOpHost));
        assert_eq!(e.state(), EvaluationState::Idle);
    }
}
