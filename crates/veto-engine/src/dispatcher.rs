//! WebRequestDispatcher - the per-process entry point of the engine.
//!
//! Owns the rule registry and the extension host. Whoever intercepts
//! network requests holds one dispatcher (usually behind an `Arc`), calls
//! the stage entry points for every request and `shutdown` when the
//! session ends.

use crate::bundle;
use crate::config::{Config, EngineConfig};
use crate::error::RuleError;
use crate::evaluator::{EvaluationReport, RequestEvaluator};
use crate::host::{ExtensionHost, HostError};
use crate::registry::RuleRegistry;
use crate::request::{CallbackId, Headers, RegistrantId, RequestDetails, Stage};
use crate::response::BlockingResponse;
use crate::rule::{ActionContext, ListenerSubscription, Rule, RuleDefinition, RuleId};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

/// Request headers `webRequest` listeners never get to see or set.
pub const HIDDEN_REQUEST_HEADERS: &[&str] = &[
    "Authorization",
    "Cache-Control",
    "Connection",
    "Content-Length",
    "Host",
    "If-Modified-Since",
    "If-None-Match",
    "If-Range",
    "Partial-Data",
    "Pragma",
    "Proxy-Authorization",
    "Proxy-Connection",
    "Transfer-Encoding",
];

pub struct WebRequestDispatcher {
    config: EngineConfig,
    host: Arc<dyn ExtensionHost>,
    registry: RuleRegistry,
    shut_down: AtomicBool,
}

impl WebRequestDispatcher {
    pub fn new(config: EngineConfig, host: Arc<dyn ExtensionHost>) -> Self {
        info!(
            "Dispatcher started (action timeout {}ms, evaluation timeout {:?})",
            config.action_timeout_ms, config.evaluation_timeout_ms
        );
        Self {
            config,
            host,
            registry: RuleRegistry::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Create a dispatcher and register the rules and listeners of `config`.
    pub fn from_config(config: &Config, host: Arc<dyn ExtensionHost>) -> anyhow::Result<Self> {
        let dispatcher = Self::new(config.engine.clone(), host);
        let rules = config.compile_rules()?;
        let count = rules.len();
        dispatcher.registry.add_all(rules)?;
        info!("Loaded {} rule(s) from configuration", count);
        Ok(dispatcher)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<(), RuleError> {
        if self.is_shut_down() {
            return Err(RuleError::ShutDown);
        }
        Ok(())
    }

    /// Compile and register one rule.
    pub fn register_rule(&self, definition: &RuleDefinition) -> Result<RuleId, RuleError> {
        self.ensure_running()?;
        let rule = Rule::compile(definition)?;
        let id = self.registry.add(rule)?;
        info!(
            "Registered rule {} for registrant {}",
            id, definition.registrant
        );
        Ok(id)
    }

    /// Compile and register several rules; if one is rejected none is registered.
    pub fn register_rules(&self, definitions: &[RuleDefinition]) -> Result<Vec<RuleId>, RuleError> {
        self.ensure_running()?;
        let rules = definitions
            .iter()
            .map(Rule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        let ids = self.registry.add_all(rules)?;
        info!("Registered {} rule(s)", ids.len());
        Ok(ids)
    }

    /// `webRequest.<stage>.addListener`.
    pub fn add_listener(&self, subscription: &ListenerSubscription) -> Result<RuleId, RuleError> {
        self.ensure_running()?;
        let id = self.registry.add(subscription.compile()?)?;
        info!(
            "Registered {} listener {} for registrant {}",
            subscription.stage, subscription.callback_id, subscription.registrant
        );
        Ok(id)
    }

    /// Remove the rule owning `callback_id`. Unknown ids are a no-op.
    pub fn unregister_rule(&self, callback_id: &CallbackId) -> bool {
        match self.registry.remove_by_callback_id(callback_id) {
            Some(rule) => {
                info!("Unregistered rule {} ({})", rule.id(), callback_id);
                true
            }
            None => {
                debug!("Nothing registered under callback id {}", callback_id);
                false
            }
        }
    }

    /// Remove every rule of a disabled or uninstalled registrant.
    pub fn unregister_all_for_registrant(&self, registrant: &RegistrantId) -> usize {
        self.registry.remove_all_for_registrant(registrant)
    }

    fn evaluator(&self, details: RequestDetails) -> RequestEvaluator {
        let ctx = ActionContext::new(Arc::clone(&self.host), self.config.action_timeout());
        RequestEvaluator::new(Arc::new(details), self.registry.snapshot(), ctx)
            .with_evaluation_timeout(self.config.evaluation_timeout())
    }

    /// Evaluate a request and return the full report.
    pub async fn evaluate_with_report(&self, details: RequestDetails) -> EvaluationReport {
        // After shutdown the registry is empty, so this passes through
        self.evaluator(details).run(BlockingResponse::new()).await
    }

    pub async fn evaluate(&self, details: RequestDetails) -> BlockingResponse {
        self.evaluate_with_report(details).await.response
    }

    /// Evaluate on the runtime and call `completion` once with the response.
    pub fn evaluate_detached<F>(&self, details: RequestDetails, completion: F) -> JoinHandle<()>
    where
        F: FnOnce(BlockingResponse) + Send + 'static,
    {
        let evaluator = self.evaluator(details);
        tokio::spawn(async move {
            evaluator
                .run_with(BlockingResponse::new(), |report| completion(report.response))
                .await;
        })
    }

    pub async fn on_before_request(&self, details: RequestDetails) -> BlockingResponse {
        self.evaluate(details.with_stage(Stage::OnBeforeRequest))
            .await
    }

    /// Evaluate the send-headers stage.
    ///
    /// `cookie_headers` (from the cookie store) are merged into the request
    /// headers, then headers listeners may not see are stripped from the
    /// merged set.
    pub async fn on_before_send_headers(
        &self,
        details: RequestDetails,
        cookie_headers: Headers,
    ) -> BlockingResponse {
        let mut headers = details.request_headers().cloned().unwrap_or_default();
        for (name, value) in cookie_headers.iter() {
            headers.insert(name, value);
        }
        for name in HIDDEN_REQUEST_HEADERS {
            headers.remove(name);
        }
        let details = details
            .with_request_headers(headers)
            .with_stage(Stage::OnBeforeSendHeaders);
        self.evaluate(details).await
    }

    pub async fn on_headers_received(&self, details: RequestDetails) -> BlockingResponse {
        self.evaluate(details.with_stage(Stage::OnHeadersReceived))
            .await
    }

    /// Load a `chrome-extension://` URL from the owning registrant's bundle.
    pub async fn load_bundle_resource(&self, url: &Url) -> Result<Bytes, HostError> {
        let Some(registrant) = bundle::registrant_of(url) else {
            return Err(HostError::NotFound {
                registrant: RegistrantId::new(url.host_str().unwrap_or_default()),
                path: url.path().to_string(),
            });
        };
        self.host.fetch_bundle_resource(&registrant, url.path()).await
    }

    /// Tear down: drop every rule and refuse new registrations.
    ///
    /// Evaluations already running keep their snapshot and finish normally.
    /// A registration racing with shutdown is either dropped with the rest
    /// or refused; it never survives.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let count = self.registry.close();
        info!("Dispatcher shut down, dropped {} rule(s)", count);
    }
}
