//! Request rule-matching and blocking-response engine.
//!
//! Registrants (browser extensions, or anything acting like one) register
//! rules: condition trees over request attributes bound to actions such as
//! cancel, redirect or a `webRequest` listener round-trip. For each
//! intercepted request the [`WebRequestDispatcher`] evaluates a snapshot of
//! the registered rules in order and folds their actions into a single
//! [`BlockingResponse`].

pub mod backends;
pub mod bundle;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod host;
pub mod metrics;
pub mod predicate;
pub mod registry;
pub mod request;
pub mod response;
pub mod rule;

pub use dispatcher::WebRequestDispatcher;
pub use error::{PatternError, RuleError};
pub use evaluator::{EvaluationReport, EvaluationState, RequestEvaluator};
pub use host::{ExtensionHost, HostError, NoOpHost};
pub use registry::{RuleRegistry, RuleSnapshot};
pub use request::{CallbackId, Headers, RegistrantId, RequestDetails, ResourceType, Stage};
pub use response::{BlockingResponse, ListenerResult, SyntheticResponse};
pub use rule::{ListenerSubscription, Rule, RuleDefinition, RuleId};
