//! Rule actions: what happens to a request once a rule matched.

use crate::error::RuleError;
use crate::host::{ExtensionHost, HostError};
use crate::request::{CallbackId, RegistrantId, RequestDetails, Stage};
use crate::response::{BlockingResponse, ListenerResult, SyntheticResponse};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Callback used for `sendMessageToExtension` when none is named.
pub const DEFAULT_MESSAGE_CALLBACK: &str = "runtime.onMessage";

/// Options a `webRequest` listener subscribes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtraInfo {
    Blocking,
    RequestHeaders,
    ResponseHeaders,
}

/// Action configuration as registrants submit it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionDefinition {
    CancelRequest,
    #[serde(rename_all = "camelCase")]
    RedirectRequest {
        redirect_url: String,
    },
    RedirectToEmptyDocument,
    #[serde(rename_all = "camelCase")]
    SendMessageToExtension {
        #[serde(default)]
        message: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        callback_id: Option<CallbackId>,
    },
    #[serde(rename_all = "camelCase")]
    Listener {
        callback_id: CallbackId,
        stage: Stage,
        #[serde(default)]
        blocking: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        extra_info: Vec<ExtraInfo>,
    },
}

/// An action that failed for one request. Logged and treated as a no-op.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionFailure {
    #[error("Callback '{callback_id}' did not answer within {timeout:?}")]
    Timeout {
        callback_id: CallbackId,
        timeout: Duration,
    },
    #[error("Registrant '{0}' is unavailable")]
    RegistrantUnavailable(RegistrantId),
    #[error(transparent)]
    Callback(HostError),
    #[error("Malformed result from callback '{callback_id}': {reason}")]
    MalformedResult {
        callback_id: CallbackId,
        reason: String,
    },
}

impl ActionFailure {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionFailure::Timeout { .. } => "timeout",
            ActionFailure::RegistrantUnavailable(_) => "registrant_unavailable",
            ActionFailure::Callback(_) => "callback",
            ActionFailure::MalformedResult { .. } => "malformed_result",
        }
    }
}

impl From<HostError> for ActionFailure {
    fn from(err: HostError) -> Self {
        match err {
            HostError::RegistrantUnavailable(registrant) => {
                ActionFailure::RegistrantUnavailable(registrant)
            }
            other => ActionFailure::Callback(other),
        }
    }
}

/// What an action needs from the outside world while it runs.
#[derive(Clone)]
pub struct ActionContext {
    pub host: Arc<dyn ExtensionHost>,
    /// Upper bound for one callback round-trip
    pub action_timeout: Duration,
}

impl ActionContext {
    pub fn new(host: Arc<dyn ExtensionHost>, action_timeout: Duration) -> Self {
        Self {
            host,
            action_timeout,
        }
    }
}

/// A `webRequest` listener bound to a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerAction {
    pub callback_id: CallbackId,
    pub stage: Stage,
    pub blocking: bool,
    pub include_request_headers: bool,
    pub include_response_headers: bool,
}

/// Compiled action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Cancel,
    Redirect(Url),
    RedirectToEmptyDocument,
    SendMessage {
        message: Value,
        callback_id: CallbackId,
    },
    Listener(ListenerAction),
}

impl Action {
    pub fn compile(definition: &ActionDefinition) -> Result<Self, RuleError> {
        let action = match definition {
            ActionDefinition::CancelRequest => Action::Cancel,
            ActionDefinition::RedirectRequest { redirect_url } => {
                let url = Url::parse(redirect_url).map_err(|e| RuleError::InvalidRedirect {
                    url: redirect_url.clone(),
                    reason: e.to_string(),
                })?;
                Action::Redirect(url)
            }
            ActionDefinition::RedirectToEmptyDocument => Action::RedirectToEmptyDocument,
            ActionDefinition::SendMessageToExtension {
                message,
                callback_id,
            } => Action::SendMessage {
                message: message.clone(),
                callback_id: callback_id
                    .clone()
                    .unwrap_or_else(|| CallbackId::new(DEFAULT_MESSAGE_CALLBACK)),
            },
            ActionDefinition::Listener {
                callback_id,
                stage,
                blocking,
                extra_info,
            } => Action::Listener(ListenerAction {
                callback_id: callback_id.clone(),
                stage: *stage,
                blocking: *blocking || extra_info.contains(&ExtraInfo::Blocking),
                include_request_headers: extra_info.contains(&ExtraInfo::RequestHeaders),
                include_response_headers: extra_info.contains(&ExtraInfo::ResponseHeaders),
            }),
        };
        Ok(action)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Cancel => "cancelRequest",
            Action::Redirect(_) => "redirectRequest",
            Action::RedirectToEmptyDocument => "redirectToEmptyDocument",
            Action::SendMessage { .. } => "sendMessageToExtension",
            Action::Listener(_) => "listener",
        }
    }

    /// Callback id that identifies this action for targeted removal.
    ///
    /// Only listeners own their callback; message callbacks are shared
    /// between rules of the same registrant.
    pub fn owned_callback_id(&self) -> Option<&CallbackId> {
        match self {
            Action::Listener(listener) => Some(&listener.callback_id),
            _ => None,
        }
    }

    /// Apply the action to `response`.
    ///
    /// Declarative actions complete immediately. Blocking listeners suspend
    /// until the registrant answers or `ctx.action_timeout` elapses; the
    /// response is only touched once the reply is in, so a timed-out or
    /// failed round-trip leaves it unchanged.
    pub async fn apply(
        &self,
        response: &mut BlockingResponse,
        details: &Arc<RequestDetails>,
        registrant: &RegistrantId,
        ctx: &ActionContext,
    ) -> Result<(), ActionFailure> {
        match self {
            Action::Cancel => {
                response.cancel();
                Ok(())
            }
            Action::Redirect(url) => {
                response.set_redirect_url(url.as_str());
                Ok(())
            }
            Action::RedirectToEmptyDocument => {
                response.set_synthetic(SyntheticResponse::empty_document());
                Ok(())
            }
            Action::SendMessage {
                message,
                callback_id,
            } => {
                let payload = json!({
                    "message": message,
                    "details": details.listener_payload(false, false),
                });
                notify(ctx, registrant, callback_id, payload);
                Ok(())
            }
            Action::Listener(listener) => {
                let payload = details.listener_payload(
                    listener.include_request_headers,
                    listener.include_response_headers,
                );
                if !listener.blocking {
                    notify(ctx, registrant, &listener.callback_id, payload);
                    return Ok(());
                }

                let reply = tokio::time::timeout(
                    ctx.action_timeout,
                    ctx.host
                        .deliver_callback(registrant, &listener.callback_id, payload),
                )
                .await
                .map_err(|_| ActionFailure::Timeout {
                    callback_id: listener.callback_id.clone(),
                    timeout: ctx.action_timeout,
                })??;

                match reply {
                    None | Some(Value::Null) => Ok(()),
                    Some(value) => {
                        let result: ListenerResult =
                            serde_json::from_value(value).map_err(|e| {
                                ActionFailure::MalformedResult {
                                    callback_id: listener.callback_id.clone(),
                                    reason: e.to_string(),
                                }
                            })?;
                        response.merge_listener_result(listener.stage, result);
                        Ok(())
                    }
                }
            }
        }
    }
}

/// Fire-and-forget delivery. The evaluation never waits for it, but the
/// delivery task itself is bounded by `ctx.action_timeout`.
fn notify(ctx: &ActionContext, registrant: &RegistrantId, callback_id: &CallbackId, payload: Value) {
    let host = Arc::clone(&ctx.host);
    let timeout = ctx.action_timeout;
    let registrant = registrant.clone();
    let callback_id = callback_id.clone();
    tokio::spawn(async move {
        let delivery = host.deliver_callback(&registrant, &callback_id, payload);
        match tokio::time::timeout(timeout, delivery).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!(
                "Notification to {}/{} was not delivered: {}",
                registrant, callback_id, e
            ),
            Err(_) => debug!(
                "Notification to {}/{} abandoned after {:?}",
                registrant, callback_id, timeout
            ),
        }
    });
}
