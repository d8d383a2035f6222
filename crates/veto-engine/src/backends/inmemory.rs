use crate::host::{ExtensionHost, HostError};
use crate::request::{CallbackId, RegistrantId};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Scripted reply of one callback.
#[derive(Debug, Clone)]
enum Reply {
    Value(Option<Value>),
    Fail(String),
}

#[derive(Debug, Clone)]
struct Responder {
    reply: Reply,
    latency: Option<Duration>,
}

/// One payload handed to a registrant callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub registrant: RegistrantId,
    pub callback_id: CallbackId,
    pub payload: Value,
}

/// In-memory implementation of ExtensionHost
///
/// Bundle resources live in a map, callback replies are scripted per callback
/// id (optionally delayed), and every delivery is logged. Useful for tests,
/// the CLI and embedding without a script runtime.
#[derive(Debug, Default)]
pub struct InMemoryHost {
    resources: RwLock<HashMap<(RegistrantId, String), Bytes>>,
    responders: RwLock<HashMap<CallbackId, Responder>>,
    disabled: RwLock<HashSet<RegistrantId>>,
    deliveries: Mutex<Vec<Delivery>>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bundle resource. Paths are stored with a leading `/`.
    pub fn insert_resource(
        &self,
        registrant: impl Into<RegistrantId>,
        path: &str,
        body: impl Into<Bytes>,
    ) {
        self.resources
            .write()
            .insert((registrant.into(), normalize_path(path)), body.into());
    }

    /// Reply to `callback_id` with `reply` (`None` for an empty reply).
    pub fn respond_with(&self, callback_id: impl Into<CallbackId>, reply: Option<Value>) {
        self.set_responder(callback_id.into(), Reply::Value(reply), None);
    }

    /// Reply to `callback_id` after `latency` has elapsed.
    pub fn respond_after(
        &self,
        callback_id: impl Into<CallbackId>,
        reply: Option<Value>,
        latency: Duration,
    ) {
        self.set_responder(callback_id.into(), Reply::Value(reply), Some(latency));
    }

    /// Make every delivery to `callback_id` fail.
    pub fn fail_with(&self, callback_id: impl Into<CallbackId>, reason: impl Into<String>) {
        self.set_responder(callback_id.into(), Reply::Fail(reason.into()), None);
    }

    fn set_responder(&self, callback_id: CallbackId, reply: Reply, latency: Option<Duration>) {
        self.responders
            .write()
            .insert(callback_id, Responder { reply, latency });
    }

    pub fn disable(&self, registrant: impl Into<RegistrantId>) {
        self.disabled.write().insert(registrant.into());
    }

    pub fn enable(&self, registrant: &RegistrantId) {
        self.disabled.write().remove(registrant);
    }

    /// All deliveries so far, oldest first.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn deliveries_to(&self, callback_id: &CallbackId) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .iter()
            .filter(|d| &d.callback_id == callback_id)
            .cloned()
            .collect()
    }

    fn is_disabled(&self, registrant: &RegistrantId) -> bool {
        self.disabled.read().contains(registrant)
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[async_trait]
impl ExtensionHost for InMemoryHost {
    async fn fetch_bundle_resource(
        &self,
        registrant: &RegistrantId,
        path: &str,
    ) -> Result<Bytes, HostError> {
        if self.is_disabled(registrant) {
            return Err(HostError::RegistrantUnavailable(registrant.clone()));
        }
        let key = (registrant.clone(), normalize_path(path));
        self.resources
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| HostError::NotFound {
                registrant: registrant.clone(),
                path: path.to_string(),
            })
    }

    async fn deliver_callback(
        &self,
        registrant: &RegistrantId,
        callback_id: &CallbackId,
        payload: Value,
    ) -> Result<Option<Value>, HostError> {
        if self.is_disabled(registrant) {
            return Err(HostError::RegistrantUnavailable(registrant.clone()));
        }

        self.deliveries.lock().push(Delivery {
            registrant: registrant.clone(),
            callback_id: callback_id.clone(),
            payload,
        });

        // Clone out so no lock is held across the await
        let responder = self.responders.read().get(callback_id).cloned();
        let Some(responder) = responder else {
            return Ok(None);
        };

        if let Some(latency) = responder.latency {
            tokio::time::sleep(latency).await;
        }

        match responder.reply {
            Reply::Value(value) => Ok(value),
            Reply::Fail(reason) => Err(HostError::Callback {
                callback_id: callback_id.clone(),
                reason,
            }),
        }
    }

    async fn is_registrant_active(&self, registrant: &RegistrantId) -> bool {
        !self.is_disabled(registrant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_resources_with_and_without_leading_slash() {
        let host = InMemoryHost::new();
        host.insert_resource("ext", "blank.html", "<html></html>");

        let body = host
            .fetch_bundle_resource(&"ext".into(), "/blank.html")
            .await
            .unwrap();
        assert_eq!(body, Bytes::from_static(b"<html></html>"));

        assert!(host
            .fetch_bundle_resource(&"other".into(), "/blank.html")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_scripted_replies_and_delivery_log() {
        let host = InMemoryHost::new();
        host.respond_with("cb-1", Some(json!({"cancel": true})));
        host.fail_with("cb-2", "script threw");

        let reply = host
            .deliver_callback(&"ext".into(), &"cb-1".into(), json!({"n": 1}))
            .await
            .unwrap();
        assert_eq!(reply, Some(json!({"cancel": true})));

        let err = host
            .deliver_callback(&"ext".into(), &"cb-2".into(), json!({"n": 2}))
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Callback { .. }));

        // Unknown callbacks answer with nothing but are still logged
        let reply = host
            .deliver_callback(&"ext".into(), &"cb-3".into(), json!({"n": 3}))
            .await
            .unwrap();
        assert!(reply.is_none());

        assert_eq!(host.deliveries().len(), 3);
        assert_eq!(host.deliveries_to(&"cb-2".into())[0].payload, json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_disabled_registrant() {
        let host = InMemoryHost::new();
        host.disable("ext");
        assert!(!host.is_registrant_active(&"ext".into()).await);

        let err = host
            .deliver_callback(&"ext".into(), &"cb".into(), json!(null))
            .await
            .unwrap_err();
        assert_eq!(err, HostError::RegistrantUnavailable("ext".into()));
        assert!(host.deliveries().is_empty());

        host.enable(&"ext".into());
        assert!(host.is_registrant_active(&"ext".into()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_applied() {
        let host = InMemoryHost::new();
        host.respond_after("slow", Some(json!({})), Duration::from_secs(2));

        let start = tokio::time::Instant::now();
        host.deliver_callback(&"ext".into(), &"slow".into(), json!(null))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
