//! Outbound collaborators of the engine.
//!
//! The engine never talks to an extension runtime directly. Everything that
//! crosses into a registrant's script context (bundle resources, callback
//! round-trips, enable/disable state) goes through an [`ExtensionHost`].

use crate::request::{CallbackId, RegistrantId};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

/// Errors reported by an [`ExtensionHost`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("Resource '{path}' not found in bundle of '{registrant}'")]
    NotFound {
        registrant: RegistrantId,
        path: String,
    },
    #[error("Registrant '{0}' is unavailable")]
    RegistrantUnavailable(RegistrantId),
    #[error("Callback '{callback_id}' failed: {reason}")]
    Callback {
        callback_id: CallbackId,
        reason: String,
    },
}

/// Bridge to the registrants (extensions) owning rules.
///
/// Implementations must be cheap to share: the dispatcher holds one behind
/// an `Arc` and every in-flight evaluation uses it concurrently.
#[async_trait]
pub trait ExtensionHost: Send + Sync {
    /// Fetch a file from a registrant's bundle.
    async fn fetch_bundle_resource(
        &self,
        registrant: &RegistrantId,
        path: &str,
    ) -> Result<Bytes, HostError>;

    /// Deliver a payload to a registrant callback and wait for its reply.
    ///
    /// `Ok(None)` means the callback returned nothing.
    async fn deliver_callback(
        &self,
        registrant: &RegistrantId,
        callback_id: &CallbackId,
        payload: Value,
    ) -> Result<Option<Value>, HostError>;

    /// Whether rules of this registrant should still fire.
    async fn is_registrant_active(&self, registrant: &RegistrantId) -> bool;
}

/// Host without any registrant runtime attached.
///
/// Every registrant is active, bundles are empty and callbacks return nothing,
/// so only purely declarative actions have an effect.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHost;

#[async_trait]
impl ExtensionHost for NoOpHost {
    async fn fetch_bundle_resource(
        &self,
        registrant: &RegistrantId,
        path: &str,
    ) -> Result<Bytes, HostError> {
        Err(HostError::NotFound {
            registrant: registrant.clone(),
            path: path.to_string(),
        })
    }

    async fn deliver_callback(
        &self,
        _registrant: &RegistrantId,
        callback_id: &CallbackId,
        _payload: Value,
    ) -> Result<Option<Value>, HostError> {
        tracing::trace!("NoOpHost: dropping delivery to callback {}", callback_id);
        Ok(None)
    }

    async fn is_registrant_active(&self, _registrant: &RegistrantId) -> bool {
        true
    }
}
