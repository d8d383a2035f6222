//! In-memory host setup, used when no real extension runtime is attached.

use crate::backends::InMemoryHost;
use crate::request::{CallbackId, RegistrantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BundleResource {
    pub registrant: RegistrantId,
    pub path: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct HostConfig {
    /// Scripted reply per callback id (`null` for an empty reply)
    #[serde(default)]
    pub responses: HashMap<CallbackId, Value>,
    #[serde(default)]
    pub disabled_registrants: Vec<RegistrantId>,
    #[serde(default)]
    pub resources: Vec<BundleResource>,
}

impl HostConfig {
    pub fn build(&self) -> InMemoryHost {
        let host = InMemoryHost::new();
        for (callback_id, reply) in &self.responses {
            let reply = (!reply.is_null()).then(|| reply.clone());
            host.respond_with(callback_id.clone(), reply);
        }
        for registrant in &self.disabled_registrants {
            host.disable(registrant.clone());
        }
        for resource in &self.resources {
            host.insert_resource(
                resource.registrant.clone(),
                &resource.path,
                resource.body.clone(),
            );
        }
        host
    }
}
