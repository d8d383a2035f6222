//! Predicates over the blocking response accumulated so far.
//!
//! These let a later rule react to what earlier rules of the same evaluation
//! decided, e.g. only rewrite headers when nobody redirected the request.

use crate::response::BlockingResponse;
use serde::{Deserialize, Serialize};

/// Expected state of the blocking response. Every flag present must hold.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers_set: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers_set: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthetic: Option<bool>,
}

impl ResponseState {
    pub fn matches(&self, response: &BlockingResponse) -> bool {
        let checks = [
            (self.cancelled, response.is_cancelled()),
            (self.redirected, response.redirect_url().is_some()),
            (self.request_headers_set, response.request_headers().is_some()),
            (self.response_headers_set, response.response_headers().is_some()),
            (self.synthetic, response.synthetic().is_some()),
        ];
        checks
            .iter()
            .all(|(expected, actual)| expected.map_or(true, |e| e == *actual))
    }
}
