//! `chrome-extension://<registrant>/<path>` resource URLs.

use crate::request::RegistrantId;
use url::Url;

pub const BUNDLE_SCHEME: &str = "chrome-extension";

pub fn is_bundle_resource(url: &Url) -> bool {
    url.scheme() == BUNDLE_SCHEME && url.host_str().is_some_and(|h| !h.is_empty())
}

/// The registrant whose bundle `url` points into.
pub fn registrant_of(url: &Url) -> Option<RegistrantId> {
    if !is_bundle_resource(url) {
        return None;
    }
    url.host_str().map(RegistrantId::from)
}

/// URL of `path` inside the bundle of `registrant`.
pub fn resource_url(path: &str, registrant: &RegistrantId) -> Result<Url, url::ParseError> {
    let path = path.trim_start_matches('/');
    Url::parse(&format!("{BUNDLE_SCHEME}://{registrant}/{path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_url_round_trip() {
        let registrant = RegistrantId::new("abcdefgh");
        let url = resource_url("blank.html", &registrant).unwrap();
        assert_eq!(url.as_str(), "chrome-extension://abcdefgh/blank.html");
        assert!(is_bundle_resource(&url));
        assert_eq!(registrant_of(&url), Some(registrant.clone()));

        let url = resource_url("/img/x.png", &registrant).unwrap();
        assert_eq!(url.path(), "/img/x.png");
    }

    #[test]
    fn test_other_schemes_are_not_bundle_resources() {
        let url = Url::parse("https://abcdefgh/blank.html").unwrap();
        assert!(!is_bundle_resource(&url));
        assert!(registrant_of(&url).is_none());
    }
}
