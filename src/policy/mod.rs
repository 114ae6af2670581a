//! Stateless interception policy (§4.7): decides continue/fail for each
//! intercepted request given the primary document's host.

use serde_json::Value;

use crate::session::InterceptOutcome;

/// Resource types blocked regardless of domain, when enabled.
const FONT_RESOURCE_TYPE: &str = "Font";

#[derive(Debug, Clone)]
pub struct PolicyFilter {
    block_fonts: bool,
    allowed_domains: Option<Vec<String>>,
}

impl PolicyFilter {
    #[must_use]
    pub fn new(block_fonts: bool, allowed_domains: Option<Vec<String>>) -> Self {
        Self {
            block_fonts,
            allowed_domains,
        }
    }

    /// Decides continue/fail for one `Network.requestIntercepted` event's
    /// params. `main_url` is the primary navigation URL; its host is always
    /// allowed regardless of the allow-list.
    #[must_use]
    pub fn decide(&self, main_url: &str, params: &Value) -> InterceptOutcome {
        let is_main_document = params
            .get("isNavigationRequest")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if is_main_document {
            return InterceptOutcome::Continue;
        }

        let request_url = params
            .get("request")
            .and_then(|r| r.get("url"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        if let Some(allowed) = &self.allowed_domains {
            let main_host = host_of(main_url);
            let request_host = host_of(request_url);
            if !request_host.is_empty()
                && request_host != main_host
                && !allowed.iter().any(|suffix| host_matches(&request_host, suffix))
            {
                return InterceptOutcome::Fail;
            }
        }

        if self.block_fonts {
            let resource_type = params.get("resourceType").and_then(Value::as_str);
            if resource_type == Some(FONT_RESOURCE_TYPE) {
                return InterceptOutcome::Fail;
            }
        }

        InterceptOutcome::Continue
    }
}

/// Extracts the host from a URL, or an empty string if it has none or
/// doesn't parse. Shared by the pre-acquisition host check and the
/// per-subresource interception decision.
#[must_use]
pub fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Suffix match: `host` is allowed by `suffix` if equal, or `host` ends with
/// `.{suffix}` so subdomains of an allowed domain are permitted.
fn host_matches(host: &str, suffix: &str) -> bool {
    host == suffix || host.ends_with(&format!(".{suffix}"))
}

/// Whether `host` is allowed to be rendered at all, independent of any
/// per-subresource filtering. `None` means no allow-list is configured and
/// every host is allowed. Used before any pool acquisition or CDP traffic:
/// a request for a disallowed host is rejected outright (§8), rather than
/// merely having its subresources blocked the way [`PolicyFilter::decide`]
/// does once a session is already driving the page.
#[must_use]
pub fn is_host_allowed(host: &str, allowed_domains: Option<&[String]>) -> bool {
    match allowed_domains {
        Some(allowed) => allowed.iter().any(|suffix| host_matches(host, suffix)),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn main_document_always_continues() {
        let filter = PolicyFilter::new(true, Some(vec!["example.com".to_string()]));
        let params = json!({ "isNavigationRequest": true, "request": { "url": "https://evil.test/" } });
        assert_eq!(filter.decide("https://example.com", &params), InterceptOutcome::Continue);
    }

    #[test]
    fn blocks_disallowed_domain() {
        let filter = PolicyFilter::new(false, Some(vec!["example.com".to_string()]));
        let params = json!({
            "isNavigationRequest": false,
            "request": { "url": "https://tracker.test/pixel.gif" },
            "resourceType": "Image",
        });
        assert_eq!(filter.decide("https://example.com", &params), InterceptOutcome::Fail);
    }

    #[test]
    fn allows_subdomain_of_allowed_suffix() {
        let filter = PolicyFilter::new(false, Some(vec!["example.com".to_string()]));
        let params = json!({
            "isNavigationRequest": false,
            "request": { "url": "https://cdn.example.com/app.js" },
            "resourceType": "Script",
        });
        assert_eq!(filter.decide("https://example.com", &params), InterceptOutcome::Continue);
    }

    #[test]
    fn blocks_fonts_when_enabled() {
        let filter = PolicyFilter::new(true, None);
        let params = json!({
            "isNavigationRequest": false,
            "request": { "url": "https://example.com/font.woff2" },
            "resourceType": "Font",
        });
        assert_eq!(filter.decide("https://example.com", &params), InterceptOutcome::Fail);
    }

    #[test]
    fn is_host_allowed_rejects_domain_outside_the_allow_list() {
        let allowed = vec!["allowed.example".to_string()];
        assert!(!is_host_allowed("blocked.example", Some(&allowed)));
        assert!(is_host_allowed("allowed.example", Some(&allowed)));
        assert!(is_host_allowed("sub.allowed.example", Some(&allowed)));
    }

    #[test]
    fn is_host_allowed_permits_anything_with_no_allow_list() {
        assert!(is_host_allowed("anywhere.test", None));
    }

    #[test]
    fn allows_everything_with_no_restrictions() {
        let filter = PolicyFilter::new(false, None);
        let params = json!({
            "isNavigationRequest": false,
            "request": { "url": "https://anywhere.test/x" },
            "resourceType": "XHR",
        });
        assert_eq!(filter.decide("https://example.com", &params), InterceptOutcome::Continue);
    }
}
