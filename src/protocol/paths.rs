//! Negotiation endpoint paths.
//!
//! Inbound patterns are regular expressions matched by the callback endpoint
//! against the full request path. Outbound helpers join a base URL with the
//! path for a given process id.

/// Provider → consumer offer (harness as consumer)
pub const NEGOTIATIONS_OFFER_PATH: &str = "/negotiations/[^/]+/offers/";
/// Provider → consumer agreement (harness as consumer)
pub const NEGOTIATIONS_AGREEMENT_PATH: &str = "/negotiations/[^/]+/agreement";
/// Termination from either side
pub const NEGOTIATIONS_TERMINATION_PATH: &str = "/negotiations/[^/]+/termination/";
/// Negotiation events (ACCEPTED towards providers, FINALIZED towards consumers)
pub const NEGOTIATION_EVENT_PATH: &str = "/negotiations/[^/]+/events";
/// Consumer → provider initial request (harness as provider)
pub const NEGOTIATIONS_REQUEST_PATH: &str = "/negotiations/request";
/// Consumer → provider counter request (harness as provider)
pub const NEGOTIATIONS_COUNTER_REQUEST_PATH: &str = "/negotiations/[^/]+/request";
/// Consumer → provider agreement verification (harness as provider)
pub const NEGOTIATIONS_VERIFICATION_PATH: &str = "/negotiations/[^/]+/agreement/verification";

fn join(base: &str, path: &str) -> String {
    format!("{}{path}", base.trim_end_matches('/'))
}

/// `{base}/negotiations/request`
pub fn request_url(base: &str) -> String {
    join(base, "/negotiations/request")
}

/// `{base}/negotiations/{id}/request`
pub fn counter_request_url(base: &str, id: &str) -> String {
    join(base, &format!("/negotiations/{id}/request"))
}

/// `{base}/negotiations/{id}/events`
pub fn events_url(base: &str, id: &str) -> String {
    join(base, &format!("/negotiations/{id}/events"))
}

/// `{base}/negotiations/{id}/agreement/verification`
pub fn verification_url(base: &str, id: &str) -> String {
    join(base, &format!("/negotiations/{id}/agreement/verification"))
}

/// `{base}/negotiations/{id}/termination`, with the trailing slash the
/// provider side uses when `trailing_slash` is set
pub fn termination_url(base: &str, id: &str, trailing_slash: bool) -> String {
    let slash = if trailing_slash { "/" } else { "" };
    join(base, &format!("/negotiations/{id}/termination{slash}"))
}

/// `{base}/negotiations/offers`
pub fn initial_offer_url(base: &str) -> String {
    join(base, "/negotiations/offers")
}

/// `{base}/negotiations/{id}/offers/`
pub fn offer_url(base: &str, id: &str) -> String {
    join(base, &format!("/negotiations/{id}/offers/"))
}

/// `{base}/negotiations/{id}/agreement`
pub fn agreement_url(base: &str, id: &str) -> String {
    join(base, &format!("/negotiations/{id}/agreement"))
}

/// `{base}/negotiations/{id}`
pub fn negotiation_url(base: &str, id: &str) -> String {
    join(base, &format!("/negotiations/{id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        assert_eq!(request_url("http://p/"), "http://p/negotiations/request");
        assert_eq!(
            verification_url("http://p/dsp", "42"),
            "http://p/dsp/negotiations/42/agreement/verification"
        );
        assert_eq!(
            termination_url("http://p", "42", false),
            "http://p/negotiations/42/termination"
        );
        assert_eq!(
            termination_url("http://c", "7", true),
            "http://c/negotiations/7/termination/"
        );
        assert_eq!(offer_url("http://c", "7"), "http://c/negotiations/7/offers/");
        assert_eq!(negotiation_url("http://p", "42"), "http://p/negotiations/42");
    }
}
