//! Shared User-Agent string for outbound HTTP clients.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/bookfetch";

/// Default User-Agent for file transfers and bypass proxy calls.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("bookfetch/{version} (+{PROJECT_UA_URL})")
}
