//! Identity resolution: turn a contact email into store records.
//!
//! Two shapes share the same rules: credentials are read fresh before any request, failures
//! are converted to a user-facing [`ResolveError`] at the view, and results from a request
//! that is no longer current are discarded.

mod detail;
mod search;

use crate::config::{Credentials, CredentialsProvider};

pub use detail::{CustomerRecord, DetailState, DetailView, Resolution};
pub use search::{SearchAccumulator, SearchOutcome, SearchPhase, SearchTicket, SearchView};

const SETTINGS_HINT: &str = "check the store URL, key and secret in your settings";

/// Resolution failures as shown to the agent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// One or more store credentials are not configured. No request was made.
    #[error("store credentials are not configured")]
    ConfigurationMissing,
    /// Detail lookup failed at the customer or the order step.
    #[error("customer lookup failed: {0}")]
    SearchFailed(String),
    #[error("store returned HTTP {status}")]
    Http { status: u16 },
    #[error("search failed: {0}")]
    Unknown(String),
}

impl ResolveError {
    /// Message for the agent, with a pointer to the settings for anything config-related.
    pub fn user_message(&self) -> String {
        format!("{}; {}", self, SETTINGS_HINT)
    }
}

fn require_credentials(provider: &dyn CredentialsProvider) -> Result<Credentials, ResolveError> {
    provider.credentials().ok_or_else(|| {
        log::warn!("resolve: store credentials not configured");
        ResolveError::ConfigurationMissing
    })
}
