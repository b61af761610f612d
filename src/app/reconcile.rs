//! Collapsing a multiplexed response set into one outcome.

use crate::domain::{ERROR_PREFIX, ReconciledOutcome, ResponseSet, SubmissionOutcome};

/// Classify a response set by how many distinct entries it holds.
#[must_use]
pub fn reconcile(responses: &ResponseSet) -> ReconciledOutcome {
    match responses.first() {
        None => ReconciledOutcome::NoResults,
        Some(_) if responses.len() > 1 => ReconciledOutcome::Mixed,
        Some(entry) => match entry.strip_prefix(ERROR_PREFIX) {
            Some(message) => ReconciledOutcome::SingleError(message.to_string()),
            None => ReconciledOutcome::SingleSuccess(entry.to_string()),
        },
    }
}

impl From<ReconciledOutcome> for SubmissionOutcome {
    fn from(outcome: ReconciledOutcome) -> Self {
        match outcome {
            ReconciledOutcome::NoResults => Self::ServiceUnavailable,
            ReconciledOutcome::SingleError(message) => Self::Rejected(message),
            ReconciledOutcome::SingleSuccess(payload) => Self::Accepted(json_text(payload)),
            ReconciledOutcome::Mixed => Self::AmbiguousUpstream,
        }
    }
}

/// Unwrap a JSON string payload; anything else is returned as-is.
fn json_text(payload: String) -> String {
    serde_json::from_str::<String>(&payload).unwrap_or(payload)
}
