use thiserror::Error;

/// Errors a single delivery target can end in.
///
/// Everything except `UnexpectedResponse` is handled locally: the target is
/// recorded and logged, and the task carries on with the remaining targets.
/// `UnexpectedResponse` is surfaced to the scheduler so it can decide on a
/// retry.
#[derive(Debug, Error)]
pub enum AddonError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Rejected with status {status}: {reason}")]
    Rejected { status: u16, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected response from {addon}: status={status}, body={body}")]
    UnexpectedResponse {
        addon: String,
        status: u16,
        body: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AddonError {
    /// Whether the error must be surfaced to the external retry layer.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AddonError::UnexpectedResponse { .. })
    }
}
