//! Transform-level error type.

use thiserror::Error;

/// Errors raised while talking to the LLM backend.
///
/// These never cross the [`StepTransform`](crate::StepTransform) boundary as
/// errors: implementations render them into
/// [`TransformOutcome::error`](crate::TransformOutcome) via `Display`.
#[derive(Debug, Error)]
pub enum TransformError {
    /// No API key was configured; the client is the disabled sentinel.
    #[error("Gemini not configured: set GEMINI_API_KEY")]
    NotConfigured,

    /// The request never produced a response (connect, timeout, TLS, …).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Gemini API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("invalid Gemini response: {0}")]
    Decode(String),

    /// The model answered but produced no text.
    #[error("Gemini returned empty response")]
    EmptyResponse,
}
