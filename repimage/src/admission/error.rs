//! Admission error types.

use thiserror::Error;

use super::review::GroupVersionResource;

/// Errors turned into a denial-carrying admission response.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// Request body is not an AdmissionReview.
    #[error("failed to decode admission review: {0}")]
    Envelope(#[source] serde_json::Error),

    /// AdmissionReview without a request.
    #[error("admission review has no request")]
    MissingRequest,

    /// Webhook was called for something other than pods.
    #[error("expect resource to be {expected}, got {actual}")]
    UnexpectedResource {
        expected: GroupVersionResource,
        actual: GroupVersionResource,
    },

    /// Request carries no object to mutate.
    #[error("admission request has no object")]
    MissingObject,

    /// Object is not a decodable Pod.
    #[error("failed to decode pod: {0}")]
    Decode(#[source] serde_json::Error),

    /// Mutated spec could not be serialized into a patch.
    #[error("failed to encode patch: {0}")]
    PatchEncode(#[source] serde_json::Error),
}

impl AdmissionError {
    /// HTTP-style status code reported in the response status.
    pub fn code(&self) -> u16 {
        match self {
            AdmissionError::PatchEncode(_) => 500,
            _ => 400,
        }
    }
}

/// Result type for admission operations.
pub type Result<T> = std::result::Result<T, AdmissionError>;
