use thiserror::Error;

/// Failures talking to an ArcGIS feature service.
#[derive(Error, Debug)]
pub enum FeatureServiceError {
    #[error("Feature service request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an `{"error": ...}` document, e.g. for an invalid `where` clause.
    #[error("Feature service error {code}: {message} {details:?}")]
    Service {
        code: i64,
        message: String,
        details: Vec<String>,
    },

    #[error("Malformed feature service response: {message}")]
    MalformedResponse { message: String },

    #[error("Incomplete record set: expected {expected} features, received {received}")]
    IncompleteRecordSet { expected: usize, received: usize },
}

pub type Result<T> = std::result::Result<T, FeatureServiceError>;
