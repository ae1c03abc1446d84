use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Bad URN: {0}")]
    InvalidUrn(String),

    #[error("Wrong datasource: {0}")]
    WrongDatasource(String),

    #[error("Unknown feature type: {0}")]
    UnknownFeatureType(String),

    #[error("Unknown relationship: {feature_type}.{name}")]
    UnknownRelationship { feature_type: String, name: String },

    #[error("Not in a delta context")]
    NoDelta,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns a stable error code for this error variant.
    /// These codes are stable and can be used by clients for error classification.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidUrn(_) => "INVALID_URN",
            Error::WrongDatasource(_) => "WRONG_DATASOURCE",
            Error::UnknownFeatureType(_) => "UNKNOWN_FEATURE_TYPE",
            Error::UnknownRelationship { .. } => "UNKNOWN_RELATIONSHIP",
            Error::NoDelta => "NO_DELTA",
            Error::Store(_) => "STORE_ERROR",
            Error::Transaction(_) => "TRANSACTION_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true for failures of the backing store, which batched lookups
    /// log and skip rather than propagate.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, Error::Store(_) | Error::UnknownFeatureType(_))
    }

    /// Adds context to an error by wrapping it in an Internal error.
    ///
    /// # Examples
    ///
    /// ```
    /// use myworld_core::Error;
    ///
    /// let err = Error::Store("disk gone".into()).with_context("loading base record");
    /// assert_eq!(err.to_string(), "Internal error: loading base record: Store error: disk gone");
    /// ```
    pub fn with_context(self, context: &str) -> Error {
        Error::Internal(format!("{}: {}", context, self))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
