/// Validation failures raised while building or decoding a [`Metric`](crate::types::Metric).
///
/// These are always the caller's fault and are never retried.
///
/// # Examples
///
/// ```rust
/// use telemon_common::error::ModelError;
///
/// let err = ModelError::UnknownKind("histogram".to_string());
/// assert!(err.to_string().contains("histogram"));
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// The metric ID is empty.
    #[error("Model: metric id is empty")]
    EmptyId,

    /// The metric type is empty.
    #[error("Model: metric type is empty")]
    EmptyKind,

    /// The metric type is neither `gauge` nor `counter`.
    #[error("Model: unknown metric type '{0}'")]
    UnknownKind(String),

    /// The raw value could not be parsed as the numeric type required by the kind.
    #[error("Model: invalid {kind} value '{raw}'")]
    InvalidValue { kind: &'static str, raw: String },

    /// A wire record does not carry exactly the payload its kind requires.
    #[error("Model: {kind} metric '{id}' must carry only the '{field}' field")]
    PayloadMismatch {
        id: String,
        kind: &'static str,
        field: &'static str,
    },
}

/// Convenience `Result` alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
