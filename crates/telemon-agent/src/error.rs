use reqwest::StatusCode;

/// Errors raised while delivering one batch to the server.
///
/// Every variant is final for its batch: the worker logs it and moves on.
///
/// # Examples
///
/// ```rust
/// use reqwest::StatusCode;
/// use telemon_agent::error::DeliveryError;
///
/// let err = DeliveryError::Exhausted { attempts: 4, status: StatusCode::BAD_GATEWAY };
/// assert!(err.to_string().contains("4 attempts"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The batch could not be serialized to JSON.
    #[error("Delivery: failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),

    /// Gzip compression of the request body failed.
    #[error("Delivery: failed to compress batch: {0}")]
    Compress(#[from] std::io::Error),

    /// The request never produced a response (connect, TLS, timeout).
    #[error("Delivery: transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a status that is not worth retrying.
    #[error("Delivery: server rejected batch with status {0}")]
    Status(StatusCode),

    /// Every attempt ended in a retryable gateway status.
    #[error("Delivery: gave up after {attempts} attempts, last status {status}")]
    Exhausted { attempts: u32, status: StatusCode },

    /// Shutdown was requested while the batch was in flight or backing off.
    #[error("Delivery: cancelled")]
    Cancelled,
}

/// Convenience `Result` alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;
