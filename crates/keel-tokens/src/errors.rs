//! Token counting errors.

/// Failure of an exact token counter.
///
/// Never escapes [`TokenAccountant`](crate::TokenAccountant); it degrades to
/// the rough estimate instead.
#[derive(Debug, thiserror::Error)]
pub enum CountError {
    /// The counter cannot be reached (missing credentials, no client).
    #[error("token counter `{counter}` unavailable")]
    Unavailable {
        /// Counter name.
        counter: String,
    },
    /// The counter answered with an error.
    #[error("token counter failed: {message}")]
    Backend {
        /// Error detail.
        message: String,
    },
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CountError>;
