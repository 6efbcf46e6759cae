//! Truncation errors.
//!
//! Always recovered by [`ContextWindowManager`](crate::ContextWindowManager):
//! it logs the error and hands back the unmodified list.

/// Internal truncation failure.
#[derive(Debug, thiserror::Error)]
pub enum TruncationError {
    /// A computed cut index fell outside the list.
    #[error("cut index {cut} out of range for {len} messages")]
    CutOutOfRange {
        /// Computed index.
        cut: usize,
        /// List length.
        len: usize,
    },
    /// Summing token counts overflowed.
    #[error("token total overflowed while budgeting")]
    TokenOverflow,
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, TruncationError>;
