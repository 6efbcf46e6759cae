//! The exact-counting seam.

use async_trait::async_trait;

use crate::errors::Result;
use crate::estimate::RoughEstimator;

/// Backend-specific token counter.
///
/// Implementations may suspend (a network round trip) and may fail; the
/// accountant caches successes and replaces failures with a rough estimate.
#[async_trait]
pub trait TokenCounter: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Count the tokens in `text`.
    async fn count(&self, text: &str) -> Result<u64>;
}

#[async_trait]
impl TokenCounter for RoughEstimator {
    fn name(&self) -> &str {
        "rough"
    }

    async fn count(&self, text: &str) -> Result<u64> {
        Ok(self.estimate(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CountError;
    use assert_matches::assert_matches;

    struct Offline;

    #[async_trait]
    impl TokenCounter for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        async fn count(&self, _text: &str) -> Result<u64> {
            Err(CountError::Unavailable {
                counter: self.name().to_owned(),
            })
        }
    }

    #[tokio::test]
    async fn rough_estimator_is_a_counter() {
        let counter: &dyn TokenCounter = &RoughEstimator::words();
        assert_eq!(counter.name(), "rough");
        assert_eq!(counter.count("one two three").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn failing_counter_reports_its_name() {
        let counter: &dyn TokenCounter = &Offline;
        assert_matches!(
            counter.count("hi").await,
            Err(CountError::Unavailable { counter }) if counter == "offline"
        );
    }
}
