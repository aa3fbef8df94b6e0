use async_trait::async_trait;

use crate::error::ClassifierError;
use crate::schema::{ClassificationRequest, ClassifierResponse};

/// An external labeller for block entities.
///
/// Implementations only answer; caching, retries, timeouts, statistics and
/// fallback are handled by [`crate::ClassificationPipeline`].
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassifierResponse, ClassifierError>;
}
