use std::sync::Arc;
use std::time::{Duration, Instant};

use extract::{Classification, ClassificationMethod, ExtractedEntity};
use futures::future::join_all;
use geometry::Point;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::classifier::Classifier;
use crate::config::ClassifyConfig;
use crate::context::{CallOutcome, RunContext};
use crate::error::ClassifierError;
use crate::retry::RetryPolicy;
use crate::schema::{ClassificationRequest, ClassifierResponse};

/// Turns extracted entities into classifications.
///
/// Per entity: cache lookup, then at most one classifier call per block name
/// per run, then fallback if that call fails. Never returns an error.
pub struct ClassificationPipeline {
    classifier: Arc<dyn Classifier>,
    retry: RetryPolicy,
    request_timeout: Duration,
    max_neighbors: usize,
    permits: Semaphore,
}

impl ClassificationPipeline {
    pub fn new(classifier: Arc<dyn Classifier>, config: &ClassifyConfig) -> Self {
        Self {
            classifier,
            retry: RetryPolicy::from(&config.retry),
            request_timeout: config.concurrency.request_timeout(),
            max_neighbors: config.max_neighbors,
            permits: Semaphore::new(config.concurrency.max_concurrent_calls.max(1)),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Classify one entity. `neighbors` are nearby block names for context.
    pub async fn classify(
        &self,
        ctx: &RunContext,
        entity: &ExtractedEntity,
        neighbors: Vec<String>,
    ) -> Classification {
        self.classify_request(ctx, request_for(entity, neighbors)).await
    }

    /// Classify every entity concurrently. The output has the same length and
    /// order as `entities`. The cache is flushed before returning, including
    /// when the run was cancelled part way.
    pub async fn batch_classify(
        &self,
        ctx: &RunContext,
        entities: &[ExtractedEntity],
    ) -> Vec<Classification> {
        info!(
            run_id = %ctx.run_id,
            entities = entities.len(),
            classifier = self.classifier.name(),
            "Classifying entities"
        );

        let centers: Vec<Point> = entities.iter().map(ExtractedEntity::center).collect();
        let jobs = entities.iter().enumerate().map(|(index, entity)| {
            let neighbors = nearby_identifiers(entities, &centers, index, self.max_neighbors);
            self.classify_request(ctx, request_for(entity, neighbors))
        });
        let classifications = join_all(jobs).await;

        self.flush(ctx).await;

        let stats = ctx.stats.snapshot();
        info!(
            run_id = %ctx.run_id,
            total = stats.total_requests,
            cache_hits = stats.cache_hits,
            api_calls = stats.api_calls,
            errors = stats.errors,
            cancelled = ctx.is_cancelled(),
            "Classification finished"
        );

        classifications
    }

    /// [`Self::batch_classify`] and attach each result to its entity.
    pub async fn classify_entities(&self, ctx: &RunContext, entities: &mut [ExtractedEntity]) {
        let classifications = self.batch_classify(ctx, entities).await;
        for (entity, classification) in entities.iter_mut().zip(classifications) {
            entity.classification = Some(classification);
        }
    }

    async fn classify_request(
        &self,
        ctx: &RunContext,
        request: ClassificationRequest,
    ) -> Classification {
        ctx.stats.record_request();

        let classification = self.resolve(ctx, request).await;

        if classification.is_fallback() {
            ctx.stats.record_error();
        }
        ctx.stats.record_category(&classification.category);
        classification
    }

    async fn resolve(&self, ctx: &RunContext, request: ClassificationRequest) -> Classification {
        let key = request.block_identifier.clone();

        if ctx.is_cancelled() {
            return Classification::fallback("cancelled before classification");
        }

        if let Some(hit) = ctx.cache.get(&key) {
            debug!(block = %key, "Cache hit");
            ctx.stats.record_cache_hit();
            return hit;
        }

        let slot = ctx.call_slot(&key);
        let mut initiated = false;
        let outcome = slot
            .get_or_init(|| {
                initiated = true;
                self.call(ctx, &request)
            })
            .await
            .clone();

        match outcome {
            Ok(classification) if initiated => {
                if ctx.cache.set(&key, &classification) {
                    self.flush(ctx).await;
                }
                classification
            }
            Ok(classification) => {
                // another entity with this name made the call
                ctx.stats.record_cache_hit();
                Classification {
                    method: ClassificationMethod::Cached,
                    ..classification
                }
            }
            Err(reason) => Classification::fallback(reason),
        }
    }

    async fn call(&self, ctx: &RunContext, request: &ClassificationRequest) -> CallOutcome {
        let attempt = async {
            let Ok(_permit) = self.permits.acquire().await else {
                return Err(ClassifierError::Cancelled);
            };
            // counted on dispatch so a call cut short by cancellation still shows
            ctx.stats.record_api_call();

            let started = Instant::now();
            let result = self
                .retry
                .retry_if("classify", ClassifierError::is_retryable, || {
                    self.call_once(request)
                })
                .await;
            ctx.stats.record_call_time(started.elapsed());
            result
        };

        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(ClassifierError::Cancelled),
            result = attempt => result,
        };

        match result {
            Ok(response) => {
                debug!(
                    block = %request.block_identifier,
                    category = response.category(),
                    kind = response.kind(),
                    confidence = response.confidence(),
                    "Classified"
                );
                Ok(response.into_classification(ClassificationMethod::Classified))
            }
            Err(e) => {
                warn!(
                    block = %request.block_identifier,
                    classifier = self.classifier.name(),
                    error = %e,
                    "Classification failed, using fallback"
                );
                Err(format!("classification failed: {}", e))
            }
        }
    }

    async fn call_once(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassifierResponse, ClassifierError> {
        match tokio::time::timeout(self.request_timeout, self.classifier.classify(request)).await {
            Ok(result) => result,
            Err(_) => Err(ClassifierError::Timeout(self.request_timeout)),
        }
    }

    async fn flush(&self, ctx: &RunContext) {
        if let Err(e) = ctx.cache.flush().await {
            warn!(error = %e, "Cache flush failed, results kept in memory");
        }
    }
}

fn request_for(entity: &ExtractedEntity, neighbors: Vec<String>) -> ClassificationRequest {
    ClassificationRequest {
        block_identifier: entity.block_name.clone(),
        geometry_kind: entity.geometry_kind,
        area: entity.area,
        vertex_count: entity.vertex_count(),
        neighboring_identifiers: neighbors,
    }
}

/// Distinct names of the other blocks closest to `entities[index]`, nearest
/// first, excluding its own name.
pub fn nearby_identifiers(
    entities: &[ExtractedEntity],
    centers: &[Point],
    index: usize,
    limit: usize,
) -> Vec<String> {
    if limit == 0 {
        return Vec::new();
    }

    let own = entities[index].block_name.as_str();
    let origin = centers[index];

    let mut others: Vec<(f64, &str)> = entities
        .iter()
        .zip(centers)
        .filter(|(e, _)| e.block_name != own)
        .map(|(e, c)| (c.distance(&origin), e.block_name.as_str()))
        .collect();
    others.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut names: Vec<String> = Vec::new();
    for (_, name) in others {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
            if names.len() == limit {
                break;
            }
        }
    }
    names
}
