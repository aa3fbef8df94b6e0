mod config;
mod layers;
mod output;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use classify::{
    AnthropicClassifier, BackendConfig, CacheStore, ClassificationPipeline, Classifier,
    OllamaClassifier, OpenAiClassifier, RuleClassifier, RunContext,
};
use classify::config::CacheConfig;
use extract::{BlockGraph, BlockWalker};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::output::RunReport;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load()?;
    run(config).await
}

/// `RUST_LOG` picks the filter; `BLOCKLABEL_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var("BLOCKLABEL_LOG_JSON").is_ok_and(|v| v == "1") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: AppConfig) -> Result<()> {
    let text = tokio::fs::read_to_string(&config.input)
        .await
        .with_context(|| format!("Failed to read block graph {}", config.input.display()))?;
    let graph = BlockGraph::from_json(&text).context("Failed to decode block graph")?;

    let traversal = BlockWalker::new(config.walker.clone())
        .traverse(&graph)
        .context("Block graph rejected")?;
    info!(
        entities = traversal.entities.len(),
        warnings = traversal.warnings.len(),
        "Extraction finished"
    );

    let cache = open_cache(&config.classify.cache, config.clear_cache).await;
    let classifier = build_classifier(&config.classify.backend).await?;
    let pipeline = ClassificationPipeline::new(classifier, &config.classify);

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(watch_for_cancel(cancel.clone(), config.run_timeout()));
    let ctx = RunContext::new(cache).with_cancellation(cancel);

    let mut entities = traversal.entities;
    pipeline.classify_entities(&ctx, &mut entities).await;
    watcher.abort();

    if config.normalize {
        if let Some(offset) = output::normalize_entities(&mut entities) {
            info!(x = offset.x, y = offset.y, "Normalized coordinates");
        }
    }

    let report = RunReport::new(&ctx, &entities, &traversal.warnings, &config.layers);
    output::write_report(&config.output, &report).await?;

    info!(
        run_id = %ctx.run_id,
        output = %config.output.display(),
        entities = entities.len(),
        cache_hit_rate = report.stats.cache_hit_rate,
        errors = report.stats.errors,
        cancelled = report.cancelled,
        "Run complete"
    );
    Ok(())
}

async fn open_cache(config: &CacheConfig, clear: bool) -> Arc<CacheStore> {
    if !config.enabled {
        info!("Cache disabled");
        return Arc::new(CacheStore::in_memory());
    }

    let cache = CacheStore::open(&config.path, config.flush_every).await;
    if clear {
        if let Err(e) = cache.clear().await {
            warn!(error = %e, "Failed to clear cache");
        }
    }
    info!(
        path = ?cache.path(),
        records = cache.stats().total,
        persistent = cache.is_persistent(),
        "Cache ready"
    );
    Arc::new(cache)
}

async fn build_classifier(backend: &BackendConfig) -> Result<Arc<dyn Classifier>> {
    let classifier: Arc<dyn Classifier> = match backend {
        BackendConfig::Ollama { base_url, model } => {
            let classifier = OllamaClassifier::new(base_url.clone(), model.clone());
            let classifier = match classifier.clone().with_connect_timeout(Duration::from_secs(5)) {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "Using default HTTP client");
                    classifier
                }
            };
            // unreachable servers still produce fallback labels
            if let Err(e) = classifier.check_model().await {
                warn!(base_url = %base_url, error = %e, "Ollama server not reachable");
            }
            info!(model = classifier.model(), "Using Ollama classifier");
            Arc::new(classifier)
        }
        BackendConfig::Anthropic {
            base_url,
            model,
            api_key,
        } => {
            let key = require_key(backend, api_key.as_deref())?;
            let classifier = AnthropicClassifier::new(key)
                .with_base_url(base_url.clone())
                .with_model(model.clone());
            info!(model = classifier.model(), "Using Anthropic classifier");
            Arc::new(classifier)
        }
        BackendConfig::OpenAi {
            base_url,
            model,
            api_key,
        } => {
            let key = require_key(backend, api_key.as_deref())?;
            let classifier = OpenAiClassifier::new(key)
                .with_base_url(base_url.clone())
                .with_model(model.clone());
            info!(model = classifier.model(), "Using OpenAI classifier");
            Arc::new(classifier)
        }
        BackendConfig::Rules => {
            let classifier = RuleClassifier::new();
            info!(rules = classifier.rule_count(), "Using offline rule classifier");
            Arc::new(classifier)
        }
    };
    Ok(classifier)
}

/// Hosted backends without a key would turn every block into a fallback.
fn require_key(backend: &BackendConfig, key: Option<&str>) -> Result<String> {
    match key {
        Some(key) => Ok(key.to_string()),
        None => bail!(
            "No API key: set {} or backend.api_key in the config file",
            backend.api_key_env().unwrap_or("an API key")
        ),
    }
}

/// Cancel on Ctrl-C or when the run timeout elapses.
async fn watch_for_cancel(cancel: CancellationToken, timeout: Option<Duration>) {
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                return;
            }
            warn!("Interrupted, finishing with completed classifications");
        }
        _ = deadline => {
            warn!(?timeout, "Run timeout reached, finishing with completed classifications");
        }
    }
    cancel.cancel();
}
