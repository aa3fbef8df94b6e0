pub mod cache;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod hosted;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod retry;
pub mod rules;
pub mod schema;
pub mod stats;

#[cfg(test)]
mod test_server;

pub use cache::{CacheRecord, CacheStats, CacheStore};
pub use classifier::Classifier;
pub use config::{BackendConfig, ClassifyConfig, OperationMode};
pub use context::RunContext;
pub use error::{CacheError, ClassifierError};
pub use hosted::{AnthropicClassifier, OpenAiClassifier};
pub use llm::OllamaClassifier;
pub use pipeline::{ClassificationPipeline, nearby_identifiers};
pub use retry::RetryPolicy;
pub use rules::RuleClassifier;
pub use schema::{ClassificationRequest, ClassifierResponse};
pub use stats::{ClassificationStats, StatsSnapshot};
