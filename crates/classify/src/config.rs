use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::hosted;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    pub mode: OperationMode,
    pub backend: BackendConfig,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    /// Nearby block names sent along with each request.
    pub max_neighbors: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Fast,      // More parallel calls, short timeouts
    Accurate,  // Cache off, every block asked fresh
    Balanced,  // Default: cache on, moderate parallelism
}

impl FromStr for OperationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(Self::Fast),
            "accurate" => Ok(Self::Accurate),
            "balanced" => Ok(Self::Balanced),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// Which classifier answers. Hosted backends take their key from here or,
/// when absent, from `ANTHROPIC_API_KEY` / `OPENAI_API_KEY`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Ollama {
        base_url: String,
        model: String,
    },
    Anthropic {
        #[serde(default = "default_anthropic_url")]
        base_url: String,
        #[serde(default = "default_anthropic_model")]
        model: String,
        #[serde(default, skip_serializing)]
        api_key: Option<String>,
    },
    OpenAi {
        #[serde(default = "default_openai_url")]
        base_url: String,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default, skip_serializing)]
        api_key: Option<String>,
    },
    Rules,
}

fn default_anthropic_url() -> String {
    hosted::ANTHROPIC_BASE_URL.to_string()
}

fn default_anthropic_model() -> String {
    hosted::ANTHROPIC_MODEL.to_string()
}

fn default_openai_url() -> String {
    hosted::OPENAI_BASE_URL.to_string()
}

fn default_openai_model() -> String {
    hosted::OPENAI_MODEL.to_string()
}

impl BackendConfig {
    pub fn ollama() -> Self {
        Self::Ollama {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
        }
    }

    pub fn anthropic() -> Self {
        Self::Anthropic {
            base_url: default_anthropic_url(),
            model: default_anthropic_model(),
            api_key: None,
        }
    }

    pub fn openai() -> Self {
        Self::OpenAi {
            base_url: default_openai_url(),
            model: default_openai_model(),
            api_key: None,
        }
    }

    /// Backend by name: `ollama`, `anthropic`, `openai` or `rules`.
    pub fn named(name: &str) -> Option<Self> {
        match name {
            "ollama" => Some(Self::ollama()),
            "anthropic" | "claude" => Some(Self::anthropic()),
            "openai" => Some(Self::openai()),
            "rules" => Some(Self::Rules),
            _ => None,
        }
    }

    /// Replace the model name; the rule table has none.
    pub fn set_model(&mut self, name: String) {
        match self {
            Self::Ollama { model, .. }
            | Self::Anthropic { model, .. }
            | Self::OpenAi { model, .. } => *model = name,
            Self::Rules => {}
        }
    }

    /// Environment variable holding the API key for hosted backends.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::Anthropic { .. } => Some("ANTHROPIC_API_KEY"),
            Self::OpenAi { .. } => Some("OPENAI_API_KEY"),
            Self::Ollama { .. } | Self::Rules => None,
        }
    }

    /// Fill a missing API key from `lookup`; keys already set win.
    pub fn fill_api_key(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let Some(var) = self.api_key_env() else {
            return;
        };
        if let Self::Anthropic { api_key, .. } | Self::OpenAi { api_key, .. } = self {
            if api_key.is_none() {
                *api_key = lookup(var).filter(|k| !k.is_empty());
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub max_concurrent_calls: usize,
    pub request_timeout_secs: u64,
}

impl ConcurrencyConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub path: PathBuf,
    /// Flush after this many new records; 0 flushes only at the end of a run.
    pub flush_every: usize,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            mode: OperationMode::Balanced,
            backend: BackendConfig::ollama(),
            concurrency: ConcurrencyConfig {
                max_concurrent_calls: 3,
                request_timeout_secs: 60,
            },
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff_ms: 1000,
                max_backoff_ms: 10000,
            },
            cache: CacheConfig {
                enabled: true,
                path: PathBuf::from(".layer_classification_cache.json"),
                flush_every: 25,
            },
            max_neighbors: 5,
        }
    }
}

impl ClassifyConfig {
    pub fn fast_mode() -> Self {
        let base = Self::default();
        Self {
            mode: OperationMode::Fast,
            concurrency: ConcurrencyConfig {
                max_concurrent_calls: 8,
                request_timeout_secs: 30,
            },
            retry: RetryConfig {
                max_retries: 1,
                initial_backoff_ms: 500,
                max_backoff_ms: 5000,
            },
            ..base
        }
    }

    pub fn accurate_mode() -> Self {
        let base = Self::default();
        Self {
            mode: OperationMode::Accurate,
            concurrency: ConcurrencyConfig {
                max_concurrent_calls: 2,
                request_timeout_secs: 120,
            },
            retry: RetryConfig {
                max_retries: 4,
                initial_backoff_ms: 2000,
                max_backoff_ms: 20000,
            },
            cache: CacheConfig {
                enabled: false,
                ..base.cache.clone()
            },
            ..base
        }
    }

    pub fn preset(mode: OperationMode) -> Self {
        match mode {
            OperationMode::Fast => Self::fast_mode(),
            OperationMode::Accurate => Self::accurate_mode(),
            OperationMode::Balanced => Self::default(),
        }
    }

    /// Switch to `mode`, taking only what the mode governs from its preset:
    /// concurrency, retries and whether the cache is used. Backend, cache
    /// location, flush cadence and neighbour count stay as configured.
    pub fn apply_mode(&mut self, mode: OperationMode) {
        let preset = Self::preset(mode);
        self.mode = preset.mode;
        self.concurrency = preset.concurrency;
        self.retry = preset.retry;
        self.cache.enabled = preset.cache.enabled;
    }

    /// Offline rule table instead of a model server.
    pub fn offline() -> Self {
        Self {
            backend: BackendConfig::Rules,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert!(ClassifyConfig::default().cache.enabled);
        assert!(!ClassifyConfig::accurate_mode().cache.enabled);
        assert_eq!(ClassifyConfig::fast_mode().mode, OperationMode::Fast);
        assert_eq!(ClassifyConfig::offline().backend, BackendConfig::Rules);
    }

    #[test]
    fn test_apply_mode_keeps_site_settings() {
        let mut config = ClassifyConfig::offline();
        config.cache.path = PathBuf::from("site_cache.json");
        config.cache.flush_every = 5;
        config.max_neighbors = 2;

        config.apply_mode(OperationMode::Accurate);

        assert_eq!(config.mode, OperationMode::Accurate);
        assert_eq!(config.concurrency.max_concurrent_calls, 2);
        assert_eq!(config.retry.max_retries, 4);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.path, PathBuf::from("site_cache.json"));
        assert_eq!(config.cache.flush_every, 5);
        assert_eq!(config.max_neighbors, 2);
        assert_eq!(config.backend, BackendConfig::Rules);
    }

    #[test]
    fn test_mode_names() {
        assert_eq!("fast".parse::<OperationMode>(), Ok(OperationMode::Fast));
        assert_eq!("balanced".parse::<OperationMode>(), Ok(OperationMode::Balanced));
        assert!("turbo".parse::<OperationMode>().is_err());
    }

    #[test]
    fn test_hosted_backend_from_json() {
        let backend: BackendConfig =
            serde_json::from_str(r#"{"kind": "anthropic"}"#).unwrap();
        assert_eq!(backend, BackendConfig::anthropic());

        let backend: BackendConfig =
            serde_json::from_str(r#"{"kind": "openai", "model": "gpt-4o", "api_key": "sk-1"}"#)
                .unwrap();
        assert!(matches!(
            &backend,
            BackendConfig::OpenAi { model, api_key: Some(key), .. } if model == "gpt-4o" && key == "sk-1"
        ));
        // keys are never written back out
        assert!(!serde_json::to_string(&backend).unwrap().contains("sk-1"));
    }

    #[test]
    fn test_fill_api_key() {
        let lookup = |var: &str| (var == "OPENAI_API_KEY").then(|| "sk-env".to_string());

        let mut openai = BackendConfig::openai();
        openai.fill_api_key(lookup);
        assert!(matches!(&openai, BackendConfig::OpenAi { api_key: Some(k), .. } if k == "sk-env"));

        let mut anthropic = BackendConfig::anthropic();
        anthropic.fill_api_key(lookup);
        assert!(matches!(&anthropic, BackendConfig::Anthropic { api_key: None, .. }));

        let mut rules = BackendConfig::Rules;
        rules.set_model("ignored".to_string());
        assert_eq!(rules, BackendConfig::Rules);
        assert_eq!(BackendConfig::named("claude"), Some(BackendConfig::anthropic()));
        assert_eq!(BackendConfig::named("gpt"), None);
    }

    #[test]
    fn test_round_trips_through_json() {
        let json = serde_json::to_string(&ClassifyConfig::default()).unwrap();
        let back: ClassifyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.concurrency.max_concurrent_calls, 3);
        assert_eq!(back.cache.path, PathBuf::from(".layer_classification_cache.json"));
    }
}
