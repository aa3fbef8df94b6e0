use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use classify::{BackendConfig, ClassifyConfig, OperationMode};
use extract::WalkerConfig;
use serde::{Deserialize, Serialize};

use crate::layers::LayerSchema;

pub const CONFIG_ENV: &str = "BLOCKLABEL_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Decoded block graph (JSON).
    pub input: PathBuf,
    /// Classified entities are written here.
    pub output: PathBuf,
    pub walker: WalkerConfig,
    pub classify: ClassifyConfig,
    pub layers: LayerSchema,
    /// Cancel the run after this long; completed work is still written.
    pub run_timeout_secs: Option<u64>,
    /// Drop every cached record before classifying.
    pub clear_cache: bool,
    /// Move the output so the lowest vertex coordinates sit at the origin.
    pub normalize: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("block_graph.json"),
            output: PathBuf::from("classified_entities.json"),
            walker: WalkerConfig::default(),
            classify: ClassifyConfig::default(),
            layers: LayerSchema::default(),
            run_timeout_secs: None,
            clear_cache: false,
            normalize: false,
        }
    }
}

impl AppConfig {
    /// Defaults, then the JSON file named by `BLOCKLABEL_CONFIG`, then
    /// individual `BLOCKLABEL_*` variables.
    pub fn load() -> Result<Self> {
        let file = match std::env::var(CONFIG_ENV) {
            Ok(path) => Some(
                std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path))?,
            ),
            Err(_) => None,
        };
        Self::from_sources(file.as_deref(), |key| std::env::var(key).ok())
    }

    pub fn from_sources(
        file: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config: Self = match file {
            Some(text) => serde_json::from_str(text).context("Invalid config file")?,
            None => Self::default(),
        };

        if let Some(mode) = env("BLOCKLABEL_MODE") {
            let mode: OperationMode = match mode.parse() {
                Ok(mode) => mode,
                Err(e) => bail!("BLOCKLABEL_MODE: {}", e),
            };
            config.classify.apply_mode(mode);
        }
        if let Some(name) = env("BLOCKLABEL_BACKEND") {
            let Some(backend) = BackendConfig::named(&name) else {
                bail!("Unknown BLOCKLABEL_BACKEND '{}'", name);
            };
            config.classify.backend = backend;
        }
        if env("BLOCKLABEL_OFFLINE").is_some_and(|v| is_truthy(&v)) {
            config.classify.backend = BackendConfig::Rules;
        }
        if let Some(model) = env("BLOCKLABEL_MODEL") {
            config.classify.backend.set_model(model);
        }
        config.classify.backend.fill_api_key(&env);
        if let Some(input) = env("BLOCKLABEL_INPUT") {
            config.input = PathBuf::from(input);
        }
        if let Some(output) = env("BLOCKLABEL_OUTPUT") {
            config.output = PathBuf::from(output);
        }
        if let Some(path) = env("BLOCKLABEL_CACHE") {
            config.classify.cache.path = PathBuf::from(path);
        }
        if env("BLOCKLABEL_CLEAR_CACHE").is_some_and(|v| is_truthy(&v)) {
            config.clear_cache = true;
        }
        if env("BLOCKLABEL_NORMALIZE").is_some_and(|v| is_truthy(&v)) {
            config.normalize = true;
        }
        if let Some(secs) = env("BLOCKLABEL_TIMEOUT_SECS") {
            let secs = secs
                .parse()
                .with_context(|| format!("BLOCKLABEL_TIMEOUT_SECS is not a number: {}", secs))?;
            config.run_timeout_secs = Some(secs);
        }

        Ok(config)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "yes")
}
