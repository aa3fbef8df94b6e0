use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::Classifier;
use crate::error::ClassifierError;
use crate::prompt;
use crate::schema::{ClassificationRequest, ClassifierResponse};

/// Classifier backed by a local Ollama server.
#[derive(Clone)]
pub struct OllamaClassifier {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    format: String, // "json" for structured output
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

impl Default for OllamaClassifier {
    fn default() -> Self {
        Self::new(
            "http://localhost:11434".to_string(),
            "llama3.2:3b".to_string(),
        )
    }
}

impl OllamaClassifier {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
        }
    }

    /// Use a client with a connect timeout. Request deadlines are enforced
    /// by the pipeline.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Result<Self, ClassifierError> {
        self.client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()?;
        Ok(self)
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check the server is reachable and has the configured model pulled.
    pub async fn check_model(&self) -> Result<bool, ClassifierError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ClassifierError::Status(response.status().as_u16()));
        }

        let tags: TagsResponse = serde_json::from_str(&response.text().await?)?;
        let installed = tags.models.iter().any(|m| m.name == self.model);
        if installed {
            info!(model = %self.model, "Ollama model available");
        } else {
            let names: Vec<_> = tags.models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                model = %self.model,
                installed = ?names,
                "Ollama model not installed, run `ollama pull {}`",
                self.model
            );
        }
        Ok(installed)
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, ClassifierError> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            format: "json".to_string(), // Force JSON output
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(ClassifierError::Status(response.status().as_u16()));
        }

        // a body that is not an Ollama envelope is a bad answer, not a transport fault
        let ollama_response: OllamaResponse = serde_json::from_str(&response.text().await?)?;

        Ok(ollama_response.response)
    }

    /// Generate and validate; an invalid answer gets one repair round trip.
    pub async fn generate_validated(&self, prompt: &str) -> Result<ClassifierResponse, ClassifierError> {
        let response = self.generate(prompt).await?;

        match ClassifierResponse::parse(&response) {
            Ok(parsed) => Ok(parsed),
            Err(err) => {
                debug!(error = %err, "Invalid classifier JSON, asking for a fix");
                let corrected = self.generate(&prompt::build_retry_prompt(&response)).await?;
                ClassifierResponse::parse(&corrected)
            }
        }
    }
}

#[async_trait]
impl Classifier for OllamaClassifier {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassifierResponse, ClassifierError> {
        debug!(block = %request.block_identifier, model = %self.model, "Calling Ollama");
        let prompt = prompt::build_classification_prompt(request);
        self.generate_validated(&prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::GeometryKind;

    use crate::test_server::{http_client, serve};

    fn generate_body(inner: &str) -> String {
        serde_json::json!({ "response": inner }).to_string()
    }

    fn client(url: String, model: &str) -> OllamaClassifier {
        OllamaClassifier::new(url, model.to_string()).with_client(http_client())
    }

    fn request() -> ClassificationRequest {
        ClassificationRequest {
            block_identifier: "PARK_일반".to_string(),
            geometry_kind: GeometryKind::ClosedPolyline,
            area: 12_500_000.0,
            vertex_count: 4,
            neighboring_identifiers: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_classify_parses_model_output() {
        let (url, mut requests) = serve(vec![(
            200,
            generate_body(r#"{"category":"parking","type":"basic","confidence":0.9,"reasoning":"PARK"}"#),
        )])
        .await;

        let client = client(url, "test");
        let response = client.classify(&request()).await.unwrap();
        assert_eq!(response.category(), "parking");
        assert_eq!(response.kind(), "basic");

        let sent = requests.recv().await.unwrap();
        assert!(sent.starts_with("POST /api/generate"));
        assert!(sent.contains(r#""format":"json""#));
    }

    #[tokio::test]
    async fn test_invalid_json_gets_one_repair() {
        let (url, _requests) = serve(vec![
            (200, generate_body(r#"{"category":"parking""#)),
            (
                200,
                generate_body(r#"{"category":"parking","type":"basic","confidence":0.8,"reasoning":"fixed"}"#),
            ),
        ])
        .await;

        let client = client(url, "test");
        let response = client.classify(&request()).await.unwrap();
        assert_eq!(response.confidence(), 0.8);
    }

    #[tokio::test]
    async fn test_server_error_is_status() {
        let (url, _requests) = serve(vec![(500, "{}".to_string())]).await;

        let client = client(url, "test");
        let err = client.classify(&request()).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Status(500)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unexpected_envelope_is_not_retried() {
        let (url, _requests) = serve(vec![(200, r#"{"error":"model busy"}"#.to_string())]).await;

        let client = client(url, "test");
        let err = client.classify(&request()).await.unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidResponse(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_check_model() {
        let (url, _requests) = serve(vec![(
            200,
            r#"{"models":[{"name":"llama3.2:3b"},{"name":"qwen2.5:7b"}]}"#.to_string(),
        )])
        .await;

        let client = client(url, "qwen2.5:7b");
        assert_eq!(client.model(), "qwen2.5:7b");
        assert!(client.check_model().await.unwrap());
    }

    #[test]
    fn test_default_points_at_local_server() {
        assert_eq!(OllamaClassifier::default().model(), "llama3.2:3b");
    }
}
