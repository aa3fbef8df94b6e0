//! Classifiers backed by paid hosted model APIs. Every call costs money,
//! which is what the cache in front of them is for.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::Classifier;
use crate::error::ClassifierError;
use crate::prompt;
use crate::schema::{ClassificationRequest, ClassifierResponse};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const OPENAI_MODEL: &str = "gpt-4o-mini";

/// Send `request` and decode a JSON body. Non-2xx is `Status`; a body that
/// does not decode is `InvalidResponse`, never a transport error.
async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, ClassifierError> {
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ClassifierError::Status(status.as_u16()));
    }

    Ok(serde_json::from_str(&response.text().await?)?)
}

// Anthropic Messages API

#[derive(Clone)]
pub struct AnthropicClassifier {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicClassifier {
    pub fn new(api_key: String) -> Self {
        Self {
            base_url: ANTHROPIC_BASE_URL.to_string(),
            model: ANTHROPIC_MODEL.to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn complete(&self, user_prompt: &str) -> Result<String, ClassifierError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: 1000,
            system: prompt::SYSTEM_PROMPT,
            messages: vec![ChatMessage {
                role: "user",
                content: user_prompt,
            }],
        };

        let response: MessagesResponse = send_json(
            self.client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body),
        )
        .await?;

        response
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| ClassifierError::InvalidResponse("no text block in reply".to_string()))
    }
}

#[async_trait]
impl Classifier for AnthropicClassifier {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassifierResponse, ClassifierError> {
        debug!(block = %request.block_identifier, model = %self.model, "Calling Anthropic");
        let text = self
            .complete(&prompt::build_classification_prompt(request))
            .await?;
        ClassifierResponse::parse(&text)
    }
}

// OpenAI Chat Completions API

#[derive(Clone)]
pub struct OpenAiClassifier {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClassifier {
    pub fn new(api_key: String) -> Self {
        Self {
            base_url: OPENAI_BASE_URL.to_string(),
            model: OPENAI_MODEL.to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn complete(&self, user_prompt: &str) -> Result<String, ClassifierError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = CompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt::SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: 0.3,
            max_tokens: 500,
            response_format: ResponseFormat {
                r#type: "json_object",
            },
        };

        let response: CompletionResponse = send_json(
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body),
        )
        .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ClassifierError::InvalidResponse("empty completion".to_string()))
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    fn name(&self) -> &str {
        "openai"
    }

    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassifierResponse, ClassifierError> {
        debug!(block = %request.block_identifier, model = %self.model, "Calling OpenAI");
        let text = self
            .complete(&prompt::build_classification_prompt(request))
            .await?;
        ClassifierResponse::parse(&text)
    }
}
