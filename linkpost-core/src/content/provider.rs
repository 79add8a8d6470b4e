use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Instant};

use crate::config::ProviderSection;

use super::breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitDecision};
use super::error::{ProviderError, ProviderResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPrompt {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

impl TextPrompt {
    /// Prompt lines long enough that seeing them in output means the model
    /// echoed its instructions.
    pub fn distinctive_lines(&self) -> Vec<&str> {
        self.system
            .lines()
            .chain(self.user.lines())
            .map(str::trim)
            .filter(|line| line.len() >= 24)
            .collect()
    }
}

#[async_trait]
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, prompt: &TextPrompt) -> ProviderResult<String>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completions endpoint.
pub struct HttpTextProvider {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
}

impl HttpTextProvider {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            name: name.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            max_tokens: 400,
        }
    }

    pub fn from_config(section: &ProviderSection) -> ProviderResult<Self> {
        let api_key = match &section.api_key_env {
            Some(env) => match std::env::var(env) {
                Ok(value) if !value.trim().is_empty() => Some(value),
                _ => return Err(ProviderError::MissingKey { env: env.clone() }),
            },
            None => None,
        };
        let mut provider =
            Self::new(&section.name, &section.endpoint, &section.model, api_key);
        provider.max_tokens = section.max_tokens;
        Ok(provider)
    }
}

#[async_trait]
impl TextProvider for HttpTextProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &TextPrompt) -> ProviderResult<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: prompt.max_tokens.min(self.max_tokens),
        };
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(ProviderError::Empty)
    }
}

/// A provider behind its own circuit breaker and call deadline.
pub struct GuardedProvider {
    provider: Arc<dyn TextProvider>,
    breaker: Mutex<CircuitBreaker>,
    deadline: Duration,
}

impl GuardedProvider {
    pub fn new(
        provider: Arc<dyn TextProvider>,
        deadline: Duration,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        Self {
            provider,
            breaker: Mutex::new(CircuitBreaker::new(breaker)),
            deadline,
        }
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }

    pub async fn call(&self, prompt: &TextPrompt) -> ProviderResult<String> {
        if self.with_breaker(|breaker| breaker.before_call(Instant::now()))
            == CircuitDecision::ShortCircuit
        {
            return Err(ProviderError::CircuitOpen);
        }
        let result = match timeout(self.deadline, self.provider.generate(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.deadline)),
        };
        if result.is_err() {
            self.record(false);
        }
        result
    }

    /// Successful calls are recorded by the caller once the text has been
    /// validated; rejected output counts as a failure.
    pub fn record(&self, success: bool) {
        self.with_breaker(|breaker| breaker.record(Instant::now(), success));
    }

    fn with_breaker<T>(&self, f: impl FnOnce(&mut CircuitBreaker) -> T) -> T {
        let mut guard = self
            .breaker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}
