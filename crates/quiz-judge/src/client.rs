//! HTTP client for the chat-completions judge.

use std::time::Duration;

use async_trait::async_trait;
use quiz_engine::{JudgeConfig, JudgeFailure, SemanticJudge};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{build_prompt, parse_verdict, JudgeError, Result};

const TEMPERATURE: f64 = 0.1;
const MAX_TOKENS: u32 = 5;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Judges answers by asking a chat model for a `true`/`false` verdict.
#[derive(Clone)]
pub struct JudgeClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for JudgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JudgeClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl JudgeClient {
    /// Creates a client with a 10 second request timeout.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            timeout: quiz_engine::oracle::DEFAULT_JUDGE_TIMEOUT,
        }
    }

    /// Creates a client from configuration, reading the API key from the
    /// configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns `JudgeError::MissingApiKey` if the variable is unset or blank.
    pub fn from_config(config: &JudgeConfig) -> Result<Self> {
        let api_key = config
            .api_key()
            .ok_or_else(|| JudgeError::missing_api_key(&config.api_key_env))?;
        Ok(Self::new(&config.endpoint, &config.model, api_key).with_timeout(config.timeout()))
    }

    /// Overrides the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Endpoint the client posts to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Asks the model whether `candidate` answers `question`.
    ///
    /// # Errors
    ///
    /// Returns `JudgeError::Api` for non-2xx replies, `JudgeError::Timeout`
    /// or `JudgeError::Network` for transport failures, and
    /// `JudgeError::UnexpectedReply` if the reply is not a verdict.
    #[instrument(skip_all, fields(model = %self.model))]
    pub async fn judge_answer(
        &self,
        question: &str,
        canonical: &str,
        candidate: &str,
    ) -> Result<bool> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: build_prompt(question, canonical, candidate),
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Judge API returned an error");
            return Err(JudgeError::api(status.as_u16(), body.trim()));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let reply = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        debug!(reply = %reply.trim(), "Judge replied");

        parse_verdict(&reply)
    }

    fn transport_error(&self, e: &reqwest::Error) -> JudgeError {
        if e.is_timeout() {
            JudgeError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            JudgeError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl SemanticJudge for JudgeClient {
    async fn judge(
        &self,
        prompt: &str,
        canonical: &str,
        candidate: &str,
    ) -> std::result::Result<bool, JudgeFailure> {
        self.judge_answer(prompt, canonical, candidate)
            .await
            .map_err(JudgeFailure::from)
    }
}
