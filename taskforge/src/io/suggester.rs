//! Suggester abstraction over an LLM chat-completions service.
//!
//! The [`Suggester`] trait is the only thing the orchestrator knows about the
//! completion backend. [`OpenAiSuggester`] talks to any OpenAI-compatible
//! `/chat/completions` endpoint; tests use scripted suggesters.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::SuggestError;
use crate::io::config::SuggesterConfig;
use crate::io::spinner::Spinner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Conversational memory shared by every suggester call of one CLI invocation.
///
/// Created once per top-level command and discarded at exit; never persisted.
#[derive(Debug, Clone)]
pub struct Conversation {
    id: Uuid,
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Prior user/assistant exchanges, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Remember one completed exchange.
    pub fn record(&mut self, prompt: &str, reply: &str) {
        self.messages.push(ChatMessage {
            role: Role::User,
            content: prompt.to_string(),
        });
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            content: reply.to_string(),
        });
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a text prompt to a text completion.
pub trait Suggester {
    /// Return the raw completion for `prompt`. The text may be blank; callers
    /// decide what blank means for them.
    fn suggest(&self, prompt: &str, conversation: &mut Conversation)
    -> Result<String, SuggestError>;
}

impl<T: Suggester + ?Sized> Suggester for &T {
    fn suggest(
        &self,
        prompt: &str,
        conversation: &mut Conversation,
    ) -> Result<String, SuggestError> {
        (**self).suggest(prompt, conversation)
    }
}

/// Suggester backed by an OpenAI-compatible chat-completions API.
pub struct OpenAiSuggester {
    client: Client,
    config: SuggesterConfig,
    api_key: Option<String>,
}

impl OpenAiSuggester {
    /// Build a client; the API key is read from `config.api_key_env`.
    ///
    /// A missing key is not an error here: runs that only replay stored
    /// commands never call the suggester.
    pub fn new(config: SuggesterConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn payload(&self, prompt: &str, conversation: &Conversation) -> Value {
        let mut messages = Vec::with_capacity(conversation.messages().len() + 2);
        messages.push(ChatMessage {
            role: Role::System,
            content: self.config.system_prompt.clone(),
        });
        messages.extend(conversation.messages().iter().cloned());
        messages.push(ChatMessage {
            role: Role::User,
            content: prompt.to_string(),
        });
        json!({
            "model": self.config.model,
            "messages": messages,
        })
    }

    fn post(&self, api_key: &str, payload: &Value) -> Result<(u16, String), SuggestError> {
        let spinner = Spinner::start(self.config.spinner);
        let result = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(payload)
            .send()
            .and_then(|response| {
                let status = response.status().as_u16();
                response.text().map(|body| (status, body))
            });
        spinner.stop();
        result.map_err(|e| SuggestError::Transport(e.to_string()))
    }
}

impl Suggester for OpenAiSuggester {
    #[instrument(skip_all, fields(conversation = %conversation.id(), model = %self.config.model))]
    fn suggest(
        &self,
        prompt: &str,
        conversation: &mut Conversation,
    ) -> Result<String, SuggestError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SuggestError::MissingApiKey(self.config.api_key_env.clone()))?;

        let payload = self.payload(prompt, conversation);
        debug!(prompt_bytes = prompt.len(), history = conversation.messages().len(), "sending prompt");

        let (status, body) = self.post(api_key, &payload)?;
        let content = parse_completion(status, &body)?;
        debug!(reply_bytes = content.len(), "received completion");

        conversation.record(prompt, &content);
        Ok(content)
    }
}

/// Extract `choices[0].message.content` from a chat-completions response body.
fn parse_completion(status: u16, body: &str) -> Result<String, SuggestError> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if let Some(message) = parsed.as_ref().and_then(api_error_message) {
        warn!(status, "suggester returned an error");
        return Err(SuggestError::Api(message));
    }
    if !(200..300).contains(&status) {
        return Err(SuggestError::Status {
            status,
            body: body.trim().to_string(),
        });
    }

    parsed
        .as_ref()
        .and_then(|value| value.get("choices"))
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(SuggestError::MissingContent)
}

fn api_error_message(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    if let Some(text) = error.as_str() {
        return Some(text.to_string());
    }
    error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}
