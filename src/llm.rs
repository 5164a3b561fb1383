//! Chat-completion client for an OpenAI-compatible API.
//!
//! One POST to `{base}/chat/completions` per turn, bearer-token auth,
//! full session history in the body. The request asks the provider for
//! schema-constrained JSON output so replies parse cleanly, but the
//! caller still treats the text as untrusted.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, ChatRole};

/// Per-request timeout for completion calls.
const LLM_TIMEOUT: Duration = Duration::from_secs(60);

/// Instruction steering the model toward structured transaction replies.
pub(crate) const SYSTEM_PROMPT: &str = "You are a bookkeeping assistant. \
    When the user describes a transaction, reply only with a JSON object \
    containing keys: date (ISO 8601), amount, account, category. Preserve \
    any spaces in names or numbers.";

/// Chat-completion request body.
#[derive(Debug, Serialize)]
struct CompletionRequest {
    /// Model identifier.
    model: String,
    /// Full conversation, system instruction first.
    messages: Vec<ChatMessage>,
    /// Structured-output hint for the provider.
    response_format: ResponseFormat,
}

/// The `response_format` object of a completion request.
#[derive(Debug, Serialize)]
struct ResponseFormat {
    /// Output kind; always `json_object`.
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Chat-completion response body (the fields this client reads).
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    /// Candidate replies; the first one is used.
    choices: Vec<Choice>,
}

/// One candidate reply.
#[derive(Debug, Deserialize)]
struct Choice {
    /// The reply message.
    message: ChoiceMessage,
}

/// The message inside a choice.
#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    /// Assistant text.
    content: String,
}

/// Errors from a completion call.
#[derive(Debug, thiserror::Error)]
pub(crate) enum LlmError {
    /// Network-level failure, timeout, or undecodable body.
    #[error("chat completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Non-2xx status from the provider.
    #[error("chat completion returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: reqwest::StatusCode,
        /// Response body, best effort.
        body: String,
    },
    /// 2xx response carrying no choices.
    #[error("chat completion returned no choices")]
    NoChoices,
}

/// Client for the chat-completion endpoint.
#[derive(Debug, Clone)]
pub(crate) struct ChatClient {
    /// Pooled HTTP client with [`LLM_TIMEOUT`] applied.
    http: reqwest::Client,
    /// API base without a trailing slash.
    base_url: String,
    /// Bearer token.
    api_key: String,
    /// Model identifier sent with every request.
    model: String,
}

impl ChatClient {
    /// Creates a client for the given API base, key, and model.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub(crate) fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(LLM_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            model: model.to_owned(),
        })
    }

    /// Sends the transcript (system instruction first) and returns the
    /// assistant text from the first choice.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, a non-2xx status, an
    /// undecodable body, or an empty choice list. No retries.
    pub(crate) async fn complete(&self, history: &[ChatMessage]) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage {
            role: ChatRole::System,
            content: SYSTEM_PROMPT.to_owned(),
        });
        messages.extend_from_slice(history);

        let request = CompletionRequest {
            model: self.model.clone(),
            messages,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(%url, turns = history.len(), "requesting chat completion");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(LlmError::NoChoices)
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect and indexing for readability"
)]
mod tests {
    use serde_json::Value;

    use super::{CompletionRequest, CompletionResponse, ResponseFormat};
    use crate::chat::ChatMessage;

    #[test]
    fn request_serializes_wire_shape() {
        let request = CompletionRequest {
            model: "deepseek-chat".to_owned(),
            messages: vec![ChatMessage::user("Spent 20 on coffee".to_owned())],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };
        let value = serde_json::to_value(&request).expect("should serialize");
        assert_eq!(value["model"], "deepseek-chat");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "Spent 20 on coffee");
        assert_eq!(value["response_format"]["type"], "json_object");
    }

    #[test]
    fn response_takes_first_choice() {
        let json = r#"{
            "id": "cmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "first"}},
                {"index": 1, "message": {"role": "assistant", "content": "second"}}
            ],
            "usage": {"total_tokens": 12}
        }"#;
        let response: CompletionResponse = serde_json::from_str(json).expect("should deserialize");
        let content = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .expect("should have a choice");
        assert_eq!(content, "first");
    }

    #[test]
    fn empty_choices_deserialize() {
        let json = r#"{"choices": []}"#;
        let response: CompletionResponse = serde_json::from_str(json).expect("should deserialize");
        assert!(response.choices.is_empty());
    }

    #[test]
    fn system_prompt_mentions_required_keys() {
        for key in ["date", "amount", "account", "category"] {
            assert!(super::SYSTEM_PROMPT.contains(key), "missing key {key}");
        }
    }

    #[test]
    fn roles_serialize_lowercase() {
        let message = ChatMessage::assistant("ok".to_owned());
        let value: Value = serde_json::to_value(&message).expect("should serialize");
        assert_eq!(value["role"], "assistant");
    }
}
