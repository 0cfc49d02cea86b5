//! Chat completion client with structured output.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Errors surfaced while requesting a chat completion.
#[derive(Debug, Error)]
pub enum ChatError {
    /// HTTP layer failed before receiving a response.
    #[error("Chat request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Endpoint responded with an unexpected status code.
    #[error("Unexpected chat endpoint response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the endpoint.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Response body did not contain a parseable structured answer.
    #[error("Malformed chat response: {0}")]
    InvalidResponse(String),
}

/// One message in a chat conversation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    /// Conversation role, `"system"` or `"user"`.
    pub role: &'static str,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// System-role message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    /// User-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// Structured answer returned by the model for one checklist leaf.
#[derive(Debug, Clone, Deserialize)]
pub struct ChecklistAnswer {
    /// Chosen response option, or `None` when the model declines to answer.
    pub answer: Option<String>,
    /// Free-text justification for the chosen answer.
    pub rationale: String,
    /// Ids of the retrieved passages the answer relies on.
    #[serde(default)]
    pub citation_ids: Vec<String>,
}

/// Interface implemented by chat completion providers.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Request a completion constrained to the given answer schema.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        schema: Value,
    ) -> Result<ChecklistAnswer, ChatError>;
}

/// Chat client speaking the OpenAI-compatible `/chat/completions` protocol.
pub struct HttpChatClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpChatClient {
    /// Construct a client for the given endpoint and model.
    pub fn new(base_url: &str, api_key: Option<String>, model: &str) -> Result<Self, ChatError> {
        let client = Client::builder().user_agent("checklist-rag/0.1").build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

#[async_trait]
impl ChatModel for HttpChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        schema: Value,
    ) -> Result<ChecklistAnswer, ChatError> {
        let payload = json!({
            "model": self.model,
            "messages": messages,
            // Low temperature keeps constrained answers stable across runs.
            "temperature": 0.1,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "checklist_answer",
                    "strict": true,
                    "schema": schema,
                }
            }
        });

        let mut request = self.client.post(self.endpoint()).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::UnexpectedStatus { status, body });
        }

        let completion: CompletionResponse = response.json().await?;
        let content = completion
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| ChatError::InvalidResponse("response contained no choices".into()))?;

        serde_json::from_str(content).map_err(|error| {
            ChatError::InvalidResponse(format!("choice content was not a structured answer: {error}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::schema::answer_schema;
    use httpmock::{Method::POST, MockServer};

    fn sample_messages() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("Answer from the provided context."),
            ChatMessage::user("Is access reviewed quarterly?"),
        ]
    }

    #[tokio::test]
    async fn parses_structured_answer_from_choice_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .json_body_partial(r#"{"temperature": 0.1}"#);
                then.status(200).json_body(json!({
                    "choices": [{
                        "message": {
                            "content": "{\"answer\":\"Yes\",\"rationale\":\"Reviewed in Q2.\",\"citation_ids\":[\"doc-1\"]}"
                        }
                    }]
                }));
            })
            .await;

        let client = HttpChatClient::new(&format!("{}/v1", server.base_url()), None, "gpt-4o")
            .expect("client");
        let answer = client
            .complete(&sample_messages(), answer_schema(&["Yes".into(), "No".into()]))
            .await
            .expect("completion");

        mock.assert();
        assert_eq!(answer.answer.as_deref(), Some("Yes"));
        assert_eq!(answer.citation_ids, vec!["doc-1"]);
    }

    #[tokio::test]
    async fn error_status_is_surfaced_with_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        let client = HttpChatClient::new(&format!("{}/v1", server.base_url()), None, "gpt-4o")
            .expect("client");
        let error = client
            .complete(&sample_messages(), answer_schema(&[]))
            .await
            .expect_err("error status");

        assert!(
            matches!(error, ChatError::UnexpectedStatus { status, ref body }
                if status.as_u16() == 429 && body.contains("rate limited"))
        );
    }

    #[tokio::test]
    async fn unparseable_choice_content_is_invalid_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "content": "not json" } }]
                }));
            })
            .await;

        let client = HttpChatClient::new(&format!("{}/v1", server.base_url()), None, "gpt-4o")
            .expect("client");
        let error = client
            .complete(&sample_messages(), answer_schema(&[]))
            .await
            .expect_err("invalid content");

        assert!(matches!(error, ChatError::InvalidResponse(_)));
    }
}
