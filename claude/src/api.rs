//! Wire types for the Messages API.

use crate::types::{Message, Response, StopReason, Usage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct ApiRequest {
    pub model: String,
    pub max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiMessage {
    pub role: &'static str,
    pub content: String,
}

impl From<&Message> for ApiMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str(),
            content: message.text.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse {
    pub id: String,
    pub model: String,
    pub content: Vec<ApiContent>,
    pub stop_reason: Option<String>,
    pub usage: ApiUsage,
}

/// Only text blocks are surfaced; anything else the API returns is skipped.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ApiContent {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl From<ApiResponse> for Response {
    fn from(api: ApiResponse) -> Self {
        let blocks = api
            .content
            .into_iter()
            .filter_map(|block| match block {
                ApiContent::Text { text } => Some(text),
                ApiContent::Other => None,
            })
            .collect();

        Response {
            id: api.id,
            model: api.model,
            blocks,
            stop_reason: StopReason::parse(api.stop_reason.as_deref()),
            usage: Usage {
                input_tokens: api.usage.input_tokens,
                output_tokens: api.usage.output_tokens,
            },
        }
    }
}

/// Error envelope: `{"type":"error","error":{"type":..,"message":..}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

impl ApiError {
    /// Pull a readable message out of an error body, falling back to the raw body.
    pub fn message_from_body(body: &str) -> String {
        match serde_json::from_str::<ApiError>(body) {
            Ok(parsed) => format!("{}: {}", parsed.error.kind, parsed.error.message),
            Err(_) => body.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_skips_unset_fields() {
        let request = ApiRequest {
            model: "m".into(),
            max_tokens: 10,
            system: None,
            messages: vec![(&Message::user("hi")).into()],
            temperature: None,
            stop_sequences: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert!(json.get("system").is_none());
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_response_keeps_only_text_blocks() {
        let body = r#"{
            "id": "msg_01",
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Hello"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 3}
        }"#;
        let api: ApiResponse = serde_json::from_str(body).unwrap();
        let response: Response = api.into();
        assert_eq!(response.text(), "Hello");
        assert_eq!(response.usage.input_tokens, 12);
        assert_eq!(response.stop_reason, StopReason::EndTurn);
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(ApiError::message_from_body(body), "overloaded_error: Overloaded");
        assert_eq!(ApiError::message_from_body("<html>"), "<html>");
    }
}
