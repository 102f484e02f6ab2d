use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::build_prompt::Message;
use crate::config::Config;
use crate::error::{RagError, Result};
use crate::http::post_json_authed;

/// An LLM completion backend. Temperature is passed per call so it can be
/// changed while the application runs.
pub trait Generator: Send {
    fn generate(&self, messages: &[Message], temperature: f32) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints (Groq by default).
#[derive(Clone, Debug)]
pub struct ChatCompletionsClient {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ChatCompletionsClient {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            base_url: cfg.llm_base_url.clone(),
            api_key: cfg.api_key.clone(),
            model: cfg.model_name.clone(),
            max_tokens: cfg.max_tokens,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Generator for ChatCompletionsClient {
    fn generate(&self, messages: &[Message], temperature: f32) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let req = ChatRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };
        debug!(model = %self.model, messages = messages.len(), temperature, "chat completion");
        let res = post_json_authed::<ChatResponse, _>(&url, Some(&self.api_key), &req)
            .map_err(RagError::Generation)?;
        completion_text(res)
    }
}

fn completion_text(res: ChatResponse) -> Result<String> {
    res.choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or_else(|| RagError::Generation("completion had no message content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(body: &str) -> Result<String> {
        completion_text(serde_json::from_str(body).expect("valid response json"))
    }

    #[test]
    fn first_choice_content_is_the_answer() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Paris"}},{"message":{"content":"Lyon"}}]}"#;
        assert_eq!(decode(body).expect("content"), "Paris");
    }

    #[test]
    fn empty_or_missing_choices_are_generation_errors() {
        for body in [r#"{"choices":[]}"#, r#"{}"#, r#"{"choices":[{"message":null}]}"#] {
            assert!(matches!(decode(body), Err(RagError::Generation(_))), "{}", body);
        }
    }
}
