// PromptCut Responder - Free-Text Fallback
// Copyright (c) 2026 Xing_The_Creator | PromptCut
//
// When a prompt is not an editing command, the CLI hands it to an
// OpenAI-compatible chat-completions endpoint. Without one configured (or
// when it is unreachable) the fixed help message is returned instead.

use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use super::intent::FALLBACK_MESSAGE;

pub struct Responder {
    client: reqwest::Client,
    endpoint: Option<Url>,
    model: String,
}

impl Responder {
    pub fn new(api_url: Option<&str>, model: &str) -> Self {
        let endpoint = api_url.and_then(|base| match chat_endpoint(base) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("[RESPONDER] Ignoring invalid LLM URL '{}': {}", base, e);
                None
            }
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            endpoint,
            model: model.to_string(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Generic text reply. Never fails; errors degrade to the help message.
    pub async fn reply(&self, prompt: &str) -> String {
        let Some(endpoint) = &self.endpoint else {
            return FALLBACK_MESSAGE.to_string();
        };

        info!("[RESPONDER] Asking {} about: {}", self.model, prompt);

        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a video editing assistant. Supported commands: trim, split, add captions, mute, add music. Answer briefly."
                },
                { "role": "user", "content": prompt }
            ],
            "max_tokens": 50,
            "temperature": 0.7
        });

        let resp = match self.client.post(endpoint.clone()).json(&payload).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("[RESPONDER] LLM connection failed: {}", e);
                return FALLBACK_MESSAGE.to_string();
            }
        };

        if !resp.status().is_success() {
            warn!("[RESPONDER] LLM returned {}", resp.status());
            return FALLBACK_MESSAGE.to_string();
        }

        match resp.json::<serde_json::Value>().await {
            Ok(body) => extract_content(&body).unwrap_or_else(|| FALLBACK_MESSAGE.to_string()),
            Err(e) => {
                warn!("[RESPONDER] Unreadable LLM response: {}", e);
                FALLBACK_MESSAGE.to_string()
            }
        }
    }
}

/// `http://host:11434/v1` -> `http://host:11434/v1/chat/completions`
fn chat_endpoint(base: &str) -> Result<Url, url::ParseError> {
    let mut normalized = base.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Url::parse(&normalized)?.join("chat/completions")
}

fn extract_content(body: &serde_json::Value) -> Option<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
