use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::{DEFAULT_RATE_LIMIT_WAIT_SECS, Lang, TranslatorConfig};
use crate::error::{Error, Result};
use super::traits::{Translator, TranslatorInfo};

/// Translator for OpenAI-compatible chat completion APIs
/// (OpenAI, llama.cpp server, Ollama, vLLM, ...).
pub struct OpenAiTranslator {
    client: Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    retry_count: u32,
    retry_delay: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Outcome of one HTTP attempt
enum Attempt {
    Done(String),
    /// Retry after the given wait
    Retry(Error, Duration),
    Fatal(Error),
}

impl OpenAiTranslator {
    pub fn from_config(config: &TranslatorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::TranslationRequest(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: config.model.clone(),
            retry_count: config.retry_count.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    fn system_prompt(source: &Lang, target: &Lang) -> String {
        format!(
            "Translate the following text from {} to {}. \
             Keep the line breaks of the input. Output only the translation.",
            language_name(source),
            language_name(target)
        )
    }

    /// The hosted OpenAI endpoint refuses anonymous requests; local servers don't.
    fn needs_api_key(&self) -> bool {
        self.api_base.contains("api.openai.com")
    }

    async fn attempt(&self, request: &ChatRequest<'_>) -> Attempt {
        let url = format!("{}/chat/completions", self.api_base);
        let mut req = self.client.post(&url).json(request);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = match req.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!("Translation request timed out");
                return Attempt::Retry(Error::TranslationTimeout, self.retry_delay);
            }
            Err(e) => {
                warn!("Request failed: {}", e);
                return Attempt::Retry(Error::TranslationRequest(e.to_string()), self.retry_delay);
            }
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            warn!("Rate limited, retry after {:?}s", retry_after);
            let wait = Duration::from_secs(retry_after.unwrap_or(DEFAULT_RATE_LIMIT_WAIT_SECS));
            return Attempt::Retry(Error::TranslationRateLimited { retry_after }, wait);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Attempt::Fatal(Error::TranslationMissingApiKey);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("API error: {} - {}", status, body);
            return Attempt::Retry(
                Error::TranslationRequest(format!("HTTP {status}: {body}")),
                self.retry_delay,
            );
        }

        match response.json::<ChatResponse>().await {
            Ok(chat) => match extract_content(chat) {
                Some(text) => Attempt::Done(text),
                None => Attempt::Retry(
                    Error::TranslationInvalidResponse("No content in response".to_string()),
                    self.retry_delay,
                ),
            },
            Err(e) => {
                warn!("Failed to parse response: {}", e);
                Attempt::Retry(Error::TranslationInvalidResponse(e.to_string()), self.retry_delay)
            }
        }
    }

    async fn request_with_retry(&self, text: &str, source: &Lang, target: &Lang) -> Result<String> {
        let system = Self::system_prompt(source, target);
        let request = ChatRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: &system,
                },
                Message {
                    role: "user",
                    content: text,
                },
            ],
            temperature: 0.3,
        };

        let mut last_error = None;

        for attempt in 1..=self.retry_count {
            debug!("Translation request attempt {}/{}", attempt, self.retry_count);

            match self.attempt(&request).await {
                Attempt::Done(translated) => return Ok(translated),
                Attempt::Fatal(e) => return Err(e),
                Attempt::Retry(e, wait) => {
                    last_error = Some(e);
                    if attempt < self.retry_count {
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }

        error!("Translation failed after {} attempts", self.retry_count);
        Err(last_error.unwrap_or(Error::TranslationMaxRetriesExceeded))
    }
}

/// First choice's content, with any wrapping quotes the model added removed.
fn extract_content(chat: ChatResponse) -> Option<String> {
    let content = chat.choices.into_iter().next()?.message.content?;
    let trimmed = content.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(trimmed);
    Some(unquoted.to_string())
}

#[async_trait]
impl Translator for OpenAiTranslator {
    fn info(&self) -> TranslatorInfo {
        TranslatorInfo {
            name: "OpenAI Compatible",
            requires_api_key: self.needs_api_key(),
        }
    }

    async fn translate(&self, text: &str, source: &Lang, target: &Lang) -> Result<String> {
        if text.trim().is_empty() || source == target {
            return Ok(text.to_string());
        }
        if !self.is_available() {
            return Err(Error::TranslationMissingApiKey);
        }

        self.request_with_retry(text, source, target).await
    }

    fn is_available(&self) -> bool {
        !self.needs_api_key() || self.api_key.is_some()
    }
}

/// English name of a language code, as used in prompts.
pub fn language_name(lang: &Lang) -> &str {
    match lang.as_str() {
        "en" => "English",
        "vi" => "Vietnamese",
        "zh-CN" => "Simplified Chinese",
        "zh-TW" => "Traditional Chinese",
        "ja" => "Japanese",
        "ko" => "Korean",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "th" => "Thai",
        // Models understand most other codes and plain names as given
        other => other,
    }
}
