// Chat-completion translation backend
//
// Long transcripts are split on sentence boundaries and translated chunk by
// chunk against an OpenAI-compatible `/chat/completions` endpoint.

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::TranslatorConfig;
use crate::gateway::{GatewayError, Translator};
use crate::pipeline::run::UNKNOWN_LANGUAGE;

/// Symbols that leak into Arabic model output and confuse speech synthesis
const STRAY_SYMBOLS: [char; 18] = [
    '!', '@', '#', '$', '%', '^', '&', '*', '+', '=', '|', '\\', '/', '<', '>', '?', '`', '~',
];

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Translator that talks to an OpenAI-compatible chat API
#[derive(Clone)]
pub struct ChatCompletionTranslator {
    client: reqwest::Client,
    config: TranslatorConfig,
}

impl ChatCompletionTranslator {
    pub fn new(config: TranslatorConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn system_prompt(source_language: &str, target_language: &str) -> String {
        let mut prompt = if source_language.is_empty() || source_language == UNKNOWN_LANGUAGE {
            format!("Translate the following text into the language with code '{}'", target_language)
        } else {
            format!(
                "Translate the following text from the language with code '{}' into the language with code '{}'",
                source_language, target_language
            )
        };
        prompt.push_str(
            ", keeping technical terms unchanged. Keep the translation concise and close to the \
             length of the original, and reply with the translation only.",
        );
        if target_language == "ar" {
            prompt.push_str(" Add full diacritics to every Arabic word to help speech synthesis.");
        }
        prompt
    }

    async fn translate_chunk(&self, system: &str, chunk: &str) -> Result<String, GatewayError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: chunk,
                },
            ],
        };

        let mut builder = self.client.post(&self.config.api_url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::InvalidResponse(format!(
                "translation API returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| GatewayError::InvalidResponse("response contained no choices".to_string()))
    }
}

#[async_trait]
impl Translator for ChatCompletionTranslator {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, GatewayError> {
        let chunks = split_into_chunks(text, self.config.chunk_chars);
        if chunks.is_empty() {
            return Ok(String::new());
        }

        let system = Self::system_prompt(source_language, target_language);
        info!(
            "Translating {} chunk(s) from {} to {}",
            chunks.len(),
            source_language,
            target_language
        );

        let mut translated = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            debug!("Translating chunk {}/{}", index + 1, chunks.len());
            let mut piece = self.translate_chunk(&system, chunk).await?;
            if target_language == "ar" {
                piece = clean_arabic_text(&piece);
            }
            translated.push(piece);

            if index + 1 < chunks.len() && !self.config.chunk_delay.is_zero() {
                tokio::time::sleep(self.config.chunk_delay).await;
            }
        }

        Ok(translated.join(" ").trim().to_string())
    }
}

/// Split text into chunks of at most `max_chars` characters on sentence ends
///
/// A single sentence longer than `max_chars` becomes its own chunk.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(text) {
        let len = sentence.chars().count();
        if current_len > 0 && current_len + 1 + len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(sentence);
        current_len += len;
    }
    if current_len > 0 {
        chunks.push(current);
    }
    chunks
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut previous_terminal = false;

    for (index, ch) in text.char_indices() {
        if previous_terminal && ch.is_whitespace() {
            let sentence = text[start..index].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = index;
        }
        previous_terminal = matches!(ch, '.' | '!' | '?');
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Strip stray symbols and collapse whitespace runs in Arabic text
pub fn clean_arabic_text(text: &str) -> String {
    let filtered: String = text.chars().filter(|c| !STRAY_SYMBOLS.contains(c)).collect();
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}
