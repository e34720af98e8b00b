//! Caption generation through an OpenAI-compatible chat completions endpoint

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use crate::config::GeneratorConfig;
use crate::error::{GenerationError, Result};
use crate::generator::{ContentGenerator, GeneratedContent, GenerationRequest};

pub struct OpenAiContentGenerator {
    endpoint: String,
    model: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl OpenAiContentGenerator {
    pub fn new(endpoint: &str, model: &str, api_key: SecretString) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Build from `[generator]`, reading the key from `api_key_env`
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        let key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::MissingApiKey(config.api_key_env.clone()))?;
        Ok(Self::new(
            &config.endpoint,
            &config.model,
            SecretString::from(key),
        ))
    }

    fn single_prompt(request: &GenerationRequest) -> String {
        let url = request.destination_url.as_deref().unwrap_or("");
        format!(
            "Input: {topic}, {tone}, {length}, {url}\n\n\
             Task: Produce:\n\
             1) A short caption (1-3 sentences) optimized for social engagement (hook + value + CTA).\n\
             2) Exactly 3 relevant hashtags (each preceded by #).\n\
             3) A 1-line image generation prompt tailored to vertical format (1024x1792) describing scene, mood, and composition.\n\
             4) A 1-line alt-text for accessibility.\n\
             5) A 2-line CTA encouraging click-through to {url}.\n\n\
             Tone: {tone}\n\
             Length: {length}\n\
             Return JSON only: {{ \"caption\": \"...\", \"hashtags\": [\"#...\",\"#...\",\"#...\"], \"image_prompt\": \"...\", \"alt_text\": \"...\", \"cta\": \"...\" }}",
            topic = request.topic,
            tone = request.tone,
            length = request.length,
            url = url,
        )
    }

    fn batch_prompt(topic: &str, tone: &str, count: usize) -> String {
        format!(
            "Generate {count} variations for the topic \"{topic}\" with tone {tone}. \
             Return JSON only: {{ \"variations\": [ ... ] }} where each element has the fields \
             caption, hashtags (array of 3), image_prompt, alt_text and cta. \
             Ensure diversity of hooks and CTAs."
        )
    }

    /// Send one prompt and return the message content parsed as JSON
    async fn complete(&self, prompt: String) -> Result<Value> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "response_format": { "type": "json_object" },
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Http(format!("{} unreachable: {}", self.endpoint, e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Http(format!("{}: {}", status, text)).into());
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                GenerationError::InvalidResponse("missing choices[0].message.content".to_string())
            })?;

        serde_json::from_str(content).map_err(|e| {
            GenerationError::InvalidResponse(format!("content is not JSON: {}", e)).into()
        })
    }
}

fn parse_content(value: Value) -> Result<GeneratedContent> {
    serde_json::from_value(value)
        .map_err(|e| GenerationError::InvalidResponse(format!("unexpected post shape: {}", e)).into())
}

#[async_trait]
impl ContentGenerator for OpenAiContentGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent> {
        tracing::debug!(topic = %request.topic, model = %self.model, "Requesting post content");
        let value = self.complete(Self::single_prompt(request)).await?;
        parse_content(value)
    }

    async fn generate_batch(
        &self,
        topic: &str,
        tone: &str,
        count: usize,
    ) -> Result<Vec<GeneratedContent>> {
        tracing::debug!(topic = %topic, count, model = %self.model, "Requesting post variations");
        let value = self.complete(Self::batch_prompt(topic, tone, count)).await?;

        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("variations").or_else(|| map.remove("posts")) {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(GenerationError::InvalidResponse(
                        "expected a \"variations\" array".to_string(),
                    )
                    .into())
                }
            },
            _ => {
                return Err(
                    GenerationError::InvalidResponse("expected a JSON object".to_string()).into(),
                )
            }
        };

        items.into_iter().map(parse_content).collect()
    }
}
