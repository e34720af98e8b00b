//! Stability text-to-image client

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use crate::config::GeneratorConfig;
use crate::error::{GenerationError, Result};
use crate::generator::ImageGenerator;

/// Vertical story format
const WIDTH: u32 = 1024;
const HEIGHT: u32 = 1792;

pub struct StabilityImageGenerator {
    endpoint: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl StabilityImageGenerator {
    pub fn new(endpoint: &str, api_key: SecretString) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        let key = std::env::var(&config.image_api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::MissingApiKey(config.image_api_key_env.clone()))?;
        Ok(Self::new(&config.image_endpoint, SecretString::from(key)))
    }
}

#[async_trait]
impl ImageGenerator for StabilityImageGenerator {
    async fn generate_image(&self, prompt: &str) -> Result<String> {
        tracing::debug!(prompt = %prompt, "Requesting image");

        let body = json!({
            "text_prompts": [{ "text": prompt }],
            "cfg_scale": 7,
            "height": HEIGHT,
            "width": WIDTH,
            "steps": 30,
            "samples": 1,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .header("Accept", "application/json")
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

        let image = json["artifacts"][0]["base64"].as_str().ok_or_else(|| {
            GenerationError::InvalidResponse("missing artifacts[0].base64".to_string())
        })?;

        Ok(format!("data:image/png;base64,{}", image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutopostError;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(server: &MockServer) -> StabilityImageGenerator {
        StabilityImageGenerator::new(
            &format!("{}/v1/generation/sd/text-to-image", server.uri()),
            SecretString::from("img-key".to_string()),
        )
    }

    #[tokio::test]
    async fn test_returns_data_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer img-key"))
            .and(body_partial_json(json!({
                "text_prompts": [{ "text": "neon street at night" }],
                "width": 1024,
                "height": 1792
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "artifacts": [{ "base64": "iVBORw0KGgo=", "seed": 1, "finishReason": "SUCCESS" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let url = generator(&server)
            .generate_image("neon street at night")
            .await
            .unwrap();
        assert_eq!(url, "data:image/png;base64,iVBORw0KGgo=");
    }

    #[tokio::test]
    async fn test_missing_artifact_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "artifacts": [] })))
            .mount(&server)
            .await;

        let result = generator(&server).generate_image("anything").await;
        assert!(matches!(
            result,
            Err(AutopostError::Generation(GenerationError::InvalidResponse(_)))
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = generator(&server).generate_image("anything").await;
        assert!(matches!(
            result,
            Err(AutopostError::Generation(GenerationError::Http(_)))
        ));
    }
}
