use super::types::{ClassifierError, ImageClassifier};
use crate::shared::config::ClassifierConfig;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

/// Инструкция сервису: только цифры кода, без пояснений
const PROMPT: &str = "Return only the TNVED code from the image. No explanation. Digits only.";

/// HTTP-клиент Qwen-VL (OpenAI-совместимый chat/completions endpoint)
pub struct QwenVlClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl QwenVlClient {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .expect("Failed to create HTTP client"),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    fn data_url(image: &[u8], extension: &str) -> String {
        let mime = match extension {
            "jpg" | "jpeg" => "jpeg",
            "gif" => "gif",
            "bmp" => "bmp",
            _ => "png",
        };
        format!(
            "data:image/{};base64,{}",
            mime,
            base64::engine::general_purpose::STANDARD.encode(image)
        )
    }
}

#[async_trait]
impl ImageClassifier for QwenVlClient {
    async fn classify_image(
        &self,
        image: &[u8],
        extension: &str,
    ) -> Result<String, ClassifierError> {
        if self.api_key.trim().is_empty() {
            return Err(ClassifierError::AuthError(
                "Classifier api_key is not configured".to_string(),
            ));
        }

        let url = format!("{}/chat/completions", self.api_base);
        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "image_url",
                            "image_url": { "url": Self::data_url(image, extension) }
                        },
                        {
                            "type": "text",
                            "text": PROMPT
                        }
                    ]
                }
            ],
            "temperature": 0.1,
            "top_p": 0.9
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError::NetworkError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClassifierError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            tracing::error!("Classifier API error ({}): {}", status, text);
            if status.as_u16() == 401 {
                return Err(ClassifierError::AuthError(text));
            }
            return Err(ClassifierError::ApiError(format!("{}: {}", status, text)));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| ClassifierError::InvalidResponse(format!("{}: {}", e, text)))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ClassifierError::InvalidResponse("Empty choices".to_string()))?;

        Ok(content)
    }

    fn provider_name(&self) -> &str {
        "Qwen-VL"
    }
}
