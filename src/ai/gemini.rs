use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::{
	config::GeminiConfig,
	error::{AppError, AppResult},
	images::Upload,
};

#[derive(Serialize, Debug)]
struct GenerateRequest<'a> {
	contents: [Content<'a>; 1],
}

#[derive(Serialize, Debug)]
struct Content<'a> {
	parts: [Part<'a>; 2],
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum Part<'a> {
	InlineData { inline_data: InlineData },
	Text { text: &'a str },
}

#[derive(Serialize, Debug)]
struct InlineData {
	mime_type: String,
	data: String,
}

#[derive(Deserialize, Debug, Default)]
struct GenerateResponse {
	#[serde(default)]
	candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug, Default)]
struct Candidate {
	#[serde(default)]
	content: CandidateContent,
}

#[derive(Deserialize, Debug, Default)]
struct CandidateContent {
	#[serde(default)]
	parts: Vec<ReplyPart>,
}

#[derive(Deserialize, Debug, Default)]
struct ReplyPart {
	#[serde(default)]
	text: Option<String>,
}

impl GenerateResponse {
	fn text(self) -> String {
		self.candidates
			.into_iter()
			.next()
			.map(|candidate| candidate.content.parts.into_iter().filter_map(|part| part.text).collect())
			.unwrap_or_default()
	}
}

/// Client for Gemini's `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
	http: reqwest::Client,
	api_key: String,
	model: String,
	base_url: String,
}

impl GeminiClient {
	/// `None` when no API key is configured.
	pub fn from_config(config: &GeminiConfig) -> Option<Self> {
		let api_key = config.api_key.clone()?;
		let http = reqwest::Client::builder()
			.timeout(Duration::from_secs(60))
			.build()
			.unwrap_or_default();

		info!("AI extraction enabled with model {}", config.model);
		Some(Self {
			http,
			api_key,
			model: config.model.clone(),
			base_url: config.base_url.trim_end_matches('/').to_string(),
		})
	}

	fn endpoint(&self) -> String {
		format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
	}

	/// Sends the image with `prompt` and returns the reply text.
	pub async fn generate(&self, prompt: &str, image: &Upload) -> AppResult<String> {
		let body = GenerateRequest {
			contents: [Content {
				parts: [
					Part::InlineData {
						inline_data: InlineData {
							mime_type: image.mime_type(),
							data: STANDARD.encode(&image.data),
						},
					},
					Part::Text { text: prompt },
				],
			}],
		};

		let response = self
			.http
			.post(self.endpoint())
			.query(&[("key", self.api_key.as_str())])
			.json(&body)
			.send()
			.await
			.map_err(|e| {
				error!("Gemini request failed: {e}");
				AppError::Upstream("Failed to reach the AI service".to_string())
			})?;

		let status = response.status();
		if !status.is_success() {
			let detail = response.text().await.unwrap_or_default();
			error!("Gemini returned {status}: {detail}");
			return Err(AppError::Upstream(format!("AI service error ({})", status.as_u16())));
		}

		let reply: GenerateResponse = response.json().await.map_err(|e| {
			error!("Unreadable Gemini response: {e}");
			AppError::Upstream("Failed to parse AI response".to_string())
		})?;

		Ok(reply.text())
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn request_body_uses_the_rest_field_names() {
		let body = GenerateRequest {
			contents: [Content {
				parts: [
					Part::InlineData {
						inline_data: InlineData {
							mime_type: "image/png".into(),
							data: STANDARD.encode(b"png"),
						},
					},
					Part::Text { text: "describe" },
				],
			}],
		};
		assert_eq!(
			serde_json::to_value(&body).unwrap(),
			json!({
				"contents": [{
					"parts": [
						{ "inline_data": { "mime_type": "image/png", "data": "cG5n" } },
						{ "text": "describe" }
					]
				}]
			})
		);
	}

	#[test]
	fn reply_text_joins_the_first_candidate_parts() {
		let reply: GenerateResponse = serde_json::from_value(json!({
			"candidates": [
				{ "content": { "parts": [{ "text": "{\"make\":" }, { "text": "\"BMW\"}" }] } },
				{ "content": { "parts": [{ "text": "ignored" }] } }
			]
		}))
		.unwrap();
		assert_eq!(reply.text(), "{\"make\":\"BMW\"}");

		let empty: GenerateResponse = serde_json::from_value(json!({})).unwrap();
		assert_eq!(empty.text(), "");
	}

	#[test]
	fn no_key_means_no_client() {
		let mut config = GeminiConfig {
			api_key: None,
			model: "gemini-1.5-flash".into(),
			base_url: "http://localhost:9999/".into(),
		};
		assert!(GeminiClient::from_config(&config).is_none());

		config.api_key = Some("k".into());
		let client = GeminiClient::from_config(&config).unwrap();
		assert_eq!(client.endpoint(), "http://localhost:9999/v1beta/models/gemini-1.5-flash:generateContent");
	}
}
