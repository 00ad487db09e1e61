use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::hud::{AspectRatio, GeneratedMedia};
use jarvis_realtime::types::GroundingSource;

/// Which hosted model tier a chat command is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Low-latency model for simple commands.
    Fast,
    /// Higher-capability, higher-latency model with a thinking budget.
    Deep,
}

/// Capability text plus the citations backing it.
#[derive(Debug, Clone)]
pub struct Grounded {
    pub text: String,
    pub sources: Vec<GroundingSource>,
}

// The `Capability` trait is the boundary to every hosted AI endpoint
// this system consumes: text, vision, image, speech, search and maps.
// High-level logic (router, tool dispatcher, orchestrator) depends on
// this abstraction rather than on the HTTP client, so tests exercise
// those paths against `mockall`'s `MockCapability` without network
// calls.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Capability {
    async fn generate_text(&self, prompt: &str, tier: ModelTier) -> Result<String>;

    async fn analyze_image(&self, data: &[u8], mime_type: &str, prompt: &str) -> Result<String>;

    async fn generate_image(&self, prompt: &str, aspect_ratio: AspectRatio)
        -> Result<GeneratedMedia>;

    /// Returns raw PCM16 bytes at the playback rate.
    async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>>;

    async fn web_search(&self, query: &str) -> Result<Grounded>;

    async fn find_nearby(&self, query: &str) -> Result<Grounded>;
}

// --- Hosted API response shapes ---

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    pub candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    pub parts: Option<Vec<ContentPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPart {
    pub text: Option<String>,
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    pub grounding_chunks: Option<Vec<GroundingChunk>>,
}

#[derive(Debug, Deserialize)]
pub struct GroundingChunk {
    pub web: Option<ChunkRef>,
    pub maps: Option<ChunkRef>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkRef {
    pub title: Option<String>,
    pub uri: Option<String>,
}

impl GenerateContentResponse {
    fn first_text(&self) -> Option<String> {
        self.candidates
            .as_ref()?
            .first()?
            .content
            .as_ref()?
            .parts
            .as_ref()?
            .iter()
            .find_map(|p| p.text.clone())
    }

    fn first_inline_data(&self) -> Option<&InlineData> {
        self.candidates
            .as_ref()?
            .first()?
            .content
            .as_ref()?
            .parts
            .as_ref()?
            .iter()
            .find_map(|p| p.inline_data.as_ref())
    }

    fn grounding_sources(&self, web: bool) -> Vec<GroundingSource> {
        let chunks = self
            .candidates
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.grounding_metadata.as_ref())
            .and_then(|m| m.grounding_chunks.as_ref());
        let Some(chunks) = chunks else {
            return Vec::new();
        };
        chunks
            .iter()
            .filter_map(|chunk| {
                let r = if web {
                    chunk.web.as_ref()
                } else {
                    chunk.maps.as_ref()
                }?;
                Some(GroundingSource {
                    title: r
                        .title
                        .clone()
                        .unwrap_or_else(|| {
                            let fallback = if web { "Ref" } else { "Location" };
                            fallback.to_string()
                        }),
                    uri: r.uri.clone().unwrap_or_default(),
                })
            })
            .collect()
    }
}

/// Which hosted model serves each capability.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    pub fast: String,
    pub deep: String,
    pub vision: String,
    pub image: String,
    pub tts: String,
    pub search: String,
    pub maps: String,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            fast: "gemini-2.5-flash-lite-latest".to_string(),
            deep: "gemini-3-pro-preview".to_string(),
            vision: "gemini-3-pro-preview".to_string(),
            image: "gemini-3-pro-image-preview".to_string(),
            tts: "gemini-2.5-flash-preview-tts".to_string(),
            search: "gemini-3-flash-preview".to_string(),
            maps: "gemini-2.5-flash".to_string(),
        }
    }
}

const TTS_VOICE: &str = "Fenrir";
const TTS_STYLE_PREFIX: &str = "Say clearly and with a refined British accent: ";
const DEEP_THINKING_BUDGET: u32 = 32768;
const VISION_THINKING_BUDGET: u32 = 10000;

/// reqwest-backed implementation of [`Capability`] against the hosted
/// generative API.
pub struct CapabilityClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
    models: ModelCatalog,
}

impl CapabilityClient {
    pub fn new(api_key: SecretString) -> Self {
        Self::with_models(api_key, ModelCatalog::default())
    }

    pub fn with_models(api_key: SecretString, models: ModelCatalog) -> Self {
        Self {
            client: Client::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key,
            models,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn generate_content(
        &self,
        model: &str,
        body: serde_json::Value,
    ) -> Result<GenerateContentResponse> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            model,
            self.api_key.expose_secret()
        );
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<GenerateContentResponse>()
            .await?;
        Ok(resp)
    }
}

#[async_trait]
impl Capability for CapabilityClient {
    async fn generate_text(&self, prompt: &str, tier: ModelTier) -> Result<String> {
        let model = match tier {
            ModelTier::Fast => &self.models.fast,
            ModelTier::Deep => &self.models.deep,
        };
        let mut body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        if tier == ModelTier::Deep {
            body["generationConfig"] =
                serde_json::json!({ "thinkingConfig": { "thinkingBudget": DEEP_THINKING_BUDGET } });
        }
        let resp = self
            .generate_content(model, body)
            .await
            .context("text generation failed")?;
        resp.first_text()
            .ok_or_else(|| anyhow::anyhow!("no text in model response"))
    }

    async fn analyze_image(&self, data: &[u8], mime_type: &str, prompt: &str) -> Result<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        let prompt = if prompt.trim().is_empty() {
            "Describe this image in detail."
        } else {
            prompt
        };
        let body = serde_json::json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": mime_type, "data": encoded } },
                    { "text": prompt }
                ]
            }],
            "generationConfig": { "thinkingConfig": { "thinkingBudget": VISION_THINKING_BUDGET } }
        });
        let resp = self
            .generate_content(&self.models.vision, body)
            .await
            .context("vision analysis failed")?;
        resp.first_text()
            .ok_or_else(|| anyhow::anyhow!("analysis returned no description"))
    }

    async fn generate_image(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<GeneratedMedia> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "imageConfig": { "aspectRatio": aspect_ratio.as_str(), "imageSize": "1K" }
            }
        });
        let resp = self
            .generate_content(&self.models.image, body)
            .await
            .context("image generation failed")?;
        let inline = resp
            .first_inline_data()
            .ok_or_else(|| anyhow::anyhow!("no image data in model response"))?;
        Ok(GeneratedMedia {
            mime_type: inline.mime_type.clone(),
            data: inline.data.clone(),
            prompt: prompt.to_string(),
        })
    }

    async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": format!("{}{}", TTS_STYLE_PREFIX, text) }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": TTS_VOICE } }
                }
            }
        });
        let resp = self
            .generate_content(&self.models.tts, body)
            .await
            .context("speech synthesis failed")?;
        let inline = resp
            .first_inline_data()
            .ok_or_else(|| anyhow::anyhow!("no audio data in synthesis response"))?;
        base64::engine::general_purpose::STANDARD
            .decode(&inline.data)
            .context("synthesis audio was not valid base64")
    }

    async fn web_search(&self, query: &str) -> Result<Grounded> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": query }] }],
            "tools": [{ "googleSearch": {} }]
        });
        let resp = self
            .generate_content(&self.models.search, body)
            .await
            .context("web search failed")?;
        let sources = resp.grounding_sources(true);
        Ok(Grounded {
            text: resp
                .first_text()
                .unwrap_or_else(|| "Results extracted.".to_string()),
            sources,
        })
    }

    async fn find_nearby(&self, query: &str) -> Result<Grounded> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": query }] }],
            "tools": [{ "googleMaps": {} }]
        });
        let resp = self
            .generate_content(&self.models.maps, body)
            .await
            .context("maps grounding failed")?;
        let sources = resp.grounding_sources(false);
        Ok(Grounded {
            text: resp
                .first_text()
                .unwrap_or_else(|| "Nearby data mapped.".to_string()),
            sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parsing_extracts_text_and_grounding() {
        let raw = r#"{
            "candidates": [{
                "content": { "parts": [{ "text": "The answer." }] },
                "groundingMetadata": {
                    "groundingChunks": [
                        { "web": { "title": "Example", "uri": "https://example.com" } },
                        { "maps": { "title": "Cafe", "uri": "https://maps.example" } }
                    ]
                }
            }]
        }"#;
        let resp: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.first_text().as_deref(), Some("The answer."));

        let web = resp.grounding_sources(true);
        assert_eq!(web.len(), 1);
        assert_eq!(web[0].title, "Example");

        let maps = resp.grounding_sources(false);
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].uri, "https://maps.example");
    }

    #[test]
    fn response_parsing_extracts_inline_data() {
        let raw = r#"{
            "candidates": [{
                "content": { "parts": [
                    { "inlineData": { "mimeType": "image/png", "data": "aGVsbG8=" } }
                ] }
            }]
        }"#;
        let resp: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let inline = resp.first_inline_data().unwrap();
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(inline.data, "aGVsbG8=");
    }

    #[test]
    fn missing_candidates_yield_nothing() {
        let resp: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.first_text().is_none());
        assert!(resp.first_inline_data().is_none());
        assert!(resp.grounding_sources(true).is_empty());
    }
}
