//! Google Gemini research client
//!
//! Calls `generateContent` with Google Search grounding enabled, decodes the
//! JSON answer and turns grounding chunks into source snippets. An answer
//! that cannot be decoded is followed by one correction prompt (configurable)
//! that quotes the previous text back to the model.

use super::{parse, prompts, ClientFactory, ResearchClient, ResearchError};
use crate::company::{CompanyRecord, PeFirmProfile, SourceSnippet};
use crate::config::{GeminiConfig, RateLimitConfig};
use crate::rate_limit::{RetryHelper, SharedRateLimiter};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: serde_json::Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
    #[serde(default)]
    grounding_supports: Vec<GroundingSupport>,
}

#[derive(Debug, Default, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Debug, Default, Deserialize)]
struct WebSource {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingSupport {
    #[serde(default)]
    segment: Option<Segment>,
    #[serde(default)]
    grounding_chunk_indices: Vec<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct Segment {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate's parts.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// One snippet per grounding chunk with a URL. The snippet text is the
    /// first answer segment that cites the chunk.
    fn sources(&self) -> Vec<SourceSnippet> {
        let Some(metadata) = self.candidates.first().and_then(|c| c.grounding_metadata.as_ref()) else {
            return Vec::new();
        };

        metadata
            .grounding_chunks
            .iter()
            .enumerate()
            .filter_map(|(index, chunk)| {
                let web = chunk.web.as_ref()?;
                let url = web.uri.clone()?;
                let snippet = metadata
                    .grounding_supports
                    .iter()
                    .find(|s| s.grounding_chunk_indices.contains(&index))
                    .and_then(|s| s.segment.as_ref())
                    .and_then(|seg| seg.text.clone())
                    .unwrap_or_default();
                Some(SourceSnippet {
                    snippet,
                    url,
                    title: web.title.clone().unwrap_or_else(|| "Unknown Source".to_string()),
                })
            })
            .collect()
    }
}

/// Result of the prompt / correction loop
struct JsonAnswer {
    value: Option<Value>,
    sources: Vec<SourceSnippet>,
    last_text: String,
}

/// Gemini API client
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
    api_key: String,
    retry: RetryHelper,
    limiter: SharedRateLimiter,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(
        config: &GeminiConfig,
        rate_limit: &RateLimitConfig,
        limiter: SharedRateLimiter,
        api_key: &str,
    ) -> Result<Self, ResearchError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ResearchError::MissingApiKey);
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            config: config.clone(),
            api_key: api_key.to_string(),
            retry: RetryHelper::new(rate_limit),
            limiter,
        })
    }

    /// Factory handing out clients that share one process-wide rate limiter.
    pub fn factory(config: GeminiConfig, rate_limit: RateLimitConfig) -> ClientFactory {
        let limiter = SharedRateLimiter::new(rate_limit.requests_per_second);
        Arc::new(move |api_key: &str| {
            let client = GeminiClient::new(&config, &rate_limit, limiter.clone(), api_key)?;
            Ok(Arc::new(client) as Arc<dyn ResearchClient>)
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            self.api_key
        )
    }

    fn request_body(&self, prompt: &str) -> GenerateRequest {
        let tools = if self.config.google_search {
            vec![Tool { google_search: serde_json::Map::new() }]
        } else {
            Vec::new()
        };
        GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt.to_string() }],
            }],
            tools,
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
            },
        }
    }

    /// One HTTP round trip
    async fn send_once(&self, body: &GenerateRequest) -> Result<GenerateResponse, ResearchError> {
        self.limiter.acquire().await;

        let url = self.endpoint();
        debug!("Sending request to Gemini API: {}", url.replace(&self.api_key, "***"));

        // reqwest errors carry the request URL, which holds the key
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ResearchError::Http(e.without_url()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ResearchError::Http(e.without_url()))?;

        if !status.is_success() {
            error!("Gemini API error: {} - {}", status, text);
            return Err(ResearchError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }

    /// Send a prompt, retrying transient transport failures with backoff.
    async fn generate(&self, prompt: &str) -> Result<GenerateResponse, ResearchError> {
        let body = self.request_body(prompt);
        self.retry
            .with_retry(|| self.send_once(&body), ResearchError::is_transient)
            .await
    }

    /// Ask for a JSON answer, re-prompting with a correction request while
    /// the answer cannot be decoded.
    async fn generate_json<F>(&self, subject: &str, initial_prompt: String, correction: F) -> Result<JsonAnswer, ResearchError>
    where
        F: Fn(&str) -> String,
    {
        let attempts = self.config.parse_attempts.max(1);
        let mut last_text = String::new();
        let mut sources = Vec::new();

        for attempt in 0..attempts {
            let prompt = if attempt == 0 {
                initial_prompt.clone()
            } else {
                warn!("Retrying JSON parsing for {}. Attempt {}.", subject, attempt + 1);
                correction(&last_text)
            };

            let response = self.generate(&prompt).await?;
            last_text = response.text();
            let response_sources = response.sources();
            if !response_sources.is_empty() {
                sources = response_sources;
            }

            if let Some(value) = parse::extract_json_object(&last_text) {
                return Ok(JsonAnswer {
                    value: Some(value),
                    sources,
                    last_text,
                });
            }
        }

        Ok(JsonAnswer {
            value: None,
            sources,
            last_text,
        })
    }
}

#[async_trait]
impl ResearchClient for GeminiClient {
    async fn analyze_company(&self, name: &str) -> Result<CompanyRecord, ResearchError> {
        info!("Initiating analysis for company: {}", name);
        let answer = self
            .generate_json(name, prompts::analyze_company(name), |previous| {
                prompts::company_correction(name, previous)
            })
            .await?;

        let mut record = CompanyRecord::new(name);
        record.source_snippets = answer.sources;
        match answer.value {
            Some(value) => parse::apply_company_answer(&mut record, &value),
            None if answer.last_text.trim().is_empty() => {
                warn!("No text content in Gemini response for {}", name);
                record.error = Some("Gemini returned no text content.".to_string());
            }
            None => {
                error!("Could not decode JSON for {} after retries. Final response: {}", name, answer.last_text);
                record.error = Some("Failed to parse AI response as JSON after multiple attempts.".to_string());
            }
        }

        info!("Finished analysis for {}", name);
        Ok(record)
    }

    async fn research_pe_firm(&self, name: &str) -> Result<PeFirmProfile, ResearchError> {
        info!("Initiating portfolio research for PE firm: {}", name);
        let answer = self
            .generate_json(name, prompts::research_pe_portfolio(name), |previous| {
                prompts::portfolio_correction(name, previous)
            })
            .await?;

        let mut profile = PeFirmProfile::new(name);
        match answer.value {
            Some(value) => parse::apply_portfolio_answer(&mut profile, &value),
            None => {
                error!("Could not decode PE portfolio JSON for {}. Final response: {}", name, answer.last_text);
                profile.error = Some(
                    "Failed to parse AI response for PE portfolio as JSON after multiple attempts.".to_string(),
                );
            }
        }

        info!(
            "Finished PE research for {}. Portfolio companies found: {}",
            name,
            profile.portfolio_companies.len()
        );
        Ok(profile)
    }
}
