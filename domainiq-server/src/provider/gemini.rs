//! Gemini `generateContent` client
//!
//! The model is asked for a bare JSON object of scores. The first text part
//! of the first candidate is parsed (a surrounding ```json fence is
//! tolerated), range-checked and turned into an [`AnalysisResult`].
//!
//! # Error classification
//!
//! | Response                                     | Error          |
//! |----------------------------------------------|----------------|
//! | HTTP 429, or a `RESOURCE_EXHAUSTED` body     | `QuotaExceeded`|
//! | timeout, connect failure, HTTP 500/502/503/504 | `Transient`  |
//! | anything else, including bad payloads        | `Other`        |
//!
//! Error messages carry the API's status and message, never the raw body or
//! the key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domainiq::{
    AnalysisResult, AnalysisSource, InferenceProvider, InvestmentGrade, MAX_SCORE, ProviderError,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Connection settings for [`GeminiProvider`]
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    /// API base URL, e.g. `https://generativelanguage.googleapis.com/v1beta`
    pub endpoint: String,
    pub timeout: Duration,
}

pub struct GeminiProvider {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl InferenceProvider for GeminiProvider {
    async fn analyze(&self, key: &str) -> Result<AnalysisResult, ProviderError> {
        debug!(domain = %key, model = %self.config.model, "Sending request to Gemini");

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&GenerateRequest::for_domain(key))
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport_error)?;

        if !status.is_success() {
            let err = classify_status(status.as_u16(), &body);
            warn!(status = %status, error = %err, "Gemini API error response");
            return Err(err);
        }

        parse_response(key, &body, Utc::now())
    }
}

fn prompt(domain: &str) -> String {
    format!(
        "You are a domain name investment analyst. Evaluate the domain \"{domain}\".\n\
         Respond with only a JSON object with these fields:\n\
         - brandability: integer 0-100\n\
         - memorability: integer 0-100\n\
         - seo_potential: integer 0-100\n\
         - rarity: integer 0-100\n\
         - investment_grade: one of \"A+\", \"A\", \"B\", \"C\", \"D\"\n\
         - estimated_value_usd: integer\n\
         - summary: one sentence"
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

impl GenerateRequest {
    fn for_domain(domain: &str) -> Self {
        GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt(domain)),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                response_mime_type: "application/json",
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    /// Absent when the candidate was blocked
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// The score object the model is asked to produce
#[derive(Debug, Deserialize)]
struct ScorePayload {
    brandability: f64,
    memorability: f64,
    seo_potential: f64,
    rarity: f64,
    #[serde(default)]
    investment_grade: Option<String>,
    #[serde(default)]
    estimated_value_usd: Option<f64>,
    #[serde(default)]
    summary: Option<String>,
}

fn classify_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Transient("request timed out".to_string())
    } else if err.is_connect() {
        ProviderError::Transient(format!("connection failed: {err}"))
    } else if err.is_body() {
        ProviderError::Transient(format!("response interrupted: {err}"))
    } else {
        ProviderError::Other(format!("request failed: {err}"))
    }
}

pub(crate) fn classify_status(status: u16, body: &str) -> ProviderError {
    let detail = serde_json::from_str::<ApiError>(body).ok().map(|e| e.error);
    let message = match &detail {
        Some(detail) => format!("HTTP {status} {}: {}", detail.status, detail.message),
        None => format!("HTTP {status}"),
    };
    let exhausted = detail
        .as_ref()
        .is_some_and(|detail| detail.status == "RESOURCE_EXHAUSTED");

    match status {
        429 => ProviderError::QuotaExceeded(message),
        _ if exhausted => ProviderError::QuotaExceeded(message),
        500 | 502 | 503 | 504 => ProviderError::Transient(message),
        _ => ProviderError::Other(message),
    }
}

pub(crate) fn parse_response(
    domain: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Result<AnalysisResult, ProviderError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Other(format!("malformed response: {e}")))?;

    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().find_map(|part| part.text))
        .ok_or_else(|| ProviderError::Other("response has no text".to_string()))?;

    let payload: ScorePayload = serde_json::from_str(strip_code_fence(&text))
        .map_err(|e| ProviderError::Other(format!("unparseable scores: {e}")))?;

    let mut result = AnalysisResult {
        domain: domain.to_string(),
        brandability: score("brandability", payload.brandability)?,
        memorability: score("memorability", payload.memorability)?,
        seo_potential: score("seo_potential", payload.seo_potential)?,
        rarity: score("rarity", payload.rarity)?,
        investment_grade: InvestmentGrade::D,
        estimated_value_usd: payload
            .estimated_value_usd
            .filter(|value| value.is_finite() && *value >= 0.0)
            .map(|value| value.round() as u64),
        summary: payload.summary.filter(|s| !s.trim().is_empty()),
        source: AnalysisSource::Provider,
        analyzed_at: now,
    };

    // A missing or unknown grade is derived from the scores
    result.investment_grade = payload
        .investment_grade
        .and_then(|grade| grade.parse().ok())
        .unwrap_or_else(|| InvestmentGrade::from_score(result.average_score()));

    Ok(result)
}

fn score(name: &str, value: f64) -> Result<u8, ProviderError> {
    if value.is_finite() && (0.0..=MAX_SCORE as f64).contains(&value) {
        Ok(value.round() as u8)
    } else {
        Err(ProviderError::Other(format!("{name} out of range: {value}")))
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
