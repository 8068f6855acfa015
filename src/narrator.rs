// src/narrator.rs
use crate::models::FeatureImpact;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

/// Text returned when no narrative was requested.
pub const NO_ANALYSIS: &str = "Analysis not available.";

/// How many top-ranked factors go into the prompt.
pub const PROMPT_FACTORS: usize = 3;

#[derive(Debug, Error)]
pub enum NarratorError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Turns a ranked attribution list into analyst-facing prose.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, factors: &[FeatureImpact]) -> Result<String, NarratorError>;
}

/// Calls the narrator and folds any failure into the returned text.
pub async fn narrate_or_fallback(narrator: &dyn Narrator, factors: &[FeatureImpact]) -> String {
    match narrator.narrate(factors).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Narrative generation failed: {}", e);
            format!("AI Error: {}", e)
        }
    }
}

pub fn build_prompt(factors: &[FeatureImpact]) -> String {
    let factors_str = factors
        .iter()
        .take(PROMPT_FACTORS)
        .map(|f| format!("{}: {:.2}", f.feature, f.impact))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are a friendly fraud analyst explaining a risky transaction to a bank manager.\n\
         \n\
         Key Risk Factors (SHAP Impact Values): {factors_str}\n\
         (Note: Higher positive values mean more likely fraud. Negative values reduce fraud likelihood.)\n\
         \n\
         Please explain in simple, easy-to-understand language:\n\
         \n\
         1. **What's happening?** Describe the suspicious behavior pattern in simple terms. \
         Is the account being drained? Are there unusual transfer patterns?\n\
         \n\
         2. **Why is this risky?** Explain in 1-2 sentences how this pattern indicates potential fraud, \
         mentioning how balance changes and the transaction amount contribute.\n\
         \n\
         3. **What should we do?** Give a clear, actionable next step \
         (e.g. \"Contact the customer immediately to verify\", \"Flag for manual review\").\n\
         \n\
         Keep your response under 150 words. Avoid technical terms like \"SHAP\" or \"machine learning\"."
    )
}

/// Google Gemini `generateContent` client
pub struct GeminiNarrator {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl GeminiNarrator {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Narrator for GeminiNarrator {
    async fn narrate(&self, factors: &[FeatureImpact]) -> Result<String, NarratorError> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": build_prompt(factors)}]
            }]
        });

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        info!("📡 Sending generateContent → {}", url);

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(NarratorError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        extract_text(&text)
    }
}

/// Pull the first candidate's text out of a `generateContent` response.
pub fn extract_text(raw: &str) -> Result<String, NarratorError> {
    let parsed: Value =
        serde_json::from_str(raw).map_err(|e| NarratorError::InvalidResponse(e.to_string()))?;

    parsed["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| NarratorError::InvalidResponse("No content in response".to_string()))
}
