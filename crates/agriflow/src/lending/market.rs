use async_trait::async_trait;
use tracing::{info, warn};

use super::domain::{GroundingResult, GroundingSource, VerificationConfidence};
use super::gemini::{
    GeminiClient, GeminiError, GenerateContentRequest, GenerationConfig, GroundingChunk, Tool,
};

const VERIFICATION_TEMPERATURE: f32 = 0.1;
const NO_ANALYSIS: &str = "No analysis generated.";

const VERIFIED_MARKERS: [&str; 4] = ["correct", "accurate", "supports", "verified"];
const CONTRADICTED_MARKERS: [&str; 3] = ["incorrect", "false", "contradicts"];

/// Queries offered to officers who have not typed anything yet.
pub const SUGGESTED_QUERIES: [&str; 4] = [
    "Current price of 90kg bag of Irish Potatoes in Nairobi",
    "Wholesale price of Kienyeji Chicken in Kiambu",
    "Fertilizer subsidy availability in Nyandarua",
    "Predicted rainfall for Rift Valley in November",
];

#[async_trait]
pub trait MarketVerifier: Send + Sync {
    async fn verify(&self, query: &str) -> Result<GroundingResult, VerificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("market query must not be blank")]
    EmptyQuery,
    #[error(transparent)]
    Gemini(#[from] GeminiError),
    /// For verifiers backed by something other than Gemini to report an
    /// outage without inventing a transport error.
    #[error("verification collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Market verification backed by Gemini with Google Search grounding.
#[derive(Debug, Clone)]
pub struct GeminiMarketVerifier {
    client: GeminiClient,
}

impl GeminiMarketVerifier {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    pub fn request_for(query: &str) -> GenerateContentRequest {
        let prompt = format!(
            "You are a market research assistant for farmers. Verify the following query using Google Search.

Query: \"{query}\"

Focus on current market prices in Kenya, weather patterns, or government subsidies.
If search results support the query, classify as Verified. If contradictory, Contradicted."
        );
        let mut request = GenerateContentRequest::from_prompt(prompt);
        request.generation_config = Some(GenerationConfig {
            temperature: Some(VERIFICATION_TEMPERATURE),
            ..GenerationConfig::default()
        });
        request.tools.push(Tool::google_search());
        request
    }
}

#[async_trait]
impl MarketVerifier for GeminiMarketVerifier {
    async fn verify(&self, query: &str) -> Result<GroundingResult, VerificationError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(VerificationError::EmptyQuery);
        }

        let response = self
            .client
            .generate(&Self::request_for(query))
            .await
            .map_err(|err| {
                warn!(error = %err, "market grounding call failed");
                err
            })?;

        let verification_text = response.text().unwrap_or_else(|| NO_ANALYSIS.to_string());
        let sources = collect_sources(response.grounding_chunks());
        let confidence = classify_confidence(&verification_text);

        info!(
            confidence = confidence.label(),
            sources = sources.len(),
            "market grounding completed"
        );

        Ok(GroundingResult {
            verification_text,
            sources,
            confidence,
        })
    }
}

/// Keyword bucket for a grounding narrative. The verified markers are checked
/// first, so a narrative carrying both kinds of marker counts as verified.
pub fn classify_confidence(narrative: &str) -> VerificationConfidence {
    let lowered = narrative.to_lowercase();
    if VERIFIED_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        VerificationConfidence::Verified
    } else if CONTRADICTED_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        VerificationConfidence::Contradicted
    } else {
        VerificationConfidence::Unverified
    }
}

/// Web citations with both a uri and a title, in response order.
pub fn collect_sources(chunks: &[GroundingChunk]) -> Vec<GroundingSource> {
    chunks
        .iter()
        .filter_map(|chunk| chunk.web.as_ref())
        .filter_map(|web| match (web.uri.as_deref(), web.title.as_deref()) {
            (Some(uri), Some(title)) if !uri.is_empty() && !title.is_empty() => {
                Some(GroundingSource {
                    uri: uri.to_string(),
                    title: title.to_string(),
                })
            }
            _ => None,
        })
        .collect()
}
