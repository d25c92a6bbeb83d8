use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::domain::{FarmerProfile, LoanAssessmentResult, RiskAnalysis};
use super::gemini::{GeminiClient, GeminiError, GenerateContentRequest, GenerationConfig};

const ASSESSMENT_TEMPERATURE: f32 = 0.3;

/// Scores a farmer profile. Implementations may call out to remote models.
#[async_trait]
pub trait LoanAssessor: Send + Sync {
    async fn assess(&self, profile: &FarmerProfile)
        -> Result<LoanAssessmentResult, AssessmentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AssessmentError {
    #[error(transparent)]
    Gemini(#[from] GeminiError),
    /// For assessors not backed by Gemini, such as a bureau lookup or a
    /// rules engine, to report that they could not produce a score.
    #[error("assessment collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Underwriting backed by Gemini structured output.
#[derive(Debug, Clone)]
pub struct GeminiLoanAssessor {
    client: GeminiClient,
}

impl GeminiLoanAssessor {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    pub fn request_for(profile: &FarmerProfile) -> GenerateContentRequest {
        let mut request = GenerateContentRequest::from_prompt(underwriting_prompt(profile));
        request.generation_config = Some(GenerationConfig {
            temperature: Some(ASSESSMENT_TEMPERATURE),
            response_mime_type: Some("application/json".to_string()),
            response_schema: Some(response_schema()),
        });
        request
    }
}

#[async_trait]
impl LoanAssessor for GeminiLoanAssessor {
    async fn assess(
        &self,
        profile: &FarmerProfile,
    ) -> Result<LoanAssessmentResult, AssessmentError> {
        let request = Self::request_for(profile);
        let response = self.client.generate(&request).await.map_err(|err| {
            warn!(error = %err, model = self.client.model(), "agri scoring call failed");
            err
        })?;

        let result = response
            .text()
            .ok_or(GeminiError::EmptyResponse)
            .and_then(|text| parse_assessment(&text))
            .map_err(|err| {
                warn!(error = %err, "agri scoring response rejected");
                err
            })?;

        info!(
            approved = result.approved,
            credit_score = result.credit_score,
            approved_amount = result.approved_amount,
            "agri scoring completed"
        );
        Ok(result)
    }
}

/// Decode the model's JSON text. Every field of the result is mandatory.
pub fn parse_assessment(text: &str) -> Result<LoanAssessmentResult, GeminiError> {
    if text.trim().is_empty() {
        return Err(GeminiError::EmptyResponse);
    }
    let payload: AssessmentPayload = serde_json::from_str(text.trim())?;
    Ok(payload.into())
}

/// Wire shape of the model output. The schema sent to Gemini is camelCase,
/// while `LoanAssessmentResult` serializes snake_case on the HTTP API, so the
/// two are decoupled here instead of aliasing every domain field.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssessmentPayload {
    approved: bool,
    credit_score: u32,
    approved_amount: u64,
    interest_rate: f64,
    repayment_date: String,
    risk_analysis: RiskPayload,
    projected_revenue: u64,
    recommendation: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RiskPayload {
    weather_risk: String,
    market_risk: String,
    pest_disease_risk: String,
}

impl From<AssessmentPayload> for LoanAssessmentResult {
    fn from(payload: AssessmentPayload) -> Self {
        Self {
            approved: payload.approved,
            credit_score: payload.credit_score,
            approved_amount: payload.approved_amount,
            interest_rate: payload.interest_rate,
            repayment_date: payload.repayment_date,
            risk_analysis: RiskAnalysis {
                weather_risk: payload.risk_analysis.weather_risk,
                market_risk: payload.risk_analysis.market_risk,
                pest_disease_risk: payload.risk_analysis.pest_disease_risk,
            },
            projected_revenue: payload.projected_revenue,
            recommendation: payload.recommendation,
        }
    }
}

fn underwriting_prompt(profile: &FarmerProfile) -> String {
    format!(
        "Act as an agricultural loan underwriter for the Kenyan market. Analyze this farmer's profile to approve a micro-loan for inputs (fertilizer, feeds, seeds).

Farmer Profile:
- Name: {name}
- Produce: {produce} ({farm_type})
- Location: {location}
- Size: {size} (Acres/Heads)
- Cycle Stage: {cycle}
- Requested: KES {requested}
- History: {history}
- M-PESA: {mpesa}

Consider:
1. Crop cycle duration for repayment date.
2. Typical yield per acre/head for this produce in Kenya.
3. Market value of the produce.
4. If the requested amount is reasonable for inputs for this size.

The loan is \"Lipa Mdogo Mdogo\" (small installments) or bullet payment after harvest via M-PESA.",
        name = profile.farmer_name,
        produce = profile.specific_produce,
        farm_type = profile.farm_type.label(),
        location = profile.location,
        size = profile.farm_size,
        cycle = profile.cycle_stage.label(),
        requested = profile.requested_amount,
        history = profile.previous_yield_history,
        mpesa = profile.mpesa_number,
    )
}

/// Response schema sent with every scoring request; all fields required.
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "approved": {
                "type": "BOOLEAN",
                "description": "Whether the loan is approved based on potential yield."
            },
            "creditScore": {
                "type": "INTEGER",
                "description": "Agri-credit score (300-850) based on crop viability and risk."
            },
            "approvedAmount": {
                "type": "INTEGER",
                "description": "The amount in KES approved for disbursement."
            },
            "interestRate": {
                "type": "NUMBER",
                "description": "Interest rate percentage."
            },
            "repaymentDate": {
                "type": "STRING",
                "description": "Estimated date of repayment based on harvest cycle (YYYY-MM-DD)."
            },
            "riskAnalysis": {
                "type": "OBJECT",
                "properties": {
                    "weatherRisk": {
                        "type": "STRING",
                        "description": "Assessment of weather risks for this location/crop."
                    },
                    "marketRisk": {
                        "type": "STRING",
                        "description": "Volatility of the produce price."
                    },
                    "pestDiseaseRisk": {
                        "type": "STRING",
                        "description": "Risk of pests/diseases for this specific produce."
                    }
                },
                "required": ["weatherRisk", "marketRisk", "pestDiseaseRisk"]
            },
            "projectedRevenue": {
                "type": "INTEGER",
                "description": "Estimated revenue in KES after harvest."
            },
            "recommendation": {
                "type": "STRING",
                "description": "Concise advice for the loan officer."
            }
        },
        "required": [
            "approved",
            "creditScore",
            "approvedAmount",
            "interestRate",
            "repaymentDate",
            "riskAnalysis",
            "projectedRevenue",
            "recommendation"
        ]
    })
}
