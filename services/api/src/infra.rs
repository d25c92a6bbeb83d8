use agriflow::config::{AppConfig, PaymentSimulationConfig};
use agriflow::error::AppError;
use agriflow::lending::{
    AssessmentError, CycleStage, FarmType, FarmerProfile, GeminiClient, GeminiLoanAssessor,
    GeminiMarketVerifier, LendingState, LoanAssessmentResult, LoanAssessor, LoanDesk,
    RiskAnalysis, SimulatedDaraja,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Wire the Gemini-backed collaborators and the Daraja simulator into one
/// shared state.
pub(crate) fn lending_state(config: &AppConfig) -> Result<LendingState, AppError> {
    let client = GeminiClient::new(config.gemini.clone())?;
    let desk = LoanDesk::new(
        Arc::new(GeminiLoanAssessor::new(client.clone())),
        Arc::new(SimulatedDaraja::new(config.payments.clone())),
    );
    Ok(LendingState {
        desk: Arc::new(desk),
        verifier: Arc::new(GeminiMarketVerifier::new(client)),
    })
}

pub(crate) fn offline_desk(payments: PaymentSimulationConfig) -> LoanDesk {
    LoanDesk::new(
        Arc::new(OfflineAssessor),
        Arc::new(SimulatedDaraja::new(payments)),
    )
}

/// Rule-of-thumb underwriting for demos run without an AI credential.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct OfflineAssessor;

const INPUT_COST_PER_UNIT: f64 = 12_000.0;
const OFFLINE_INTEREST_RATE: f64 = 12.5;

impl OfflineAssessor {
    pub(crate) fn score(profile: &FarmerProfile) -> LoanAssessmentResult {
        let mut credit_score: u32 = 560;
        if !profile.previous_yield_history.trim().is_empty() {
            credit_score += 120;
        }
        if profile.farm_size >= 1.0 {
            credit_score += 40;
        }
        if profile.farm_type == FarmType::Mixed {
            credit_score += 20;
        }
        let credit_score = credit_score.clamp(300, 850);

        let ceiling = (profile.farm_size * INPUT_COST_PER_UNIT).round() as u64;
        let approved_amount = profile.requested_amount.min(ceiling);
        let approved = credit_score >= 500 && approved_amount > 0;

        let days_to_harvest = match profile.cycle_stage {
            CycleStage::Planting => 120,
            CycleStage::Growth => 75,
            CycleStage::Harvesting => 30,
        };
        let repayment_date = (Utc::now().date_naive() + Duration::days(days_to_harvest))
            .format("%Y-%m-%d")
            .to_string();

        let recommendation = if approved_amount < profile.requested_amount {
            format!(
                "Approve KES {approved_amount}; the request exceeds typical input costs for {} {}.",
                profile.farm_size, profile.specific_produce
            )
        } else {
            format!(
                "Approve the full request for {} inputs with repayment after harvest.",
                profile.specific_produce
            )
        };

        LoanAssessmentResult {
            approved,
            credit_score,
            approved_amount: if approved { approved_amount } else { 0 },
            interest_rate: OFFLINE_INTEREST_RATE,
            repayment_date,
            risk_analysis: RiskAnalysis {
                weather_risk: "Medium".to_string(),
                market_risk: "Low".to_string(),
                pest_disease_risk: "Medium".to_string(),
            },
            projected_revenue: approved_amount.saturating_mul(6),
            recommendation,
        }
    }
}

#[async_trait]
impl LoanAssessor for OfflineAssessor {
    async fn assess(
        &self,
        profile: &FarmerProfile,
    ) -> Result<LoanAssessmentResult, AssessmentError> {
        Ok(Self::score(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_profile_is_capped_at_input_costs() {
        let result = OfflineAssessor::score(&FarmerProfile::sample());
        assert!(result.approved);
        assert_eq!(result.credit_score, 720);
        assert_eq!(result.approved_amount, 25_000);
        assert!(result.repayment_due().is_some());
    }

    #[test]
    fn small_plot_gets_a_reduced_amount() {
        let profile = FarmerProfile {
            farm_size: 0.5,
            previous_yield_history: String::new(),
            ..FarmerProfile::sample()
        };
        let result = OfflineAssessor::score(&profile);
        assert_eq!(result.credit_score, 560);
        assert_eq!(result.approved_amount, 6_000);
        assert!(result.recommendation.contains("6000"));
    }

    #[test]
    fn empty_plot_is_declined() {
        let profile = FarmerProfile {
            farm_size: 0.0,
            ..FarmerProfile::sample()
        };
        let result = OfflineAssessor::score(&profile);
        assert!(!result.approved);
        assert_eq!(result.approved_amount, 0);
    }
}
