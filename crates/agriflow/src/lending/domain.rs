use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier wrapper for loan lifecycles held by the desk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoanId(pub String);

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FarmType {
    Crops,
    Livestock,
    Mixed,
}

impl FarmType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Crops => "Crops",
            Self::Livestock => "Livestock",
            Self::Mixed => "Mixed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    Planting,
    Growth,
    Harvesting,
}

impl CycleStage {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Planting => "Planting",
            Self::Growth => "Growth",
            Self::Harvesting => "Harvesting",
        }
    }
}

/// Application data entered by the farmer or loan officer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmerProfile {
    pub farmer_name: String,
    pub mpesa_number: String,
    pub location: String,
    pub farm_type: FarmType,
    pub specific_produce: String,
    /// Acres for crops, head count for livestock.
    pub farm_size: f64,
    pub cycle_stage: CycleStage,
    /// KES.
    pub requested_amount: u64,
    pub previous_yield_history: String,
}

impl FarmerProfile {
    /// The prefilled profile shown when a new application is opened.
    pub fn sample() -> Self {
        Self {
            farmer_name: "John Kamau".to_string(),
            mpesa_number: "254700000000".to_string(),
            location: "Kinangop, Nyandarua".to_string(),
            farm_type: FarmType::Crops,
            specific_produce: "Irish Potatoes".to_string(),
            farm_size: 2.5,
            cycle_stage: CycleStage::Planting,
            requested_amount: 25_000,
            previous_yield_history: "120 bags in 2023".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if !self.farm_size.is_finite() || self.farm_size < 0.0 {
            return Err(ProfileError::InvalidFarmSize);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("farm size must be a finite, non-negative number")]
    InvalidFarmSize,
}

/// Three independent, free-text risk ratings returned by the scoring model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAnalysis {
    pub weather_risk: String,
    pub market_risk: String,
    pub pest_disease_risk: String,
}

/// Structured underwriting outcome produced by the assessment collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanAssessmentResult {
    pub approved: bool,
    /// Agri-credit score on the 300-850 scale requested from the model.
    pub credit_score: u32,
    pub approved_amount: u64,
    /// Percentage, e.g. `12.5` for 12.5%.
    pub interest_rate: f64,
    pub repayment_date: String,
    pub risk_analysis: RiskAnalysis,
    pub projected_revenue: u64,
    pub recommendation: String,
}

impl LoanAssessmentResult {
    pub fn score_band(&self) -> CreditScoreBand {
        CreditScoreBand::from_score(self.credit_score)
    }

    /// Principal plus interest, rounded to the nearest shilling.
    pub fn total_repayable(&self) -> u64 {
        let rate = if self.interest_rate.is_finite() {
            self.interest_rate.max(0.0)
        } else {
            0.0
        };
        let total = self.approved_amount as f64 * (1.0 + rate / 100.0);
        total.round() as u64
    }

    pub fn repayment_due(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.repayment_date.trim(), "%Y-%m-%d").ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditScoreBand {
    Strong,
    Moderate,
    Weak,
}

impl CreditScoreBand {
    pub const fn from_score(score: u32) -> Self {
        if score >= 700 {
            Self::Strong
        } else if score >= 500 {
            Self::Moderate
        } else {
            Self::Weak
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Strong => "Strong",
            Self::Moderate => "Moderate",
            Self::Weak => "Weak",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// B2C: business paying the farmer.
    Disbursement,
    /// STK push collection from the farmer (Lipa Mdogo Mdogo).
    Repayment,
}

impl TransactionType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Disbursement => "Disbursement",
            Self::Repayment => "Repayment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

/// One simulated mobile-money operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MpesaTransaction {
    pub transaction_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub amount: u64,
    pub phone_number: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub uri: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationConfidence {
    Verified,
    Contradicted,
    Unverified,
}

impl VerificationConfidence {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Verified => "Verified",
            Self::Contradicted => "Contradicted",
            Self::Unverified => "Unverified",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingResult {
    pub verification_text: String,
    pub sources: Vec<GroundingSource>,
    pub confidence: VerificationConfidence,
}

/// Position of a loan in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStage {
    Application,
    Assessing,
    Review,
    Disbursing,
    Active,
    Repaying,
    Completed,
}

impl LoanStage {
    pub const fn ordered() -> [Self; 7] {
        [
            Self::Application,
            Self::Assessing,
            Self::Review,
            Self::Disbursing,
            Self::Active,
            Self::Repaying,
            Self::Completed,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Application => "Application",
            Self::Assessing => "Assessing",
            Self::Review => "Review",
            Self::Disbursing => "Disbursing",
            Self::Active => "Active",
            Self::Repaying => "Repaying",
            Self::Completed => "Completed",
        }
    }

    /// 1-based position for progress indicators.
    pub const fn step(self) -> usize {
        match self {
            Self::Application => 1,
            Self::Assessing => 2,
            Self::Review => 3,
            Self::Disbursing => 4,
            Self::Active => 5,
            Self::Repaying => 6,
            Self::Completed => 7,
        }
    }

    /// Stages held only while a collaborator call is outstanding.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Assessing | Self::Disbursing | Self::Repaying)
    }
}

impl fmt::Display for LoanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(amount: u64, rate: f64) -> LoanAssessmentResult {
        LoanAssessmentResult {
            approved: true,
            credit_score: 712,
            approved_amount: amount,
            interest_rate: rate,
            repayment_date: "2025-12-15".to_string(),
            risk_analysis: RiskAnalysis {
                weather_risk: "Low".to_string(),
                market_risk: "Medium".to_string(),
                pest_disease_risk: "Late blight".to_string(),
            },
            projected_revenue: 180_000,
            recommendation: "Approve".to_string(),
        }
    }

    #[test]
    fn stage_steps_follow_declared_order() {
        let steps: Vec<usize> = LoanStage::ordered().iter().map(|s| s.step()).collect();
        assert_eq!(steps, vec![1, 2, 3, 4, 5, 6, 7]);
        let transient: Vec<LoanStage> = LoanStage::ordered()
            .into_iter()
            .filter(|stage| stage.is_transient())
            .collect();
        assert_eq!(
            transient,
            vec![LoanStage::Assessing, LoanStage::Disbursing, LoanStage::Repaying]
        );
    }

    #[test]
    fn total_repayable_adds_interest() {
        assert_eq!(assessment(25_000, 12.0).total_repayable(), 28_000);
        assert_eq!(assessment(10_000, 0.0).total_repayable(), 10_000);
        assert_eq!(assessment(10_000, f64::NAN).total_repayable(), 10_000);
    }

    #[test]
    fn repayment_due_parses_iso_dates_only() {
        let mut result = assessment(25_000, 12.0);
        assert_eq!(
            result.repayment_due(),
            NaiveDate::from_ymd_opt(2025, 12, 15)
        );
        result.repayment_date = "after harvest".to_string();
        assert!(result.repayment_due().is_none());
    }

    #[test]
    fn score_bands_split_at_500_and_700() {
        assert_eq!(CreditScoreBand::from_score(850), CreditScoreBand::Strong);
        assert_eq!(CreditScoreBand::from_score(700), CreditScoreBand::Strong);
        assert_eq!(CreditScoreBand::from_score(699), CreditScoreBand::Moderate);
        assert_eq!(CreditScoreBand::from_score(500), CreditScoreBand::Moderate);
        assert_eq!(CreditScoreBand::from_score(300), CreditScoreBand::Weak);
    }

    #[test]
    fn transaction_serializes_kind_as_type() {
        let tx = MpesaTransaction {
            transaction_id: "B2C-1".to_string(),
            kind: TransactionType::Disbursement,
            status: TransactionStatus::Completed,
            amount: 100,
            phone_number: "254700000000".to_string(),
            timestamp: Utc::now(),
            reference: None,
        };
        let value = serde_json::to_value(&tx).expect("serializes");
        assert_eq!(value["type"], "disbursement");
        assert!(value.get("reference").is_none());
    }

    #[test]
    fn validate_rejects_negative_farm_size() {
        let mut profile = FarmerProfile::sample();
        assert!(profile.validate().is_ok());
        profile.farm_size = -1.0;
        assert_eq!(profile.validate(), Err(ProfileError::InvalidFarmSize));
    }
}
