//! Agricultural micro-lending: AI underwriting, market verification, and the
//! simulated M-PESA loan lifecycle.

pub mod assessment;
pub mod desk;
pub mod domain;
pub mod gemini;
pub mod lifecycle;
pub mod market;
pub mod payments;
pub mod router;

#[cfg(test)]
mod tests;

pub use assessment::{AssessmentError, GeminiLoanAssessor, LoanAssessor};
pub use desk::{DeskError, LoanDesk, OpenedLoan, PortfolioSummary, StageCount};
pub use domain::{
    CreditScoreBand, CycleStage, FarmType, FarmerProfile, GroundingResult, GroundingSource,
    LoanAssessmentResult, LoanId, LoanStage, MpesaTransaction, ProfileError, RiskAnalysis,
    TransactionStatus, TransactionType, VerificationConfidence,
};
pub use gemini::{GeminiClient, GeminiError};
pub use lifecycle::{LifecycleError, LoanAction, LoanLifecycle, LoanSnapshot};
pub use market::{
    classify_confidence, collect_sources, GeminiMarketVerifier, MarketVerifier,
    VerificationError, SUGGESTED_QUERIES,
};
pub use payments::{PaymentError, PaymentGateway, SimulatedDaraja};
pub use router::{lending_router, LendingState};
