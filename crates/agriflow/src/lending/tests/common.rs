use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Notify;

use crate::lending::assessment::{AssessmentError, LoanAssessor};
use crate::lending::desk::LoanDesk;
use crate::lending::domain::{
    FarmerProfile, GroundingResult, GroundingSource, LoanAssessmentResult, MpesaTransaction,
    RiskAnalysis, TransactionStatus, TransactionType, VerificationConfidence,
};
use crate::lending::lifecycle::LoanLifecycle;
use crate::lending::market::{MarketVerifier, VerificationError};
use crate::lending::payments::{PaymentError, PaymentGateway};
use crate::lending::router::LendingState;

pub(super) fn approved_result() -> LoanAssessmentResult {
    LoanAssessmentResult {
        approved: true,
        credit_score: 720,
        approved_amount: 22_000,
        interest_rate: 12.5,
        repayment_date: "2025-03-15".to_string(),
        risk_analysis: RiskAnalysis {
            weather_risk: "Low".to_string(),
            market_risk: "Medium".to_string(),
            pest_disease_risk: "Medium".to_string(),
        },
        projected_revenue: 180_000,
        recommendation: "Approve with certified seed purchase.".to_string(),
    }
}

pub(super) fn profile_with_farm_size(farm_size: f64) -> FarmerProfile {
    FarmerProfile {
        farm_size,
        ..FarmerProfile::sample()
    }
}

#[derive(Debug)]
pub(super) struct StubAssessor {
    pub result: LoanAssessmentResult,
    pub calls: AtomicUsize,
}

impl StubAssessor {
    pub(super) fn approving() -> Self {
        Self {
            result: approved_result(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn declining() -> Self {
        Self {
            result: LoanAssessmentResult {
                approved: false,
                credit_score: 410,
                approved_amount: 0,
                recommendation: "Decline until yield records are available.".to_string(),
                ..approved_result()
            },
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LoanAssessor for StubAssessor {
    async fn assess(
        &self,
        _profile: &FarmerProfile,
    ) -> Result<LoanAssessmentResult, AssessmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

#[derive(Debug, Default)]
pub(super) struct FailingAssessor;

#[async_trait]
impl LoanAssessor for FailingAssessor {
    async fn assess(
        &self,
        _profile: &FarmerProfile,
    ) -> Result<LoanAssessmentResult, AssessmentError> {
        Err(AssessmentError::Unavailable("network unreachable".to_string()))
    }
}

/// Holds the assessment open until the test releases it.
#[derive(Debug, Default)]
pub(super) struct GatedAssessor {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl LoanAssessor for GatedAssessor {
    async fn assess(
        &self,
        _profile: &FarmerProfile,
    ) -> Result<LoanAssessmentResult, AssessmentError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(approved_result())
    }
}

/// Records every payment and fails the first `disbursement_failures` payouts
/// and `repayment_failures` collections.
#[derive(Debug, Default)]
pub(super) struct ScriptedGateway {
    pub disbursement_failures: AtomicUsize,
    pub repayment_failures: AtomicUsize,
    pub payments: Mutex<Vec<(TransactionType, u64)>>,
}

fn take_failure(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

impl ScriptedGateway {
    pub(super) fn failing_disbursements(count: usize) -> Self {
        Self {
            disbursement_failures: AtomicUsize::new(count),
            ..Self::default()
        }
    }

    pub(super) fn failing_repayments(count: usize) -> Self {
        Self {
            repayment_failures: AtomicUsize::new(count),
            ..Self::default()
        }
    }

    pub(super) fn recorded(&self) -> Vec<(TransactionType, u64)> {
        self.payments.lock().expect("payments mutex poisoned").clone()
    }

    fn record(&self, kind: TransactionType, phone_number: &str, amount: u64) -> MpesaTransaction {
        let mut payments = self.payments.lock().expect("payments mutex poisoned");
        payments.push((kind, amount));
        let prefix = match kind {
            TransactionType::Disbursement => "B2C",
            TransactionType::Repayment => "LNM",
        };
        MpesaTransaction {
            transaction_id: format!("{prefix}-{}", payments.len()),
            kind,
            status: TransactionStatus::Completed,
            amount,
            phone_number: phone_number.to_string(),
            timestamp: Utc::now(),
            reference: None,
        }
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn disburse(
        &self,
        phone_number: &str,
        amount: u64,
    ) -> Result<MpesaTransaction, PaymentError> {
        if take_failure(&self.disbursement_failures) {
            return Err(PaymentError::DisbursementDeclined);
        }
        Ok(self.record(TransactionType::Disbursement, phone_number, amount))
    }

    async fn repay(
        &self,
        phone_number: &str,
        amount: u64,
    ) -> Result<MpesaTransaction, PaymentError> {
        if take_failure(&self.repayment_failures) {
            return Err(PaymentError::Unavailable("STK push timed out".to_string()));
        }
        Ok(self.record(TransactionType::Repayment, phone_number, amount))
    }
}

#[derive(Debug, Default)]
pub(super) struct StubVerifier;

#[async_trait]
impl MarketVerifier for StubVerifier {
    async fn verify(&self, query: &str) -> Result<GroundingResult, VerificationError> {
        if query.trim().is_empty() {
            return Err(VerificationError::EmptyQuery);
        }
        Ok(GroundingResult {
            verification_text: "Prices are verified by recent reports.".to_string(),
            sources: vec![GroundingSource {
                uri: "https://example.org/potatoes".to_string(),
                title: "Potato prices".to_string(),
            }],
            confidence: VerificationConfidence::Verified,
        })
    }
}

#[derive(Debug, Default)]
pub(super) struct UnreachableVerifier;

#[async_trait]
impl MarketVerifier for UnreachableVerifier {
    async fn verify(&self, _query: &str) -> Result<GroundingResult, VerificationError> {
        Err(VerificationError::Unavailable("dns failure".to_string()))
    }
}

pub(super) fn lifecycle_with(
    assessor: Arc<dyn LoanAssessor>,
    gateway: Arc<dyn PaymentGateway>,
) -> LoanLifecycle {
    LoanLifecycle::new(FarmerProfile::sample(), assessor, gateway)
}

pub(super) fn lending_state(verifier: Arc<dyn MarketVerifier>) -> LendingState {
    lending_state_with(Arc::new(StubAssessor::approving()), verifier)
}

pub(super) fn lending_state_with(
    assessor: Arc<dyn LoanAssessor>,
    verifier: Arc<dyn MarketVerifier>,
) -> LendingState {
    LendingState {
        desk: Arc::new(LoanDesk::new(
            assessor,
            Arc::new(ScriptedGateway::default()),
        )),
        verifier,
    }
}

pub(super) async fn json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json body")
}

/// Declines the first `declines` payouts, then never completes a payment.
#[derive(Debug, Default)]
pub(super) struct StalledGateway {
    pub declines: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for StalledGateway {
    async fn disburse(
        &self,
        _phone_number: &str,
        _amount: u64,
    ) -> Result<MpesaTransaction, PaymentError> {
        if take_failure(&self.declines) {
            return Err(PaymentError::DisbursementDeclined);
        }
        std::future::pending().await
    }

    async fn repay(
        &self,
        _phone_number: &str,
        _amount: u64,
    ) -> Result<MpesaTransaction, PaymentError> {
        std::future::pending().await
    }
}
