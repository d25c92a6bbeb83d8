//! End-to-end loan scenarios through the public desk facade: Gemini scoring
//! served by a local stand-in, payments through the seeded Daraja simulator.

mod common {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use agriflow::config::{GeminiConfig, PaymentSimulationConfig};
    use agriflow::lending::{GeminiClient, GeminiLoanAssessor, LoanDesk, SimulatedDaraja};

    pub fn scoring_reply(assessment: &Value) -> Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": assessment.to_string() }] }
            }]
        })
    }

    pub fn approved_assessment() -> Value {
        json!({
            "approved": true,
            "creditScore": 684,
            "approvedAmount": 20000,
            "interestRate": 10.0,
            "repaymentDate": "2025-04-30",
            "riskAnalysis": {
                "weatherRisk": "Medium",
                "marketRisk": "Low",
                "pestDiseaseRisk": "High"
            },
            "projectedRevenue": 150000,
            "recommendation": "Approve 20,000 for certified seed and CAN fertilizer."
        })
    }

    pub async fn spawn_gemini(status: StatusCode, reply: Value) -> String {
        let app = Router::new().fallback(move || {
            let reply = reply.clone();
            async move { (status, Json(reply)) }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake gemini");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve fake gemini");
        });
        format!("http://{addr}")
    }

    pub fn desk(base_url: String, disbursement_success_rate: f64) -> LoanDesk {
        let client = GeminiClient::new(GeminiConfig {
            api_key: Some("test-key".to_string()),
            base_url,
            timeout: Duration::from_secs(5),
            ..GeminiConfig::default()
        })
        .expect("client");

        let mut payments = PaymentSimulationConfig::instant(2024);
        payments.disbursement_success_rate = disbursement_success_rate;

        LoanDesk::new(
            Arc::new(GeminiLoanAssessor::new(client)),
            Arc::new(SimulatedDaraja::new(payments)),
        )
    }
}

use agriflow::lending::lifecycle::{ASSESSMENT_FAILED_MESSAGE, DISBURSEMENT_FAILED_MESSAGE};
use agriflow::lending::{
    CreditScoreBand, FarmerProfile, LoanStage, TransactionStatus, TransactionType,
};
use axum::http::StatusCode;
use common::{approved_assessment, desk, scoring_reply, spawn_gemini};
use serde_json::json;

#[tokio::test]
async fn scored_loan_is_disbursed_and_repaid() {
    let base_url = spawn_gemini(StatusCode::OK, scoring_reply(&approved_assessment())).await;
    let desk = desk(base_url, 1.0);
    let loan_id = desk.open(FarmerProfile::sample()).expect("open").loan_id;

    let review = desk.submit(&loan_id).await.expect("submit");
    assert_eq!(review.stage, LoanStage::Review);
    let result = review.result.expect("assessment stored");
    assert_eq!(result.credit_score, 684);
    assert_eq!(result.risk_analysis.pest_disease_risk, "High");
    assert_eq!(review.score_band, Some(CreditScoreBand::Moderate));

    let active = desk.disburse(&loan_id).await.expect("disburse");
    assert_eq!(active.stage, LoanStage::Active);
    let payout = &active.transactions[0];
    assert_eq!(payout.kind, TransactionType::Disbursement);
    assert_eq!(payout.status, TransactionStatus::Completed);
    assert_eq!(payout.amount, 20_000);
    assert_eq!(payout.phone_number, "254700000000");
    assert!(payout.transaction_id.starts_with("B2C-"));

    let completed = desk.repay(&loan_id).await.expect("repay");
    assert_eq!(completed.stage, LoanStage::Completed);
    let repayment = &completed.transactions[1];
    assert_eq!(repayment.kind, TransactionType::Repayment);
    assert_eq!(repayment.amount, 22_000);
    assert!(repayment.transaction_id.starts_with("LNM-"));
}

#[tokio::test]
async fn malformed_scoring_reply_returns_to_application() {
    let reply = scoring_reply(&json!({ "approved": true, "creditScore": 700 }));
    let base_url = spawn_gemini(StatusCode::OK, reply).await;
    let desk = desk(base_url, 1.0);
    let loan_id = desk.open(FarmerProfile::sample()).expect("open").loan_id;

    let snapshot = desk.submit(&loan_id).await.expect("submit");
    assert_eq!(snapshot.stage, LoanStage::Application);
    assert_eq!(snapshot.error.as_deref(), Some(ASSESSMENT_FAILED_MESSAGE));
    assert!(snapshot.result.is_none());
}

#[tokio::test]
async fn upstream_outage_returns_to_application() {
    let base_url = spawn_gemini(StatusCode::SERVICE_UNAVAILABLE, json!({})).await;
    let desk = desk(base_url, 1.0);
    let loan_id = desk.open(FarmerProfile::sample()).expect("open").loan_id;

    let snapshot = desk.submit(&loan_id).await.expect("submit");
    assert_eq!(snapshot.stage, LoanStage::Application);
    assert_eq!(snapshot.error.as_deref(), Some(ASSESSMENT_FAILED_MESSAGE));
}

#[tokio::test]
async fn declined_payout_keeps_the_loan_in_review() {
    let base_url = spawn_gemini(StatusCode::OK, scoring_reply(&approved_assessment())).await;
    let desk = desk(base_url, 0.0);
    let loan_id = desk.open(FarmerProfile::sample()).expect("open").loan_id;
    desk.submit(&loan_id).await.expect("submit");

    let snapshot = desk.disburse(&loan_id).await.expect("disburse");
    assert_eq!(snapshot.stage, LoanStage::Review);
    assert_eq!(snapshot.error.as_deref(), Some(DISBURSEMENT_FAILED_MESSAGE));
    assert!(snapshot.transactions.is_empty());
    assert!(snapshot.result.is_some());
}

#[tokio::test]
async fn reset_after_completion_starts_a_fresh_application() {
    let base_url = spawn_gemini(StatusCode::OK, scoring_reply(&approved_assessment())).await;
    let desk = desk(base_url, 1.0);
    let loan_id = desk.open(FarmerProfile::sample()).expect("open").loan_id;
    desk.submit(&loan_id).await.expect("submit");
    desk.disburse(&loan_id).await.expect("disburse");
    desk.repay(&loan_id).await.expect("repay");

    let snapshot = desk.reset(&loan_id).expect("reset");
    assert_eq!(snapshot.stage, LoanStage::Application);
    assert!(snapshot.transactions.is_empty());
    assert_eq!(snapshot.profile, FarmerProfile::sample());

    let again = desk.submit(&loan_id).await.expect("resubmit");
    assert_eq!(again.stage, LoanStage::Review);
}
