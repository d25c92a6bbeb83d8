use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::desk::{DeskError, LoanDesk};
use super::domain::{FarmerProfile, LoanId};
use super::lifecycle::{LifecycleError, LoanSnapshot};
use super::market::{MarketVerifier, VerificationError, SUGGESTED_QUERIES};

pub const VERIFICATION_FAILED_MESSAGE: &str =
    "Failed to verify market data. Please check your connection.";

/// Shared handles for the lending routes.
#[derive(Clone)]
pub struct LendingState {
    pub desk: Arc<LoanDesk>,
    pub verifier: Arc<dyn MarketVerifier>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenLoanRequest {
    #[serde(default)]
    pub profile: Option<FarmerProfile>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyMarketRequest {
    pub query: String,
}

/// Router builder exposing the loan lifecycle and market verification endpoints.
pub fn lending_router(state: LendingState) -> Router {
    Router::new()
        .route(
            "/api/v1/loans",
            post(open_loan_handler).get(portfolio_handler),
        )
        .route("/api/v1/loans/:loan_id", get(snapshot_handler))
        .route("/api/v1/loans/:loan_id/profile", put(update_profile_handler))
        .route("/api/v1/loans/:loan_id/assessment", post(submit_handler))
        .route("/api/v1/loans/:loan_id/disbursement", post(disburse_handler))
        .route("/api/v1/loans/:loan_id/repayment", post(repay_handler))
        .route("/api/v1/loans/:loan_id/reset", post(reset_handler))
        .route("/api/v1/market/verifications", post(verify_market_handler))
        .route("/api/v1/market/suggestions", get(suggestions_handler))
        .with_state(state)
}

pub(crate) async fn open_loan_handler(
    State(state): State<LendingState>,
    request: Option<Json<OpenLoanRequest>>,
) -> Response {
    let profile = request
        .and_then(|Json(request)| request.profile)
        .unwrap_or_else(FarmerProfile::sample);

    match state.desk.open(profile) {
        Ok(opened) => (StatusCode::CREATED, Json(opened)).into_response(),
        Err(err) => desk_error_response(err),
    }
}

pub(crate) async fn portfolio_handler(State(state): State<LendingState>) -> Response {
    (StatusCode::OK, Json(state.desk.portfolio())).into_response()
}

pub(crate) async fn snapshot_handler(
    State(state): State<LendingState>,
    Path(loan_id): Path<String>,
) -> Response {
    snapshot_response(state.desk.snapshot(&LoanId(loan_id)))
}

pub(crate) async fn update_profile_handler(
    State(state): State<LendingState>,
    Path(loan_id): Path<String>,
    Json(profile): Json<FarmerProfile>,
) -> Response {
    snapshot_response(state.desk.update_profile(&LoanId(loan_id), profile))
}

pub(crate) async fn submit_handler(
    State(state): State<LendingState>,
    Path(loan_id): Path<String>,
) -> Response {
    snapshot_response(state.desk.submit(&LoanId(loan_id)).await)
}

pub(crate) async fn disburse_handler(
    State(state): State<LendingState>,
    Path(loan_id): Path<String>,
) -> Response {
    snapshot_response(state.desk.disburse(&LoanId(loan_id)).await)
}

pub(crate) async fn repay_handler(
    State(state): State<LendingState>,
    Path(loan_id): Path<String>,
) -> Response {
    snapshot_response(state.desk.repay(&LoanId(loan_id)).await)
}

pub(crate) async fn reset_handler(
    State(state): State<LendingState>,
    Path(loan_id): Path<String>,
) -> Response {
    snapshot_response(state.desk.reset(&LoanId(loan_id)))
}

pub(crate) async fn verify_market_handler(
    State(state): State<LendingState>,
    Json(request): Json<VerifyMarketRequest>,
) -> Response {
    match state.verifier.verify(&request.query).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(VerificationError::EmptyQuery) => {
            let payload = json!({ "error": VerificationError::EmptyQuery.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        Err(_) => {
            let payload = json!({ "error": VERIFICATION_FAILED_MESSAGE });
            (StatusCode::BAD_GATEWAY, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn suggestions_handler() -> Json<serde_json::Value> {
    Json(json!({ "suggestions": SUGGESTED_QUERIES }))
}

fn snapshot_response(outcome: Result<LoanSnapshot, DeskError>) -> Response {
    match outcome {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(err) => desk_error_response(err),
    }
}

fn desk_error_response(err: DeskError) -> Response {
    let status = match &err {
        DeskError::NotFound(_) => StatusCode::NOT_FOUND,
        DeskError::Lifecycle(LifecycleError::InvalidProfile(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DeskError::Lifecycle(
            LifecycleError::InvalidTransition { .. }
            | LifecycleError::Superseded { .. }
            | LifecycleError::NotApproved,
        ) => StatusCode::CONFLICT,
    };
    let payload = json!({ "error": err.to_string() });
    (status, Json(payload)).into_response()
}
