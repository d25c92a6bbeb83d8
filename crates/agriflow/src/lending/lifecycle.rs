//! Seven-stage loan lifecycle controller.
//!
//! The controller owns one loan's state behind a mutex that is never held
//! across a collaborator call. Each trigger moves into its transient stage,
//! releases the lock, awaits the collaborator, then commits the outcome. A
//! snapshot taken while the call is outstanding therefore shows the transient
//! stage.
//!
//! Every commit is tagged with the cycle it started in. `reset` opens a new
//! cycle, and late results from the previous one are dropped instead of
//! leaking into the fresh application.
//!
//! If a trigger future is dropped before it commits (client disconnect,
//! timeout layer), an `InFlight` guard puts the loan back on the stable
//! stage it started from.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{info, warn};

use super::assessment::LoanAssessor;
use super::domain::{
    CreditScoreBand, FarmerProfile, LoanAssessmentResult, LoanStage, MpesaTransaction,
    ProfileError,
};
use super::payments::PaymentGateway;

pub const ASSESSMENT_FAILED_MESSAGE: &str =
    "Failed to analyze farm profile. Please check connection.";
pub const DISBURSEMENT_FAILED_MESSAGE: &str = "M-PESA disbursement failed. Please retry.";
pub const REPAYMENT_FAILED_MESSAGE: &str = "M-PESA repayment failed. Please retry.";

/// User actions that drive the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanAction {
    EditProfile,
    Submit,
    Disburse,
    Repay,
}

impl LoanAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::EditProfile => "edit profile",
            Self::Submit => "submit",
            Self::Disburse => "disburse",
            Self::Repay => "repay",
        }
    }

    const fn accepted_from(self) -> LoanStage {
        match self {
            Self::EditProfile | Self::Submit => LoanStage::Application,
            Self::Disburse => LoanStage::Review,
            Self::Repay => LoanStage::Active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot {} while the loan is in {stage}", .action.label())]
    InvalidTransition { stage: LoanStage, action: LoanAction },
    #[error(transparent)]
    InvalidProfile(#[from] ProfileError),
    #[error("the loan was reset before the {} call completed", .action.label())]
    Superseded { action: LoanAction },
    #[error("loan not approved for disbursement")]
    NotApproved,
}

/// Read-only view handed to presentation code.
#[derive(Debug, Clone, Serialize)]
pub struct LoanSnapshot {
    pub stage: LoanStage,
    pub stage_label: &'static str,
    pub step: usize,
    pub total_steps: usize,
    pub in_flight: bool,
    pub profile: FarmerProfile,
    pub result: Option<LoanAssessmentResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_band: Option<CreditScoreBand>,
    pub transactions: Vec<MpesaTransaction>,
    pub error: Option<String>,
}

#[derive(Debug)]
struct LifecycleState {
    stage: LoanStage,
    profile: FarmerProfile,
    result: Option<LoanAssessmentResult>,
    transactions: Vec<MpesaTransaction>,
    error: Option<String>,
    cycle: u64,
}

impl LifecycleState {
    fn snapshot(&self) -> LoanSnapshot {
        LoanSnapshot {
            stage: self.stage,
            stage_label: self.stage.label(),
            step: self.stage.step(),
            total_steps: LoanStage::ordered().len(),
            in_flight: self.stage.is_transient(),
            profile: self.profile.clone(),
            result: self.result.clone(),
            score_band: self.result.as_ref().map(LoanAssessmentResult::score_band),
            transactions: self.transactions.clone(),
            error: self.error.clone(),
        }
    }

    fn require(&self, action: LoanAction) -> Result<(), LifecycleError> {
        if self.stage == action.accepted_from() {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                stage: self.stage,
                action,
            })
        }
    }

    /// Everything a payment trigger needs. Stages from Review onward always
    /// carry a result, but the lookup is still checked.
    fn payment_terms(&self, action: LoanAction) -> Result<&LoanAssessmentResult, LifecycleError> {
        self.result
            .as_ref()
            .ok_or(LifecycleError::InvalidTransition {
                stage: self.stage,
                action,
            })
    }
}

pub struct LoanLifecycle {
    assessor: Arc<dyn LoanAssessor>,
    payments: Arc<dyn PaymentGateway>,
    state: Mutex<LifecycleState>,
}

impl std::fmt::Debug for LoanLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoanLifecycle")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl LoanLifecycle {
    pub fn new(
        profile: FarmerProfile,
        assessor: Arc<dyn LoanAssessor>,
        payments: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            assessor,
            payments,
            state: Mutex::new(LifecycleState {
                stage: LoanStage::Application,
                profile,
                result: None,
                transactions: Vec::new(),
                error: None,
                cycle: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().expect("lifecycle mutex poisoned")
    }

    pub fn snapshot(&self) -> LoanSnapshot {
        self.lock().snapshot()
    }

    /// Move into `transient` and arm the guard that undoes it if the caller
    /// never reaches the commit.
    fn begin(&self, state: &mut LifecycleState, transient: LoanStage) -> InFlight<'_> {
        let in_flight = InFlight {
            state: &self.state,
            cycle: state.cycle,
            resume: state.stage,
            previous_error: state.error.take(),
            settled: false,
        };
        state.stage = transient;
        in_flight
    }

    pub fn stage(&self) -> LoanStage {
        self.lock().stage
    }

    /// Replace the profile. Only allowed before the application is submitted.
    pub fn update_profile(&self, profile: FarmerProfile) -> Result<LoanSnapshot, LifecycleError> {
        profile.validate()?;
        let mut state = self.lock();
        state.require(LoanAction::EditProfile)?;
        state.profile = profile;
        Ok(state.snapshot())
    }

    /// Application -> Assessing -> Review, or back to Application on failure.
    pub async fn submit(&self) -> Result<LoanSnapshot, LifecycleError> {
        let (profile, in_flight) = {
            let mut state = self.lock();
            state.require(LoanAction::Submit)?;
            state.profile.validate()?;
            let in_flight = self.begin(&mut state, LoanStage::Assessing);
            (state.profile.clone(), in_flight)
        };
        info!(farmer = %profile.farmer_name, "loan assessment requested");

        let outcome = self.assessor.assess(&profile).await;

        let cycle = in_flight.settle();
        let mut state = self.lock();
        ensure_current(&state, cycle, LoanAction::Submit)?;
        match outcome {
            Ok(result) => {
                info!(
                    approved = result.approved,
                    credit_score = result.credit_score,
                    "loan moved to review"
                );
                state.result = Some(result);
                state.stage = LoanStage::Review;
            }
            Err(err) => {
                warn!(error = %err, "loan assessment failed; returning to application");
                state.stage = LoanStage::Application;
                state.error = Some(ASSESSMENT_FAILED_MESSAGE.to_string());
            }
        }
        Ok(state.snapshot())
    }

    /// Review -> Disbursing -> Active, or back to Review on failure.
    pub async fn disburse(&self) -> Result<LoanSnapshot, LifecycleError> {
        let (phone_number, amount, in_flight) = {
            let mut state = self.lock();
            state.require(LoanAction::Disburse)?;
            let terms = state.payment_terms(LoanAction::Disburse)?;
            if !terms.approved {
                return Err(LifecycleError::NotApproved);
            }
            let amount = terms.approved_amount;
            let in_flight = self.begin(&mut state, LoanStage::Disbursing);
            (state.profile.mpesa_number.clone(), amount, in_flight)
        };

        let outcome = self.payments.disburse(&phone_number, amount).await;

        let cycle = in_flight.settle();
        let mut state = self.lock();
        ensure_current(&state, cycle, LoanAction::Disburse)?;
        match outcome {
            Ok(transaction) => {
                info!(
                    transaction_id = %transaction.transaction_id,
                    amount,
                    "loan disbursed; now active"
                );
                state.transactions.push(transaction);
                state.stage = LoanStage::Active;
            }
            Err(err) => {
                warn!(error = %err, "disbursement failed; returning to review");
                state.stage = LoanStage::Review;
                state.error = Some(DISBURSEMENT_FAILED_MESSAGE.to_string());
            }
        }
        Ok(state.snapshot())
    }

    /// Active -> Repaying -> Completed, or back to Active on failure.
    pub async fn repay(&self) -> Result<LoanSnapshot, LifecycleError> {
        let (phone_number, amount, in_flight) = {
            let mut state = self.lock();
            state.require(LoanAction::Repay)?;
            let amount = state.payment_terms(LoanAction::Repay)?.total_repayable();
            let in_flight = self.begin(&mut state, LoanStage::Repaying);
            (state.profile.mpesa_number.clone(), amount, in_flight)
        };

        let outcome = self.payments.repay(&phone_number, amount).await;

        let cycle = in_flight.settle();
        let mut state = self.lock();
        ensure_current(&state, cycle, LoanAction::Repay)?;
        match outcome {
            Ok(transaction) => {
                info!(
                    transaction_id = %transaction.transaction_id,
                    amount,
                    "loan repaid; lifecycle completed"
                );
                state.transactions.push(transaction);
                state.stage = LoanStage::Completed;
            }
            Err(err) => {
                warn!(error = %err, "repayment failed; returning to active");
                state.stage = LoanStage::Active;
                state.error = Some(REPAYMENT_FAILED_MESSAGE.to_string());
            }
        }
        Ok(state.snapshot())
    }

    /// Return to Application from any stage, keeping the profile for editing.
    pub fn reset(&self) -> LoanSnapshot {
        let mut state = self.lock();
        if state.stage.is_transient() {
            warn!(stage = %state.stage, "reset while a call is in flight; its result will be discarded");
        }
        state.stage = LoanStage::Application;
        state.result = None;
        state.transactions.clear();
        state.error = None;
        state.cycle = state.cycle.wrapping_add(1);
        state.snapshot()
    }
}

/// Outstanding collaborator call. Must be settled before the state lock is
/// retaken for the commit.
struct InFlight<'a> {
    state: &'a Mutex<LifecycleState>,
    cycle: u64,
    resume: LoanStage,
    previous_error: Option<String>,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self) -> u64 {
        self.settled = true;
        self.cycle
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.cycle == self.cycle && state.stage.is_transient() {
            warn!(
                stage = %state.stage,
                resume = %self.resume,
                "call abandoned before commit; restoring stable stage"
            );
            state.stage = self.resume;
            state.error = self.previous_error.take();
        }
    }
}

fn ensure_current(
    state: &LifecycleState,
    cycle: u64,
    action: LoanAction,
) -> Result<(), LifecycleError> {
    if state.cycle == cycle {
        Ok(())
    } else {
        warn!(action = action.label(), "discarding result from a reset cycle");
        Err(LifecycleError::Superseded { action })
    }
}
