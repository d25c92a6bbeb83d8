use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::info;

use super::assessment::LoanAssessor;
use super::domain::{FarmerProfile, LoanId, LoanStage, TransactionType};
use super::lifecycle::{LifecycleError, LoanLifecycle, LoanSnapshot};
use super::payments::PaymentGateway;

/// In-memory registry of loan lifecycles, one per dashboard session.
pub struct LoanDesk {
    assessor: Arc<dyn LoanAssessor>,
    payments: Arc<dyn PaymentGateway>,
    lifecycles: Mutex<BTreeMap<LoanId, Arc<LoanLifecycle>>>,
    sequence: AtomicU64,
}

#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    #[error("loan {0} not found")]
    NotFound(LoanId),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenedLoan {
    pub loan_id: LoanId,
    #[serde(flatten)]
    pub snapshot: LoanSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageCount {
    pub stage: LoanStage,
    pub stage_label: &'static str,
    pub count: usize,
}

/// Figures for the dashboard overview, computed from the live lifecycles.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub total_loans: usize,
    pub stages: Vec<StageCount>,
    pub disbursed_total: u64,
    pub repaid_total: u64,
    pub projected_revenue_total: u64,
    /// Share of disbursed loans that have been repaid, 0.0 when nothing was disbursed.
    pub repayment_rate: f64,
}

impl LoanDesk {
    pub fn new(assessor: Arc<dyn LoanAssessor>, payments: Arc<dyn PaymentGateway>) -> Self {
        Self {
            assessor,
            payments,
            lifecycles: Mutex::new(BTreeMap::new()),
            sequence: AtomicU64::new(1),
        }
    }

    fn next_loan_id(&self) -> LoanId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        LoanId(format!("loan-{id:06}"))
    }

    /// Start a new application in the Application stage.
    pub fn open(&self, profile: FarmerProfile) -> Result<OpenedLoan, DeskError> {
        profile.validate().map_err(LifecycleError::from)?;

        let loan_id = self.next_loan_id();
        let lifecycle = Arc::new(LoanLifecycle::new(
            profile,
            self.assessor.clone(),
            self.payments.clone(),
        ));
        let snapshot = lifecycle.snapshot();

        self.lifecycles
            .lock()
            .expect("desk mutex poisoned")
            .insert(loan_id.clone(), lifecycle);
        info!(%loan_id, "loan application opened");

        Ok(OpenedLoan { loan_id, snapshot })
    }

    pub fn get(&self, loan_id: &LoanId) -> Result<Arc<LoanLifecycle>, DeskError> {
        self.lifecycles
            .lock()
            .expect("desk mutex poisoned")
            .get(loan_id)
            .cloned()
            .ok_or_else(|| DeskError::NotFound(loan_id.clone()))
    }

    pub fn snapshot(&self, loan_id: &LoanId) -> Result<LoanSnapshot, DeskError> {
        Ok(self.get(loan_id)?.snapshot())
    }

    pub fn update_profile(
        &self,
        loan_id: &LoanId,
        profile: FarmerProfile,
    ) -> Result<LoanSnapshot, DeskError> {
        Ok(self.get(loan_id)?.update_profile(profile)?)
    }

    pub async fn submit(&self, loan_id: &LoanId) -> Result<LoanSnapshot, DeskError> {
        Ok(self.get(loan_id)?.submit().await?)
    }

    pub async fn disburse(&self, loan_id: &LoanId) -> Result<LoanSnapshot, DeskError> {
        Ok(self.get(loan_id)?.disburse().await?)
    }

    pub async fn repay(&self, loan_id: &LoanId) -> Result<LoanSnapshot, DeskError> {
        Ok(self.get(loan_id)?.repay().await?)
    }

    pub fn reset(&self, loan_id: &LoanId) -> Result<LoanSnapshot, DeskError> {
        Ok(self.get(loan_id)?.reset())
    }

    pub fn portfolio(&self) -> PortfolioSummary {
        let snapshots: Vec<LoanSnapshot> = {
            let guard = self.lifecycles.lock().expect("desk mutex poisoned");
            guard.values().map(|lifecycle| lifecycle.snapshot()).collect()
        };

        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        let mut disbursed_total = 0u64;
        let mut repaid_total = 0u64;
        let mut projected_revenue_total = 0u64;
        let mut disbursed_loans = 0usize;
        let mut repaid_loans = 0usize;

        for snapshot in &snapshots {
            *counts.entry(snapshot.stage.step()).or_default() += 1;

            if let Some(result) = &snapshot.result {
                projected_revenue_total =
                    projected_revenue_total.saturating_add(result.projected_revenue);
            }

            let mut disbursed = false;
            let mut repaid = false;
            for tx in &snapshot.transactions {
                match tx.kind {
                    TransactionType::Disbursement => {
                        disbursed = true;
                        disbursed_total = disbursed_total.saturating_add(tx.amount);
                    }
                    TransactionType::Repayment => {
                        repaid = true;
                        repaid_total = repaid_total.saturating_add(tx.amount);
                    }
                }
            }
            disbursed_loans += usize::from(disbursed);
            repaid_loans += usize::from(repaid);
        }

        let stages = LoanStage::ordered()
            .into_iter()
            .map(|stage| StageCount {
                stage,
                stage_label: stage.label(),
                count: counts.get(&stage.step()).copied().unwrap_or(0),
            })
            .collect();

        let repayment_rate = if disbursed_loans == 0 {
            0.0
        } else {
            repaid_loans as f64 / disbursed_loans as f64
        };

        PortfolioSummary {
            total_loans: snapshots.len(),
            stages,
            disbursed_total,
            repaid_total,
            projected_revenue_total,
            repayment_rate,
        }
    }
}
