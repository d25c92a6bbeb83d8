//! Simulated Safaricom Daraja gateway.
//!
//! B2C disbursements fail on a configurable share of attempts to mimic
//! timeouts and float shortfalls. STK push repayments always complete once the
//! simulated PIN-entry delay has elapsed.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use super::domain::{MpesaTransaction, TransactionStatus, TransactionType};
use crate::config::PaymentSimulationConfig;

const RECEIPT_SPACE: u32 = 10_000_000;
const DISBURSEMENT_REFERENCE: &str = "AgriFlow Loan";
const REPAYMENT_REFERENCE: &str = "Loan Repayment";

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Pay loan funds out to the farmer's wallet.
    async fn disburse(
        &self,
        phone_number: &str,
        amount: u64,
    ) -> Result<MpesaTransaction, PaymentError>;

    /// Collect a repayment from the farmer's wallet.
    async fn repay(&self, phone_number: &str, amount: u64)
        -> Result<MpesaTransaction, PaymentError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("Daraja B2C transaction failed: timeout or insufficient funds")]
    DisbursementDeclined,
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug)]
pub struct SimulatedDaraja {
    config: PaymentSimulationConfig,
    rng: Mutex<StdRng>,
}

impl SimulatedDaraja {
    pub fn new(config: PaymentSimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }

    pub fn with_rng(config: PaymentSimulationConfig, rng: StdRng) -> Self {
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Draws the outcome and receipt number in one step so the lock is never
    /// held across the simulated latency.
    fn draw(&self, success_rate: f64) -> (bool, u32) {
        let mut rng = self.rng.lock().expect("payment rng mutex poisoned");
        let success = rng.gen_bool(success_rate.clamp(0.0, 1.0));
        let receipt = rng.gen_range(0..RECEIPT_SPACE);
        (success, receipt)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedDaraja {
    async fn disburse(
        &self,
        phone_number: &str,
        amount: u64,
    ) -> Result<MpesaTransaction, PaymentError> {
        info!(amount, phone_number, "initiating B2C disbursement");
        tokio::time::sleep(self.config.disbursement_delay).await;

        let (success, receipt) = self.draw(self.config.disbursement_success_rate);
        if !success {
            warn!(amount, phone_number, "B2C disbursement declined");
            return Err(PaymentError::DisbursementDeclined);
        }

        Ok(completed_transaction(
            format!("B2C-{receipt}"),
            TransactionType::Disbursement,
            phone_number,
            amount,
            DISBURSEMENT_REFERENCE,
        ))
    }

    async fn repay(
        &self,
        phone_number: &str,
        amount: u64,
    ) -> Result<MpesaTransaction, PaymentError> {
        info!(amount, phone_number, "triggering STK push");
        tokio::time::sleep(self.config.repayment_delay).await;

        let (_, receipt) = self.draw(1.0);
        Ok(completed_transaction(
            format!("LNM-{receipt}"),
            TransactionType::Repayment,
            phone_number,
            amount,
            REPAYMENT_REFERENCE,
        ))
    }
}

fn completed_transaction(
    transaction_id: String,
    kind: TransactionType,
    phone_number: &str,
    amount: u64,
    reference: &str,
) -> MpesaTransaction {
    MpesaTransaction {
        transaction_id,
        kind,
        status: TransactionStatus::Completed,
        amount,
        phone_number: phone_number.to_string(),
        timestamp: Utc::now(),
        reference: Some(reference.to_string()),
    }
}
