use crate::infra::{lending_state, offline_desk};
use agriflow::config::{AppConfig, PaymentSimulationConfig};
use agriflow::error::AppError;
use agriflow::lending::{
    FarmerProfile, GroundingResult, LoanAssessmentResult, LoanDesk, LoanSnapshot, LoanStage,
    MarketVerifier, MpesaTransaction, PortfolioSummary, SUGGESTED_QUERIES,
};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;

const MAX_DISBURSEMENT_ATTEMPTS: usize = 3;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Score the loan with built-in rules instead of calling Gemini.
    #[arg(long)]
    pub(crate) offline: bool,
    /// Seed the payment simulator so receipts and failures repeat.
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    /// Skip the simulated M-PESA latency.
    #[arg(long)]
    pub(crate) fast: bool,
}

#[derive(Args, Debug)]
pub(crate) struct VerifyArgs {
    /// Market claim to check, e.g. "Current price of Irish Potatoes in Nyandarua"
    #[arg(required = true, num_args = 1..)]
    pub(crate) query: Vec<String>,
}

impl VerifyArgs {
    pub(crate) fn query(&self) -> String {
        self.query.join(" ")
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        offline,
        seed,
        fast,
    } = args;

    let mut config = AppConfig::load()?;
    config.payments = demo_payments(config.payments, seed, fast);

    println!("AgriFlow loan walkthrough");
    let desk: Arc<LoanDesk> = if offline {
        println!("Scoring: offline rules (no AI call)");
        Arc::new(offline_desk(config.payments.clone()))
    } else {
        println!("Scoring: Gemini ({})", config.gemini.model);
        lending_state(&config)?.desk
    };

    let opened = desk.open(FarmerProfile::sample())?;
    let loan_id = opened.loan_id.clone();
    println!("\nLoan {loan_id} opened");
    render_profile(&opened.snapshot.profile);
    render_stage(&opened.snapshot);

    announce(LoanStage::Assessing);
    let snapshot = desk.submit(&loan_id).await?;
    render_stage(&snapshot);
    if let Some(message) = &snapshot.error {
        println!("  {message}");
        return Ok(());
    }
    if let Some(result) = &snapshot.result {
        render_assessment(result);
        if !result.approved {
            println!("\nApplication declined; nothing to disburse.");
            return Ok(());
        }
    }

    let mut snapshot = snapshot;
    for attempt in 1..=MAX_DISBURSEMENT_ATTEMPTS {
        announce(LoanStage::Disbursing);
        snapshot = desk.disburse(&loan_id).await?;
        render_stage(&snapshot);
        match &snapshot.error {
            Some(message) => println!("  Attempt {attempt}: {message}"),
            None => break,
        }
    }
    if snapshot.stage != LoanStage::Active {
        println!("\nDisbursement did not go through; the loan stays in review.");
        return Ok(());
    }
    render_transactions(&snapshot.transactions);

    announce(LoanStage::Repaying);
    let snapshot = desk.repay(&loan_id).await?;
    render_stage(&snapshot);
    if let Some(message) = &snapshot.error {
        println!("  {message}");
    }
    render_transactions(&snapshot.transactions);

    render_portfolio(&desk.portfolio());
    Ok(())
}

pub(crate) async fn run_verify(args: VerifyArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let state = lending_state(&config)?;
    let query = args.query();

    println!("Verifying: {query}");
    let result = state.verifier.verify(&query).await?;
    render_grounding(&result);

    println!("\nOther checks to try");
    for suggestion in SUGGESTED_QUERIES.iter().filter(|s| **s != query) {
        println!("- {suggestion}");
    }
    Ok(())
}

fn demo_payments(
    mut payments: PaymentSimulationConfig,
    seed: Option<u64>,
    fast: bool,
) -> PaymentSimulationConfig {
    if let Some(seed) = seed {
        payments.seed = Some(seed);
    }
    if fast {
        payments.disbursement_delay = Duration::ZERO;
        payments.repayment_delay = Duration::ZERO;
    }
    payments
}

fn announce(stage: LoanStage) {
    println!(
        "[{}/{}] {}...",
        stage.step(),
        LoanStage::ordered().len(),
        stage.label()
    );
}

fn render_stage(snapshot: &LoanSnapshot) {
    println!(
        "[{}/{}] {}",
        snapshot.step, snapshot.total_steps, snapshot.stage_label
    );
}

fn render_profile(profile: &FarmerProfile) {
    println!(
        "  Farmer: {} ({}), M-PESA {}",
        profile.farmer_name, profile.location, profile.mpesa_number
    );
    println!(
        "  Farm: {} {} on {} units, {} stage",
        profile.farm_type.label(),
        profile.specific_produce,
        profile.farm_size,
        profile.cycle_stage.label()
    );
    println!(
        "  Requested: KES {} | History: {}",
        profile.requested_amount, profile.previous_yield_history
    );
}

fn render_assessment(result: &LoanAssessmentResult) {
    let decision = if result.approved { "Approved" } else { "Declined" };
    println!("\nAssessment: {decision}");
    println!(
        "  Agri-credit score: {} ({})",
        result.credit_score,
        result.score_band().label()
    );
    println!(
        "  Approved amount: KES {} at {:.1}% | repay KES {} by {}",
        result.approved_amount,
        result.interest_rate,
        result.total_repayable(),
        result.repayment_date
    );
    println!("  Projected revenue: KES {}", result.projected_revenue);
    println!(
        "  Risk: weather {}, market {}, pests/disease {}",
        result.risk_analysis.weather_risk,
        result.risk_analysis.market_risk,
        result.risk_analysis.pest_disease_risk
    );
    println!("  Recommendation: {}", result.recommendation);
}

fn render_transactions(transactions: &[MpesaTransaction]) {
    println!("  M-PESA ledger:");
    for tx in transactions {
        println!(
            "  - {} {} KES {} to/from {} [{}] {}",
            tx.transaction_id,
            tx.kind.label(),
            tx.amount,
            tx.phone_number,
            tx.status.label(),
            tx.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

fn render_portfolio(summary: &PortfolioSummary) {
    println!("\nPortfolio");
    println!(
        "  Loans: {} | disbursed KES {} | repaid KES {} | repayment rate {:.0}%",
        summary.total_loans,
        summary.disbursed_total,
        summary.repaid_total,
        summary.repayment_rate * 100.0
    );
}

fn render_grounding(result: &GroundingResult) {
    println!("Confidence: {}", result.confidence.label());
    println!("\n{}", result.verification_text);
    if result.sources.is_empty() {
        println!("\nSources: none returned");
    } else {
        println!("\nSources");
        for source in &result.sources {
            println!("- {} <{}>", source.title, source.uri);
        }
    }
}
