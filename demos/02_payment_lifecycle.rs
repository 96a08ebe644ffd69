/// payment lifecycle - late payment, manual override, cancellation and reopening
use chrono::{Duration, TimeZone, Utc};
use microloan_engine::{
    EngineConfig, InMemoryLedger, LateFeePolicy, LoanService, LoanTerms, PaymentRequest,
    SafeTimeProvider, TimeSource,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== payment lifecycle ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    ));
    let controller = time.test_control().unwrap();

    let config = EngineConfig::from_json_str(r#"{ "default_late_fee_policy": "cascading" }"#)?;
    let terms = LoanTerms::from_primitives("5000", "12", 4, "quincenal", "2024-01-01", &config)?;
    let mut service = LoanService::new(InMemoryLedger::new(), config)?;
    let loan = service.create_loan("client-042", terms, &time)?;
    println!("loan total {} policy {}", loan.total_with_interest, LateFeePolicy::Cascading);

    // first two installments on time
    let today = time.now().date_naive();
    let quote = service.quote_payment(loan.id, 2, today)?;
    service.record_payment(
        loan.id,
        2,
        &PaymentRequest::new(quote.expected_total, today, "Transferencia").with_reference("TRX-1001"),
        &time,
    )?;
    println!("{}: paid 2 installments for {}", today, quote.expected_total);

    // the third one is paid late, lender accepts a rounded amount
    controller.advance(Duration::days(70));
    let today = time.now().date_naive();
    let quote = service.quote_payment(loan.id, 1, today)?;
    let line = &quote.lines[0].projection;
    println!(
        "{}: installment {} is {} days past grace, owes {}",
        today, line.sequence, line.days_past_grace, line.amount_owed
    );
    let late = service.record_payment(
        loan.id,
        1,
        &PaymentRequest::new(microloan_engine::Money::from_major(1_450), today, "Efectivo"),
        &time,
    )?;
    println!("accepted {} (override {})", late.amount, late.override_delta());

    // the lender notices a mistake and cancels it
    let cancellation = service.cancel_payment(late.id, "amount entered incorrectly", &time)?;
    println!("cancelled payment, reverted {} installment(s)", cancellation.reverted_installments.len());

    let summary = service.loan_summary(loan.id, today)?;
    println!(
        "\npending {} overdue {} outstanding {}",
        summary.pending_count, summary.overdue_count, summary.outstanding
    );

    println!("\naudit trail:");
    for event in service.take_events() {
        println!("  {:?}", event);
    }

    Ok(())
}
