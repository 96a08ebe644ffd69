/// quick start - create a loan, preview the next payment and record it
use microloan_engine::{
    Frequency, InMemoryLedger, LoanService, LoanTerms, Money, PaymentRequest, Rate,
    SafeTimeProvider, TimeSource,
};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let time = SafeTimeProvider::new(TimeSource::System);
    let today = time.now().date_naive();

    let mut service = LoanService::with_defaults(InMemoryLedger::new());

    // 10,000 at 10% over 5 monthly installments
    let terms = LoanTerms::builder()
        .principal(Money::from_major(10_000))
        .interest_rate(Rate::from_percentage(dec!(10)))
        .installments(5)
        .frequency(Frequency::Monthly)
        .start_date(today)
        .build()?;

    let loan = service.create_loan("client-001", terms, &time)?;
    println!("loan {} total with interest: {}", loan.id, loan.total_with_interest);

    for installment in service.schedule(loan.id)? {
        println!("  #{} due {} amount {}", installment.sequence, installment.due_date, installment.amount);
    }

    // pay the first installment
    let quote = service.quote_payment(loan.id, 1, today)?;
    let payment = service.record_payment(
        loan.id,
        1,
        &PaymentRequest::new(quote.expected_total, today, "Efectivo"),
        &time,
    )?;
    println!("\npaid {} covering installments {:?}", payment.amount, payment.sequences());

    // print current state
    println!("{}", service.statement(loan.id, today)?.to_json_pretty()?);

    Ok(())
}
