/// late fees - fixed vs cascading surcharge on an overdue installment
use chrono::{Duration, NaiveDate};
use microloan_engine::interest::{LateFeeConfig, LateFeeEngine};
use microloan_engine::schedule::ScheduledInstallment;
use microloan_engine::{Installment, LateFeePolicy, Money, Rate, Uuid};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== late fee projection ===\n");

    let due_date = NaiveDate::from_ymd_opt(2024, 3, 1).ok_or("invalid date")?;
    let installment = Installment::from_schedule(
        Uuid::new_v4(),
        &ScheduledInstallment {
            sequence: 1,
            due_date,
            amount: Money::from_major(1_000),
        },
    );

    let rate = Rate::from_percentage(dec!(2));
    let fixed = LateFeeEngine::new(LateFeeConfig::new(LateFeePolicy::Fixed, 5, rate));
    let cascading = LateFeeEngine::new(LateFeeConfig::new(LateFeePolicy::Cascading, 5, rate));

    println!("{:>12} {:>6} {:>10} {:>10}", "as of", "late", "fixed", "cascading");
    for days in [0, 5, 6, 35, 65, 95, 185] {
        let as_of = due_date + Duration::days(days);
        let f = fixed.project(&installment, as_of)?;
        let c = cascading.project(&installment, as_of)?;
        println!(
            "{:>12} {:>6} {:>10} {:>10}",
            as_of.to_string(),
            c.months_overdue,
            f.amount_owed,
            c.amount_owed
        );
    }

    // month-by-month capitalization under the cascading policy
    let as_of = due_date + Duration::days(95);
    println!("\ncapitalization as of {}:", as_of);
    for step in cascading.capitalization_breakdown(&installment, as_of)? {
        println!(
            "  month {}: {} + {} = {}",
            step.period, step.opening_balance, step.surcharge, step.closing_balance
        );
    }

    Ok(())
}
