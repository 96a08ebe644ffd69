use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};

/// (1 + rate)^periods at full precision
pub fn compound_factor(rate: Rate, periods: u32) -> Result<Decimal> {
    let base = Decimal::ONE + rate.as_decimal();
    let mut factor = Decimal::ONE;
    for _ in 0..periods {
        factor = factor.checked_mul(base).ok_or_else(|| overflow(rate, periods))?;
    }
    Ok(factor)
}

/// balance after capitalizing `rate` on `base` for `periods` periods, rounded once
pub fn compound_balance(base: Money, rate: Rate, periods: u32) -> Result<Money> {
    let factor = compound_factor(rate, periods)?;
    let balance = base
        .as_decimal()
        .checked_mul(factor)
        .ok_or_else(|| overflow(rate, periods))?;
    Ok(Money::from_decimal(balance))
}

/// one month of capitalization on an overdue balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalizationStep {
    pub period: u32,
    pub opening_balance: Money,
    pub surcharge: Money,
    pub closing_balance: Money,
}

/// month-by-month breakdown whose final closing balance equals `compound_balance`
pub fn capitalization_steps(base: Money, rate: Rate, periods: u32) -> Result<Vec<CapitalizationStep>> {
    let mut steps = Vec::with_capacity(periods as usize);
    let mut opening = base;
    for period in 1..=periods {
        // closing balance rounds once from the full-precision factor
        let closing = compound_balance(base, rate, period)?;
        steps.push(CapitalizationStep {
            period,
            opening_balance: opening,
            surcharge: closing - opening,
            closing_balance: closing,
        });
        opening = closing;
    }
    Ok(steps)
}

fn overflow(rate: Rate, periods: u32) -> LoanError {
    LoanError::CalculationOverflow {
        message: format!("compounding {} over {} periods", rate, periods),
    }
}
