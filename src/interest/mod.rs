pub mod compound;
pub mod late_fee;

use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};

pub use compound::{capitalization_steps, compound_balance, compound_factor, CapitalizationStep};
pub use late_fee::{LateFeeConfig, LateFeeEngine, LateFeeProjection, DAYS_PER_LATE_MONTH};

/// simple interest charged once over the whole term
pub fn simple_interest(principal: Money, rate: Rate) -> Result<Money> {
    principal
        .checked_apply_rate(rate)
        .ok_or_else(|| LoanError::CalculationOverflow {
            message: format!("interest of {} on {}", rate, principal),
        })
}
