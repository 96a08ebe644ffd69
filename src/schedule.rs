use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calendar::DueDateResolver;
use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};
use crate::interest::simple_interest;
use crate::types::Frequency;

/// one row of a generated schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledInstallment {
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
}

/// complete installment plan for a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentSchedule {
    pub principal: Money,
    pub interest_rate: Rate,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    /// principal plus simple interest over the whole term
    pub total_with_interest: Money,
    pub interest_amount: Money,
    /// amount of every installment but the last
    pub base_installment: Money,
    pub installments: Vec<ScheduledInstallment>,
}

impl InstallmentSchedule {
    pub fn installment_count(&self) -> u32 {
        self.installments.len() as u32
    }

    pub fn get(&self, sequence: u32) -> Option<&ScheduledInstallment> {
        sequence
            .checked_sub(1)
            .and_then(|i| self.installments.get(i as usize))
    }

    /// due date of the last installment
    pub fn maturity_date(&self) -> Option<NaiveDate> {
        self.installments.last().map(|i| i.due_date)
    }

    pub fn scheduled_total(&self) -> Money {
        self.installments.iter().map(|i| i.amount).sum()
    }
}

/// largest principal a loan may carry, in major units
pub const MAX_PRINCIPAL: i64 = 1_000_000_000_000_000;

/// simple interest applied once over the full term, rounded to cents
pub fn total_with_interest(principal: Money, rate: Rate) -> Result<Money> {
    let interest = simple_interest(principal, rate)?;
    principal
        .checked_add(interest)
        .ok_or_else(|| LoanError::CalculationOverflow {
            message: format!("total of {} plus {} interest", principal, interest),
        })
}

/// builds the installment plan at loan creation
pub struct ScheduleGenerator;

impl ScheduleGenerator {
    /// generate the schedule; the last installment absorbs the rounding remainder
    pub fn generate(
        principal: Money,
        interest_rate: Rate,
        installment_count: u32,
        start_date: NaiveDate,
        frequency: Frequency,
    ) -> Result<InstallmentSchedule> {
        validate_terms(principal, interest_rate, installment_count)?;

        let total = total_with_interest(principal, interest_rate)?;
        let count = Decimal::from(installment_count);
        let base = Money::from_decimal(total.as_decimal() / count);
        let leading = base
            .as_decimal()
            .checked_mul(Decimal::from(installment_count - 1))
            .ok_or_else(|| LoanError::CalculationOverflow {
                message: format!("{} installments of {}", installment_count - 1, base),
            })?;
        let last = total - Money::from_decimal(leading);

        if base.is_zero() || last.is_negative() {
            return Err(LoanError::InvalidTerms {
                message: format!(
                    "{} installments cannot split a total of {} into positive cent amounts",
                    installment_count, total
                ),
            });
        }

        let resolver = DueDateResolver::new(start_date, frequency);
        let mut installments = Vec::with_capacity(installment_count as usize);
        for sequence in 1..=installment_count {
            let amount = if sequence == installment_count { last } else { base };
            installments.push(ScheduledInstallment {
                sequence,
                due_date: resolver.due_date(sequence)?,
                amount,
            });
        }

        debug!(
            %principal,
            %interest_rate,
            installment_count,
            %total,
            %base,
            %last,
            "generated installment schedule"
        );

        Ok(InstallmentSchedule {
            principal,
            interest_rate,
            frequency,
            start_date,
            total_with_interest: total,
            interest_amount: total - principal,
            base_installment: base,
            installments,
        })
    }
}

pub(crate) fn validate_terms(principal: Money, interest_rate: Rate, installment_count: u32) -> Result<()> {
    if installment_count < 1 {
        return Err(LoanError::InvalidTerms {
            message: "installment count must be at least 1".to_string(),
        });
    }
    if !principal.is_positive() {
        return Err(LoanError::InvalidTerms {
            message: format!("principal must be positive, got {}", principal),
        });
    }
    if principal > Money::from_major(MAX_PRINCIPAL) {
        return Err(LoanError::InvalidTerms {
            message: format!("principal {} exceeds the maximum of {}", principal, MAX_PRINCIPAL),
        });
    }
    if interest_rate.is_negative() {
        return Err(LoanError::InvalidTerms {
            message: format!("interest rate cannot be negative, got {}", interest_rate),
        });
    }
    Ok(())
}
