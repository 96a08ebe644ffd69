use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LoanError, Result};
use crate::interest::{LateFeeEngine, LateFeeProjection};
use crate::state::{Installment, InstallmentAllocation, Loan, Payment};
use crate::types::{InstallmentId, LoanId};

use super::methods::PaymentMethods;
use super::PaymentRequest;

/// one installment selected for payment with its live owed amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLine {
    pub installment_id: InstallmentId,
    pub projection: LateFeeProjection,
}

/// read-only preview shown when the payment screen opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationQuote {
    pub loan_id: LoanId,
    pub as_of: NaiveDate,
    pub lines: Vec<QuoteLine>,
    pub expected_total: Money,
}

impl AllocationQuote {
    pub fn sequences(&self) -> Vec<u32> {
        self.lines.iter().map(|l| l.projection.sequence).collect()
    }
}

/// confirmed allocation ready to be committed to the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    pub payment: Payment,
    pub quote: AllocationQuote,
}

impl AllocationPlan {
    /// the lender accepted an amount different from the computed total
    pub fn is_override(&self) -> bool {
        self.payment.amount != self.quote.expected_total
    }
}

/// selects installments oldest-first and splits a payment across them
pub struct PaymentAllocator<'a> {
    loan: &'a Loan,
    late_fees: LateFeeEngine,
    methods: &'a PaymentMethods,
}

impl<'a> PaymentAllocator<'a> {
    pub fn new(loan: &'a Loan, methods: &'a PaymentMethods) -> Self {
        Self {
            loan,
            late_fees: LateFeeEngine::new(loan.terms.late_fee.clone()),
            methods,
        }
    }

    /// live amounts for the first `count` pending installments
    pub fn quote(
        &self,
        installments: &[Installment],
        count: usize,
        as_of: NaiveDate,
    ) -> Result<AllocationQuote> {
        let selected = select_oldest_pending(installments, count)?;
        self.quote_selected(&selected, as_of)
    }

    /// allocate a payment to the first `count` pending installments
    pub fn allocate(
        &self,
        installments: &[Installment],
        count: usize,
        request: &PaymentRequest,
        recorded_at: DateTime<Utc>,
    ) -> Result<AllocationPlan> {
        let resolved = self.validate_request(request)?;
        let selected = select_oldest_pending(installments, count)?;
        self.build_plan(&selected, request, resolved, recorded_at)
    }

    /// allocate to an explicit list of sequence numbers, which must be the oldest pending ones
    pub fn allocate_sequences(
        &self,
        installments: &[Installment],
        sequences: &[u32],
        request: &PaymentRequest,
        recorded_at: DateTime<Utc>,
    ) -> Result<AllocationPlan> {
        let resolved = self.validate_request(request)?;

        let mut requested = sequences.to_vec();
        requested.sort_unstable();
        requested.dedup();

        for sequence in &requested {
            if let Some(installment) = installments.iter().find(|i| i.sequence == *sequence) {
                if !installment.is_pending() {
                    return Err(LoanError::InstallmentAlreadyPaid { sequence: *sequence });
                }
            }
        }

        let selected = select_oldest_pending(installments, requested.len())?;
        let expected: Vec<u32> = selected.iter().map(|i| i.sequence).collect();
        if expected != requested {
            warn!(loan_id = %self.loan.id, ?requested, ?expected, "out-of-order installment selection rejected");
            return Err(LoanError::FifoViolation { requested, expected });
        }

        self.build_plan(&selected, request, resolved, recorded_at)
    }

    fn validate_request(&self, request: &PaymentRequest) -> Result<super::ResolvedMethod> {
        if !request.amount.is_positive() {
            return Err(LoanError::InvalidAmount {
                amount: request.amount,
            });
        }
        if request.payment_date < self.loan.terms.start_date {
            return Err(LoanError::PaymentBeforeLoanStart {
                payment_date: request.payment_date,
                start_date: self.loan.terms.start_date,
            });
        }
        self.methods
            .resolve(&request.method, request.reference.as_deref())
    }

    fn quote_selected(&self, selected: &[&Installment], as_of: NaiveDate) -> Result<AllocationQuote> {
        let mut lines = Vec::with_capacity(selected.len());
        for installment in selected {
            lines.push(QuoteLine {
                installment_id: installment.id,
                projection: self.late_fees.project(installment, as_of)?,
            });
        }
        let expected_total = lines.iter().map(|l| l.projection.amount_owed).sum();

        debug!(loan_id = %self.loan.id, %as_of, installments = lines.len(), %expected_total, "payment quote");

        Ok(AllocationQuote {
            loan_id: self.loan.id,
            as_of,
            lines,
            expected_total,
        })
    }

    fn build_plan(
        &self,
        selected: &[&Installment],
        request: &PaymentRequest,
        resolved: super::ResolvedMethod,
        recorded_at: DateTime<Utc>,
    ) -> Result<AllocationPlan> {
        let quote = self.quote_selected(selected, request.payment_date)?;
        let owed: Vec<Money> = quote.lines.iter().map(|l| l.projection.amount_owed).collect();
        let shares = distribute(request.amount, &owed);

        let allocations = quote
            .lines
            .iter()
            .zip(shares)
            .map(|(line, applied)| InstallmentAllocation {
                installment_id: line.installment_id,
                sequence: line.projection.sequence,
                amount_owed: line.projection.amount_owed,
                amount_applied: applied,
            })
            .collect();

        let payment = Payment {
            id: Uuid::new_v4(),
            loan_id: self.loan.id,
            amount: request.amount,
            payment_date: request.payment_date,
            method: resolved.name,
            reference: resolved.reference,
            expected_total: quote.expected_total,
            allocations,
            recorded_at,
        };

        let plan = AllocationPlan { payment, quote };
        if plan.is_override() {
            warn!(
                loan_id = %self.loan.id,
                amount = %plan.payment.amount,
                expected = %plan.quote.expected_total,
                "payment amount differs from computed total"
            );
        }
        Ok(plan)
    }
}

/// pending installments in ascending sequence order
pub fn pending_in_order(installments: &[Installment]) -> Vec<&Installment> {
    let mut pending: Vec<&Installment> = installments.iter().filter(|i| i.is_pending()).collect();
    pending.sort_by_key(|i| i.sequence);
    pending
}

/// the `count` lowest-sequence pending installments
pub fn select_oldest_pending(installments: &[Installment], count: usize) -> Result<Vec<&Installment>> {
    if count == 0 {
        return Err(LoanError::InvalidInstallmentCount { requested: count });
    }
    let pending = pending_in_order(installments);
    if count > pending.len() {
        return Err(LoanError::NoPendingInstallments {
            requested: count,
            pending: pending.len(),
        });
    }
    Ok(pending.into_iter().take(count).collect())
}

/// split `amount` in proportion to `weights`; the last share takes the remainder
pub fn distribute(amount: Money, weights: &[Money]) -> Vec<Money> {
    if weights.is_empty() {
        return Vec::new();
    }

    let total: Decimal = weights.iter().map(|w| w.as_decimal()).sum();
    let count = Decimal::from(weights.len());
    let mut remaining = amount;
    let mut shares = Vec::with_capacity(weights.len());

    for (i, weight) in weights.iter().enumerate() {
        if i == weights.len() - 1 {
            shares.push(remaining);
            break;
        }
        let exact = if total.is_zero() {
            amount.as_decimal() / count
        } else {
            // weight / total is at most one
            amount
                .as_decimal()
                .checked_mul(weight.as_decimal())
                .map(|product| product / total)
                .unwrap_or_else(|| amount.as_decimal() * (weight.as_decimal() / total))
        };
        let share = Money::from_decimal(exact).min(remaining).max(Money::ZERO);
        remaining -= share;
        shares.push(share);
    }
    shares
}
