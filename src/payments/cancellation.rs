use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::errors::{LedgerError, LoanError, Result};
use crate::state::{Installment, Payment, PaymentCancellation};

/// checks that a payment can be reversed and produces the cancellation record
pub struct CancellationPlanner<'a> {
    payment: &'a Payment,
    installments: &'a [Installment],
}

impl<'a> CancellationPlanner<'a> {
    pub fn new(payment: &'a Payment, installments: &'a [Installment]) -> Self {
        Self {
            payment,
            installments,
        }
    }

    /// validate and build the cancellation; nothing is mutated
    pub fn plan(
        &self,
        already_cancelled: bool,
        reason: &str,
        cancelled_at: DateTime<Utc>,
    ) -> Result<PaymentCancellation> {
        if already_cancelled {
            return Err(LoanError::PaymentAlreadyCancelled {
                id: self.payment.id,
            });
        }

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LoanError::MissingCancellationReason);
        }

        if let Some(blocking) = blocking_payment(self.payment, self.installments) {
            warn!(payment_id = %self.payment.id, %blocking, "cancellation blocked by later payment");
            return Err(LoanError::CancellationOrderViolation {
                id: self.payment.id,
                blocking,
            });
        }

        let mut reverted = Vec::with_capacity(self.payment.allocations.len());
        for allocation in &self.payment.allocations {
            let held_by_payment = self
                .installments
                .iter()
                .find(|i| i.id == allocation.installment_id)
                .map(|i| !i.is_pending() && i.payment_id == Some(self.payment.id))
                .unwrap_or(false);

            if !held_by_payment {
                return Err(LedgerError::Conflict {
                    message: format!(
                        "installment {} is no longer held by payment {}",
                        allocation.sequence, self.payment.id
                    ),
                }
                .into());
            }
            reverted.push(allocation.installment_id);
        }

        Ok(PaymentCancellation {
            id: Uuid::new_v4(),
            payment_id: self.payment.id,
            loan_id: self.payment.loan_id,
            reason: reason.to_string(),
            reverted_installments: reverted,
            cancelled_at,
        })
    }

}

/// a different payment holding an installment later than any `payment` covers
pub(crate) fn blocking_payment(payment: &Payment, installments: &[Installment]) -> Option<Uuid> {
    let last_covered = payment.sequences().into_iter().max()?;
    installments
        .iter()
        .filter(|i| i.sequence > last_covered && !i.is_pending())
        .filter_map(|i| i.payment_id)
        .find(|id| *id != payment.id)
}

/// return the installments named by a cancellation to pending
pub fn revert_installments(installments: &mut [Installment], cancellation: &PaymentCancellation) -> usize {
    let mut reverted = 0;
    for installment in installments
        .iter_mut()
        .filter(|i| cancellation.reverted_installments.contains(&i.id))
    {
        installment.revert_to_pending();
        reverted += 1;
    }
    reverted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Money;
    use crate::errors::ErrorKind;
    use crate::schedule::ScheduledInstallment;
    use crate::state::InstallmentAllocation;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn installments(loan_id: Uuid, count: u32) -> Vec<Installment> {
        (1..=count)
            .map(|sequence| {
                Installment::from_schedule(
                    loan_id,
                    &ScheduledInstallment {
                        sequence,
                        due_date: date(2024, sequence, 1),
                        amount: Money::from_major(100),
                    },
                )
            })
            .collect()
    }

    fn pay(installments: &mut [Installment], sequences: &[u32]) -> Payment {
        let loan_id = installments[0].loan_id;
        let id = Uuid::new_v4();
        let mut allocations = Vec::new();
        for installment in installments.iter_mut().filter(|i| sequences.contains(&i.sequence)) {
            installment.mark_paid(id, Money::from_major(100), date(2024, 1, 1));
            allocations.push(InstallmentAllocation {
                installment_id: installment.id,
                sequence: installment.sequence,
                amount_owed: Money::from_major(100),
                amount_applied: Money::from_major(100),
            });
        }
        Payment {
            id,
            loan_id,
            amount: Money::from_major(100 * sequences.len() as i64),
            payment_date: date(2024, 1, 1),
            method: "Efectivo".to_string(),
            reference: None,
            expected_total: Money::from_major(100 * sequences.len() as i64),
            allocations,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_cancel_latest_payment() {
        let mut rows = installments(Uuid::new_v4(), 4);
        let _first = pay(&mut rows, &[1]);
        let second = pay(&mut rows, &[2, 3]);

        let cancellation = CancellationPlanner::new(&second, &rows)
            .plan(false, "  wrong amount ", Utc::now())
            .unwrap();
        assert_eq!(cancellation.reason, "wrong amount");
        assert_eq!(cancellation.reverted_installments, second.installment_ids());

        assert_eq!(revert_installments(&mut rows, &cancellation), 2);
        assert!(rows[1].is_pending());
        assert!(rows[2].is_pending());
        assert!(!rows[0].is_pending());
    }

    #[test]
    fn test_earlier_payment_blocked_by_later() {
        let mut rows = installments(Uuid::new_v4(), 4);
        let first = pay(&mut rows, &[1]);
        let second = pay(&mut rows, &[2]);

        let err = CancellationPlanner::new(&first, &rows)
            .plan(false, "duplicate", Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            LoanError::CancellationOrderViolation {
                id: first.id,
                blocking: second.id,
            }
        );
    }

    #[test]
    fn test_reason_required_and_single_use() {
        let mut rows = installments(Uuid::new_v4(), 2);
        let payment = pay(&mut rows, &[1]);
        let planner = CancellationPlanner::new(&payment, &rows);

        assert_eq!(
            planner.plan(false, "   ", Utc::now()).unwrap_err(),
            LoanError::MissingCancellationReason
        );
        assert!(matches!(
            planner.plan(true, "again", Utc::now()),
            Err(LoanError::PaymentAlreadyCancelled { .. })
        ));
    }

    #[test]
    fn test_inconsistent_installment_is_conflict() {
        let mut rows = installments(Uuid::new_v4(), 2);
        let payment = pay(&mut rows, &[1]);
        rows[0].revert_to_pending();

        let err = CancellationPlanner::new(&payment, &rows)
            .plan(false, "reversal", Utc::now())
            .unwrap_err();
        assert!(matches!(err, LoanError::Ledger(LedgerError::Conflict { .. })));
        assert_eq!(err.kind(), ErrorKind::Consistency);
    }
}
