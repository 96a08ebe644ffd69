use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::errors::{LedgerError, LoanError, Result};
use crate::payments::cancellation::{blocking_payment, revert_installments};
use crate::state::{Installment, Loan, Payment, PaymentCancellation};
use crate::types::{LoanId, LoanStatus, PaymentId};

/// loan status change applied as part of a ledger write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: LoanStatus,
    pub to: LoanStatus,
    pub at: DateTime<Utc>,
}

/// authoritative store of loans, installments, payments and cancellations
///
/// every write is all-or-nothing and re-checks the rows it depends on under
/// the write lock, so two sessions cannot allocate the same installment or
/// reverse a payment that a later one now builds on.
pub trait Ledger: Send + Sync {
    /// insert a loan together with its full installment schedule
    fn insert_loan(&self, loan: Loan, installments: Vec<Installment>) -> Result<()>;

    fn loan(&self, id: LoanId) -> Result<Loan>;

    fn loans(&self) -> Result<Vec<Loan>>;

    /// installments of a loan in sequence order
    fn installments(&self, loan_id: LoanId) -> Result<Vec<Installment>>;

    fn payment(&self, id: PaymentId) -> Result<Payment>;

    /// every payment of a loan, cancelled ones included, in recording order
    fn payments(&self, loan_id: LoanId) -> Result<Vec<Payment>>;

    fn cancellation(&self, payment_id: PaymentId) -> Result<Option<PaymentCancellation>>;

    /// mark the covered installments paid and insert the payment row;
    /// settles the loan when no pending installment remains
    fn commit_payment(&self, payment: &Payment) -> Result<Option<StatusTransition>>;

    /// insert the cancellation record and revert its installments to pending;
    /// reopens a settled loan
    fn commit_cancellation(&self, cancellation: &PaymentCancellation) -> Result<Option<StatusTransition>>;

    /// cancel an active loan that has no standing payment
    fn cancel_loan(&self, loan_id: LoanId, at: DateTime<Utc>) -> Result<Loan>;
}

impl<L: Ledger + ?Sized> Ledger for Arc<L> {
    fn insert_loan(&self, loan: Loan, installments: Vec<Installment>) -> Result<()> {
        (**self).insert_loan(loan, installments)
    }

    fn loan(&self, id: LoanId) -> Result<Loan> {
        (**self).loan(id)
    }

    fn loans(&self) -> Result<Vec<Loan>> {
        (**self).loans()
    }

    fn installments(&self, loan_id: LoanId) -> Result<Vec<Installment>> {
        (**self).installments(loan_id)
    }

    fn payment(&self, id: PaymentId) -> Result<Payment> {
        (**self).payment(id)
    }

    fn payments(&self, loan_id: LoanId) -> Result<Vec<Payment>> {
        (**self).payments(loan_id)
    }

    fn cancellation(&self, payment_id: PaymentId) -> Result<Option<PaymentCancellation>> {
        (**self).cancellation(payment_id)
    }

    fn commit_payment(&self, payment: &Payment) -> Result<Option<StatusTransition>> {
        (**self).commit_payment(payment)
    }

    fn commit_cancellation(&self, cancellation: &PaymentCancellation) -> Result<Option<StatusTransition>> {
        (**self).commit_cancellation(cancellation)
    }

    fn cancel_loan(&self, loan_id: LoanId, at: DateTime<Utc>) -> Result<Loan> {
        (**self).cancel_loan(loan_id, at)
    }
}

#[derive(Debug, Default)]
struct Tables {
    loans: HashMap<LoanId, Loan>,
    /// kept sorted by sequence
    installments: HashMap<LoanId, Vec<Installment>>,
    payments: HashMap<PaymentId, Payment>,
    payment_order: Vec<PaymentId>,
    cancellations: HashMap<PaymentId, PaymentCancellation>,
}

/// in-process ledger used by tests, demos and embedded deployments
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    tables: RwLock<Tables>,
    offline: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// simulate the backing store becoming unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.is_offline() {
            return Err(LedgerError::Unavailable {
                message: "ledger is offline".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.ensure_online()?;
        self.tables.read().map_err(|_| {
            LedgerError::Unavailable {
                message: "failed to acquire ledger read lock".to_string(),
            }
            .into()
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.ensure_online()?;
        self.tables.write().map_err(|_| {
            LedgerError::Unavailable {
                message: "failed to acquire ledger write lock".to_string(),
            }
            .into()
        })
    }
}

fn conflict(message: String) -> LoanError {
    LedgerError::Conflict { message }.into()
}

impl Tables {
    fn loan_status(&self, loan_id: LoanId) -> Result<LoanStatus> {
        self.loans
            .get(&loan_id)
            .map(|l| l.status)
            .ok_or(LoanError::LoanNotFound { id: loan_id })
    }

    fn set_status(&mut self, loan_id: LoanId, to: LoanStatus, at: DateTime<Utc>) -> Result<StatusTransition> {
        let loan = self
            .loans
            .get_mut(&loan_id)
            .ok_or(LoanError::LoanNotFound { id: loan_id })?;
        let from = loan.status;
        loan.update_status(to, at);
        info!(%loan_id, ?from, ?to, "loan status updated");
        Ok(StatusTransition { from, to, at })
    }
}

impl Ledger for InMemoryLedger {
    fn insert_loan(&self, loan: Loan, mut installments: Vec<Installment>) -> Result<()> {
        let mut tables = self.write()?;
        if tables.loans.contains_key(&loan.id) {
            return Err(conflict(format!("loan {} already exists", loan.id)));
        }
        if installments.iter().any(|i| i.loan_id != loan.id) {
            return Err(conflict(format!("installments do not belong to loan {}", loan.id)));
        }
        installments.sort_by_key(|i| i.sequence);

        info!(loan_id = %loan.id, installments = installments.len(), "loan inserted");
        tables.installments.insert(loan.id, installments);
        tables.loans.insert(loan.id, loan);
        Ok(())
    }

    fn loan(&self, id: LoanId) -> Result<Loan> {
        self.read()?
            .loans
            .get(&id)
            .cloned()
            .ok_or(LoanError::LoanNotFound { id })
    }

    fn loans(&self) -> Result<Vec<Loan>> {
        let tables = self.read()?;
        let mut loans: Vec<Loan> = tables.loans.values().cloned().collect();
        loans.sort_by_key(|l| l.created_at);
        Ok(loans)
    }

    fn installments(&self, loan_id: LoanId) -> Result<Vec<Installment>> {
        self.read()?
            .installments
            .get(&loan_id)
            .cloned()
            .ok_or(LoanError::LoanNotFound { id: loan_id })
    }

    fn payment(&self, id: PaymentId) -> Result<Payment> {
        self.read()?
            .payments
            .get(&id)
            .cloned()
            .ok_or(LoanError::PaymentNotFound { id })
    }

    fn payments(&self, loan_id: LoanId) -> Result<Vec<Payment>> {
        let tables = self.read()?;
        Ok(tables
            .payment_order
            .iter()
            .filter_map(|id| tables.payments.get(id))
            .filter(|p| p.loan_id == loan_id)
            .cloned()
            .collect())
    }

    fn cancellation(&self, payment_id: PaymentId) -> Result<Option<PaymentCancellation>> {
        Ok(self.read()?.cancellations.get(&payment_id).cloned())
    }

    fn commit_payment(&self, payment: &Payment) -> Result<Option<StatusTransition>> {
        let mut tables = self.write()?;

        if tables.payments.contains_key(&payment.id) {
            return Err(conflict(format!("payment {} already recorded", payment.id)));
        }
        let status = tables.loan_status(payment.loan_id)?;
        if status != LoanStatus::Active {
            return Err(LoanError::LoanNotActive { status });
        }

        let rows = tables
            .installments
            .get_mut(&payment.loan_id)
            .ok_or(LoanError::LoanNotFound { id: payment.loan_id })?;

        // the covered installments must still be exactly the oldest pending ones
        let oldest: Vec<_> = rows
            .iter()
            .filter(|i| i.is_pending())
            .take(payment.allocations.len())
            .map(|i| i.id)
            .collect();
        if oldest != payment.installment_ids() {
            warn!(payment_id = %payment.id, loan_id = %payment.loan_id, "stale allocation rejected");
            return Err(conflict(format!(
                "installments {:?} are no longer the oldest pending",
                payment.sequences()
            )));
        }

        for allocation in &payment.allocations {
            if let Some(row) = rows.iter_mut().find(|i| i.id == allocation.installment_id) {
                row.mark_paid(payment.id, allocation.amount_applied, payment.payment_date);
            }
        }
        let settled = rows.iter().all(|i| !i.is_pending());
        tables.payments.insert(payment.id, payment.clone());
        tables.payment_order.push(payment.id);

        info!(
            payment_id = %payment.id,
            loan_id = %payment.loan_id,
            amount = %payment.amount,
            installments = ?payment.sequences(),
            "payment committed"
        );

        if settled {
            let transition = tables.set_status(payment.loan_id, LoanStatus::Paid, payment.recorded_at)?;
            return Ok(Some(transition));
        }
        Ok(None)
    }

    fn commit_cancellation(&self, cancellation: &PaymentCancellation) -> Result<Option<StatusTransition>> {
        let mut tables = self.write()?;

        if tables.cancellations.contains_key(&cancellation.payment_id) {
            return Err(LoanError::PaymentAlreadyCancelled {
                id: cancellation.payment_id,
            });
        }
        let payment = tables
            .payments
            .get(&cancellation.payment_id)
            .cloned()
            .ok_or(LoanError::PaymentNotFound {
                id: cancellation.payment_id,
            })?;
        if payment.loan_id != cancellation.loan_id {
            return Err(conflict(format!(
                "cancellation for loan {} does not match payment loan {}",
                cancellation.loan_id, payment.loan_id
            )));
        }
        let status = tables.loan_status(payment.loan_id)?;
        if status == LoanStatus::Cancelled {
            return Err(LoanError::LoanNotActive { status });
        }

        let rows = tables
            .installments
            .get_mut(&payment.loan_id)
            .ok_or(LoanError::LoanNotFound { id: payment.loan_id })?;

        // a payment committed after the plan was made may now sit on later installments
        if let Some(blocking) = blocking_payment(&payment, &rows[..]) {
            warn!(payment_id = %payment.id, %blocking, "cancellation blocked by later payment");
            return Err(LoanError::CancellationOrderViolation {
                id: payment.id,
                blocking,
            });
        }

        let all_held = cancellation.reverted_installments.iter().all(|id| {
            rows.iter()
                .any(|i| i.id == *id && i.payment_id == Some(cancellation.payment_id))
        });
        if !all_held {
            return Err(conflict(format!(
                "installments of payment {} changed since the cancellation was planned",
                cancellation.payment_id
            )));
        }

        let reverted = revert_installments(rows, cancellation);
        tables
            .cancellations
            .insert(cancellation.payment_id, cancellation.clone());

        info!(
            payment_id = %cancellation.payment_id,
            loan_id = %cancellation.loan_id,
            reverted,
            "payment cancelled"
        );

        if status == LoanStatus::Paid {
            let transition = tables.set_status(payment.loan_id, LoanStatus::Active, cancellation.cancelled_at)?;
            return Ok(Some(transition));
        }
        Ok(None)
    }

    fn cancel_loan(&self, loan_id: LoanId, at: DateTime<Utc>) -> Result<Loan> {
        let mut tables = self.write()?;

        let status = tables.loan_status(loan_id)?;
        if status != LoanStatus::Active {
            return Err(LoanError::LoanNotActive { status });
        }
        let active_payments = tables
            .payments
            .values()
            .filter(|p| p.loan_id == loan_id && !tables.cancellations.contains_key(&p.id))
            .count();
        if active_payments > 0 {
            warn!(%loan_id, active_payments, "loan cancellation rejected");
            return Err(LoanError::LoanHasPayments { active_payments });
        }

        tables.set_status(loan_id, LoanStatus::Cancelled, at)?;
        tables
            .loans
            .get(&loan_id)
            .cloned()
            .ok_or(LoanError::LoanNotFound { id: loan_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Money, Rate};
    use crate::errors::ErrorKind;
    use crate::payments::CancellationPlanner;
    use crate::schedule::ScheduleGenerator;
    use crate::state::{InstallmentAllocation, LoanTerms};
    use crate::types::Frequency;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn seeded() -> (InMemoryLedger, Loan) {
        let terms = LoanTerms::builder()
            .principal(Money::from_major(1_000))
            .interest_rate(Rate::from_percentage(dec!(20)))
            .installments(3)
            .frequency(Frequency::Weekly)
            .start_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .build()
            .unwrap();
        let schedule = ScheduleGenerator::generate(
            terms.principal,
            terms.interest_rate,
            terms.installment_count,
            terms.start_date,
            terms.frequency,
        )
        .unwrap();
        let loan = Loan::new("client-9".to_string(), terms, &schedule, Utc::now());
        let installments = schedule
            .installments
            .iter()
            .map(|s| Installment::from_schedule(loan.id, s))
            .collect();

        let ledger = InMemoryLedger::new();
        ledger.insert_loan(loan.clone(), installments).unwrap();
        (ledger, loan)
    }

    fn payment_for(loan_id: LoanId, rows: &[Installment]) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            loan_id,
            amount: Money::from_major(400),
            payment_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            method: "Efectivo".to_string(),
            reference: None,
            expected_total: Money::from_major(400),
            allocations: rows
                .iter()
                .map(|i| InstallmentAllocation {
                    installment_id: i.id,
                    sequence: i.sequence,
                    amount_owed: i.amount,
                    amount_applied: i.amount,
                })
                .collect(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_read_back() {
        let (ledger, loan) = seeded();
        assert_eq!(ledger.loan(loan.id).unwrap(), loan);
        let rows = ledger.installments(loan.id).unwrap();
        let sequences: Vec<u32> = rows.iter().map(|i| i.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(ledger.loans().unwrap().len(), 1);

        assert!(matches!(
            ledger.insert_loan(loan.clone(), Vec::new()),
            Err(LoanError::Ledger(LedgerError::Conflict { .. }))
        ));
        assert!(matches!(
            ledger.loan(Uuid::new_v4()),
            Err(LoanError::LoanNotFound { .. })
        ));
    }

    #[test]
    fn test_commit_payment_marks_installments() {
        let (ledger, loan) = seeded();
        let rows = ledger.installments(loan.id).unwrap();
        let payment = payment_for(loan.id, &rows[..1]);

        ledger.commit_payment(&payment).unwrap();
        let rows = ledger.installments(loan.id).unwrap();
        assert_eq!(rows[0].payment_id, Some(payment.id));
        assert!(rows[1].is_pending());
        assert_eq!(ledger.payments(loan.id).unwrap(), vec![payment.clone()]);
        assert_eq!(ledger.payment(payment.id).unwrap(), payment);
    }

    #[test]
    fn test_stale_payment_is_rejected_whole() {
        let (ledger, loan) = seeded();
        let rows = ledger.installments(loan.id).unwrap();
        let first = payment_for(loan.id, &rows[..1]);
        let second = payment_for(loan.id, &rows[..2]);

        ledger.commit_payment(&first).unwrap();
        let err = ledger.commit_payment(&second).unwrap_err();
        assert!(matches!(err, LoanError::Ledger(LedgerError::Conflict { .. })));

        // nothing from the rejected payment was written
        let rows = ledger.installments(loan.id).unwrap();
        assert!(rows[1].is_pending());
        assert_eq!(ledger.payments(loan.id).unwrap().len(), 1);
    }

    #[test]
    fn test_out_of_order_payment_is_rejected() {
        let (ledger, loan) = seeded();
        let rows = ledger.installments(loan.id).unwrap();
        let skip_first = payment_for(loan.id, &rows[1..2]);
        assert!(matches!(
            ledger.commit_payment(&skip_first),
            Err(LoanError::Ledger(LedgerError::Conflict { .. }))
        ));
    }

    #[test]
    fn test_commit_cancellation_reverts() {
        let (ledger, loan) = seeded();
        let rows = ledger.installments(loan.id).unwrap();
        let payment = payment_for(loan.id, &rows[..2]);
        ledger.commit_payment(&payment).unwrap();

        let cancellation = PaymentCancellation {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            loan_id: loan.id,
            reason: "recorded twice".to_string(),
            reverted_installments: payment.installment_ids(),
            cancelled_at: Utc::now(),
        };
        ledger.commit_cancellation(&cancellation).unwrap();

        assert!(ledger.installments(loan.id).unwrap().iter().all(|i| i.is_pending()));
        assert_eq!(ledger.cancellation(payment.id).unwrap(), Some(cancellation.clone()));
        // original payment row survives
        assert!(ledger.payment(payment.id).is_ok());

        assert!(matches!(
            ledger.commit_cancellation(&cancellation),
            Err(LoanError::PaymentAlreadyCancelled { .. })
        ));
    }

    #[test]
    fn test_offline_ledger_is_transient() {
        let (ledger, loan) = seeded();
        ledger.set_offline(true);

        let err = ledger.loan(loan.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(err.is_transient());

        ledger.set_offline(false);
        assert!(ledger.loan(loan.id).is_ok());
    }

    #[test]
    fn test_final_payment_settles_and_cancellation_reopens() {
        let (ledger, loan) = seeded();
        let rows = ledger.installments(loan.id).unwrap();
        let payment = payment_for(loan.id, &rows);

        let settled = ledger.commit_payment(&payment).unwrap();
        assert_eq!(
            settled,
            Some(StatusTransition {
                from: LoanStatus::Active,
                to: LoanStatus::Paid,
                at: payment.recorded_at,
            })
        );
        assert_eq!(ledger.loan(loan.id).unwrap().status, LoanStatus::Paid);

        let cancelled_at = Utc::now();
        let cancellation = CancellationPlanner::new(&payment, &ledger.installments(loan.id).unwrap())
            .plan(false, "cheque bounced", cancelled_at)
            .unwrap();
        let reopened = ledger.commit_cancellation(&cancellation).unwrap();
        assert_eq!(
            reopened,
            Some(StatusTransition {
                from: LoanStatus::Paid,
                to: LoanStatus::Active,
                at: cancelled_at,
            })
        );
        let stored = ledger.loan(loan.id).unwrap();
        assert_eq!(stored.status, LoanStatus::Active);
        assert_eq!(stored.status_changed_at, cancelled_at);
    }

    #[test]
    fn test_cancellation_rejected_once_a_later_payment_lands() {
        let (ledger, loan) = seeded();
        let rows = ledger.installments(loan.id).unwrap();
        let first = payment_for(loan.id, &rows[..1]);
        ledger.commit_payment(&first).unwrap();

        // planned against a snapshot where nothing follows the first payment
        let snapshot = ledger.installments(loan.id).unwrap();
        let cancellation = CancellationPlanner::new(&first, &snapshot)
            .plan(false, "wrong client", Utc::now())
            .unwrap();

        let second = payment_for(loan.id, &snapshot[1..2]);
        ledger.commit_payment(&second).unwrap();

        let err = ledger.commit_cancellation(&cancellation).unwrap_err();
        assert!(matches!(
            err,
            LoanError::CancellationOrderViolation { id, blocking } if id == first.id && blocking == second.id
        ));
        assert_eq!(err.kind(), ErrorKind::Consistency);

        let rows = ledger.installments(loan.id).unwrap();
        assert_eq!(rows[0].payment_id, Some(first.id));
        assert_eq!(rows[1].payment_id, Some(second.id));
        assert_eq!(ledger.cancellation(first.id).unwrap(), None);
    }

    #[test]
    fn test_cancellation_must_name_the_payment_loan() {
        let (ledger, loan) = seeded();
        let rows = ledger.installments(loan.id).unwrap();
        let payment = payment_for(loan.id, &rows[..1]);
        ledger.commit_payment(&payment).unwrap();

        let cancellation = PaymentCancellation {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            loan_id: Uuid::new_v4(),
            reason: "recorded twice".to_string(),
            reverted_installments: payment.installment_ids(),
            cancelled_at: Utc::now(),
        };
        assert!(matches!(
            ledger.commit_cancellation(&cancellation),
            Err(LoanError::Ledger(LedgerError::Conflict { .. }))
        ));
        assert_eq!(ledger.installments(loan.id).unwrap()[0].payment_id, Some(payment.id));
        assert_eq!(ledger.cancellation(payment.id).unwrap(), None);
    }

    #[test]
    fn test_cancel_loan_checks_payments_under_the_lock() {
        let (ledger, loan) = seeded();
        let rows = ledger.installments(loan.id).unwrap();
        let payment = payment_for(loan.id, &rows[..1]);
        ledger.commit_payment(&payment).unwrap();

        assert!(matches!(
            ledger.cancel_loan(loan.id, Utc::now()),
            Err(LoanError::LoanHasPayments { active_payments: 1 })
        ));

        let cancellation = CancellationPlanner::new(&payment, &ledger.installments(loan.id).unwrap())
            .plan(false, "refunded", Utc::now())
            .unwrap();
        ledger.commit_cancellation(&cancellation).unwrap();

        let at = Utc::now();
        let cancelled = ledger.cancel_loan(loan.id, at).unwrap();
        assert_eq!(cancelled.status, LoanStatus::Cancelled);
        assert_eq!(cancelled.status_changed_at, at);

        assert!(matches!(
            ledger.cancel_loan(loan.id, Utc::now()),
            Err(LoanError::LoanNotActive { status: LoanStatus::Cancelled })
        ));
        let rows = ledger.installments(loan.id).unwrap();
        assert!(matches!(
            ledger.commit_payment(&payment_for(loan.id, &rows[..1])),
            Err(LoanError::LoanNotActive { status: LoanStatus::Cancelled })
        ));
    }

    #[test]
    fn test_cancel_loan_and_payment_race_has_one_winner() {
        for _ in 0..50 {
            let (ledger, loan) = seeded();
            let ledger = Arc::new(ledger);
            let rows = ledger.installments(loan.id).unwrap();
            let payment = payment_for(loan.id, &rows[..1]);

            let paying = {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || ledger.commit_payment(&payment).is_ok())
            };
            let cancelling = {
                let ledger = Arc::clone(&ledger);
                let loan_id = loan.id;
                std::thread::spawn(move || ledger.cancel_loan(loan_id, Utc::now()).is_ok())
            };
            let paid = paying.join().unwrap();
            let cancelled = cancelling.join().unwrap();

            assert!(paid != cancelled);
            let status = ledger.loan(loan.id).unwrap().status;
            if cancelled {
                assert_eq!(status, LoanStatus::Cancelled);
                assert!(ledger.payments(loan.id).unwrap().is_empty());
            } else {
                assert_eq!(status, LoanStatus::Active);
                assert_eq!(ledger.payments(loan.id).unwrap().len(), 1);
            }
        }
    }
}
