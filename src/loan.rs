use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EngineConfig;
use crate::decimal::Money;
use crate::errors::{LoanError, Result};
use crate::events::{Event, EventStore};
use crate::interest::{LateFeeEngine, LateFeeProjection};
use crate::ledger::{Ledger, StatusTransition};
use crate::payments::{
    AllocationPlan, AllocationQuote, CancellationPlanner, PaymentAllocator, PaymentMethods,
    PaymentRequest,
};
use crate::schedule::{InstallmentSchedule, ScheduleGenerator};
use crate::serialization::LoanStatementView;
use crate::state::{Installment, Loan, LoanTerms, Payment, PaymentCancellation};
use crate::types::{InstallmentState, LoanId, LoanStatus, PaymentId};

/// position of one loan on a given date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanSummary {
    pub loan_id: LoanId,
    pub client_id: String,
    pub status: LoanStatus,
    pub as_of: NaiveDate,
    pub total_with_interest: Money,
    pub installment_count: u32,
    pub paid_count: u32,
    pub pending_count: u32,
    pub overdue_count: u32,
    /// sum of what was collected on paid installments
    pub collected: Money,
    /// scheduled amount still pending, before surcharge
    pub pending_base: Money,
    /// live amount owed on every pending installment
    pub outstanding: Money,
    pub overdue_balance: Money,
    pub next_due_date: Option<NaiveDate>,
    pub next_due_amount: Option<Money>,
    pub projections: Vec<LateFeeProjection>,
}

impl LoanSummary {
    pub fn is_in_arrears(&self) -> bool {
        self.overdue_count > 0
    }
}

/// totals across every loan in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub as_of: NaiveDate,
    pub loan_count: usize,
    pub active_loans: usize,
    pub paid_loans: usize,
    pub cancelled_loans: usize,
    /// principal of loans that were not cancelled
    pub principal_lent: Money,
    pub collected: Money,
    /// live balance of active loans
    pub outstanding: Money,
    pub overdue_balance: Money,
    pub overdue_installments: u32,
    pub loans_in_arrears: usize,
}

/// orchestrates the engine against a ledger
pub struct LoanService<L: Ledger> {
    ledger: L,
    config: EngineConfig,
    methods: PaymentMethods,
    pub events: EventStore,
}

impl<L: Ledger> LoanService<L> {
    pub fn new(ledger: L, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let methods = PaymentMethods::from_config(&config);
        Ok(Self {
            ledger,
            config,
            methods,
            events: EventStore::new(),
        })
    }

    pub fn with_defaults(ledger: L) -> Self {
        let config = EngineConfig::default();
        let methods = PaymentMethods::from_config(&config);
        Self {
            ledger,
            config,
            methods,
            events: EventStore::new(),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn payment_methods(&self) -> &PaymentMethods {
        &self.methods
    }

    /// schedule shown on the loan-creation screen before anything is stored
    pub fn preview_schedule(&self, terms: &LoanTerms) -> Result<InstallmentSchedule> {
        terms.validate()?;
        ScheduleGenerator::generate(
            terms.principal,
            terms.interest_rate,
            terms.installment_count,
            terms.start_date,
            terms.frequency,
        )
    }

    /// create a loan and write its installments in one ledger call
    pub fn create_loan(
        &mut self,
        client_id: &str,
        terms: LoanTerms,
        time_provider: &SafeTimeProvider,
    ) -> Result<Loan> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(LoanError::InvalidTerms {
                message: "client id is required".to_string(),
            });
        }

        let schedule = self.preview_schedule(&terms)?;
        let now = time_provider.now();
        let loan = Loan::new(client_id.to_string(), terms, &schedule, now);
        let installments: Vec<Installment> = schedule
            .installments
            .iter()
            .map(|s| Installment::from_schedule(loan.id, s))
            .collect();

        self.ledger.insert_loan(loan.clone(), installments)?;

        info!(
            loan_id = %loan.id,
            client_id = %loan.client_id,
            total = %loan.total_with_interest,
            installments = schedule.installment_count(),
            "loan created"
        );

        self.events.emit(Event::LoanCreated {
            loan_id: loan.id,
            client_id: loan.client_id.clone(),
            principal: loan.terms.principal,
            total_with_interest: loan.total_with_interest,
            installment_count: loan.terms.installment_count,
            late_fee_policy: loan.terms.late_fee.policy,
            timestamp: now,
        });
        if let (Some(first), Some(last)) = (schedule.installments.first(), schedule.maturity_date()) {
            self.events.emit(Event::ScheduleGenerated {
                loan_id: loan.id,
                base_installment: schedule.base_installment,
                first_due_date: first.due_date,
                maturity_date: last,
            });
        }

        Ok(loan)
    }

    /// stored installments of a loan in sequence order
    pub fn schedule(&self, loan_id: LoanId) -> Result<Vec<Installment>> {
        self.ledger.installments(loan_id)
    }

    /// live amounts for the next `count` pending installments
    pub fn quote_payment(&self, loan_id: LoanId, count: usize, as_of: NaiveDate) -> Result<AllocationQuote> {
        let loan = self.active_loan(loan_id)?;
        let installments = self.ledger.installments(loan_id)?;
        PaymentAllocator::new(&loan, &self.methods).quote(&installments, count, as_of)
    }

    /// pay the next `count` pending installments
    pub fn record_payment(
        &mut self,
        loan_id: LoanId,
        count: usize,
        request: &PaymentRequest,
        time_provider: &SafeTimeProvider,
    ) -> Result<Payment> {
        let loan = self.active_loan(loan_id)?;
        let installments = self.ledger.installments(loan_id)?;
        let plan = PaymentAllocator::new(&loan, &self.methods).allocate(
            &installments,
            count,
            request,
            time_provider.now(),
        )?;
        self.commit(&loan, plan, time_provider)
    }

    /// pay an explicit set of installments; they must be the oldest pending ones
    pub fn record_payment_for(
        &mut self,
        loan_id: LoanId,
        sequences: &[u32],
        request: &PaymentRequest,
        time_provider: &SafeTimeProvider,
    ) -> Result<Payment> {
        let loan = self.active_loan(loan_id)?;
        let installments = self.ledger.installments(loan_id)?;
        let plan = PaymentAllocator::new(&loan, &self.methods).allocate_sequences(
            &installments,
            sequences,
            request,
            time_provider.now(),
        )?;
        self.commit(&loan, plan, time_provider)
    }

    /// reverse a payment, keeping the original record
    pub fn cancel_payment(
        &mut self,
        payment_id: PaymentId,
        reason: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<PaymentCancellation> {
        let payment = self.ledger.payment(payment_id)?;
        let loan = self.ledger.loan(payment.loan_id)?;
        if loan.status == LoanStatus::Cancelled {
            return Err(LoanError::LoanNotActive { status: loan.status });
        }

        let already_cancelled = self.ledger.cancellation(payment_id)?.is_some();
        let installments = self.ledger.installments(loan.id)?;
        let now = time_provider.now();
        let cancellation =
            CancellationPlanner::new(&payment, &installments).plan(already_cancelled, reason, now)?;

        let transition = self.ledger.commit_cancellation(&cancellation)?;

        self.events.emit(Event::PaymentCancelled {
            loan_id: loan.id,
            payment_id,
            reason: cancellation.reason.clone(),
            reverted_installments: cancellation.reverted_installments.clone(),
            timestamp: now,
        });

        if let Some(transition) = transition {
            self.status_changed(loan.id, transition, "payment cancelled");
        }

        Ok(cancellation)
    }

    /// cancel a loan that never received a payment that still stands
    pub fn cancel_loan(&mut self, loan_id: LoanId, reason: &str, time_provider: &SafeTimeProvider) -> Result<Loan> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LoanError::MissingCancellationReason);
        }

        let now = time_provider.now();
        let loan = self.ledger.cancel_loan(loan_id, now)?;
        let transition = StatusTransition {
            from: LoanStatus::Active,
            to: LoanStatus::Cancelled,
            at: now,
        };
        self.status_changed(loan_id, transition, reason);
        Ok(loan)
    }

    /// payments of a loan that have not been cancelled
    pub fn active_payments(&self, loan_id: LoanId) -> Result<Vec<Payment>> {
        let mut active = Vec::new();
        for payment in self.ledger.payments(loan_id)? {
            if self.ledger.cancellation(payment.id)?.is_none() {
                active.push(payment);
            }
        }
        Ok(active)
    }

    pub fn loan_summary(&self, loan_id: LoanId, as_of: NaiveDate) -> Result<LoanSummary> {
        let loan = self.ledger.loan(loan_id)?;
        let installments = self.ledger.installments(loan_id)?;
        summarize(&loan, &installments, as_of)
    }

    /// summary as of the provider's current date
    pub fn loan_summary_now(&self, loan_id: LoanId, time_provider: &SafeTimeProvider) -> Result<LoanSummary> {
        self.loan_summary(loan_id, time_provider.now().date_naive())
    }

    pub fn portfolio_summary(&self, as_of: NaiveDate) -> Result<PortfolioSummary> {
        let mut portfolio = PortfolioSummary {
            as_of,
            loan_count: 0,
            active_loans: 0,
            paid_loans: 0,
            cancelled_loans: 0,
            principal_lent: Money::ZERO,
            collected: Money::ZERO,
            outstanding: Money::ZERO,
            overdue_balance: Money::ZERO,
            overdue_installments: 0,
            loans_in_arrears: 0,
        };

        for loan in self.ledger.loans()? {
            portfolio.loan_count += 1;
            match loan.status {
                LoanStatus::Cancelled => {
                    portfolio.cancelled_loans += 1;
                    continue;
                }
                LoanStatus::Paid => portfolio.paid_loans += 1,
                LoanStatus::Active => portfolio.active_loans += 1,
            }

            let summary = summarize(&loan, &self.ledger.installments(loan.id)?, as_of)?;
            portfolio.principal_lent += loan.terms.principal;
            portfolio.collected += summary.collected;
            portfolio.outstanding += summary.outstanding;
            portfolio.overdue_balance += summary.overdue_balance;
            portfolio.overdue_installments += summary.overdue_count;
            if summary.is_in_arrears() {
                portfolio.loans_in_arrears += 1;
            }
        }

        Ok(portfolio)
    }

    /// serializable statement of a loan for display
    pub fn statement(&self, loan_id: LoanId, as_of: NaiveDate) -> Result<LoanStatementView> {
        let loan = self.ledger.loan(loan_id)?;
        let installments = self.ledger.installments(loan_id)?;
        let summary = summarize(&loan, &installments, as_of)?;
        Ok(LoanStatementView::from_parts(&loan, &summary, &installments))
    }

    /// get events
    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take_events()
    }

    fn active_loan(&self, loan_id: LoanId) -> Result<Loan> {
        let loan = self.ledger.loan(loan_id)?;
        if !loan.is_active() {
            return Err(LoanError::LoanNotActive { status: loan.status });
        }
        Ok(loan)
    }

    fn commit(&mut self, loan: &Loan, plan: AllocationPlan, time_provider: &SafeTimeProvider) -> Result<Payment> {
        let transition = self.ledger.commit_payment(&plan.payment)?;

        let now = time_provider.now();
        let payment = plan.payment;

        self.events.emit(Event::PaymentRecorded {
            loan_id: loan.id,
            payment_id: payment.id,
            amount: payment.amount,
            method: payment.method.clone(),
            installments: payment.sequences(),
            payment_date: payment.payment_date,
            timestamp: now,
        });
        if payment.amount != plan.quote.expected_total {
            self.events.emit(Event::PaymentAmountOverridden {
                loan_id: loan.id,
                payment_id: payment.id,
                expected: plan.quote.expected_total,
                accepted: payment.amount,
                timestamp: now,
            });
        }
        for line in plan.quote.lines.iter().filter(|l| l.projection.surcharge.is_positive()) {
            self.events.emit(Event::LateFeeCollected {
                loan_id: loan.id,
                installment_id: line.installment_id,
                sequence: line.projection.sequence,
                surcharge: line.projection.surcharge,
                days_past_grace: line.projection.days_past_grace,
            });
        }

        if let Some(transition) = transition {
            self.status_changed(loan.id, transition, "all installments paid");
        }

        Ok(payment)
    }

    fn status_changed(&mut self, loan_id: LoanId, transition: StatusTransition, reason: &str) {
        self.events.emit(Event::LoanStatusChanged {
            loan_id,
            old_status: transition.from,
            new_status: transition.to,
            reason: reason.to_string(),
            timestamp: transition.at,
        });
    }
}

/// project every installment of a loan and roll the results up
pub fn summarize(loan: &Loan, installments: &[Installment], as_of: NaiveDate) -> Result<LoanSummary> {
    let engine = LateFeeEngine::new(loan.terms.late_fee.clone());
    let projections = engine.project_all(installments, as_of)?;

    let mut summary = LoanSummary {
        loan_id: loan.id,
        client_id: loan.client_id.clone(),
        status: loan.status,
        as_of,
        total_with_interest: loan.total_with_interest,
        installment_count: installments.len() as u32,
        paid_count: 0,
        pending_count: 0,
        overdue_count: 0,
        collected: Money::ZERO,
        pending_base: Money::ZERO,
        outstanding: Money::ZERO,
        overdue_balance: Money::ZERO,
        next_due_date: None,
        next_due_amount: None,
        projections: Vec::with_capacity(projections.len()),
    };

    for projection in projections {
        match projection.state {
            InstallmentState::Paid => {
                summary.paid_count += 1;
                summary.collected += projection.amount_owed;
            }
            InstallmentState::Current | InstallmentState::Overdue => {
                summary.pending_count += 1;
                summary.pending_base += projection.base_amount;
                summary.outstanding += projection.amount_owed;
                if projection.is_overdue() {
                    summary.overdue_count += 1;
                    summary.overdue_balance += projection.amount_owed;
                }
                if summary.next_due_date.is_none() {
                    summary.next_due_date = Some(projection.due_date);
                    summary.next_due_amount = Some(projection.amount_owed);
                }
            }
        }
        summary.projections.push(projection);
    }

    Ok(summary)
}
