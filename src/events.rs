use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{InstallmentId, LateFeePolicy, LoanId, LoanStatus, PaymentId};

/// audit events emitted by the loan service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    LoanCreated {
        loan_id: LoanId,
        client_id: String,
        principal: Money,
        total_with_interest: Money,
        installment_count: u32,
        late_fee_policy: LateFeePolicy,
        timestamp: DateTime<Utc>,
    },
    ScheduleGenerated {
        loan_id: LoanId,
        base_installment: Money,
        first_due_date: NaiveDate,
        maturity_date: NaiveDate,
    },
    LoanStatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentRecorded {
        loan_id: LoanId,
        payment_id: PaymentId,
        amount: Money,
        method: String,
        installments: Vec<u32>,
        payment_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },
    PaymentAmountOverridden {
        loan_id: LoanId,
        payment_id: PaymentId,
        expected: Money,
        accepted: Money,
        timestamp: DateTime<Utc>,
    },
    LateFeeCollected {
        loan_id: LoanId,
        installment_id: InstallmentId,
        sequence: u32,
        surcharge: Money,
        days_past_grace: u32,
    },
    PaymentCancelled {
        loan_id: LoanId,
        payment_id: PaymentId,
        reason: String,
        reverted_installments: Vec<InstallmentId>,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn loan_id(&self) -> LoanId {
        match self {
            Event::LoanCreated { loan_id, .. }
            | Event::ScheduleGenerated { loan_id, .. }
            | Event::LoanStatusChanged { loan_id, .. }
            | Event::PaymentRecorded { loan_id, .. }
            | Event::PaymentAmountOverridden { loan_id, .. }
            | Event::LateFeeCollected { loan_id, .. }
            | Event::PaymentCancelled { loan_id, .. } => *loan_id,
        }
    }
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// events touching one loan, oldest first
    pub fn for_loan(&self, loan_id: LoanId) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.loan_id() == loan_id)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
