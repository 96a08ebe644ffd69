use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::parse_iso_date;
use crate::config::EngineConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};
use crate::interest::LateFeeConfig;
use crate::schedule::{total_with_interest, validate_terms, InstallmentSchedule, ScheduledInstallment};
use crate::types::{
    Frequency, InstallmentId, InstallmentStatus, LateFeePolicy, LoanId, LoanStatus, PaymentId,
};

/// contractual terms captured at loan creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub principal: Money,
    /// simple rate over the whole term, not per period
    pub interest_rate: Rate,
    pub installment_count: u32,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub late_fee: LateFeeConfig,
}

impl LoanTerms {
    pub fn builder() -> LoanTermsBuilder {
        LoanTermsBuilder::new()
    }

    /// build terms from the primitive values a screen submits
    pub fn from_primitives(
        principal: &str,
        interest_rate_percent: &str,
        installment_count: u32,
        frequency: &str,
        start_date: &str,
        config: &EngineConfig,
    ) -> Result<Self> {
        let principal = Money::from_str_exact(principal).map_err(|e| LoanError::InvalidTerms {
            message: format!("principal '{}': {}", principal, e),
        })?;
        let rate =
            Rate::from_percentage_str(interest_rate_percent).map_err(|e| LoanError::InvalidTerms {
                message: format!("interest rate '{}': {}", interest_rate_percent, e),
            })?;

        LoanTermsBuilder::with_config(config)
            .principal(principal)
            .interest_rate(rate)
            .installments(installment_count)
            .frequency(frequency.parse()?)
            .start_date(parse_iso_date(start_date)?)
            .build()
    }

    pub fn validate(&self) -> Result<()> {
        validate_terms(self.principal, self.interest_rate, self.installment_count)?;
        self.late_fee.validate()
    }

    pub fn total_with_interest(&self) -> Result<Money> {
        total_with_interest(self.principal, self.interest_rate)
    }
}

/// builder for loan terms; late-fee settings fall back to engine defaults
#[derive(Debug, Clone)]
pub struct LoanTermsBuilder {
    principal: Option<Money>,
    interest_rate: Option<Rate>,
    installment_count: Option<u32>,
    frequency: Option<Frequency>,
    start_date: Option<NaiveDate>,
    late_fee_policy: LateFeePolicy,
    grace_days: u32,
    late_fee_rate: Rate,
}

impl LoanTermsBuilder {
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            principal: None,
            interest_rate: None,
            installment_count: None,
            frequency: None,
            start_date: None,
            late_fee_policy: config.default_late_fee_policy,
            grace_days: config.default_grace_days,
            late_fee_rate: config.default_late_fee_rate,
        }
    }

    pub fn principal(mut self, principal: Money) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn interest_rate(mut self, rate: Rate) -> Self {
        self.interest_rate = Some(rate);
        self
    }

    pub fn installments(mut self, count: u32) -> Self {
        self.installment_count = Some(count);
        self
    }

    pub fn frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn late_fee_policy(mut self, policy: LateFeePolicy) -> Self {
        self.late_fee_policy = policy;
        self
    }

    pub fn grace_days(mut self, days: u32) -> Self {
        self.grace_days = days;
        self
    }

    pub fn late_fee_rate(mut self, rate: Rate) -> Self {
        self.late_fee_rate = rate;
        self
    }

    pub fn build(self) -> Result<LoanTerms> {
        let missing = |field: &str| LoanError::InvalidTerms {
            message: format!("{} is required", field),
        };

        let terms = LoanTerms {
            principal: self.principal.ok_or_else(|| missing("principal"))?,
            interest_rate: self.interest_rate.unwrap_or(Rate::ZERO),
            installment_count: self.installment_count.ok_or_else(|| missing("installment count"))?,
            frequency: self.frequency.ok_or_else(|| missing("frequency"))?,
            start_date: self.start_date.ok_or_else(|| missing("start date"))?,
            late_fee: LateFeeConfig {
                policy: self.late_fee_policy,
                grace_days: self.grace_days,
                rate: self.late_fee_rate,
            },
        };
        terms.validate()?;
        Ok(terms)
    }
}

impl Default for LoanTermsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// loan row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    /// opaque reference to the borrower record
    pub client_id: String,
    pub terms: LoanTerms,
    /// fixed at creation, never recomputed from live state
    pub total_with_interest: Money,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
}

impl Loan {
    pub fn new(client_id: String, terms: LoanTerms, schedule: &InstallmentSchedule, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            terms,
            total_with_interest: schedule.total_with_interest,
            status: LoanStatus::Active,
            created_at: now,
            status_changed_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    pub fn update_status(&mut self, status: LoanStatus, timestamp: DateTime<Utc>) {
        self.status = status;
        self.status_changed_at = timestamp;
    }
}

/// installment row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub loan_id: LoanId,
    pub sequence: u32,
    pub due_date: NaiveDate,
    /// scheduled amount before any surcharge
    pub amount: Money,
    pub status: InstallmentStatus,
    pub payment_id: Option<PaymentId>,
    /// what was actually collected for this installment
    pub amount_paid: Option<Money>,
    pub paid_on: Option<NaiveDate>,
}

impl Installment {
    pub fn from_schedule(loan_id: LoanId, scheduled: &ScheduledInstallment) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            sequence: scheduled.sequence,
            due_date: scheduled.due_date,
            amount: scheduled.amount,
            status: InstallmentStatus::Pending,
            payment_id: None,
            amount_paid: None,
            paid_on: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == InstallmentStatus::Pending
    }

    pub fn mark_paid(&mut self, payment_id: PaymentId, amount: Money, date: NaiveDate) {
        self.status = InstallmentStatus::Paid;
        self.payment_id = Some(payment_id);
        self.amount_paid = Some(amount);
        self.paid_on = Some(date);
    }

    pub fn revert_to_pending(&mut self) {
        self.status = InstallmentStatus::Pending;
        self.payment_id = None;
        self.amount_paid = None;
        self.paid_on = None;
    }
}

/// portion of a payment applied to one installment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentAllocation {
    pub installment_id: InstallmentId,
    pub sequence: u32,
    /// live amount owed on the payment date
    pub amount_owed: Money,
    /// share of the payment recorded against the installment
    pub amount_applied: Money,
}

/// payment row, immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub loan_id: LoanId,
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub method: String,
    pub reference: Option<String>,
    /// amount computed by the engine when the payment was confirmed
    pub expected_total: Money,
    /// covered installments in sequence order
    pub allocations: Vec<InstallmentAllocation>,
    pub recorded_at: DateTime<Utc>,
}

impl Payment {
    pub fn installment_ids(&self) -> Vec<InstallmentId> {
        self.allocations.iter().map(|a| a.installment_id).collect()
    }

    pub fn sequences(&self) -> Vec<u32> {
        self.allocations.iter().map(|a| a.sequence).collect()
    }

    pub fn covers(&self, installment_id: InstallmentId) -> bool {
        self.allocations.iter().any(|a| a.installment_id == installment_id)
    }

    /// difference between what was paid and what the engine computed
    pub fn override_delta(&self) -> Decimal {
        self.amount.as_decimal() - self.expected_total.as_decimal()
    }
}

/// cancellation record; the original payment row is kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCancellation {
    pub id: Uuid,
    pub payment_id: PaymentId,
    pub loan_id: LoanId,
    pub reason: String,
    pub reverted_installments: Vec<InstallmentId>,
    pub cancelled_at: DateTime<Utc>,
}
