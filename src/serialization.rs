/// serialization support for loan statements
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::loan::LoanSummary;
use crate::state::{Installment, Loan};
use crate::types::{Frequency, InstallmentState, LateFeePolicy, LoanId, LoanStatus, PaymentId};

/// serializable snapshot of a loan and its live installment amounts
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanStatementView {
    pub id: LoanId,
    pub client_id: String,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    pub as_of: NaiveDate,
    pub terms: TermsView,
    pub balances: BalancesView,
    pub installments: Vec<InstallmentView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TermsView {
    pub principal: Money,
    pub interest_rate: Rate,
    pub total_with_interest: Money,
    pub installment_count: u32,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub late_fee_policy: LateFeePolicy,
    pub grace_days: u32,
    pub late_fee_rate: Rate,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalancesView {
    pub collected: Money,
    pub outstanding: Money,
    pub overdue_balance: Money,
    pub paid_installments: u32,
    pub pending_installments: u32,
    pub overdue_installments: u32,
    pub next_due_date: Option<NaiveDate>,
    pub next_due_amount: Option<Money>,
}

/// one installment row as a screen renders it
#[derive(Debug, Serialize, Deserialize)]
pub struct InstallmentView {
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
    pub state: InstallmentState,
    pub days_past_due: u32,
    pub months_overdue: u32,
    pub surcharge: Money,
    pub amount_owed: Money,
    pub payment_id: Option<PaymentId>,
    pub paid_on: Option<NaiveDate>,
}

impl LoanStatementView {
    /// `summary` must have been computed from the same `installments`
    pub fn from_parts(loan: &Loan, summary: &LoanSummary, installments: &[Installment]) -> Self {
        let installments = installments
            .iter()
            .zip(&summary.projections)
            .map(|(installment, projection)| InstallmentView {
                sequence: installment.sequence,
                due_date: installment.due_date,
                amount: installment.amount,
                state: projection.state,
                days_past_due: projection.days_past_due,
                months_overdue: projection.months_overdue,
                surcharge: projection.surcharge,
                amount_owed: projection.amount_owed,
                payment_id: installment.payment_id,
                paid_on: installment.paid_on,
            })
            .collect();

        LoanStatementView {
            id: loan.id,
            client_id: loan.client_id.clone(),
            status: loan.status,
            created_at: loan.created_at,
            as_of: summary.as_of,
            terms: TermsView {
                principal: loan.terms.principal,
                interest_rate: loan.terms.interest_rate,
                total_with_interest: loan.total_with_interest,
                installment_count: loan.terms.installment_count,
                frequency: loan.terms.frequency,
                start_date: loan.terms.start_date,
                late_fee_policy: loan.terms.late_fee.policy,
                grace_days: loan.terms.late_fee.grace_days,
                late_fee_rate: loan.terms.late_fee.rate,
            },
            balances: BalancesView {
                collected: summary.collected,
                outstanding: summary.outstanding,
                overdue_balance: summary.overdue_balance,
                paid_installments: summary.paid_count,
                pending_installments: summary.pending_count,
                overdue_installments: summary.overdue_count,
                next_due_date: summary.next_due_date,
                next_due_amount: summary.next_due_amount,
            },
            installments,
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
