use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::types::LoanStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoanError {
    #[error("invalid loan terms: {message}")]
    InvalidTerms {
        message: String,
    },

    #[error("invalid late-fee policy: '{policy}' (expected fixed or cascading)")]
    InvalidPolicy {
        policy: String,
    },

    #[error("invalid payment frequency: '{frequency}' (expected weekly, biweekly or monthly)")]
    InvalidFrequency {
        frequency: String,
    },

    #[error("invalid late-fee rate: {rate}")]
    InvalidLateFeeRate {
        rate: Rate,
    },

    #[error("invalid date: {message}")]
    InvalidDate {
        message: String,
    },

    #[error("not enough pending installments: requested {requested}, pending {pending}")]
    NoPendingInstallments {
        requested: usize,
        pending: usize,
    },

    #[error("installment count to pay must be at least 1, got {requested}")]
    InvalidInstallmentCount {
        requested: usize,
    },

    #[error("invalid payment amount: {amount}")]
    InvalidAmount {
        amount: Money,
    },

    #[error("payment method '{method}' requires a reference")]
    MissingReference {
        method: String,
    },

    #[error("unknown payment method: '{method}'")]
    UnknownPaymentMethod {
        method: String,
    },

    #[error("installments must be paid oldest first: requested {requested:?}, next pending {expected:?}")]
    FifoViolation {
        requested: Vec<u32>,
        expected: Vec<u32>,
    },

    #[error("installment {sequence} is already paid")]
    InstallmentAlreadyPaid {
        sequence: u32,
    },

    #[error("loan not found: {id}")]
    LoanNotFound {
        id: Uuid,
    },

    #[error("loan not active: current status is {status:?}")]
    LoanNotActive {
        status: LoanStatus,
    },

    #[error("loan has active payments and cannot be cancelled: {active_payments} payment(s)")]
    LoanHasPayments {
        active_payments: usize,
    },

    #[error("payment not found: {id}")]
    PaymentNotFound {
        id: Uuid,
    },

    #[error("payment already cancelled: {id}")]
    PaymentAlreadyCancelled {
        id: Uuid,
    },

    #[error("payment {id} cannot be cancelled before later payment {blocking}")]
    CancellationOrderViolation {
        id: Uuid,
        blocking: Uuid,
    },

    #[error("a cancellation reason is required")]
    MissingCancellationReason,

    #[error("payment date {payment_date} precedes loan start {start_date}")]
    PaymentBeforeLoanStart {
        payment_date: NaiveDate,
        start_date: NaiveDate,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("calculation overflow: {message}")]
    CalculationOverflow {
        message: String,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// failures raised by the persistence collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("ledger unavailable: {message}")]
    Unavailable {
        message: String,
    },

    #[error("ledger write conflict: {message}")]
    Conflict {
        message: String,
    },
}

/// the three families of failure the engine distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// bad input, rejected before any ledger mutation
    Validation,
    /// request contradicts ledger state, rejected atomically
    Consistency,
    /// ledger could not be reached; caller may retry
    Persistence,
}

impl LoanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoanError::InvalidTerms { .. }
            | LoanError::InvalidPolicy { .. }
            | LoanError::InvalidFrequency { .. }
            | LoanError::InvalidLateFeeRate { .. }
            | LoanError::InvalidDate { .. }
            | LoanError::InvalidAmount { .. }
            | LoanError::InvalidInstallmentCount { .. }
            | LoanError::MissingCancellationReason
            | LoanError::MissingReference { .. }
            | LoanError::UnknownPaymentMethod { .. }
            | LoanError::PaymentBeforeLoanStart { .. }
            | LoanError::InvalidConfiguration { .. }
            | LoanError::CalculationOverflow { .. } => ErrorKind::Validation,

            LoanError::NoPendingInstallments { .. }
            | LoanError::FifoViolation { .. }
            | LoanError::InstallmentAlreadyPaid { .. }
            | LoanError::LoanNotFound { .. }
            | LoanError::LoanNotActive { .. }
            | LoanError::LoanHasPayments { .. }
            | LoanError::PaymentNotFound { .. }
            | LoanError::PaymentAlreadyCancelled { .. }
            | LoanError::CancellationOrderViolation { .. } => ErrorKind::Consistency,

            LoanError::Ledger(LedgerError::Conflict { .. }) => ErrorKind::Consistency,
            LoanError::Ledger(LedgerError::Unavailable { .. }) => ErrorKind::Persistence,
        }
    }

    /// true when retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Persistence
    }
}

pub type Result<T> = std::result::Result<T, LoanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = LoanError::InvalidAmount { amount: Money::ZERO };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_transient());

        let err = LoanError::NoPendingInstallments { requested: 3, pending: 1 };
        assert_eq!(err.kind(), ErrorKind::Consistency);

        let err: LoanError = LedgerError::Unavailable {
            message: "connection refused".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(err.is_transient());
    }

    #[test]
    fn test_error_messages() {
        let err = LoanError::MissingReference {
            method: "Transferencia".to_string(),
        };
        assert_eq!(err.to_string(), "payment method 'Transferencia' requires a reference");
    }
}
