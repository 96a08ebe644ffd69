pub mod allocator;
pub mod cancellation;
pub mod methods;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;

pub use allocator::{
    distribute, pending_in_order, select_oldest_pending, AllocationPlan, AllocationQuote,
    PaymentAllocator, QuoteLine,
};
pub use cancellation::{revert_installments, CancellationPlanner};
pub use methods::{PaymentMethods, ResolvedMethod};

/// payment as entered on the payment screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// amount actually received; may differ from the computed total
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub method: String,
    pub reference: Option<String>,
}

impl PaymentRequest {
    pub fn new(amount: Money, payment_date: NaiveDate, method: impl Into<String>) -> Self {
        Self {
            amount,
            payment_date,
            method: method.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let request = PaymentRequest::new(Money::from_major(2_200), date, "Transferencia")
            .with_reference("TRX-77");

        assert_eq!(request.method, "Transferencia");
        assert_eq!(request.reference.as_deref(), Some("TRX-77"));

        let cash = PaymentRequest::new(Money::from_major(50), date, "Efectivo");
        assert_eq!(cash.reference, None);
    }
}
