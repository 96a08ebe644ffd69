use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::decimal::Rate;
use crate::errors::{LoanError, Result};
use crate::types::LateFeePolicy;

/// engine-wide defaults and deployment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// days after due date before an installment counts as late
    pub default_grace_days: u32,
    /// surcharge per overdue period, as a fraction
    pub default_late_fee_rate: Rate,
    pub default_late_fee_policy: LateFeePolicy,
    /// methods offered on the payment screen
    pub payment_methods: Vec<PaymentMethod>,
}

/// a payment method a lender accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub name: String,
    /// traceable methods must carry a reference (transfer number, etc)
    #[serde(default)]
    pub requires_reference: bool,
}

impl PaymentMethod {
    pub fn new(name: &str, requires_reference: bool) -> Self {
        Self {
            name: name.to_string(),
            requires_reference,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_grace_days: 5,
            default_late_fee_rate: Rate::from_percentage(dec!(2)),
            default_late_fee_policy: LateFeePolicy::Fixed,
            payment_methods: default_payment_methods(),
        }
    }
}

/// fallback list used when a deployment does not configure its own
pub fn default_payment_methods() -> Vec<PaymentMethod> {
    vec![
        PaymentMethod::new("Efectivo", false),
        PaymentMethod::new("Cheque", false),
        PaymentMethod::new("Transferencia", true),
        PaymentMethod::new("Tarjeta", false),
        PaymentMethod::new("Otros", false),
    ]
}

impl EngineConfig {
    /// load overrides from json; absent fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| LoanError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_late_fee_rate.is_negative() {
            return Err(LoanError::InvalidLateFeeRate {
                rate: self.default_late_fee_rate,
            });
        }

        if self.payment_methods.is_empty() {
            return Err(LoanError::InvalidConfiguration {
                message: "at least one payment method is required".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for method in &self.payment_methods {
            if method.name.trim().is_empty() {
                return Err(LoanError::InvalidConfiguration {
                    message: "payment method name cannot be empty".to_string(),
                });
            }
            if !seen.insert(method.name.to_lowercase()) {
                return Err(LoanError::InvalidConfiguration {
                    message: format!("duplicate payment method '{}'", method.name),
                });
            }
        }

        Ok(())
    }

    /// look up a configured method by name (case-insensitive)
    pub fn payment_method(&self, name: &str) -> Option<&PaymentMethod> {
        let name = name.trim();
        self.payment_methods
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }
}
