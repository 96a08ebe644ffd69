use crate::config::{default_payment_methods, EngineConfig, PaymentMethod};
use crate::errors::{LoanError, Result};

/// payment methods accepted by a deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMethods {
    methods: Vec<PaymentMethod>,
}

/// a method and reference that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMethod {
    /// canonical name as configured
    pub name: String,
    pub reference: Option<String>,
}

impl PaymentMethods {
    /// falls back to the built-in list when `methods` is empty
    pub fn new(methods: Vec<PaymentMethod>) -> Self {
        if methods.is_empty() {
            Self {
                methods: default_payment_methods(),
            }
        } else {
            Self { methods }
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.payment_methods.clone())
    }

    pub fn names(&self) -> Vec<&str> {
        self.methods.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&PaymentMethod> {
        let name = name.trim();
        self.methods.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// check the method exists and carries a reference when it must
    pub fn resolve(&self, method: &str, reference: Option<&str>) -> Result<ResolvedMethod> {
        let configured = self.get(method).ok_or_else(|| LoanError::UnknownPaymentMethod {
            method: method.to_string(),
        })?;

        let reference = reference
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        if configured.requires_reference && reference.is_none() {
            return Err(LoanError::MissingReference {
                method: configured.name.clone(),
            });
        }

        Ok(ResolvedMethod {
            name: configured.name.clone(),
            reference,
        })
    }
}

impl Default for PaymentMethods {
    fn default() -> Self {
        Self::new(default_payment_methods())
    }
}
