use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::LoanError;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for an installment row
pub type InstallmentId = Uuid;

/// unique identifier for a payment
pub type PaymentId = Uuid;

/// repayment frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// every 7 days
    Weekly,
    /// every 15 days (quincenal)
    Biweekly,
    /// every 30 days, not calendar months
    Monthly,
}

impl Frequency {
    /// literal day offset between consecutive due dates
    pub fn step_days(&self) -> u32 {
        match self {
            Frequency::Weekly => 7,
            Frequency::Biweekly => 15,
            Frequency::Monthly => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = LoanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" | "semanal" => Ok(Frequency::Weekly),
            "biweekly" | "quincenal" => Ok(Frequency::Biweekly),
            "monthly" | "mensual" => Ok(Frequency::Monthly),
            other => Err(LoanError::InvalidFrequency {
                frequency: other.to_string(),
            }),
        }
    }
}

/// how overdue installments accrue surcharge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateFeePolicy {
    /// one surcharge on the base amount, however long the delay
    Fixed,
    /// surcharge compounds monthly on the running balance (mora por arrastre)
    Cascading,
}

impl LateFeePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LateFeePolicy::Fixed => "fixed",
            LateFeePolicy::Cascading => "cascading",
        }
    }
}

impl fmt::Display for LateFeePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LateFeePolicy {
    type Err = LoanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fixed" | "fija" => Ok(LateFeePolicy::Fixed),
            "cascading" | "arrastre" => Ok(LateFeePolicy::Cascading),
            other => Err(LoanError::InvalidPolicy {
                policy: other.to_string(),
            }),
        }
    }
}

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// installments outstanding
    Active,
    /// every installment settled
    Paid,
    /// withdrawn by the lender
    Cancelled,
}

impl FromStr for LoanStatus {
    type Err = LoanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(LoanStatus::Active),
            "paid" => Ok(LoanStatus::Paid),
            "cancelled" | "canceled" => Ok(LoanStatus::Cancelled),
            other => Err(LoanError::InvalidConfiguration {
                message: format!("unknown loan status '{}'", other),
            }),
        }
    }
}

/// installment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Pending,
    Paid,
}

/// projected state of a single installment as of some date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentState {
    /// pending and within due date plus grace
    Current,
    /// pending and past grace, surcharge applies
    Overdue,
    /// settled, amount frozen at what was collected
    Paid,
}
