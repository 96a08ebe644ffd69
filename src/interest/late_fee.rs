use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calendar::days_between;
use crate::config::EngineConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};
use crate::interest::compound::{capitalization_steps, compound_balance, CapitalizationStep};
use crate::state::Installment;
use crate::types::{InstallmentState, InstallmentStatus, LateFeePolicy};

/// days of continued default that make up one late month
pub const DAYS_PER_LATE_MONTH: u32 = 30;

/// a lender's late-fee policy for one loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LateFeeConfig {
    pub policy: LateFeePolicy,
    /// days after the due date before surcharge applies
    pub grace_days: u32,
    /// surcharge per period, as a fraction
    pub rate: Rate,
}

impl LateFeeConfig {
    pub fn new(policy: LateFeePolicy, grace_days: u32, rate: Rate) -> Self {
        Self {
            policy,
            grace_days,
            rate,
        }
    }

    /// parse the textual policy stored by the ledger
    pub fn parse(policy: &str, grace_days: u32, rate_percent: Decimal) -> Result<Self> {
        let config = Self::new(policy.parse()?, grace_days, Rate::from_percentage(rate_percent));
        config.validate()?;
        Ok(config)
    }

    pub fn from_engine_config(config: &EngineConfig) -> Self {
        Self::new(
            config.default_late_fee_policy,
            config.default_grace_days,
            config.default_late_fee_rate,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate.is_negative() {
            return Err(LoanError::InvalidLateFeeRate { rate: self.rate });
        }
        Ok(())
    }

    /// last day an installment due on `due_date` can be paid without surcharge
    pub fn grace_ends_on(&self, due_date: NaiveDate) -> NaiveDate {
        due_date
            .checked_add_signed(Duration::days(i64::from(self.grace_days)))
            .unwrap_or(NaiveDate::MAX)
    }
}

/// live view of what an installment is worth on a given date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LateFeeProjection {
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub as_of: NaiveDate,
    pub grace_ends_on: NaiveDate,
    pub state: InstallmentState,
    pub base_amount: Money,
    pub days_past_due: u32,
    pub days_past_grace: u32,
    /// whole 30-day periods elapsed since grace ended
    pub months_overdue: u32,
    /// number of times the surcharge rate was applied
    pub surcharge_periods: u32,
    pub surcharge: Money,
    pub amount_owed: Money,
}

impl LateFeeProjection {
    pub fn is_overdue(&self) -> bool {
        self.state == InstallmentState::Overdue
    }
}

/// pure projection of owed amounts; never mutates the installment
#[derive(Debug, Clone)]
pub struct LateFeeEngine {
    pub config: LateFeeConfig,
}

impl LateFeeEngine {
    pub fn new(config: LateFeeConfig) -> Self {
        Self { config }
    }

    /// project an installment row as of `as_of`
    pub fn project(&self, installment: &Installment, as_of: NaiveDate) -> Result<LateFeeProjection> {
        match installment.status {
            InstallmentStatus::Paid => Ok(self.project_paid(installment, as_of)),
            InstallmentStatus::Pending => {
                self.project_pending(installment.sequence, installment.due_date, installment.amount, as_of)
            }
        }
    }

    /// amount currently owed on an installment
    pub fn amount_owed(&self, installment: &Installment, as_of: NaiveDate) -> Result<Money> {
        Ok(self.project(installment, as_of)?.amount_owed)
    }

    pub fn project_all(
        &self,
        installments: &[Installment],
        as_of: NaiveDate,
    ) -> Result<Vec<LateFeeProjection>> {
        installments
            .iter()
            .map(|installment| self.project(installment, as_of))
            .collect()
    }

    /// project a pending amount from its raw parts
    pub fn project_pending(
        &self,
        sequence: u32,
        due_date: NaiveDate,
        base_amount: Money,
        as_of: NaiveDate,
    ) -> Result<LateFeeProjection> {
        let grace_ends_on = self.config.grace_ends_on(due_date);
        let days_past_due = clamp_days(days_between(due_date, as_of));
        let days_past_grace = days_past_due.saturating_sub(self.config.grace_days);

        if as_of <= grace_ends_on {
            return Ok(LateFeeProjection {
                sequence,
                due_date,
                as_of,
                grace_ends_on,
                state: InstallmentState::Current,
                base_amount,
                days_past_due,
                days_past_grace: 0,
                months_overdue: 0,
                surcharge_periods: 0,
                surcharge: Money::ZERO,
                amount_owed: base_amount,
            });
        }

        let months_overdue = days_past_grace / DAYS_PER_LATE_MONTH;
        let surcharge_periods = self.surcharge_periods(months_overdue);
        let amount_owed = match self.config.policy {
            LateFeePolicy::Fixed => compound_balance(base_amount, self.config.rate, 1)?,
            LateFeePolicy::Cascading => compound_balance(base_amount, self.config.rate, surcharge_periods)?,
        };

        debug!(
            sequence,
            %due_date,
            %as_of,
            days_past_grace,
            months_overdue,
            policy = %self.config.policy,
            %amount_owed,
            "installment overdue"
        );

        Ok(LateFeeProjection {
            sequence,
            due_date,
            as_of,
            grace_ends_on,
            state: InstallmentState::Overdue,
            base_amount,
            days_past_due,
            days_past_grace,
            months_overdue,
            surcharge_periods,
            surcharge: amount_owed - base_amount,
            amount_owed,
        })
    }

    /// month-by-month capitalization for an overdue installment under the cascading policy
    pub fn capitalization_breakdown(
        &self,
        installment: &Installment,
        as_of: NaiveDate,
    ) -> Result<Vec<CapitalizationStep>> {
        let projection = self.project(installment, as_of)?;
        if projection.state != InstallmentState::Overdue {
            return Ok(Vec::new());
        }
        capitalization_steps(
            projection.base_amount,
            self.config.rate,
            projection.surcharge_periods,
        )
    }

    /// periods the rate is applied while overdue; an overdue installment always carries one
    fn surcharge_periods(&self, months_overdue: u32) -> u32 {
        match self.config.policy {
            LateFeePolicy::Fixed => 1,
            LateFeePolicy::Cascading => months_overdue.max(1),
        }
    }

    fn project_paid(&self, installment: &Installment, as_of: NaiveDate) -> LateFeeProjection {
        let collected = installment.amount_paid.unwrap_or(installment.amount);
        let settled_on = installment.paid_on.unwrap_or(as_of);
        let days_past_due = clamp_days(days_between(installment.due_date, settled_on));

        LateFeeProjection {
            sequence: installment.sequence,
            due_date: installment.due_date,
            as_of,
            grace_ends_on: self.config.grace_ends_on(installment.due_date),
            state: InstallmentState::Paid,
            base_amount: installment.amount,
            days_past_due,
            days_past_grace: days_past_due.saturating_sub(self.config.grace_days),
            months_overdue: 0,
            surcharge_periods: 0,
            surcharge: (collected - installment.amount).max(Money::ZERO),
            amount_owed: collected,
        }
    }
}

fn clamp_days(days: i64) -> u32 {
    u32::try_from(days.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScheduledInstallment;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn money(s: &str) -> Money {
        Money::from_str_exact(s).unwrap()
    }

    fn installment(amount: Money, due_date: NaiveDate) -> Installment {
        Installment::from_schedule(
            Uuid::new_v4(),
            &ScheduledInstallment {
                sequence: 1,
                due_date,
                amount,
            },
        )
    }

    fn engine(policy: LateFeePolicy) -> LateFeeEngine {
        LateFeeEngine::new(LateFeeConfig::new(policy, 5, Rate::from_percentage(dec!(2))))
    }

    #[test]
    fn test_no_surcharge_through_last_grace_day() {
        let due = date(2024, 3, 1);
        let inst = installment(Money::from_major(1_000), due);
        let engine = engine(LateFeePolicy::Fixed);

        let projection = engine.project(&inst, date(2024, 3, 6)).unwrap();
        assert_eq!(projection.state, InstallmentState::Current);
        assert_eq!(projection.amount_owed, Money::from_major(1_000));
        assert_eq!(projection.days_past_due, 5);
        assert_eq!(projection.grace_ends_on, date(2024, 3, 6));

        let before_due = engine.project(&inst, date(2024, 2, 1)).unwrap();
        assert_eq!(before_due.state, InstallmentState::Current);
        assert_eq!(before_due.days_past_due, 0);
    }

    #[test]
    fn test_fixed_surcharge_one_day_past_grace() {
        let inst = installment(Money::from_major(1_000), date(2024, 3, 1));
        let projection = engine(LateFeePolicy::Fixed)
            .project(&inst, date(2024, 3, 7))
            .unwrap();

        assert_eq!(projection.state, InstallmentState::Overdue);
        assert_eq!(projection.days_past_grace, 1);
        assert_eq!(projection.surcharge, Money::from_major(20));
        assert_eq!(projection.amount_owed, Money::from_major(1_020));
    }

    #[test]
    fn test_fixed_does_not_compound() {
        let inst = installment(Money::from_major(1_000), date(2024, 3, 1));
        let projection = engine(LateFeePolicy::Fixed)
            .project(&inst, date(2024, 9, 1))
            .unwrap();

        assert!(projection.months_overdue >= 5);
        assert_eq!(projection.surcharge_periods, 1);
        assert_eq!(projection.amount_owed, Money::from_major(1_020));
    }

    #[test]
    fn test_cascading_compounds_per_late_month() {
        let due = date(2024, 3, 1);
        let inst = installment(Money::from_major(1_000), due);
        let engine = engine(LateFeePolicy::Cascading);

        // 60 days past grace: grace ends 03-06, +60 days = 05-05
        let projection = engine.project(&inst, date(2024, 5, 5)).unwrap();
        assert_eq!(projection.days_past_grace, 60);
        assert_eq!(projection.months_overdue, 2);
        assert_eq!(projection.amount_owed, money("1040.40"));
        assert_eq!(projection.surcharge, money("40.40"));
    }

    #[test]
    fn test_cascading_first_late_month_matches_fixed() {
        let inst = installment(Money::from_major(1_000), date(2024, 3, 1));
        let cascading = engine(LateFeePolicy::Cascading);

        let day_one = cascading.project(&inst, date(2024, 3, 7)).unwrap();
        assert_eq!(day_one.months_overdue, 0);
        assert_eq!(day_one.surcharge_periods, 1);
        assert_eq!(day_one.amount_owed, Money::from_major(1_020));

        let day_fifty_nine = cascading.project(&inst, date(2024, 5, 4)).unwrap();
        assert_eq!(day_fifty_nine.months_overdue, 1);
        assert_eq!(day_fifty_nine.amount_owed, Money::from_major(1_020));
    }

    #[test]
    fn test_paid_installment_frozen_at_collected_amount() {
        let mut inst = installment(Money::from_major(1_000), date(2024, 3, 1));
        inst.mark_paid(Uuid::new_v4(), Money::from_major(1_020), date(2024, 3, 10));

        let engine = engine(LateFeePolicy::Cascading);
        let later = engine.project(&inst, date(2025, 3, 1)).unwrap();
        assert_eq!(later.state, InstallmentState::Paid);
        assert_eq!(later.amount_owed, Money::from_major(1_020));
        assert_eq!(later.surcharge, Money::from_major(20));
        assert_eq!(later.days_past_due, 9);
    }

    #[test]
    fn test_projection_is_idempotent() {
        let inst = installment(money("2200"), date(2024, 3, 1));
        let engine = engine(LateFeePolicy::Cascading);
        let as_of = date(2024, 7, 19);

        let first = engine.project(&inst, as_of).unwrap();
        let second = engine.project(&inst, as_of).unwrap();
        assert_eq!(first, second);
        assert!(inst.is_pending());
        assert_eq!(inst.amount, money("2200"));
    }

    #[test]
    fn test_zero_grace_period() {
        let engine = LateFeeEngine::new(LateFeeConfig::new(
            LateFeePolicy::Fixed,
            0,
            Rate::from_percentage(dec!(2)),
        ));
        let inst = installment(Money::from_major(500), date(2024, 1, 10));

        assert_eq!(engine.amount_owed(&inst, date(2024, 1, 10)).unwrap(), Money::from_major(500));
        assert_eq!(engine.amount_owed(&inst, date(2024, 1, 11)).unwrap(), Money::from_major(510));
    }

    #[test]
    fn test_capitalization_breakdown() {
        let inst = installment(Money::from_major(1_000), date(2024, 3, 1));
        let engine = engine(LateFeePolicy::Cascading);

        let steps = engine.capitalization_breakdown(&inst, date(2024, 5, 5)).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].closing_balance, Money::from_major(1_020));
        assert_eq!(steps[1].surcharge, money("20.40"));

        assert!(engine
            .capitalization_breakdown(&inst, date(2024, 3, 2))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_parse_policy_from_ledger_text() {
        let config = LateFeeConfig::parse("cascading", 5, dec!(2)).unwrap();
        assert_eq!(config.policy, LateFeePolicy::Cascading);
        assert_eq!(config.rate.as_decimal(), dec!(0.02));

        assert!(matches!(
            LateFeeConfig::parse("weekly", 5, dec!(2)),
            Err(LoanError::InvalidPolicy { .. })
        ));
        assert!(matches!(
            LateFeeConfig::parse("fixed", 5, dec!(-1)),
            Err(LoanError::InvalidLateFeeRate { .. })
        ));
    }
}
