use chrono::{Duration, NaiveDate};

use crate::errors::{LoanError, Result};
use crate::types::Frequency;

/// maps a start date and frequency to successive due dates
///
/// Steps are literal day offsets: a monthly loan starting 2024-01-31 falls
/// due on 2024-03-01, not 2024-02-29.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueDateResolver {
    start_date: NaiveDate,
    frequency: Frequency,
}

impl DueDateResolver {
    pub fn new(start_date: NaiveDate, frequency: Frequency) -> Self {
        Self {
            start_date,
            frequency,
        }
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// due date of installment `sequence` (1-based); the first falls on the start date
    pub fn due_date(&self, sequence: u32) -> Result<NaiveDate> {
        if sequence == 0 {
            return Err(LoanError::InvalidTerms {
                message: "installment sequence numbers start at 1".to_string(),
            });
        }

        let offset = i64::from(sequence - 1) * i64::from(self.frequency.step_days());
        self.start_date
            .checked_add_signed(Duration::days(offset))
            .ok_or_else(|| LoanError::InvalidDate {
                message: format!(
                    "installment {} overflows the calendar from {}",
                    sequence, self.start_date
                ),
            })
    }

    /// due dates for installments 1..=count
    pub fn due_dates(&self, count: u32) -> Result<Vec<NaiveDate>> {
        (1..=count).map(|sequence| self.due_date(sequence)).collect()
    }
}

/// parse an ISO `YYYY-MM-DD` date as supplied by the presentation layer
pub fn parse_iso_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| LoanError::InvalidDate {
        message: format!("'{}': {}", s, e),
    })
}

/// whole days from `from` to `to` (negative when `to` is earlier)
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_first_installment_due_on_start() {
        let resolver = DueDateResolver::new(date(2024, 1, 1), Frequency::Monthly);
        assert_eq!(resolver.due_date(1).unwrap(), date(2024, 1, 1));
    }

    #[test]
    fn test_monthly_uses_thirty_day_steps() {
        let resolver = DueDateResolver::new(date(2024, 1, 1), Frequency::Monthly);
        let dates = resolver.due_dates(5).unwrap();
        assert_eq!(
            dates,
            vec![
                date(2024, 1, 1),
                date(2024, 1, 31),
                date(2024, 3, 1), // leap february
                date(2024, 3, 31),
                date(2024, 4, 30),
            ]
        );
    }

    #[test]
    fn test_weekly_and_biweekly() {
        let weekly = DueDateResolver::new(date(2024, 2, 26), Frequency::Weekly);
        assert_eq!(weekly.due_date(2).unwrap(), date(2024, 3, 4));

        let biweekly = DueDateResolver::new(date(2024, 1, 1), Frequency::Biweekly);
        assert_eq!(biweekly.due_date(3).unwrap(), date(2024, 1, 31));
    }

    #[test]
    fn test_sequence_zero_rejected() {
        let resolver = DueDateResolver::new(date(2024, 1, 1), Frequency::Weekly);
        assert!(matches!(resolver.due_date(0), Err(LoanError::InvalidTerms { .. })));
    }

    #[test]
    fn test_parse_iso_date() {
        assert_eq!(parse_iso_date("2024-01-01").unwrap(), date(2024, 1, 1));
        assert_eq!(parse_iso_date(" 2024-12-31 ").unwrap(), date(2024, 12, 31));
        assert!(matches!(parse_iso_date("01/02/2024"), Err(LoanError::InvalidDate { .. })));
        assert!(matches!(parse_iso_date("2023-02-29"), Err(LoanError::InvalidDate { .. })));
    }

    #[test]
    fn test_days_between() {
        assert_eq!(days_between(date(2024, 3, 1), date(2024, 4, 10)), 40);
        assert_eq!(days_between(date(2024, 3, 1), date(2024, 2, 28)), -2);
    }
}
