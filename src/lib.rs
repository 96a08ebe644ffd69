pub mod calendar;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod interest;
pub mod ledger;
pub mod loan;
pub mod payments;
pub mod schedule;
pub mod serialization;
pub mod state;
pub mod types;

// re-export key types
pub use calendar::{parse_iso_date, DueDateResolver};
pub use config::{EngineConfig, PaymentMethod};
pub use decimal::{Money, Rate};
pub use errors::{ErrorKind, LedgerError, LoanError, Result};
pub use events::{Event, EventStore};
pub use interest::{LateFeeConfig, LateFeeEngine, LateFeeProjection};
pub use ledger::{InMemoryLedger, Ledger, StatusTransition};
pub use loan::{LoanService, LoanSummary, PortfolioSummary};
pub use payments::{
    AllocationPlan, AllocationQuote, CancellationPlanner, PaymentAllocator, PaymentMethods,
    PaymentRequest,
};
pub use schedule::{InstallmentSchedule, ScheduleGenerator, ScheduledInstallment};
pub use serialization::{InstallmentView, LoanStatementView};
pub use state::{
    Installment, InstallmentAllocation, Loan, LoanTerms, LoanTermsBuilder, Payment,
    PaymentCancellation,
};
pub use types::{
    Frequency, InstallmentId, InstallmentState, InstallmentStatus, LateFeePolicy, LoanId,
    LoanStatus, PaymentId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
