//! Final report assembly and storage.
//!
//! [`assemble_at`] is a pure function of a finished run. [`ReportAssembler`]
//! adds the clock and writes the result to a [`ReportStore`] exactly once.

mod assembler;
mod budget;
mod store;

pub use assembler::{assemble_at, report_key, Report, ReportAssembler, ReportMetadata, SECTION_ORDER};
pub use budget::{format_amount, parse_amount, parse_budget, BudgetBreakdown, BudgetItem};
pub use store::{FileReportStore, InMemoryReportStore, ReportStore};

#[cfg(test)]
pub use store::MockReportStore;
