pub mod frames;
pub mod records;

pub use records::{
    DataSource, DebugLog, DetailRecord, InvoiceRecord, LatestDates, MatchBasis, RawTable,
    RecordKind, ReportRecord,
};
