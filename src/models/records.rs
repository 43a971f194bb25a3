use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a classified file contributes to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    Report,
    Details,
    Invoice,
    Unclassified,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Report => "report",
            RecordKind::Details => "details",
            RecordKind::Invoice => "invoice",
            RecordKind::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rule decided a file's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchBasis {
    Filename,
    Columns,
}

impl fmt::Display for MatchBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchBasis::Filename => f.write_str("filename"),
            MatchBasis::Columns => f.write_str("columns"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataSource {
    #[default]
    Csv,
    Json,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Csv => "csv",
            DataSource::Json => "json",
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            DataSource::Json
        } else {
            DataSource::Csv
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed tabular file: canonical headers plus raw string rows. Rows may
/// be ragged, cell access goes through the cleaners which guard the index.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub source: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// One order in the canonical report table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportRecord {
    pub order_id: String,
    pub date: Option<NaiveDateTime>,
    pub total_amount: f64,
    pub status: Option<String>,
    pub order_type: Option<String>,
    pub payment_method: Option<String>,
    pub people_count: Option<f64>,
    pub member_phone: Option<String>,
    pub customer_name: Option<String>,
    pub carrier_id: Option<String>,
    pub invoice_id: Option<String>,
    pub tax_id: Option<String>,
    pub data_source: DataSource,
    // Enrichment fields, empty until `enrich` runs.
    pub day_type: Option<String>,
    pub period: Option<String>,
    pub order_category: Option<String>,
    pub member_id: Option<String>,
}

/// One line item in the canonical details table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailRecord {
    pub order_id: String,
    pub date: Option<NaiveDateTime>,
    pub item_name: String,
    pub sku: Option<String>,
    pub qty: f64,
    pub unit_price: f64,
    pub item_total: f64,
    pub options: Option<String>,
    pub item_type: Option<String>,
    pub status: Option<String>,
    pub data_source: DataSource,
    // Enrichment fields, empty until `enrich` runs.
    pub category: Option<String>,
    pub is_modifier: bool,
    pub is_main_dish: bool,
}

/// One row from an e-invoice export, used only to backfill report fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceRecord {
    pub invoice_id: String,
    pub carrier_id: Option<String>,
    pub tax_id: Option<String>,
    pub date: Option<NaiveDateTime>,
}

/// Newest business date seen per source family during a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatestDates {
    pub json: Option<NaiveDate>,
    pub csv_report: Option<NaiveDate>,
    pub csv_details: Option<NaiveDate>,
    pub invoice: Option<NaiveDate>,
}

impl LatestDates {
    pub fn bump(slot: &mut Option<NaiveDate>, candidate: Option<NaiveDateTime>) {
        if let Some(dt) = candidate {
            let date = dt.date();
            if slot.map_or(true, |current| date > current) {
                *slot = Some(date);
            }
        }
    }
}

/// Scan log carried in the pipeline output, mirrored through tracing as it
/// is written.
#[derive(Debug, Default)]
pub struct DebugLog {
    lines: Vec<String>,
}

impl DebugLog {
    pub fn new() -> Self {
        DebugLog::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!("{}", line);
        self.lines.push(line);
    }

    pub fn warn(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::warn!("{}", line);
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}
