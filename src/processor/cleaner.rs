use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;

use crate::config::CleaningConfig;
use crate::models::{DataSource, DetailRecord, InvoiceRecord, RawTable, ReportRecord};

static CURRENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[NT$,]").unwrap()
});

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Strips currency markers and parses, returning 0.0 for anything that still
/// does not look like a number. A bad cell must never fail a file.
pub fn parse_currency(raw: &str) -> f64 {
    parse_number(raw).unwrap_or(0.0)
}

pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = CURRENCY_RE.replace_all(raw, "");
    cleaned.trim().parse::<f64>().ok()
}

/// Tries the known export timestamp formats, then date-only formats at
/// midnight. Unparseable values become None.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

pub fn normalize_status(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// POS terminals hand out small order numbers that reset daily (and sometimes
/// mid-day), so a purely numeric short id gets rewritten to
/// `{YYYYMMDD}-{id}-{HHMM}` when the row has a usable date. Longer or
/// non-numeric ids are already unique and pass through untouched.
pub fn normalize_order_id(raw: &str, date: Option<NaiveDateTime>, max_short_len: usize) -> String {
    let id = raw.trim();
    let is_short_numeric =
        !id.is_empty() && id.len() <= max_short_len && id.chars().all(|c| c.is_ascii_digit());
    if is_short_numeric {
        if let Some(dt) = date {
            return format!("{}-{}-{}", dt.format("%Y%m%d"), id, dt.format("%H%M"));
        }
    }
    id.to_string()
}

pub fn clean_reports(table: &RawTable, cfg: &CleaningConfig) -> Vec<ReportRecord> {
    let invalid = cfg.invalid_status_set();
    let idx_order = table.column_index("order_id");
    let idx_date = table.column_index("date");
    let idx_total = table.column_index("total_amount");
    let idx_status = table.column_index("status");
    let idx_order_type = table.column_index("order_type");
    let idx_payment = table.column_index("payment_method");
    let idx_people = table.column_index("people_count");
    let idx_phone = table.column_index("member_phone");
    let idx_name = table.column_index("customer_name");
    let idx_carrier = table.column_index("carrier_id");
    let idx_invoice = table.column_index("invoice_id");
    let idx_tax = table.column_index("tax_id");

    let mut records = Vec::new();
    for row in &table.rows {
        let raw_id = match cell(row, idx_order) {
            Some(id) => id,
            None => continue,
        };
        let status = cell(row, idx_status).map(normalize_status);
        if let Some(s) = &status {
            if invalid.contains(s.as_str()) {
                continue;
            }
        }
        let date = cell(row, idx_date).and_then(parse_datetime);
        records.push(ReportRecord {
            order_id: normalize_order_id(raw_id, date, cfg.short_order_id_max_len),
            date,
            total_amount: cell(row, idx_total).map(parse_currency).unwrap_or(0.0),
            status,
            order_type: cell(row, idx_order_type).map(str::to_string),
            payment_method: cell(row, idx_payment).map(str::to_string),
            people_count: cell(row, idx_people).and_then(parse_number),
            member_phone: cell(row, idx_phone).map(str::to_string),
            customer_name: cell(row, idx_name).map(str::to_string),
            carrier_id: cell(row, idx_carrier).map(str::to_string),
            invoice_id: cell(row, idx_invoice).map(str::to_string),
            tax_id: cell(row, idx_tax).map(str::to_string),
            data_source: DataSource::Csv,
            ..ReportRecord::default()
        });
    }
    records
}

pub fn clean_details(table: &RawTable, cfg: &CleaningConfig) -> Vec<DetailRecord> {
    let invalid = cfg.invalid_status_set();
    let idx_order = table.column_index("order_id");
    let idx_date = table.column_index("date");
    let idx_item = table.column_index("item_name");
    let idx_sku = table.column_index("sku");
    let idx_qty = table.column_index("qty");
    let idx_unit = table.column_index("unit_price");
    let idx_total = table.column_index("item_total");
    let idx_options = table.column_index("options");
    let idx_type = table.column_index("item_type");
    let idx_status = table.column_index("status");

    let mut records = Vec::new();
    for row in &table.rows {
        let raw_id = match cell(row, idx_order) {
            Some(id) => id,
            None => continue,
        };
        let item_name = match cell(row, idx_item) {
            Some(name) => name.to_string(),
            None => continue,
        };
        let status = cell(row, idx_status).map(normalize_status);
        if let Some(s) = &status {
            if invalid.contains(s.as_str()) {
                continue;
            }
        }
        let date = cell(row, idx_date).and_then(parse_datetime);
        records.push(DetailRecord {
            order_id: normalize_order_id(raw_id, date, cfg.short_order_id_max_len),
            date,
            item_name,
            sku: cell(row, idx_sku).map(str::to_string),
            qty: cell(row, idx_qty).and_then(parse_number).unwrap_or(0.0),
            unit_price: cell(row, idx_unit).map(parse_currency).unwrap_or(0.0),
            item_total: cell(row, idx_total).map(parse_currency).unwrap_or(0.0),
            options: cell(row, idx_options).map(str::to_string),
            item_type: cell(row, idx_type).map(str::to_string),
            status,
            data_source: DataSource::Csv,
            ..DetailRecord::default()
        });
    }
    records
}

pub fn clean_invoices(table: &RawTable) -> Vec<InvoiceRecord> {
    let idx_invoice = table.column_index("invoice_id");
    let idx_carrier = table.column_index("carrier_id");
    let idx_tax = table.column_index("tax_id");
    let idx_date = table.column_index("date");

    let mut records = Vec::new();
    for row in &table.rows {
        let invoice_id = match cell(row, idx_invoice) {
            Some(id) => id.to_string(),
            None => continue,
        };
        records.push(InvoiceRecord {
            invoice_id,
            carrier_id: cell(row, idx_carrier).map(str::to_string),
            tax_id: cell(row, idx_tax).map(str::to_string),
            date: cell(row, idx_date).and_then(parse_datetime),
        });
    }
    records
}

/// Ragged rows are padded implicitly: a missing index reads as None, as do
/// empty cells and the literal "nan" pandas leaves behind in re-exports.
fn cell<'a>(row: &'a [String], idx: Option<usize>) -> Option<&'a str> {
    let value = row.get(idx?)?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("nan") {
        return None;
    }
    Some(value)
}
