use std::collections::{HashMap, HashSet};

use crate::models::{DataSource, DebugLog, DetailRecord, InvoiceRecord, ReportRecord};

#[derive(Debug, Default)]
pub struct MergeOutput {
    pub report: Vec<ReportRecord>,
    pub details: Vec<DetailRecord>,
}

/// Collapses all cleaned per-file chunks into the two canonical tables.
///
/// Order precedence: JSON rows win over CSV rows for the same order id, but
/// manually entered member fields from the losing CSV row are kept. Invoice
/// rows only ever backfill, never overwrite.
pub fn merge(
    report_chunks: Vec<Vec<ReportRecord>>,
    detail_chunks: Vec<Vec<DetailRecord>>,
    invoice_chunks: Vec<Vec<InvoiceRecord>>,
    log: &mut DebugLog,
) -> MergeOutput {
    let invoices = consolidate_invoices(invoice_chunks, log);
    let report = consolidate_reports(report_chunks, &invoices, log);
    let details = consolidate_details(detail_chunks, &report, log);
    MergeOutput { report, details }
}

fn consolidate_invoices(
    chunks: Vec<Vec<InvoiceRecord>>,
    log: &mut DebugLog,
) -> HashMap<String, InvoiceRecord> {
    let mut raw_rows = 0usize;
    let mut lookup: HashMap<String, InvoiceRecord> = HashMap::new();
    for chunk in chunks {
        for record in chunk {
            raw_rows += 1;
            // Later files win, re-exports supersede older invoice dumps.
            lookup.insert(record.invoice_id.clone(), record);
        }
    }
    if raw_rows > 0 {
        log.push(format!(
            "🧾 Invoice lookup: {} unique invoices from {} rows",
            lookup.len(),
            raw_rows
        ));
    }
    lookup
}

fn consolidate_reports(
    chunks: Vec<Vec<ReportRecord>>,
    invoices: &HashMap<String, InvoiceRecord>,
    log: &mut DebugLog,
) -> Vec<ReportRecord> {
    let mut records: Vec<ReportRecord> = chunks.into_iter().flatten().collect();
    let raw_rows = records.len();

    // Member fields typed into the POS only exist on the CSV side, so snapshot
    // them before JSON rows shadow their orders.
    let mut csv_members: HashMap<String, (Option<String>, Option<String>)> = HashMap::new();
    for record in records.iter().filter(|r| r.data_source == DataSource::Csv) {
        let entry = csv_members
            .entry(record.order_id.clone())
            .or_insert((None, None));
        if entry.0.is_none() {
            entry.0 = record.member_phone.clone();
        }
        if entry.1.is_none() {
            entry.1 = record.customer_name.clone();
        }
    }

    // Stable sort: JSON first, file order preserved within each source.
    records.sort_by_key(|r| match r.data_source {
        DataSource::Json => 0u8,
        DataSource::Csv => 1u8,
    });

    let mut seen: HashSet<String> = HashSet::new();
    let mut deduped: Vec<ReportRecord> = Vec::with_capacity(records.len());
    for record in records {
        if seen.insert(record.order_id.clone()) {
            deduped.push(record);
        }
    }
    let duplicates = raw_rows - deduped.len();

    let mut backfilled = 0usize;
    let mut invoice_hits = 0usize;
    for record in &mut deduped {
        if record.member_phone.is_none() || record.customer_name.is_none() {
            if let Some((phone, name)) = csv_members.get(&record.order_id) {
                let mut touched = false;
                if record.member_phone.is_none() && phone.is_some() {
                    record.member_phone = phone.clone();
                    touched = true;
                }
                if record.customer_name.is_none() && name.is_some() {
                    record.customer_name = name.clone();
                    touched = true;
                }
                if touched {
                    backfilled += 1;
                }
            }
        }
        if let Some(invoice) = record
            .invoice_id
            .as_ref()
            .and_then(|id| invoices.get(id.as_str()))
        {
            invoice_hits += 1;
            if record.carrier_id.is_none() {
                record.carrier_id = invoice.carrier_id.clone();
            }
            if record.tax_id.is_none() {
                record.tax_id = invoice.tax_id.clone();
            }
        }
    }

    log.push(format!(
        "🔄 Report consolidation: {} rows in, {} duplicate order ids dropped, {} kept",
        raw_rows,
        duplicates,
        deduped.len()
    ));
    if backfilled > 0 {
        log.push(format!(
            "📞 Member backfill: {} orders filled from CSV member fields",
            backfilled
        ));
    }
    if invoice_hits > 0 {
        log.push(format!(
            "🔗 Invoice join: {} orders matched an invoice",
            invoice_hits
        ));
    }

    deduped
}

fn consolidate_details(
    chunks: Vec<Vec<DetailRecord>>,
    report: &[ReportRecord],
    log: &mut DebugLog,
) -> Vec<DetailRecord> {
    let records: Vec<DetailRecord> = chunks.into_iter().flatten().collect();
    let raw_rows = records.len();

    let report_ids: HashSet<&str> = report.iter().map(|r| r.order_id.as_str()).collect();

    // Duplicate line items are legitimate (same dish twice) and are kept;
    // only rows whose order fell out of the report table are dropped.
    let mut kept: Vec<DetailRecord> = records
        .into_iter()
        .filter(|d| report_ids.contains(d.order_id.as_str()))
        .collect();
    let orphaned = raw_rows - kept.len();

    let json_orders: HashSet<String> = kept
        .iter()
        .filter(|d| d.data_source == DataSource::Json)
        .map(|d| d.order_id.clone())
        .collect();
    let before_displacement = kept.len();
    kept.retain(|d| {
        d.data_source == DataSource::Json || !json_orders.contains(d.order_id.as_str())
    });
    let displaced = before_displacement - kept.len();

    log.push(format!(
        "🍜 Details consolidation: {} rows in, {} without a surviving order, {} CSV rows displaced by JSON, {} kept",
        raw_rows,
        orphaned,
        displaced,
        kept.len()
    ));

    kept
}
