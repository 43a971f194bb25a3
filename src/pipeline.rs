use anyhow::Result;
use polars::prelude::DataFrame;
use std::path::Path;

use crate::config::{ColumnMapper, PipelineConfig};
use crate::models::{
    frames, DataSource, DebugLog, DetailRecord, InvoiceRecord, LatestDates, RecordKind,
    ReportRecord,
};
use crate::processor::{cleaner, enricher, merger, ClassifierRules};
use crate::reader::{csv_file, json_file, scanner, CandidateFile};
use crate::storage::FrameCache;

/// Everything one scan produces: the two canonical frames, the human-readable
/// scan log, and the newest business date seen per source family.
#[derive(Debug)]
pub struct LoadResult {
    pub report: DataFrame,
    pub details: DataFrame,
    pub logs: Vec<String>,
    pub latest_dates: LatestDates,
}

#[derive(Debug, Default)]
struct ScanAccumulator {
    report_chunks: Vec<Vec<ReportRecord>>,
    detail_chunks: Vec<Vec<DetailRecord>>,
    invoice_chunks: Vec<Vec<InvoiceRecord>>,
    latest: LatestDates,
}

/// Walks the configured data directories, classifies and cleans every file,
/// merges the chunks into the two canonical frames and refreshes the Parquet
/// cache. Per-file failures are logged and skipped; only a broken
/// configuration aborts the run.
pub fn scan_and_load(cfg: &PipelineConfig) -> Result<LoadResult> {
    let mut log = DebugLog::new();
    let mapper = ColumnMapper::from_table(&cfg.columns)?;
    let rules = ClassifierRules::from_config(&cfg.classifier);

    let candidates =
        scanner::collect_candidates(&cfg.scan, &cfg.classifier.json_txt_tokens, &mut log);
    let cache = FrameCache::new(&cfg.scan.cache_dir);

    if let Some(newest) = scanner::newest_modification(&candidates) {
        if cache.is_fresh(newest) {
            match load_from_cache(&cache) {
                Ok((report_records, detail_records)) => {
                    log.push(format!(
                        "📦 Cache hit: {} orders, {} line items loaded without parsing",
                        report_records.len(),
                        detail_records.len()
                    ));
                    let latest_dates = derive_latest_dates(&report_records, &detail_records);
                    let report = frames::report_frame(&report_records)?;
                    let details = frames::details_frame(&detail_records)?;
                    return Ok(LoadResult {
                        report,
                        details,
                        logs: log.into_lines(),
                        latest_dates,
                    });
                }
                Err(e) => {
                    log.warn(format!("⚠️ Cache read failed, rescanning: {:#}", e));
                }
            }
        }
    }

    let mut acc = ScanAccumulator::default();
    for candidate in &candidates {
        if let Err(e) = process_file(candidate, cfg, &mapper, &rules, &mut acc, &mut log) {
            log.warn(format!(
                "❌ Error reading {}: {:#}",
                candidate.path.display(),
                e
            ));
        }
    }

    let merged = merger::merge(
        acc.report_chunks,
        acc.detail_chunks,
        acc.invoice_chunks,
        &mut log,
    );
    log.push(format!(
        "🏁 Consolidated dataset: {} orders, {} line items",
        merged.report.len(),
        merged.details.len()
    ));

    let report = frames::report_frame(&merged.report)?;
    let details = frames::details_frame(&merged.details)?;

    let mut report_snapshot = frames::report_snapshot(&merged.report)?;
    let mut details_snapshot = frames::details_snapshot(&merged.details)?;
    match cache.store(&mut report_snapshot, &mut details_snapshot) {
        Ok(()) => log.push(format!("💾 Cache written to {}", cfg.scan.cache_dir)),
        Err(e) => log.warn(format!("⚠️ Cache write failed, continuing: {:#}", e)),
    }

    Ok(LoadResult {
        report,
        details,
        logs: log.into_lines(),
        latest_dates: acc.latest,
    })
}

/// Derives all business columns on copies of the canonical frames.
pub fn enrich(
    cfg: &PipelineConfig,
    report: &DataFrame,
    details: &DataFrame,
) -> Result<(DataFrame, DataFrame)> {
    let mut report_records = frames::report_records(report)?;
    let mut detail_records = frames::detail_records(details)?;
    enricher::enrich_records(&mut report_records, &mut detail_records, cfg)?;
    let enriched_report = frames::enriched_report_frame(&report_records)?;
    let enriched_details = frames::enriched_details_frame(&detail_records)?;
    Ok((enriched_report, enriched_details))
}

fn load_from_cache(cache: &FrameCache) -> Result<(Vec<ReportRecord>, Vec<DetailRecord>)> {
    let (report_df, details_df) = cache.load()?;
    let report = frames::report_records(&report_df)?;
    let details = frames::detail_records(&details_df)?;
    Ok((report, details))
}

/// Rebuilt on a cache hit from the persisted rows; the invoice slot cannot be
/// recovered because invoice rows are consumed during the merge.
fn derive_latest_dates(report: &[ReportRecord], details: &[DetailRecord]) -> LatestDates {
    let mut latest = LatestDates::default();
    for record in report {
        match record.data_source {
            DataSource::Json => LatestDates::bump(&mut latest.json, record.date),
            DataSource::Csv => LatestDates::bump(&mut latest.csv_report, record.date),
        }
    }
    for record in details {
        if record.data_source == DataSource::Csv {
            LatestDates::bump(&mut latest.csv_details, record.date);
        }
    }
    latest
}

fn process_file(
    candidate: &CandidateFile,
    cfg: &PipelineConfig,
    mapper: &ColumnMapper,
    rules: &ClassifierRules,
    acc: &mut ScanAccumulator,
    log: &mut DebugLog,
) -> Result<()> {
    let ext = candidate
        .path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if ext == "csv" {
        process_csv(&candidate.path, cfg, mapper, rules, acc, log)
    } else {
        process_json(&candidate.path, cfg, acc, log)
    }
}

fn process_csv(
    path: &Path,
    cfg: &PipelineConfig,
    mapper: &ColumnMapper,
    rules: &ClassifierRules,
    acc: &mut ScanAccumulator,
    log: &mut DebugLog,
) -> Result<()> {
    let name = display_name(path);
    let parsed = csv_file::read_csv_table(path, mapper)?;
    if parsed.messy_header {
        log.push(format!(
            "🔄 {}: metadata banner detected, header shifted one row",
            name
        ));
    }
    for note in &parsed.collisions {
        log.warn(format!("⚠️ {}: {}", name, note));
    }

    let total_rows = parsed.table.rows.len();
    let classification = rules.classify(&name, &parsed.table.headers);
    match classification.kind {
        RecordKind::Report => {
            let records = cleaner::clean_reports(&parsed.table, &cfg.cleaning);
            for record in &records {
                LatestDates::bump(&mut acc.latest.csv_report, record.date);
            }
            log.push(format!(
                "✅ {} [{}/{}]: {} rows kept of {}",
                name,
                classification.kind,
                classification.basis,
                records.len(),
                total_rows
            ));
            acc.report_chunks.push(records);
        }
        RecordKind::Details => {
            let records = cleaner::clean_details(&parsed.table, &cfg.cleaning);
            for record in &records {
                LatestDates::bump(&mut acc.latest.csv_details, record.date);
            }
            log.push(format!(
                "✅ {} [{}/{}]: {} rows kept of {}",
                name,
                classification.kind,
                classification.basis,
                records.len(),
                total_rows
            ));
            acc.detail_chunks.push(records);
        }
        RecordKind::Invoice => {
            let records = cleaner::clean_invoices(&parsed.table);
            for record in &records {
                LatestDates::bump(&mut acc.latest.invoice, record.date);
            }
            log.push(format!(
                "✅ {} [{}/{}]: {} rows kept of {}",
                name,
                classification.kind,
                classification.basis,
                records.len(),
                total_rows
            ));
            acc.invoice_chunks.push(records);
        }
        RecordKind::Unclassified => {
            let shown: Vec<&str> = parsed
                .table
                .headers
                .iter()
                .take(5)
                .map(|h| h.as_str())
                .collect();
            log.warn(format!(
                "⏭️ {} skipped: unrecognized columns {:?}",
                name, shown
            ));
        }
    }
    Ok(())
}

fn process_json(
    path: &Path,
    cfg: &PipelineConfig,
    acc: &mut ScanAccumulator,
    log: &mut DebugLog,
) -> Result<()> {
    let name = display_name(path);
    let orders = json_file::read_json_orders(path, cfg)?;
    for record in &orders.report {
        LatestDates::bump(&mut acc.latest.json, record.date);
    }
    log.push(format!(
        "✅ {} [json]: {} of {} orders completed, {} line items",
        name,
        orders.report.len(),
        orders.orders_seen,
        orders.details.len()
    ));
    acc.report_chunks.push(orders.report);
    acc.detail_chunks.push(orders.details);
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unnamed>")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    fn seed_data_dir(dir: &Path) {
        write_file(
            dir,
            "HistoryReport_feb.csv",
            "單號,日期,總計,狀態,會員電話,客戶姓名,電子發票號\n\
             12,2025-02-10 11:30:00,NT$120,Completed,0912345678,王小明,\n\
             13,2025-02-11 18:05:00,300,Completed,,,AB11223344\n\
             99,2025-02-11 19:00:00,50,已取消,,,\n",
        );
        write_file(
            dir,
            "TransactionDetail_feb.csv",
            "單號,日期,商品名稱,數量,單價,小計,Product SKU\n\
             12,2025-02-10 11:30:00,牛肉湯麵,1,120,120,A01\n\
             13,2025-02-11 18:05:00,乾拌麵,2,150,300,B02\n\
             99,2025-02-11 19:00:00,滷蛋,1,15,15,D05\n",
        );
        write_file(
            dir,
            "invoice_feb.csv",
            "發票號碼,載具號碼,統一編號\nAB11223344,/TESTME9,\n",
        );
        write_file(
            dir,
            "eats365_export.json",
            r#"{"orders": [
                {"order_id": 12, "status": "Completed", "time": "2025-02-10 11:30:00",
                 "total": 999,
                 "items": [{"name": "牛肉湯麵", "qty": 1, "unit_price": 120, "sku": "A01"}]}
            ]}"#,
        );
    }

    fn config_for(tmp: &TempDir) -> PipelineConfig {
        let data_dir = tmp.path().join("data");
        fs::create_dir_all(&data_dir).unwrap();
        let mut cfg = PipelineConfig::default();
        cfg.scan.data_dirs = vec![data_dir.display().to_string()];
        cfg.scan.cache_dir = tmp.path().join("cache").display().to_string();
        cfg
    }

    fn column(df: &DataFrame, name: &str) -> Vec<Option<String>> {
        df.column(name)
            .unwrap()
            .cast(&polars::prelude::DataType::String)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()
    }

    fn row_for<'a>(
        ids: &'a [Option<String>],
        values: &'a [Option<String>],
        id: &str,
    ) -> &'a Option<String> {
        let idx = ids
            .iter()
            .position(|v| v.as_deref() == Some(id))
            .expect("order id missing");
        &values[idx]
    }

    #[test]
    fn test_scan_merges_sources_with_json_precedence() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_for(&tmp);
        seed_data_dir(Path::new(&cfg.scan.data_dirs[0]));

        let result = scan_and_load(&cfg).unwrap();

        // 12 (json wins), 13 (csv only); 99 cancelled and gone.
        assert_eq!(result.report.height(), 2);
        let ids = column(&result.report, "order_id");
        let sources = column(&result.report, "data_source");
        let phones = column(&result.report, "member_phone");
        let carriers = column(&result.report, "carrier_id");

        let winner = "20250210-12-1130";
        let winner_idx = ids
            .iter()
            .position(|v| v.as_deref() == Some(winner))
            .unwrap();
        assert_eq!(row_for(&ids, &sources, winner).as_deref(), Some("json"));
        let totals = result.report.column("total_amount").unwrap().f64().unwrap();
        assert_eq!(totals.get(winner_idx), Some(999.0));
        // Member fields written only on the CSV side survive the JSON win.
        assert_eq!(
            row_for(&ids, &phones, winner).as_deref(),
            Some("0912345678")
        );
        // Invoice carrier joined onto the CSV-only order.
        assert_eq!(
            row_for(&ids, &carriers, "20250211-13-1805").as_deref(),
            Some("/TESTME9")
        );

        // Details: JSON displaced the CSV rows of order 12, order 99 is gone.
        assert_eq!(result.details.height(), 2);
        let detail_ids = column(&result.details, "order_id");
        let detail_sources = column(&result.details, "data_source");
        assert_eq!(
            row_for(&detail_ids, &detail_sources, winner).as_deref(),
            Some("json")
        );
        assert_eq!(
            row_for(&detail_ids, &detail_sources, "20250211-13-1805").as_deref(),
            Some("csv")
        );

        assert_eq!(
            result.latest_dates.json,
            NaiveDate::from_ymd_opt(2025, 2, 10)
        );
        assert_eq!(
            result.latest_dates.csv_report,
            NaiveDate::from_ymd_opt(2025, 2, 11)
        );
        assert!(result.latest_dates.invoice.is_none());
        assert!(result.logs.iter().any(|l| l.contains("Consolidated dataset")));
    }

    #[test]
    fn test_second_scan_hits_cache_with_identical_frames() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_for(&tmp);
        seed_data_dir(Path::new(&cfg.scan.data_dirs[0]));

        let cold = scan_and_load(&cfg).unwrap();
        assert!(cold.logs.iter().any(|l| l.contains("Cache written")));

        let warm = scan_and_load(&cfg).unwrap();
        assert!(warm.logs.iter().any(|l| l.contains("Cache hit")));
        assert!(warm.report.equals_missing(&cold.report));
        assert!(warm.details.equals_missing(&cold.details));
        assert_eq!(warm.latest_dates.json, cold.latest_dates.json);
        assert_eq!(warm.latest_dates.csv_report, cold.latest_dates.csv_report);
        assert_eq!(warm.latest_dates.csv_details, cold.latest_dates.csv_details);
    }

    #[test]
    fn test_corrupt_file_is_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_for(&tmp);
        let data_dir = Path::new(&cfg.scan.data_dirs[0]).to_path_buf();
        seed_data_dir(&data_dir);
        write_file(&data_dir, "broken.json", "{not json at all");

        let result = scan_and_load(&cfg).unwrap();
        assert_eq!(result.report.height(), 2);
        assert!(result
            .logs
            .iter()
            .any(|l| l.contains("❌ Error reading") && l.contains("broken.json")));
    }

    #[test]
    fn test_unclassified_file_logged_and_excluded() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_for(&tmp);
        let data_dir = Path::new(&cfg.scan.data_dirs[0]).to_path_buf();
        write_file(&data_dir, "mystery.csv", "memo,ref\nhello,1\n");

        let result = scan_and_load(&cfg).unwrap();
        assert_eq!(result.report.height(), 0);
        assert!(result
            .logs
            .iter()
            .any(|l| l.contains("mystery.csv") && l.contains("unrecognized columns")));
    }

    #[test]
    fn test_enrich_appends_derived_columns() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_for(&tmp);
        seed_data_dir(Path::new(&cfg.scan.data_dirs[0]));

        let loaded = scan_and_load(&cfg).unwrap();
        let (report, details) = enrich(&cfg, &loaded.report, &loaded.details).unwrap();

        for name in ["Date_Parsed", "Day_Type", "Period", "Order_Category", "Member_ID"] {
            assert!(report.column(name).is_ok(), "missing {}", name);
        }
        for name in ["Date_Parsed", "category", "Is_Modifier", "Is_Main_Dish"] {
            assert!(details.column(name).is_ok(), "missing {}", name);
        }

        let ids = column(&report, "order_id");
        let periods = column(&report, "Period");
        let members = column(&report, "Member_ID");
        assert_eq!(
            row_for(&ids, &periods, "20250210-12-1130").as_deref(),
            Some("Lunch")
        );
        assert_eq!(
            row_for(&ids, &members, "20250210-12-1130").as_deref(),
            Some("CRM_0912345678")
        );

        let categories = column(&details, "category");
        assert!(categories
            .iter()
            .any(|c| c.as_deref() == Some("Soup Noodle")));
    }
}
