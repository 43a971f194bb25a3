use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::env;

use super::categories::CategoryConfig;

/// Environment variable that appends an extra directory to the scan list.
pub const DATA_DIR_ENV: &str = "POS_PIPELINE_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub scan: ScanConfig,
    pub classifier: ClassifierConfig,
    pub cleaning: CleaningConfig,
    pub json: JsonConfig,
    pub identity: IdentityConfig,
    pub calendar: CalendarConfig,
    pub categories: CategoryConfig,
    /// Canonical field name -> raw column aliases, matched case-insensitively.
    pub columns: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Candidate data roots, walked recursively in order.
    pub data_dirs: Vec<String>,
    /// Directory holding the two Parquet snapshots.
    pub cache_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Filename tokens checked in this order: invoice, details, report.
    pub invoice_filename_tokens: Vec<String>,
    pub details_filename_tokens: Vec<String>,
    pub report_filename_tokens: Vec<String>,
    /// A `.txt` file is treated as a JSON API dump when its name contains one of these.
    pub json_txt_tokens: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Normalized statuses whose rows are dropped from report and details tables.
    pub invalid_statuses: Vec<String>,
    /// Numeric order ids at most this long are daily-reset numbers and get the
    /// date/time composite rewrite.
    pub short_order_id_max_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonConfig {
    /// Only API orders with this status are ingested.
    pub completed_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Known delivery-platform numbers; a cleaned phone matches by equality or substring.
    pub platform_phones: Vec<String>,
    /// A phone seen with at least this many distinct customer names is treated
    /// as a shared platform phone.
    pub shared_phone_name_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Non-weekend holidays as `%Y-%m-%d` strings, hand-maintained.
    pub holidays: Vec<String>,
}

impl PipelineConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config file: {}", path))?;
        let config: PipelineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline config file: {}", path))?;
        Ok(config)
    }

    /// Loads the config from `path` when given, falling back to the embedded
    /// defaults, then applies environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var(DATA_DIR_ENV) {
            let dir = dir.trim().to_string();
            if !dir.is_empty() && !self.scan.data_dirs.contains(&dir) {
                self.scan.data_dirs.push(dir);
            }
        }
    }

    pub fn holiday_set(&self) -> HashSet<&str> {
        self.calendar.holidays.iter().map(|s| s.as_str()).collect()
    }
}

impl CleaningConfig {
    /// Statuses are compared trimmed and lowercased.
    pub fn invalid_status_set(&self) -> HashSet<String> {
        self.invalid_statuses
            .iter()
            .map(|s| s.trim().to_lowercase())
            .collect()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            scan: ScanConfig::default(),
            classifier: ClassifierConfig::default(),
            cleaning: CleaningConfig::default(),
            json: JsonConfig::default(),
            identity: IdentityConfig::default(),
            calendar: CalendarConfig::default(),
            categories: CategoryConfig::default(),
            columns: default_column_aliases(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            data_dirs: vec![
                "/data/pos-exports".to_string(),
                "/data/uploads".to_string(),
                "data".to_string(),
            ],
            cache_dir: "cache".to_string(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            invoice_filename_tokens: vec!["發票".to_string(), "invoice".to_string()],
            details_filename_tokens: vec![
                "交易明細".to_string(),
                "transactiondetail".to_string(),
                "transaction_detail".to_string(),
            ],
            report_filename_tokens: vec![
                "營業日報".to_string(),
                "historyreport".to_string(),
                "history_report".to_string(),
                "日報表".to_string(),
            ],
            json_txt_tokens: vec!["eats365".to_string(), "api_export".to_string()],
        }
    }
}

impl Default for CleaningConfig {
    fn default() -> Self {
        CleaningConfig {
            invalid_statuses: vec![
                "cancelled".to_string(),
                "canceled".to_string(),
                "void".to_string(),
                "voided".to_string(),
                "closed".to_string(),
                "已取消".to_string(),
                "取消".to_string(),
                "作廢".to_string(),
                "已作廢".to_string(),
            ],
            short_order_id_max_len: 4,
        }
    }
}

impl Default for JsonConfig {
    fn default() -> Self {
        JsonConfig {
            completed_status: "Completed".to_string(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig {
            platform_phones: vec!["0277519126".to_string(), "0255941277".to_string()],
            shared_phone_name_threshold: 10,
        }
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        CalendarConfig {
            holidays: default_holidays(),
        }
    }
}

/// Alias dictionary covering the column names seen across the POS exports
/// (bilingual report, details and invoice files).
fn default_column_aliases() -> HashMap<String, Vec<String>> {
    let mut columns = HashMap::new();
    let mut add = |canonical: &str, aliases: &[&str]| {
        columns.insert(
            canonical.to_string(),
            aliases.iter().map(|a| a.to_string()).collect(),
        );
    };

    add(
        "order_id",
        &["單號", "訂單編號", "Order Number", "Order No", "No."],
    );
    add(
        "date",
        &[
            "日期",
            "Date",
            "Time",
            "時間",
            "交易時間",
            "付款時間",
            "發票日期",
        ],
    );
    add(
        "total_amount",
        &["總計", "Total", "Order Total", "金額", "Order Total(TWD)"],
    );
    add(
        "tax_id",
        &["統一編號", "Tax ID", "Buyer Tax ID", "買受人統編"],
    );
    add(
        "member_phone",
        &["會員電話", "Phone", "Customer Phone", "客戶電話", "Contact"],
    );
    add(
        "customer_name",
        &["客戶姓名", "Customer Name", "Name", "買受人名稱"],
    );
    add("people_count", &["人數", "People", "Guest", "Pax", "來客"]);
    add(
        "invoice_id",
        &["電子發票號", "發票號碼", "Invoice No", "Invoice Number"],
    );
    add(
        "carrier_id",
        &[
            "載具號碼",
            "Carrier Number",
            "Carrier No",
            "Mobile Carrier",
            "載具",
            "Carrier",
        ],
    );
    add(
        "status",
        &["狀態", "Status", "Order Status", "發票狀態", "Overall Status"],
    );
    add("order_type", &["單類型", "Order Type", "Type"]);
    add(
        "payment_method",
        &["付款方式", "Payment Method", "Payment Type", "支付方式"],
    );
    add("item_name", &["Item Name", "商品名稱", "Product Name"]);
    add("qty", &["Item Quantity", "數量", "Qty", "Quantity"]);
    add("unit_price", &["Unit Price", "單價", "Price"]);
    add(
        "item_total",
        &["Item Total", "小計", "Subtotal", "Item Amount(TWD)"],
    );
    add(
        "options",
        &[
            "Item Option",
            "選項",
            "Options",
            "Modifier Name",
            "Product Note",
        ],
    );
    add("sku", &["Product SKU", "SKU", "料號"]);
    add("item_type", &["Item Type", "商品型態", "ItemType"]);

    columns
}

/// Taiwan public holidays 2024-2026.
fn default_holidays() -> Vec<String> {
    [
        // 2024
        "2024-01-01", "2024-02-08", "2024-02-09", "2024-02-10", "2024-02-11", "2024-02-12",
        "2024-02-13", "2024-02-14", "2024-02-28", "2024-04-04", "2024-04-05", "2024-05-01",
        "2024-06-10", "2024-09-17", "2024-10-10", "2024-12-25",
        // 2025
        "2025-01-01", "2025-01-25", "2025-01-26", "2025-01-27", "2025-01-28", "2025-01-29",
        "2025-01-30", "2025-01-31", "2025-02-01", "2025-02-02", "2025-02-28", "2025-04-03",
        "2025-04-04", "2025-04-05", "2025-04-06", "2025-05-01", "2025-05-31", "2025-06-01",
        "2025-06-02", "2025-10-04", "2025-10-05", "2025-10-06", "2025-10-10", "2025-10-11",
        "2025-10-12", "2025-12-25",
        // 2026
        "2026-01-01", "2026-02-14", "2026-02-15", "2026-02-16", "2026-02-17", "2026-02-18",
        "2026-02-28", "2026-04-03", "2026-04-04", "2026-04-05", "2026-04-06", "2026-05-01",
        "2026-06-19", "2026-09-25", "2026-09-26", "2026-09-27", "2026-09-28", "2026-10-09",
        "2026-10-10", "2026-10-11", "2026-10-24", "2026-10-25", "2026-10-26", "2026-12-25",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_required_fields() {
        let config = PipelineConfig::default();
        for field in ["order_id", "total_amount", "item_name", "invoice_id"] {
            assert!(
                config.columns.contains_key(field),
                "missing alias list for {}",
                field
            );
        }
        assert_eq!(config.identity.shared_phone_name_threshold, 10);
        assert!(config.holiday_set().contains("2025-01-01"));
        assert!(config.cleaning.invalid_status_set().contains("void"));
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_src = r#"
            [scan]
            data_dirs = ["/tmp/exports"]

            [identity]
            shared_phone_name_threshold = 5
        "#;
        let config: PipelineConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.scan.data_dirs, vec!["/tmp/exports".to_string()]);
        assert_eq!(config.identity.shared_phone_name_threshold, 5);
        // Untouched sections keep their defaults.
        assert_eq!(config.json.completed_status, "Completed");
        assert!(!config.columns.is_empty());
    }

    #[test]
    fn test_invalid_statuses_normalized() {
        let mut config = PipelineConfig::default();
        config.cleaning.invalid_statuses.push(" VOIDED ".to_string());
        assert!(config.cleaning.invalid_status_set().contains("voided"));
    }
}
