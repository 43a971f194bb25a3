use anyhow::Result;
use chrono::{Datelike, NaiveDateTime, Timelike};
use std::collections::HashSet;
use tracing::info;

use crate::config::{CategoryConfig, PipelineConfig, SkuCategoryMap};
use crate::models::{DataSource, DetailRecord, ReportRecord};
use crate::processor::identity;

const DINNER_CUTOVER_HOUR: u32 = 16;

/// Fills every derived column on both record sets, in place. Identity
/// resolution runs here because it needs the whole merged dataset for its
/// phone-sharing statistics, never a per-view slice.
pub fn enrich_records(
    report: &mut [ReportRecord],
    details: &mut [DetailRecord],
    cfg: &PipelineConfig,
) -> Result<()> {
    let holidays = cfg.holiday_set();
    for record in report.iter_mut() {
        record.day_type = Some(day_type(record.date, &holidays));
        record.period = Some(period(record.date));
        record.order_category = Some(order_category(
            record.order_type.as_deref(),
            record.payment_method.as_deref(),
            &cfg.categories,
        ));
    }
    info!("🗓️ Day type and period derived for {} orders", report.len());

    let outcome = identity::resolve_member_identity(report, &cfg.identity);
    info!(
        "👤 Member identity: {} shared phones, {} carriers mapped, {} rows backfilled, {} members resolved",
        outcome.shared_phones,
        outcome.carriers_mapped,
        outcome.backfilled_rows,
        outcome.members_resolved
    );

    let sku_map = SkuCategoryMap::for_version(&cfg.categories.sku_table_version)?;
    for record in details.iter_mut() {
        record.category = Some(item_category(
            record.sku.as_deref(),
            &record.item_name,
            &sku_map,
            &cfg.categories,
        ));
        record.is_modifier =
            record.data_source == DataSource::Csv && record.options.is_some();
        record.is_main_dish = is_main_dish(record, &cfg.categories);
    }
    info!("🍱 Item categories assigned for {} line items", details.len());

    Ok(())
}

fn day_type(date: Option<NaiveDateTime>, holidays: &HashSet<&str>) -> String {
    let dt = match date {
        Some(dt) => dt,
        None => return "Unknown".to_string(),
    };
    let weekend = dt.weekday().number_from_monday() >= 6;
    let listed = holidays.contains(dt.format("%Y-%m-%d").to_string().as_str());
    if weekend || listed {
        "Holiday".to_string()
    } else {
        "Weekday".to_string()
    }
}

/// Exact-midnight timestamps come from date-only cells and carry no real
/// time, so they stay Unknown instead of counting as lunch.
fn period(date: Option<NaiveDateTime>) -> String {
    let dt = match date {
        Some(dt) => dt,
        None => return "Unknown".to_string(),
    };
    if dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 {
        return "Unknown".to_string();
    }
    if dt.hour() < DINNER_CUTOVER_HOUR {
        "Lunch".to_string()
    } else {
        "Dinner".to_string()
    }
}

fn order_category(
    order_type: Option<&str>,
    payment_method: Option<&str>,
    cfg: &CategoryConfig,
) -> String {
    for text in [order_type, payment_method].into_iter().flatten() {
        if let Some(category) = match_order_category(text, cfg) {
            return category.to_string();
        }
    }
    "Dine-in".to_string()
}

fn match_order_category(text: &str, cfg: &CategoryConfig) -> Option<&'static str> {
    let text = text.to_lowercase();
    let hit = |keywords: &[String]| keywords.iter().any(|k| text.contains(&k.to_lowercase()));
    if hit(&cfg.delivery_keywords) {
        return Some("Delivery");
    }
    if hit(&cfg.takeout_keywords) {
        return Some("Takeout");
    }
    if hit(&cfg.dine_in_keywords) {
        return Some("Dine-in");
    }
    None
}

fn item_category(
    sku: Option<&str>,
    item_name: &str,
    sku_map: &SkuCategoryMap,
    cfg: &CategoryConfig,
) -> String {
    if let Some(sku) = sku.map(str::trim).filter(|s| !s.is_empty()) {
        return sku_map.lookup(sku).unwrap_or("Other").to_string();
    }
    let name = item_name.to_lowercase();
    for rule in &cfg.name_rules {
        if rule.keywords.iter().any(|k| name.contains(&k.to_lowercase())) {
            return rule.category.clone();
        }
    }
    "Other".to_string()
}

/// Main dishes proxy visitor counts: combo wrappers are excluded so a set
/// meal and its inner noodle bowl do not count twice.
fn is_main_dish(record: &DetailRecord, cfg: &CategoryConfig) -> bool {
    if record.is_modifier || is_combo_wrapper(record.item_type.as_deref(), cfg) {
        return false;
    }
    match record.sku.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(sku) => {
            let sku_upper = sku.to_uppercase();
            cfg.main_dish_prefixes
                .iter()
                .any(|p| sku_upper.starts_with(&p.to_uppercase()))
        }
        None => {
            let name = record.item_name.to_lowercase();
            cfg.main_dish_keywords
                .iter()
                .any(|k| name.contains(&k.to_lowercase()))
        }
    }
}

fn is_combo_wrapper(item_type: Option<&str>, cfg: &CategoryConfig) -> bool {
    let normalized = match item_type.map(str::trim) {
        Some(t) if !t.is_empty() => t.to_lowercase(),
        _ => return false,
    };
    cfg.combo_wrapper_types
        .iter()
        .any(|t| normalized == t.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0)
    }

    fn categories() -> CategoryConfig {
        CategoryConfig::default()
    }

    #[test]
    fn test_day_type_weekend_and_holiday_set() {
        let holidays: HashSet<&str> = ["2025-01-01"].into_iter().collect();
        // Wednesday but in the holiday set.
        assert_eq!(day_type(at(2025, 1, 1, 12, 0), &holidays), "Holiday");
        // Saturday.
        assert_eq!(day_type(at(2025, 2, 15, 12, 0), &holidays), "Holiday");
        // Plain Wednesday.
        assert_eq!(day_type(at(2025, 2, 12, 12, 0), &holidays), "Weekday");
        assert_eq!(day_type(None, &holidays), "Unknown");
    }

    #[test]
    fn test_period_split_at_sixteen() {
        assert_eq!(period(at(2025, 2, 12, 11, 30)), "Lunch");
        assert_eq!(period(at(2025, 2, 12, 15, 59)), "Lunch");
        assert_eq!(period(at(2025, 2, 12, 16, 0)), "Dinner");
        assert_eq!(period(at(2025, 2, 12, 21, 15)), "Dinner");
        assert_eq!(period(at(2025, 2, 12, 0, 0)), "Unknown");
        assert_eq!(period(None), "Unknown");
    }

    #[test]
    fn test_order_category_keywords() {
        let cfg = categories();
        assert_eq!(order_category(Some("外送"), None, &cfg), "Delivery");
        assert_eq!(order_category(None, Some("UberEats"), &cfg), "Delivery");
        assert_eq!(order_category(Some("外帶"), None, &cfg), "Takeout");
        assert_eq!(order_category(Some("內用"), None, &cfg), "Dine-in");
        // order_type wins over payment_method.
        assert_eq!(order_category(Some("外帶"), Some("foodpanda"), &cfg), "Takeout");
        assert_eq!(order_category(None, None, &cfg), "Dine-in");
    }

    #[test]
    fn test_item_category_sku_first_then_name() {
        let cfg = categories();
        let map = SkuCategoryMap::for_version("v1").unwrap();
        assert_eq!(item_category(Some("A01"), "牛肉湯麵", &map, &cfg), "Soup Noodle");
        assert_eq!(item_category(Some("Z99"), "牛肉湯麵", &map, &cfg), "Other");
        assert_eq!(item_category(None, "牛肉湯麵", &map, &cfg), "Soup Noodle");
        assert_eq!(item_category(None, "滷味拼盤", &map, &cfg), "Other");
    }

    #[test]
    fn test_main_dish_rules() {
        let cfg = categories();
        let dish = |sku: Option<&str>, name: &str, item_type: Option<&str>, modifier: bool| {
            let record = DetailRecord {
                order_id: "X".to_string(),
                item_name: name.to_string(),
                sku: sku.map(str::to_string),
                item_type: item_type.map(str::to_string),
                is_modifier: modifier,
                ..DetailRecord::default()
            };
            is_main_dish(&record, &cfg)
        };

        assert!(dish(Some("A01"), "招牌湯麵", None, false));
        assert!(dish(Some("b07"), "乾拌麵", None, false));
        assert!(!dish(Some("F01"), "紅茶", None, false));
        // Name fallback when the SKU is missing.
        assert!(dish(None, "牛肉麵", None, false));
        assert!(!dish(None, "滷蛋", None, false));
        // Modifiers and combo wrappers never count.
        assert!(!dish(Some("A01"), "招牌湯麵", None, true));
        assert!(!dish(Some("A01"), "雙人套餐", Some("套餐"), false));
        assert!(!dish(Some("A01"), "combo meal", Some("Combo"), false));
    }

    #[test]
    fn test_main_dish_qty_never_exceeds_non_modifier_qty() {
        let cfg = PipelineConfig::default();
        let mut report = vec![ReportRecord {
            order_id: "X1".to_string(),
            ..ReportRecord::default()
        }];
        let item = |name: &str, sku: Option<&str>, qty: f64, options: Option<&str>| DetailRecord {
            order_id: "X1".to_string(),
            item_name: name.to_string(),
            sku: sku.map(str::to_string),
            qty,
            options: options.map(str::to_string),
            data_source: DataSource::Csv,
            ..DetailRecord::default()
        };
        let mut details = vec![
            item("招牌湯麵", Some("A01"), 2.0, None),
            item("滷蛋", Some("D05"), 3.0, None),
            item("加辣", None, 1.0, Some("小辣")),
            item("乾拌麵", Some("B02"), 1.0, None),
        ];

        enrich_records(&mut report, &mut details, &cfg).unwrap();

        let main_dish_qty: f64 = details.iter().filter(|d| d.is_main_dish).map(|d| d.qty).sum();
        let non_modifier_qty: f64 = details.iter().filter(|d| !d.is_modifier).map(|d| d.qty).sum();
        assert_eq!(main_dish_qty, 3.0);
        assert_eq!(non_modifier_qty, 6.0);
        assert!(main_dish_qty <= non_modifier_qty);
        // Every main dish is itself a non-modifier row.
        assert!(details.iter().all(|d| !(d.is_main_dish && d.is_modifier)));
    }

    #[test]
    fn test_enrich_records_fills_all_derived_fields() {
        let cfg = PipelineConfig::default();
        let mut report = vec![ReportRecord {
            order_id: "20250210-12-1130".to_string(),
            date: at(2025, 2, 10, 11, 30),
            total_amount: 240.0,
            order_type: Some("內用".to_string()),
            member_phone: Some("0912 345 678".to_string()),
            ..ReportRecord::default()
        }];
        let mut details = vec![
            DetailRecord {
                order_id: "20250210-12-1130".to_string(),
                item_name: "招牌湯麵".to_string(),
                sku: Some("A01".to_string()),
                qty: 1.0,
                data_source: DataSource::Csv,
                ..DetailRecord::default()
            },
            DetailRecord {
                order_id: "20250210-12-1130".to_string(),
                item_name: "加辣".to_string(),
                options: Some("小辣".to_string()),
                data_source: DataSource::Csv,
                ..DetailRecord::default()
            },
            DetailRecord {
                order_id: "20250210-12-1130".to_string(),
                item_name: "加麵".to_string(),
                options: Some("多一份".to_string()),
                data_source: DataSource::Json,
                ..DetailRecord::default()
            },
        ];

        enrich_records(&mut report, &mut details, &cfg).unwrap();

        assert_eq!(report[0].day_type.as_deref(), Some("Weekday"));
        assert_eq!(report[0].period.as_deref(), Some("Lunch"));
        assert_eq!(report[0].order_category.as_deref(), Some("Dine-in"));
        assert_eq!(report[0].member_id.as_deref(), Some("CRM_0912345678"));

        assert_eq!(details[0].category.as_deref(), Some("Soup Noodle"));
        assert!(details[0].is_main_dish);
        assert!(details[1].is_modifier);
        assert!(!details[1].is_main_dish);
        // JSON rows are never modifiers even with option text.
        assert!(!details[2].is_modifier);
    }
}
