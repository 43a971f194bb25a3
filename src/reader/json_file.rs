use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::config::PipelineConfig;
use crate::models::{DataSource, DetailRecord, ReportRecord};
use crate::processor::cleaner;

const ORDER_LIST_KEYS: [&str; 2] = ["orders", "data"];
const ORDER_ID_KEYS: [&str; 5] = ["order_id", "order_number", "receipt_number", "number", "id"];
const STATUS_KEYS: [&str; 3] = ["status", "order_status", "overall_status"];
const DATE_KEYS: [&str; 6] = [
    "time",
    "date",
    "order_time",
    "open_time",
    "payment_time",
    "created_at",
];
const TOTAL_KEYS: [&str; 4] = ["total", "total_amount", "order_total", "amount"];
const ITEM_LIST_KEYS: [&str; 3] = ["items", "order_items", "line_items"];
const SUB_ITEM_KEYS: [&str; 3] = ["sub_items", "combo_items", "children"];

#[derive(Debug, Default)]
pub struct JsonOrders {
    pub report: Vec<ReportRecord>,
    pub details: Vec<DetailRecord>,
    pub orders_seen: usize,
    pub orders_skipped: usize,
}

/// Reads one API dump into report and detail records. Only orders carrying
/// the configured completed status are ingested.
pub fn read_json_orders(path: &Path, cfg: &PipelineConfig) -> Result<JsonOrders> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(text.trim_start_matches('\u{feff}'))
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    parse_orders(&value, cfg)
}

pub fn parse_orders(value: &Value, cfg: &PipelineConfig) -> Result<JsonOrders> {
    let orders = match order_list(value) {
        Some(orders) => orders,
        None => bail!("No order list found in JSON payload"),
    };

    let mut out = JsonOrders::default();
    for order in orders {
        out.orders_seen += 1;
        match ingest_order(order, cfg, &mut out) {
            Some(()) => {}
            None => out.orders_skipped += 1,
        }
    }
    Ok(out)
}

fn ingest_order(order: &Value, cfg: &PipelineConfig, out: &mut JsonOrders) -> Option<()> {
    let status_raw = get_string(order, &STATUS_KEYS)?;
    if !status_raw
        .trim()
        .eq_ignore_ascii_case(cfg.json.completed_status.trim())
    {
        return None;
    }
    let raw_id = get_string(order, &ORDER_ID_KEYS)?;

    let date = get_string(order, &DATE_KEYS).and_then(|s| cleaner::parse_datetime(&s));
    let order_id =
        cleaner::normalize_order_id(&raw_id, date, cfg.cleaning.short_order_id_max_len);
    let status = Some(cleaner::normalize_status(&status_raw));

    out.report.push(ReportRecord {
        order_id: order_id.clone(),
        date,
        total_amount: get_number(order, &TOTAL_KEYS).unwrap_or(0.0),
        status: status.clone(),
        order_type: get_string(order, &["order_type", "type", "channel"]),
        payment_method: get_string(order, &["payment_method", "payment_type", "payment"]),
        people_count: get_number(order, &["people_count", "guests", "pax", "people"]),
        member_phone: get_string(order, &["member_phone", "phone", "customer_phone"])
            .or_else(|| nested_string(order, "customer", &["phone", "mobile"])),
        customer_name: get_string(order, &["customer_name", "member_name"])
            .or_else(|| nested_string(order, "customer", &["name"])),
        carrier_id: get_string(order, &["carrier_id", "carrier_number", "carrier"]),
        invoice_id: get_string(order, &["invoice_id", "invoice_number", "invoice_no"]),
        tax_id: get_string(order, &["tax_id", "buyer_tax_id"]),
        data_source: DataSource::Json,
        ..ReportRecord::default()
    });

    if let Some(items) = list_under(order, &ITEM_LIST_KEYS) {
        for item in items {
            flatten_item(item, &order_id, date, &status, out);
        }
    }
    Some(())
}

/// One nesting level of combo sub-items is flattened, with quantities
/// multiplied through the parent. The wrapper row itself is also kept so the
/// combo surcharge stays visible in revenue sums.
fn flatten_item(
    item: &Value,
    order_id: &str,
    date: Option<NaiveDateTime>,
    status: &Option<String>,
    out: &mut JsonOrders,
) {
    let parent_qty = match push_item(item, 1.0, order_id, date, status, out) {
        Some(qty) => qty,
        None => return,
    };
    if let Some(sub_items) = list_under(item, &SUB_ITEM_KEYS) {
        for sub in sub_items {
            push_item(sub, parent_qty, order_id, date, status, out);
        }
    }
}

fn push_item(
    item: &Value,
    qty_multiplier: f64,
    order_id: &str,
    date: Option<NaiveDateTime>,
    status: &Option<String>,
    out: &mut JsonOrders,
) -> Option<f64> {
    let item_name = get_string(item, &["name", "item_name", "product_name"])?;
    let qty = get_number(item, &["qty", "quantity", "count"]).unwrap_or(1.0) * qty_multiplier;
    let unit_price = get_number(item, &["unit_price", "price"]).unwrap_or(0.0);
    let item_total =
        get_number(item, &["total", "item_total", "subtotal", "amount"]).unwrap_or(qty * unit_price);

    out.details.push(DetailRecord {
        order_id: order_id.to_string(),
        date,
        item_name,
        sku: get_string(item, &["sku", "product_sku"]),
        qty,
        unit_price,
        item_total,
        options: options_text(item),
        item_type: get_string(item, &["item_type", "type"]),
        status: status.clone(),
        data_source: DataSource::Json,
        ..DetailRecord::default()
    });
    Some(qty)
}

fn order_list(value: &Value) -> Option<&Vec<Value>> {
    if let Some(list) = value.as_array() {
        return Some(list);
    }
    list_under(value, &ORDER_LIST_KEYS)
}

fn list_under<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    keys.iter().find_map(|k| value.get(k)?.as_array())
}

fn get_string(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match value.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn get_number(value: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        match value.get(key) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(Value::String(s)) => {
                if let Some(parsed) = cleaner::parse_number(s) {
                    return Some(parsed);
                }
            }
            _ => {}
        }
    }
    None
}

fn nested_string(value: &Value, under: &str, keys: &[&str]) -> Option<String> {
    get_string(value.get(under)?, keys)
}

/// Modifier text arrives as a string or a list of strings.
fn options_text(item: &Value) -> Option<String> {
    for key in ["options", "option", "modifiers", "note"] {
        match item.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Some(Value::Array(parts)) => {
                let joined: Vec<&str> = parts
                    .iter()
                    .filter_map(|p| p.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                if !joined.is_empty() {
                    return Some(joined.join(", "));
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn test_only_completed_orders_are_ingested() {
        let payload = json!({
            "orders": [
                {"order_id": "A1001", "status": "Completed", "total": 120},
                {"order_id": "A1002", "status": "Cancelled", "total": 50},
                {"order_id": "A1003", "status": "completed", "total": 80},
                {"status": "Completed", "total": 30}
            ]
        });
        let parsed = parse_orders(&payload, &config()).unwrap();
        assert_eq!(parsed.orders_seen, 4);
        assert_eq!(parsed.orders_skipped, 2);
        assert_eq!(parsed.report.len(), 2);
        assert_eq!(parsed.report[0].order_id, "A1001");
        assert_eq!(parsed.report[0].status.as_deref(), Some("completed"));
        assert_eq!(parsed.report[0].data_source, DataSource::Json);
    }

    #[test]
    fn test_short_numeric_ids_get_composite_rewrite() {
        let payload = json!([{
            "order_id": 12,
            "status": "Completed",
            "time": "2025-02-10 11:30:00",
            "total": "NT$1,250",
            "items": [
                {"name": "招牌湯麵", "qty": 2, "unit_price": 120}
            ]
        }]);
        let parsed = parse_orders(&payload, &config()).unwrap();
        assert_eq!(parsed.report[0].order_id, "20250210-12-1130");
        assert_eq!(parsed.report[0].total_amount, 1250.0);
        // Items share the rewritten id so the join survives.
        assert_eq!(parsed.details[0].order_id, "20250210-12-1130");
        assert_eq!(parsed.details[0].item_total, 240.0);
    }

    #[test]
    fn test_combo_sub_items_multiply_quantities() {
        let payload = json!({
            "data": [{
                "order_number": "X900",
                "status": "Completed",
                "items": [{
                    "name": "雙人套餐",
                    "qty": 2,
                    "price": 400,
                    "item_type": "Combo",
                    "sub_items": [
                        {"name": "招牌湯麵", "qty": 1, "sku": "A01"},
                        {"name": "滷蛋", "qty": 2, "sku": "D05"}
                    ]
                }]
            }]
        });
        let parsed = parse_orders(&payload, &config()).unwrap();
        let items: Vec<(&str, f64)> = parsed
            .details
            .iter()
            .map(|d| (d.item_name.as_str(), d.qty))
            .collect();
        assert_eq!(
            items,
            vec![("雙人套餐", 2.0), ("招牌湯麵", 2.0), ("滷蛋", 4.0)]
        );
        assert_eq!(parsed.details[1].sku.as_deref(), Some("A01"));
    }

    #[test]
    fn test_customer_fields_and_option_list() {
        let payload = json!({
            "orders": [{
                "order_id": "A77",
                "status": "Completed",
                "customer": {"name": "王小明", "phone": "0912 345 678"},
                "items": [
                    {"name": "乾拌麵", "options": ["小辣", "加蔥"]}
                ]
            }]
        });
        let parsed = parse_orders(&payload, &config()).unwrap();
        assert_eq!(parsed.report[0].customer_name.as_deref(), Some("王小明"));
        assert_eq!(parsed.report[0].member_phone.as_deref(), Some("0912 345 678"));
        assert_eq!(parsed.details[0].options.as_deref(), Some("小辣, 加蔥"));
        assert_eq!(parsed.details[0].qty, 1.0);
    }

    #[test]
    fn test_payload_without_order_list_fails() {
        let payload = json!({"meta": {"count": 0}});
        assert!(parse_orders(&payload, &config()).is_err());
    }
}
