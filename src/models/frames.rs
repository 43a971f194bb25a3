use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use polars::prelude::*;

use super::records::{DataSource, DetailRecord, ReportRecord};
use crate::processor::cleaner;

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Builds the canonical order-level frame: typed date/amount columns, one row
/// per merged report record.
pub fn report_frame(records: &[ReportRecord]) -> Result<DataFrame> {
    let mut columns: Vec<Column> = Vec::new();
    columns.push(str_series("order_id", records.iter().map(|r| Some(r.order_id.clone()))).into());
    columns.push(datetime_series("date", records.iter().map(|r| r.date)).into());
    columns.push(
        Series::new(
            "total_amount".into(),
            records.iter().map(|r| r.total_amount).collect::<Vec<f64>>(),
        )
        .into(),
    );
    columns.push(str_series("status", records.iter().map(|r| r.status.clone())).into());
    columns.push(str_series("order_type", records.iter().map(|r| r.order_type.clone())).into());
    columns.push(
        str_series(
            "payment_method",
            records.iter().map(|r| r.payment_method.clone()),
        )
        .into(),
    );
    columns.push(
        Series::new(
            "people_count".into(),
            records
                .iter()
                .map(|r| r.people_count)
                .collect::<Vec<Option<f64>>>(),
        )
        .into(),
    );
    columns.push(
        str_series(
            "member_phone",
            records.iter().map(|r| r.member_phone.clone()),
        )
        .into(),
    );
    columns.push(
        str_series(
            "customer_name",
            records.iter().map(|r| r.customer_name.clone()),
        )
        .into(),
    );
    columns.push(str_series("carrier_id", records.iter().map(|r| r.carrier_id.clone())).into());
    columns.push(str_series("invoice_id", records.iter().map(|r| r.invoice_id.clone())).into());
    columns.push(str_series("tax_id", records.iter().map(|r| r.tax_id.clone())).into());
    columns.push(
        str_series(
            "data_source",
            records
                .iter()
                .map(|r| Some(r.data_source.as_str().to_string())),
        )
        .into(),
    );

    DataFrame::new(columns).context("Failed to build report frame")
}

/// Builds the canonical line-item frame.
pub fn details_frame(records: &[DetailRecord]) -> Result<DataFrame> {
    let mut columns: Vec<Column> = Vec::new();
    columns.push(str_series("order_id", records.iter().map(|r| Some(r.order_id.clone()))).into());
    columns.push(datetime_series("date", records.iter().map(|r| r.date)).into());
    columns.push(str_series("item_name", records.iter().map(|r| Some(r.item_name.clone()))).into());
    columns.push(str_series("sku", records.iter().map(|r| r.sku.clone())).into());
    columns.push(
        Series::new(
            "qty".into(),
            records.iter().map(|r| r.qty).collect::<Vec<f64>>(),
        )
        .into(),
    );
    columns.push(
        Series::new(
            "unit_price".into(),
            records.iter().map(|r| r.unit_price).collect::<Vec<f64>>(),
        )
        .into(),
    );
    columns.push(
        Series::new(
            "item_total".into(),
            records.iter().map(|r| r.item_total).collect::<Vec<f64>>(),
        )
        .into(),
    );
    columns.push(str_series("options", records.iter().map(|r| r.options.clone())).into());
    columns.push(str_series("item_type", records.iter().map(|r| r.item_type.clone())).into());
    columns.push(str_series("status", records.iter().map(|r| r.status.clone())).into());
    columns.push(
        str_series(
            "data_source",
            records
                .iter()
                .map(|r| Some(r.data_source.as_str().to_string())),
        )
        .into(),
    );

    DataFrame::new(columns).context("Failed to build details frame")
}

/// Report frame plus the derived business columns.
pub fn enriched_report_frame(records: &[ReportRecord]) -> Result<DataFrame> {
    let mut df = report_frame(records)?;
    df.with_column(datetime_series(
        "Date_Parsed",
        records.iter().map(|r| r.date),
    ))?;
    df.with_column(str_series(
        "Day_Type",
        records.iter().map(|r| r.day_type.clone()),
    ))?;
    df.with_column(str_series(
        "Period",
        records.iter().map(|r| r.period.clone()),
    ))?;
    df.with_column(str_series(
        "Order_Category",
        records.iter().map(|r| r.order_category.clone()),
    ))?;
    df.with_column(str_series(
        "Member_ID",
        records.iter().map(|r| r.member_id.clone()),
    ))?;
    Ok(df)
}

/// Details frame plus the derived item columns.
pub fn enriched_details_frame(records: &[DetailRecord]) -> Result<DataFrame> {
    let mut df = details_frame(records)?;
    df.with_column(datetime_series(
        "Date_Parsed",
        records.iter().map(|r| r.date),
    ))?;
    df.with_column(str_series(
        "category",
        records.iter().map(|r| r.category.clone()),
    ))?;
    df.with_column(Series::new(
        "Is_Modifier".into(),
        records.iter().map(|r| r.is_modifier).collect::<Vec<bool>>(),
    ))?;
    df.with_column(Series::new(
        "Is_Main_Dish".into(),
        records
            .iter()
            .map(|r| r.is_main_dish)
            .collect::<Vec<bool>>(),
    ))?;
    Ok(df)
}

/// All-string copy of the report columns for Parquet persistence.
pub fn report_snapshot(records: &[ReportRecord]) -> Result<DataFrame> {
    let columns: Vec<Column> = vec![
        str_series("order_id", records.iter().map(|r| Some(r.order_id.clone()))).into(),
        str_series("date", records.iter().map(|r| r.date.map(format_date))).into(),
        str_series(
            "total_amount",
            records.iter().map(|r| Some(r.total_amount.to_string())),
        )
        .into(),
        str_series("status", records.iter().map(|r| r.status.clone())).into(),
        str_series("order_type", records.iter().map(|r| r.order_type.clone())).into(),
        str_series(
            "payment_method",
            records.iter().map(|r| r.payment_method.clone()),
        )
        .into(),
        str_series(
            "people_count",
            records.iter().map(|r| r.people_count.map(|v| v.to_string())),
        )
        .into(),
        str_series(
            "member_phone",
            records.iter().map(|r| r.member_phone.clone()),
        )
        .into(),
        str_series(
            "customer_name",
            records.iter().map(|r| r.customer_name.clone()),
        )
        .into(),
        str_series("carrier_id", records.iter().map(|r| r.carrier_id.clone())).into(),
        str_series("invoice_id", records.iter().map(|r| r.invoice_id.clone())).into(),
        str_series("tax_id", records.iter().map(|r| r.tax_id.clone())).into(),
        str_series(
            "data_source",
            records
                .iter()
                .map(|r| Some(r.data_source.as_str().to_string())),
        )
        .into(),
    ];
    DataFrame::new(columns).context("Failed to build report snapshot")
}

/// All-string copy of the details columns for Parquet persistence.
pub fn details_snapshot(records: &[DetailRecord]) -> Result<DataFrame> {
    let columns: Vec<Column> = vec![
        str_series("order_id", records.iter().map(|r| Some(r.order_id.clone()))).into(),
        str_series("date", records.iter().map(|r| r.date.map(format_date))).into(),
        str_series("item_name", records.iter().map(|r| Some(r.item_name.clone()))).into(),
        str_series("sku", records.iter().map(|r| r.sku.clone())).into(),
        str_series("qty", records.iter().map(|r| Some(r.qty.to_string()))).into(),
        str_series(
            "unit_price",
            records.iter().map(|r| Some(r.unit_price.to_string())),
        )
        .into(),
        str_series(
            "item_total",
            records.iter().map(|r| Some(r.item_total.to_string())),
        )
        .into(),
        str_series("options", records.iter().map(|r| r.options.clone())).into(),
        str_series("item_type", records.iter().map(|r| r.item_type.clone())).into(),
        str_series("status", records.iter().map(|r| r.status.clone())).into(),
        str_series(
            "data_source",
            records
                .iter()
                .map(|r| Some(r.data_source.as_str().to_string())),
        )
        .into(),
    ];
    DataFrame::new(columns).context("Failed to build details snapshot")
}

/// Reads report records back out of a frame. Accepts both the typed in-memory
/// layout and the all-string snapshot layout, so cached frames parse with the
/// same code path.
pub fn report_records(df: &DataFrame) -> Result<Vec<ReportRecord>> {
    let order_ids = str_values(df, "order_id")?;
    let dates = datetime_values(df, "date")?;
    let totals = f64_values(df, "total_amount")?;
    let statuses = str_values(df, "status")?;
    let order_types = str_values(df, "order_type")?;
    let payment_methods = str_values(df, "payment_method")?;
    let people_counts = f64_values(df, "people_count")?;
    let phones = str_values(df, "member_phone")?;
    let names = str_values(df, "customer_name")?;
    let carriers = str_values(df, "carrier_id")?;
    let invoices = str_values(df, "invoice_id")?;
    let tax_ids = str_values(df, "tax_id")?;
    let sources = str_values(df, "data_source")?;

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        records.push(ReportRecord {
            order_id: order_ids[i].clone().unwrap_or_default(),
            date: dates[i],
            total_amount: totals[i].unwrap_or(0.0),
            status: statuses[i].clone(),
            order_type: order_types[i].clone(),
            payment_method: payment_methods[i].clone(),
            people_count: people_counts[i],
            member_phone: phones[i].clone(),
            customer_name: names[i].clone(),
            carrier_id: carriers[i].clone(),
            invoice_id: invoices[i].clone(),
            tax_id: tax_ids[i].clone(),
            data_source: sources[i]
                .as_deref()
                .map(DataSource::parse)
                .unwrap_or_default(),
            ..ReportRecord::default()
        });
    }
    Ok(records)
}

/// Reads detail records back out of a frame, typed or snapshot layout.
pub fn detail_records(df: &DataFrame) -> Result<Vec<DetailRecord>> {
    let order_ids = str_values(df, "order_id")?;
    let dates = datetime_values(df, "date")?;
    let item_names = str_values(df, "item_name")?;
    let skus = str_values(df, "sku")?;
    let qtys = f64_values(df, "qty")?;
    let unit_prices = f64_values(df, "unit_price")?;
    let item_totals = f64_values(df, "item_total")?;
    let options = str_values(df, "options")?;
    let item_types = str_values(df, "item_type")?;
    let statuses = str_values(df, "status")?;
    let sources = str_values(df, "data_source")?;

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        records.push(DetailRecord {
            order_id: order_ids[i].clone().unwrap_or_default(),
            date: dates[i],
            item_name: item_names[i].clone().unwrap_or_default(),
            sku: skus[i].clone(),
            qty: qtys[i].unwrap_or(0.0),
            unit_price: unit_prices[i].unwrap_or(0.0),
            item_total: item_totals[i].unwrap_or(0.0),
            options: options[i].clone(),
            item_type: item_types[i].clone(),
            status: statuses[i].clone(),
            data_source: sources[i]
                .as_deref()
                .map(DataSource::parse)
                .unwrap_or_default(),
            ..DetailRecord::default()
        });
    }
    Ok(records)
}

fn format_date(dt: NaiveDateTime) -> String {
    dt.format(DATE_FORMAT).to_string()
}

fn str_series(name: &str, values: impl Iterator<Item = Option<String>>) -> Series {
    Series::new(name.into(), values.collect::<Vec<Option<String>>>())
}

fn datetime_series(name: &str, values: impl Iterator<Item = Option<NaiveDateTime>>) -> Series {
    Series::new(
        name.into(),
        values.collect::<Vec<Option<NaiveDateTime>>>(),
    )
}

fn str_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let col = match df.column(name) {
        Ok(col) => col,
        Err(_) => return Ok(vec![None; df.height()]),
    };
    let casted = col
        .cast(&DataType::String)
        .with_context(|| format!("Column '{}' is not castable to string", name))?;
    let values = casted
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect();
    Ok(values)
}

fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let col = match df.column(name) {
        Ok(col) => col,
        Err(_) => return Ok(vec![None; df.height()]),
    };
    match col.dtype() {
        DataType::String => {
            let values = col
                .str()?
                .into_iter()
                .map(|v| v.and_then(cleaner::parse_number))
                .collect();
            Ok(values)
        }
        DataType::Null => Ok(vec![None; df.height()]),
        _ => {
            let casted = col
                .cast(&DataType::Float64)
                .with_context(|| format!("Column '{}' is not castable to f64", name))?;
            Ok(casted.f64()?.into_iter().collect())
        }
    }
}

fn datetime_values(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDateTime>>> {
    let col = match df.column(name) {
        Ok(col) => col,
        Err(_) => return Ok(vec![None; df.height()]),
    };
    match col.dtype() {
        DataType::Datetime(_, _) => {
            let values = col
                .as_materialized_series()
                .datetime()?
                .as_datetime_iter()
                .collect();
            Ok(values)
        }
        DataType::String => {
            let values = col
                .str()?
                .into_iter()
                .map(|v| v.and_then(cleaner::parse_datetime))
                .collect();
            Ok(values)
        }
        DataType::Null => Ok(vec![None; df.height()]),
        other => anyhow::bail!("Column '{}' has unexpected dtype {} for a date", name, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_report() -> Vec<ReportRecord> {
        vec![
            ReportRecord {
                order_id: "20250210-12-1130".to_string(),
                date: NaiveDate::from_ymd_opt(2025, 2, 10)
                    .unwrap()
                    .and_hms_opt(11, 30, 0),
                total_amount: 420.0,
                status: Some("completed".to_string()),
                member_phone: Some("0912345678".to_string()),
                customer_name: Some("王小明".to_string()),
                data_source: DataSource::Json,
                ..ReportRecord::default()
            },
            ReportRecord {
                order_id: "A-778899".to_string(),
                total_amount: 90.5,
                people_count: Some(2.0),
                data_source: DataSource::Csv,
                ..ReportRecord::default()
            },
        ]
    }

    #[test]
    fn test_report_frame_round_trip() {
        let records = sample_report();
        let df = report_frame(&records).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 13);

        let parsed = report_records(&df).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn test_snapshot_round_trip_matches_typed_frame() {
        let records = sample_report();
        let snapshot = report_snapshot(&records).unwrap();
        for dtype in snapshot.dtypes() {
            assert_eq!(dtype, DataType::String);
        }

        let parsed = report_records(&snapshot).unwrap();
        let rebuilt = report_frame(&parsed).unwrap();
        let direct = report_frame(&records).unwrap();
        assert!(rebuilt.equals_missing(&direct));
    }

    #[test]
    fn test_details_round_trip() {
        let records = vec![DetailRecord {
            order_id: "20250210-12-1130".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 2, 10)
                .unwrap()
                .and_hms_opt(11, 30, 0),
            item_name: "招牌湯麵".to_string(),
            sku: Some("A01".to_string()),
            qty: 2.0,
            unit_price: 120.0,
            item_total: 240.0,
            data_source: DataSource::Json,
            ..DetailRecord::default()
        }];
        let df = details_frame(&records).unwrap();
        let parsed = detail_records(&df).unwrap();
        assert_eq!(parsed, records);

        let snapshot = details_snapshot(&records).unwrap();
        let from_snapshot = detail_records(&snapshot).unwrap();
        assert_eq!(from_snapshot, records);
    }

    #[test]
    fn test_empty_frames_have_schema() {
        let df = report_frame(&[]).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 13);
        assert!(report_records(&df).unwrap().is_empty());

        let df = details_frame(&[]).unwrap();
        assert_eq!(df.width(), 11);
    }

    #[test]
    fn test_enriched_frames_add_columns() {
        let mut records = sample_report();
        records[0].day_type = Some("Weekday".to_string());
        records[0].period = Some("Lunch".to_string());
        records[0].order_category = Some("Dine-in".to_string());
        records[0].member_id = Some("CRM_0912345678".to_string());

        let df = enriched_report_frame(&records).unwrap();
        assert_eq!(df.width(), 18);
        let day_types = str_values(&df, "Day_Type").unwrap();
        assert_eq!(day_types[0].as_deref(), Some("Weekday"));
        assert_eq!(day_types[1], None);
    }
}
