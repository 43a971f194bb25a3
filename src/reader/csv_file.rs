use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::config::ColumnMapper;
use crate::models::RawTable;

const MESSY_FIRST_CELL_LEN: usize = 20;

#[derive(Debug)]
pub struct CsvParse {
    pub table: RawTable,
    /// True when a metadata row was detected above the real header.
    pub messy_header: bool,
    /// Canonical-name collision notes from the column mapper.
    pub collisions: Vec<String>,
}

/// Reads one CSV export into a raw table with canonical headers. Encoding is
/// UTF-8 with BOM tolerance; undecodable bytes are replaced rather than
/// failing the file. Ragged rows are allowed, real CSV syntax errors abort
/// the file and bubble up to the scan log.
pub fn read_csv_table(path: &Path, mapper: &ColumnMapper) -> Result<CsvParse> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = String::from_utf8_lossy(strip_bom(&bytes));

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record =
            record.with_context(|| format!("Malformed CSV row in {}", path.display()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    let source = path.display().to_string();
    if rows.is_empty() {
        return Ok(CsvParse {
            table: RawTable {
                source,
                ..RawTable::default()
            },
            messy_header: false,
            collisions: Vec::new(),
        });
    }

    let messy_header = is_messy_header(&rows[0]);
    let (raw_headers, data_rows) = if messy_header {
        let headers = rows.get(1).cloned().unwrap_or_default();
        (headers, rows.into_iter().skip(2).collect())
    } else {
        let headers = rows[0].clone();
        (headers, rows.into_iter().skip(1).collect())
    };

    let mapped = mapper.map_headers(&raw_headers);
    Ok(CsvParse {
        table: RawTable {
            source,
            headers: mapped.headers,
            rows: data_rows,
        },
        messy_header,
        collisions: mapped.collisions,
    })
}

/// Some POS exports put a metadata banner above the real header: one long
/// cell with embedded digits, or a row that is mostly empty cells.
fn is_messy_header(cells: &[String]) -> bool {
    if let Some(first) = cells.first() {
        let first = first.trim();
        if first.chars().count() > MESSY_FIRST_CELL_LEN
            && first.chars().any(|c| c.is_ascii_digit())
        {
            return true;
        }
    }
    let unnamed = cells.iter().filter(|c| c.trim().is_empty()).count();
    unnamed * 2 > cells.len()
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes)
}
