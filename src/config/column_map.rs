use anyhow::{bail, Result};
use std::collections::HashMap;

/// Case-insensitive alias -> canonical field lookup, validated once at
/// construction so a bad alias table fails the run instead of silently
/// renaming columns.
#[derive(Debug, Clone)]
pub struct ColumnMapper {
    alias_to_canonical: HashMap<String, String>,
}

/// Result of renaming one file's header row.
#[derive(Debug, Clone)]
pub struct MappedHeaders {
    pub headers: Vec<String>,
    /// Log lines for canonical names claimed by more than one raw column.
    pub collisions: Vec<String>,
}

impl ColumnMapper {
    pub fn from_table(table: &HashMap<String, Vec<String>>) -> Result<Self> {
        let mut alias_to_canonical: HashMap<String, String> = HashMap::new();

        for (canonical, aliases) in table {
            let canonical = canonical.trim().to_lowercase();
            if canonical.is_empty() {
                bail!("Column alias table contains an empty canonical field name");
            }
            for alias in aliases {
                let key = normalize(alias);
                if key.is_empty() {
                    bail!("Canonical field '{}' has an empty alias", canonical);
                }
                if let Some(existing) = alias_to_canonical.get(&key) {
                    if existing != &canonical {
                        bail!(
                            "Column alias '{}' maps to both '{}' and '{}'",
                            alias,
                            existing,
                            canonical
                        );
                    }
                }
                alias_to_canonical.insert(key, canonical.clone());
            }
            // A canonical name is also its own alias, so already-clean
            // exports map onto themselves.
            if let Some(existing) = alias_to_canonical.get(&canonical) {
                if existing != &canonical {
                    bail!(
                        "Canonical field '{}' is claimed as an alias of '{}'",
                        canonical,
                        existing
                    );
                }
            } else {
                alias_to_canonical.insert(canonical.clone(), canonical);
            }
        }

        Ok(ColumnMapper { alias_to_canonical })
    }

    pub fn canonical_for(&self, raw_header: &str) -> Option<&str> {
        self.alias_to_canonical
            .get(&normalize(raw_header))
            .map(|s| s.as_str())
    }

    /// Renames a header row to canonical names. When two raw columns claim the
    /// same canonical name the first occurrence wins and the duplicate keeps
    /// its raw name, which the downstream cleaners ignore.
    pub fn map_headers(&self, raw_headers: &[String]) -> MappedHeaders {
        let mut headers = Vec::with_capacity(raw_headers.len());
        let mut taken: HashMap<String, String> = HashMap::new();
        let mut collisions = Vec::new();

        for raw in raw_headers {
            let trimmed = raw.trim();
            match self.canonical_for(trimmed) {
                Some(canonical) => {
                    if let Some(first) = taken.get(canonical) {
                        collisions.push(format!(
                            "Column '{}' also maps to '{}' (already claimed by '{}'), keeping first",
                            trimmed, canonical, first
                        ));
                        headers.push(trimmed.to_string());
                    } else {
                        taken.insert(canonical.to_string(), trimmed.to_string());
                        headers.push(canonical.to_string());
                    }
                }
                None => headers.push(trimmed.to_string()),
            }
        }

        MappedHeaders {
            headers,
            collisions,
        }
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}
