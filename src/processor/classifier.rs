use crate::config::ClassifierConfig;
use crate::models::{MatchBasis, RecordKind};

/// A file's decided kind and which rule decided it, kept for the scan log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: RecordKind,
    pub basis: MatchBasis,
}

/// Lowercased token lists, checked in a fixed order: invoice, details, report.
#[derive(Debug, Clone)]
pub struct ClassifierRules {
    invoice_tokens: Vec<String>,
    details_tokens: Vec<String>,
    report_tokens: Vec<String>,
}

impl ClassifierRules {
    pub fn from_config(cfg: &ClassifierConfig) -> Self {
        let lower = |tokens: &[String]| -> Vec<String> {
            tokens.iter().map(|t| t.trim().to_lowercase()).collect()
        };
        ClassifierRules {
            invoice_tokens: lower(&cfg.invoice_filename_tokens),
            details_tokens: lower(&cfg.details_filename_tokens),
            report_tokens: lower(&cfg.report_filename_tokens),
        }
    }

    /// Filename hints win over column shape; a file with both an invoice id
    /// and an order id column is a report, not an invoice.
    pub fn classify(&self, file_name: &str, headers: &[String]) -> Classification {
        let name = file_name.to_lowercase();
        let hit = |tokens: &[String]| tokens.iter().any(|t| name.contains(t.as_str()));

        if hit(&self.invoice_tokens) {
            return Classification {
                kind: RecordKind::Invoice,
                basis: MatchBasis::Filename,
            };
        }
        if hit(&self.details_tokens) {
            return Classification {
                kind: RecordKind::Details,
                basis: MatchBasis::Filename,
            };
        }
        if hit(&self.report_tokens) {
            return Classification {
                kind: RecordKind::Report,
                basis: MatchBasis::Filename,
            };
        }

        let has = |column: &str| headers.iter().any(|h| h == column);
        let kind = if has("item_name") {
            RecordKind::Details
        } else if has("order_id") && has("total_amount") {
            RecordKind::Report
        } else if has("invoice_id") && !has("order_id") {
            RecordKind::Invoice
        } else {
            RecordKind::Unclassified
        };
        Classification {
            kind,
            basis: MatchBasis::Columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;

    fn rules() -> ClassifierRules {
        ClassifierRules::from_config(&ClassifierConfig::default())
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_filename_tokens_win() {
        let rules = rules();
        // Header says report, filename says invoice.
        let c = rules.classify(
            "2025-02_發票明細.csv",
            &headers(&["order_id", "total_amount"]),
        );
        assert_eq!(c.kind, RecordKind::Invoice);
        assert_eq!(c.basis, MatchBasis::Filename);

        let c = rules.classify("TransactionDetail_20250210.csv", &headers(&[]));
        assert_eq!(c.kind, RecordKind::Details);

        let c = rules.classify("HistoryReport-Feb.csv", &headers(&[]));
        assert_eq!(c.kind, RecordKind::Report);
    }

    #[test]
    fn test_column_fallback_order() {
        let rules = rules();

        let c = rules.classify("export.csv", &headers(&["order_id", "item_name"]));
        assert_eq!(c.kind, RecordKind::Details);
        assert_eq!(c.basis, MatchBasis::Columns);

        let c = rules.classify("export.csv", &headers(&["order_id", "total_amount"]));
        assert_eq!(c.kind, RecordKind::Report);

        let c = rules.classify("export.csv", &headers(&["invoice_id", "carrier_id"]));
        assert_eq!(c.kind, RecordKind::Invoice);

        // invoice_id together with order_id is a report shape.
        let c = rules.classify(
            "export.csv",
            &headers(&["invoice_id", "order_id", "total_amount"]),
        );
        assert_eq!(c.kind, RecordKind::Report);

        let c = rules.classify("export.csv", &headers(&["memo", "ref"]));
        assert_eq!(c.kind, RecordKind::Unclassified);
    }
}
