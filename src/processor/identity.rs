use chrono::{NaiveDate, NaiveDateTime};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::config::IdentityConfig;
use crate::models::ReportRecord;

const MIN_SHARED_PHONE_LEN: usize = 6;
const MIN_VALID_PHONE_LEN: usize = 7;
const MIN_VALID_CARRIER_LEN: usize = 5;
const MASK_CHAR: char = '*';

/// Counters surfaced in the enrichment log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IdentityOutcome {
    pub shared_phones: usize,
    pub carriers_mapped: usize,
    pub backfilled_rows: usize,
    pub members_resolved: usize,
}

#[derive(Debug, Default)]
struct RfmStats {
    dates: HashSet<NaiveDate>,
    recency: Option<NaiveDateTime>,
    monetary: f64,
}

/// Collapses noisy phone/carrier/name data into one stable `Member_ID` per
/// row. Three confounders are handled: delivery-platform phones shared by
/// many customers, masked numbers, and anonymous tax-carrier transactions
/// that are attributed to whoever used the carrier most often, most recently,
/// for the most money.
pub fn resolve_member_identity(
    records: &mut [ReportRecord],
    cfg: &IdentityConfig,
) -> IdentityOutcome {
    let mut outcome = IdentityOutcome::default();

    for record in records.iter_mut() {
        record.member_phone = record
            .member_phone
            .as_deref()
            .map(clean_phone)
            .filter(|p| !p.is_empty());
        record.customer_name = record
            .customer_name
            .as_deref()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
    }

    let shared = detect_shared_phones(records, cfg.shared_phone_name_threshold);
    outcome.shared_phones = shared.len();
    let is_platform = |phone: &str| -> bool {
        shared.contains(phone)
            || cfg
                .platform_phones
                .iter()
                .any(|p| phone == p || phone.contains(p.as_str()))
    };

    let canonical = carrier_canonical_identities(records, &is_platform);
    outcome.carriers_mapped = canonical.len();

    for record in records.iter_mut() {
        let carrier_ok = record
            .carrier_id
            .as_deref()
            .map_or(false, |c| char_len(c.trim()) >= MIN_VALID_CARRIER_LEN);
        let phone_ok = record
            .member_phone
            .as_deref()
            .map_or(false, |p| is_valid_phone(p, &is_platform));
        if carrier_ok && !phone_ok {
            let carrier = record
                .carrier_id
                .as_deref()
                .map(|c| c.trim().to_string())
                .unwrap_or_default();
            if let Some((phone, name)) = canonical.get(&carrier) {
                record.member_phone = Some(phone.clone());
                record.customer_name = if name.is_empty() {
                    None
                } else {
                    Some(name.clone())
                };
                outcome.backfilled_rows += 1;
            }
        }
    }

    for record in records.iter_mut() {
        record.member_id = identity_token(record, &is_platform);
        if record.member_id.is_some() {
            outcome.members_resolved += 1;
        }
    }

    outcome
}

/// A phone seen with many distinct customer names belongs to a delivery
/// platform, not a member.
fn detect_shared_phones(records: &[ReportRecord], threshold: usize) -> HashSet<String> {
    let mut names_per_phone: HashMap<&str, HashSet<&str>> = HashMap::new();
    for record in records {
        let phone = match record.member_phone.as_deref() {
            Some(p) if char_len(p) >= MIN_SHARED_PHONE_LEN && !p.contains(MASK_CHAR) => p,
            _ => continue,
        };
        if let Some(name) = record.customer_name.as_deref() {
            names_per_phone.entry(phone).or_default().insert(name);
        }
    }
    names_per_phone
        .into_iter()
        .filter(|(_, names)| names.len() >= threshold)
        .map(|(phone, _)| phone.to_string())
        .collect()
}

/// Groups rows that carry both a usable phone and a carrier id by
/// `(carrier, phone, name)` and ranks the groups per carrier by frequency
/// (distinct transaction dates), then recency, then monetary total. The top
/// group is the canonical identity behind that carrier.
fn carrier_canonical_identities(
    records: &[ReportRecord],
    is_platform: &dyn Fn(&str) -> bool,
) -> HashMap<String, (String, String)> {
    let mut stats: HashMap<String, HashMap<(String, String), RfmStats>> = HashMap::new();

    for record in records {
        let phone = match record.member_phone.as_deref() {
            Some(p) if is_valid_phone(p, is_platform) => p,
            _ => continue,
        };
        let carrier = match record.carrier_id.as_deref().map(str::trim) {
            Some(c) if char_len(c) >= MIN_VALID_CARRIER_LEN => c,
            _ => continue,
        };
        let name = record.customer_name.as_deref().unwrap_or("");

        let group = stats
            .entry(carrier.to_string())
            .or_default()
            .entry((phone.to_string(), name.to_string()))
            .or_default();
        if let Some(dt) = record.date {
            group.dates.insert(dt.date());
            if group.recency.map_or(true, |current| dt > current) {
                group.recency = Some(dt);
            }
        }
        group.monetary += record.total_amount;
    }

    let mut canonical = HashMap::new();
    for (carrier, groups) in stats {
        let best = groups.into_iter().max_by(|a, b| rank_groups(a, b));
        if let Some(((phone, name), _)) = best {
            canonical.insert(carrier, (phone, name));
        }
    }
    canonical
}

/// Greater means better. Ties fall through to ascending phone then name so
/// the winner does not depend on hash iteration order.
fn rank_groups(
    a: &((String, String), RfmStats),
    b: &((String, String), RfmStats),
) -> Ordering {
    let (key_a, stats_a) = a;
    let (key_b, stats_b) = b;
    stats_a
        .dates
        .len()
        .cmp(&stats_b.dates.len())
        .then_with(|| stats_a.recency.cmp(&stats_b.recency))
        .then_with(|| {
            stats_a
                .monetary
                .partial_cmp(&stats_b.monetary)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| key_b.0.cmp(&key_a.0))
        .then_with(|| key_b.1.cmp(&key_a.1))
}

fn identity_token(
    record: &ReportRecord,
    is_platform: &dyn Fn(&str) -> bool,
) -> Option<String> {
    let phone = record
        .member_phone
        .as_deref()
        .filter(|p| !p.contains(MASK_CHAR))
        .unwrap_or("");
    let name = record.customer_name.as_deref().unwrap_or("");
    let carrier = record.carrier_id.as_deref().map(str::trim).unwrap_or("");
    let carrier_ok = char_len(carrier) >= MIN_VALID_CARRIER_LEN;

    if !phone.is_empty() && is_platform(phone) {
        if !name.is_empty() {
            return Some(format!("UE_{}", name));
        }
        if carrier_ok {
            return Some(format!("Carrier_{}", carrier));
        }
        return None;
    }
    if char_len(phone) >= MIN_VALID_PHONE_LEN {
        return Some(format!("CRM_{}", phone));
    }
    if carrier_ok {
        return Some(format!("Carrier_{}", carrier));
    }
    None
}

fn is_valid_phone(phone: &str, is_platform: &dyn Fn(&str) -> bool) -> bool {
    char_len(phone) >= MIN_VALID_PHONE_LEN && !phone.contains(MASK_CHAR) && !is_platform(phone)
}

fn clean_phone(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
