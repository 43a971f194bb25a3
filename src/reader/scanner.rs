use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::models::DebugLog;

/// One file eligible for classification, with its mtime for cache freshness.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
}

/// Walks every configured data directory recursively and returns the
/// candidate files in a deterministic order. Directories that cannot be read
/// are logged and skipped, never fatal. A path reachable through two
/// configured roots is returned once.
pub fn collect_candidates(
    scan: &ScanConfig,
    json_txt_tokens: &[String],
    log: &mut DebugLog,
) -> Vec<CandidateFile> {
    let txt_tokens: Vec<String> = json_txt_tokens
        .iter()
        .map(|t| t.trim().to_lowercase())
        .collect();

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut candidates = Vec::new();
    let mut scanned_dirs = 0usize;

    for dir in &scan.data_dirs {
        let root = match fs::canonicalize(dir) {
            Ok(root) => root,
            Err(e) => {
                log.warn(format!("⚠️ Skipping directory {}: {}", dir, e));
                continue;
            }
        };
        scanned_dirs += 1;

        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log.warn(format!("⚠️ Scan error under {}: {}", dir, e));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            if !is_candidate(&path, &txt_tokens) {
                continue;
            }
            if !seen.insert(path.clone()) {
                continue;
            }
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok();
            candidates.push(CandidateFile { path, modified });
        }
    }

    log.push(format!(
        "📂 Scan found {} candidate files across {} directories",
        candidates.len(),
        scanned_dirs
    ));
    candidates
}

pub fn newest_modification(candidates: &[CandidateFile]) -> Option<SystemTime> {
    candidates.iter().filter_map(|c| c.modified).max()
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// CSV and JSON always qualify; a `.txt` only when its name marks it as an
/// API dump.
fn is_candidate(path: &Path, txt_tokens: &[String]) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_lowercase(),
        None => return false,
    };
    match ext.as_str() {
        "csv" | "json" => true,
        "txt" => {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_lowercase)
                .unwrap_or_default();
            txt_tokens.iter().any(|t| name.contains(t.as_str()))
        }
        _ => false,
    }
}
