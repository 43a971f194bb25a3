use anyhow::{Context, Result};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const REPORT_FILE: &str = "report.parquet";
const DETAILS_FILE: &str = "details.parquet";

/// Parquet snapshots of the two canonical frames, keyed by file mtime: the
/// cache is usable only while no raw file is newer than both snapshots.
#[derive(Debug, Clone)]
pub struct FrameCache {
    dir: PathBuf,
}

impl FrameCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FrameCache { dir: dir.into() }
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join(REPORT_FILE)
    }

    pub fn details_path(&self) -> PathBuf {
        self.dir.join(DETAILS_FILE)
    }

    pub fn is_fresh(&self, newest_raw: SystemTime) -> bool {
        match (
            file_mtime(&self.report_path()),
            file_mtime(&self.details_path()),
        ) {
            (Some(report), Some(details)) => report >= newest_raw && details >= newest_raw,
            _ => false,
        }
    }

    pub fn load(&self) -> Result<(DataFrame, DataFrame)> {
        let report = read_parquet(&self.report_path())?;
        let details = read_parquet(&self.details_path())?;
        Ok((report, details))
    }

    pub fn store(&self, report: &mut DataFrame, details: &mut DataFrame) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache dir {}", self.dir.display()))?;
        write_parquet(&self.report_path(), report)?;
        write_parquet(&self.details_path(), details)?;
        Ok(())
    }
}

fn read_parquet(path: &Path) -> Result<DataFrame> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    ParquetReader::new(file)
        .finish()
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn write_parquet(path: &Path, df: &mut DataFrame) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    ParquetWriter::new(file)
        .finish(df)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).ok()?.modified().ok()
}
