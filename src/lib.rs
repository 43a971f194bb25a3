pub mod config;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod reader;
pub mod storage;

pub use config::PipelineConfig;
pub use models::{DataSource, LatestDates};
pub use pipeline::{enrich, scan_and_load, LoadResult};
