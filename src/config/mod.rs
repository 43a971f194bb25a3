pub mod categories;
pub mod column_map;
pub mod pipeline_config;

pub use categories::{CategoryConfig, NameRule, SkuCategoryMap};
pub use column_map::{ColumnMapper, MappedHeaders};
pub use pipeline_config::{
    CalendarConfig, ClassifierConfig, CleaningConfig, IdentityConfig, JsonConfig, PipelineConfig,
    ScanConfig, DATA_DIR_ENV,
};
