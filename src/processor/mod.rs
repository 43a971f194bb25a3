pub mod classifier;
pub mod cleaner;
pub mod enricher;
pub mod identity;
pub mod merger;

pub use classifier::{Classification, ClassifierRules};
pub use enricher::enrich_records;
pub use identity::{resolve_member_identity, IdentityOutcome};
pub use merger::{merge, MergeOutput};
