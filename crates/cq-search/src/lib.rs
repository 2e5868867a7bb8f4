pub mod builder;
pub mod complexity;
pub mod error;
pub mod executor;
pub mod sanitize;

pub use builder::{build, is_code_pattern, variants, BuilderConfig};
pub use complexity::{analyze, ComplexityConfig, ComplexityReport};
pub use error::{SearchError, SearchResult};
pub use executor::{execute, SearchConfig, SearchOutcome, DEFAULT_MIN_RESULTS_THRESHOLD};
pub use sanitize::{sanitize, SanitizeConfig, EMPTY_MATCH_SENTINEL};

/// Re-exported from `cq_db` so callers only need to depend on this crate
/// for the whole query pipeline, including its scoring constants (spec.md
/// §9 open question #2).
pub use cq_db::METADATA_SCORE_WEIGHT;
