pub mod classify;
pub mod discovery;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use classify::{classify, known_extensions, UNKNOWN_LANGUAGE};
pub use discovery::{discover, DiscoveredFile, DiscoveryConfig};
pub use error::{IndexError, IndexResult};
pub use pipeline::{CancellationToken, Pipeline, PipelineConfig, Progress, ProgressSnapshot};
pub use registry::{Analyzer, AnalyzerError, AnalyzerRegistry, FallbackAnalyzer};
