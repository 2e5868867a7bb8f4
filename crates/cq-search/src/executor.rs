use std::cmp::Ordering;
use std::collections::HashSet;

use cq_core::{DeduplicationStrategy, SearchHit, SearchMode};
use cq_db::Backend;
use tracing::{debug, warn};

use crate::builder::{self, BuilderConfig};
use crate::complexity::{self, ComplexityConfig};
use crate::sanitize::{self, SanitizeConfig};

/// Default floor below which the progressive-fallback stage kicks in
/// (spec.md §4.5 step 5, "if `|results| < min_results_threshold`"). Not a
/// named `SearchConfig` field in spec.md's table, so it is exposed as a
/// plain constant rather than invented as a public knob.
pub const DEFAULT_MIN_RESULTS_THRESHOLD: u32 = 5;

/// Per-call configuration for the full query pipeline (spec.md §4.5
/// "Configuration (SearchConfig)"). Every field is passed by value on each
/// call — no instance mutation, matching spec.md §5/§9's stateless
/// requirement for C1/C2/C3/C5.
#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
  pub enable_fallback: bool,
  pub enable_code_aware: bool,
  pub enable_snippet_generation: bool,
  pub enable_relevance_scoring: bool,
  pub enable_query_sanitization: bool,
  pub enable_progressive_search: bool,
  pub enable_complexity_analysis: bool,
  pub query_timeout_ms: u64,
  pub max_results: u32,
  pub snippet_context_chars: u32,
  pub min_relevance_score: f64,
  pub deduplicate_results: DeduplicationStrategy,
  pub search_mode: SearchMode,
  pub min_results_threshold: u32,
  pub sanitize: SanitizeConfig,
  pub builder: BuilderConfig,
  pub complexity: ComplexityConfig,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      enable_fallback: true,
      enable_code_aware: true,
      enable_snippet_generation: true,
      enable_relevance_scoring: true,
      enable_query_sanitization: true,
      enable_progressive_search: true,
      enable_complexity_analysis: true,
      query_timeout_ms: 5_000,
      max_results: 50,
      snippet_context_chars: 64,
      min_relevance_score: 0.0,
      deduplicate_results: DeduplicationStrategy::ByFilepath,
      search_mode: SearchMode::Unified,
      min_results_threshold: DEFAULT_MIN_RESULTS_THRESHOLD,
      sanitize: SanitizeConfig,
      builder: BuilderConfig,
      complexity: ComplexityConfig::default(),
    }
  }
}

/// Non-fatal diagnostics surfaced alongside a result set (spec.md §7
/// "Results include a `warnings[]` channel").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
  pub hits: Vec<SearchHit>,
  pub warnings: Vec<String>,
}

fn dedup_hits(hits: Vec<SearchHit>, strategy: DeduplicationStrategy) -> Vec<SearchHit> {
  match strategy {
    DeduplicationStrategy::None => hits,
    DeduplicationStrategy::ByFilepath => {
      let mut best: Vec<SearchHit> = Vec::new();
      let mut index_by_path: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
      for hit in hits {
        if let Some(&idx) = index_by_path.get(&hit.filepath) {
          if hit.score > best[idx].score {
            best[idx] = hit;
          }
        } else {
          index_by_path.insert(hit.filepath.clone(), best.len());
          best.push(hit);
        }
      }
      best
    }
  }
}

fn run_mode(backend: &Backend, dataset: &str, query: &str, mode: SearchMode, limit: u32, timeout_ms: u64) -> cq_db::DbResult<Vec<SearchHit>> {
  match mode {
    SearchMode::MetadataOnly => backend.search_metadata(query, dataset, limit, timeout_ms),
    SearchMode::ContentOnly => backend.search_content(query, dataset, limit, true, timeout_ms),
    SearchMode::Unified => backend.search_unified(query, query, dataset, limit, timeout_ms),
  }
}

/// Run the full query pipeline exactly as spec.md §4.5 lays it out:
/// sanitize → complexity-gate (fail-safe) → code-aware build → execute
/// primary → (if short and enabled) execute ONE combined OR-of-remaining-
/// variants fallback → relevance filter → dedup → stable sort → truncate.
///
/// Infallible by design (spec.md §4.2/§4.5/§7, P4): a `TOO_COMPLEX` verdict
/// or a backend failure never propagates to the caller as an error, it
/// downgrades to an empty/partial result plus a warning.
pub fn execute(backend: &Backend, dataset: &str, raw_query: &str, cfg: SearchConfig) -> SearchOutcome {
  let mut warnings = Vec::new();

  let sanitized = if cfg.enable_query_sanitization {
    sanitize::sanitize(raw_query, cfg.sanitize)
  } else {
    raw_query.to_string()
  };

  if cfg.enable_complexity_analysis {
    let report = complexity::analyze(&sanitized, cfg.complexity);
    if report.level == cq_core::ComplexityLevel::TooComplex {
      let message = format!("query too complex: {}", report.suggestions.join("; "));
      warn!(cost = report.cost, "{message}");
      warnings.push(message);
      return SearchOutcome { hits: Vec::new(), warnings };
    }
  }

  let primary = if cfg.enable_code_aware {
    builder::build(&sanitized, cfg.builder)
  } else {
    sanitized.clone()
  };

  let mut hits = match run_mode(backend, dataset, &primary, cfg.search_mode, cfg.max_results, cfg.query_timeout_ms) {
    Ok(hits) => hits,
    Err(e) => {
      let message = format!("primary query failed, treating as empty: {e}");
      warn!("{message}");
      warnings.push(message);
      Vec::new()
    }
  };

  if cfg.enable_progressive_search && cfg.enable_fallback && (hits.len() as u32) < cfg.min_results_threshold {
    let variants = builder::variants(&sanitized, cfg.builder);
    let remainder: Vec<&String> = variants.iter().skip(1).collect();
    if !remainder.is_empty() {
      let combined = remainder.iter().map(|v| format!("({v})")).collect::<Vec<_>>().join(" OR ");
      match run_mode(backend, dataset, &combined, cfg.search_mode, cfg.max_results, cfg.query_timeout_ms) {
        Ok(fallback_hits) => {
          if !fallback_hits.is_empty() {
            debug!(combined = combined.as_str(), count = fallback_hits.len(), "fallback variant produced hits");
            warnings.push("fallback query used".to_string());
          }
          hits.extend(fallback_hits);
        }
        Err(e) => {
          let message = format!("fallback query failed, treating as empty: {e}");
          warn!("{message}");
          warnings.push(message);
        }
      }
    }
  }

  if cfg.enable_relevance_scoring {
    hits.retain(|h| h.score >= cfg.min_relevance_score);
  }

  hits = dedup_hits(hits, cfg.deduplicate_results);
  hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
  hits.truncate(cfg.max_results as usize);

  if !cfg.enable_snippet_generation {
    for hit in &mut hits {
      hit.snippet = None;
    }
  }

  SearchOutcome { hits, warnings }
}
