use once_cell::sync::Lazy;
use regex::Regex;

use crate::sanitize::{sanitize, sanitize_token, SanitizeConfig};

/// Code-Aware Query Builder (spec.md C3). Stateless: `build`/`variants`
/// take the query by value each call, nothing is cached between calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuilderConfig;

fn is_fully_quoted_phrase(trimmed: &str) -> bool {
  trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed[1..trimmed.len() - 1].matches('"').count() == 0
}

fn is_operator_token(token: &str) -> bool {
  matches!(token.to_ascii_uppercase().as_str(), "AND" | "OR" | "NOT")
}

fn has_explicit_operators(query: &str) -> bool {
  let lower = query.to_ascii_lowercase();
  if lower.contains("near(") || query.contains('*') || query.contains('^') {
    return true;
  }
  query.split_whitespace().any(is_operator_token)
}

static CODE_PATTERN_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
  vec![
    Regex::new(r"^[_$]").unwrap(),
    Regex::new(r"[a-z]+_[a-z]+").unwrap(),
    Regex::new(r"[a-z]+[A-Z]").unwrap(),
    Regex::new(r"::\w+").unwrap(),
    Regex::new(r"->\w+").unwrap(),
    Regex::new(r"\w+\$").unwrap(),
    Regex::new(r"#\w+").unwrap(),
  ]
});

/// A token is a "code pattern" per spec.md §4.3 if it contains any of
/// `._$@->:#` or matches one of the structural regexes (snake_case,
/// camelCase, `Class::method`, `obj->method`, trailing `$`, `#selector`).
pub fn is_code_pattern(token: &str) -> bool {
  if token.chars().any(|c| "._$@->:#".contains(c)) {
    return true;
  }
  CODE_PATTERN_RES.iter().any(|re| re.is_match(token))
}

/// Build the primary FTS query (spec.md C3 `build`).
pub fn build(query: &str, _cfg: BuilderConfig) -> String {
  let trimmed = query.trim();
  if trimmed.is_empty() {
    return sanitize(trimmed, SanitizeConfig);
  }
  if is_fully_quoted_phrase(trimmed) {
    return trimmed.to_string();
  }
  if has_explicit_operators(trimmed) {
    return build_advanced(trimmed);
  }
  build_code_aware(trimmed)
}

/// "Advanced" mode: preserve operators/wildcards/NEAR verbatim, sanitize
/// every other token (spec.md §4.3).
fn build_advanced(query: &str) -> String {
  let mut out = Vec::new();
  for token in query.split_whitespace() {
    let lower = token.to_ascii_lowercase();
    if is_operator_token(token) {
      out.push(token.to_ascii_uppercase());
    } else if lower.starts_with("near(") || token.contains('*') || token.contains('^') {
      out.push(token.to_string());
    } else if let Some(sanitized) = sanitize_token(token) {
      out.push(sanitized);
    }
  }
  if out.is_empty() {
    return crate::sanitize::EMPTY_MATCH_SENTINEL.to_string();
  }
  out.join(" ")
}

/// Plain code-aware mode: code-pattern tokens are quoted to survive the
/// tokenizer; everything else is emitted bare with implicit AND between
/// terms (spec.md §4.3).
fn build_code_aware(query: &str) -> String {
  let mut out = Vec::new();
  for token in query.split_whitespace() {
    if is_code_pattern(token) {
      out.push(format!("\"{}\"", token.replace('"', "\"\"")));
    } else if let Some(sanitized) = sanitize_token(token) {
      out.push(sanitized);
    }
  }
  if out.is_empty() {
    return crate::sanitize::EMPTY_MATCH_SENTINEL.to_string();
  }
  out.join(" ")
}

/// Common English stop words dropped by the keyword-extraction fallback
/// (spec.md §4.3 variant 5), unless the token itself carries a tokenizer
/// special character (in which case it's kept regardless — it's probably
/// a code identifier, not prose).
const STOP_WORDS: &[&str] = &[
  "a", "an", "the", "of", "to", "in", "on", "for", "is", "are", "was", "were", "be", "been", "being", "and", "or", "not", "this", "that",
  "these", "those", "it", "its", "with", "as", "at", "by", "from", "into", "about",
];

fn plain_terms(query: &str) -> Vec<String> {
  query
    .split_whitespace()
    .filter(|t| !is_operator_token(t))
    .map(|t| t.trim_matches('"').to_string())
    .filter(|t| !t.is_empty())
    .collect()
}

/// Ordered, deduplicated fallback variants, most to least specific (spec.md
/// §4.3 "Fallback variants").
pub fn variants(query: &str, cfg: BuilderConfig) -> Vec<String> {
  let trimmed = query.trim();
  let primary = build(trimmed, cfg);
  let sanitized_whole = sanitize(trimmed, SanitizeConfig);
  let terms = plain_terms(trimmed);

  let mut out = vec![primary];

  out.push(format!("\"{}\"", sanitized_whole.replace('"', "")));

  if !terms.is_empty() {
    let prefix_match = terms.iter().map(|t| format!("{t}*")).collect::<Vec<_>>().join(" ");
    out.push(prefix_match);

    let or_of_terms = terms.iter().map(|t| format!("\"{t}\"")).collect::<Vec<_>>().join(" OR ");
    out.push(or_of_terms);

    let keywords: Vec<&String> = terms
      .iter()
      .filter(|t| !STOP_WORDS.contains(&t.to_ascii_lowercase().as_str()) || t.chars().any(|c| "._$@->:#".contains(c)))
      .collect();
    if !keywords.is_empty() {
      let keyword_or = keywords.iter().map(|t| format!("\"{t}\"")).collect::<Vec<_>>().join(" OR ");
      out.push(keyword_or);
    }
  }

  let mut seen = std::collections::HashSet::new();
  out.retain(|v| seen.insert(v.clone()));
  out
}
