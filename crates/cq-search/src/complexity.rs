use cq_core::ComplexityLevel;

/// Query Complexity Analyzer (spec.md C2). Thresholds travel per call, not
/// as instance state (spec.md §5/§9).
#[derive(Debug, Clone, Copy)]
pub struct ComplexityConfig {
  pub max_wildcards: u32,
  pub max_terms: u32,
  pub max_near: u32,
  pub max_nesting_depth: u32,
  pub max_cost: f64,
  /// Weight of each whitespace term in the cost formula.
  pub weight_terms: f64,
  /// Weight of each unescaped wildcard.
  pub weight_wildcards: f64,
  /// Weight of each `NEAR(` clause.
  pub weight_near: f64,
  /// Base of the exponential nesting-depth term (`base^depth`) — chosen to
  /// be deliberately punishing so `((((…))))`-style attacks blow the
  /// budget long before term/wildcard counts would (spec.md §4.2).
  pub nesting_base: f64,
}

impl Default for ComplexityConfig {
  fn default() -> Self {
    Self {
      max_wildcards: 3,
      max_terms: 20,
      max_near: 3,
      max_nesting_depth: 5,
      max_cost: 100.0,
      weight_terms: 1.0,
      weight_wildcards: 5.0,
      weight_near: 3.0,
      nesting_base: 2.0,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComplexityReport {
  pub terms: u32,
  pub operators: u32,
  pub wildcards: u32,
  pub near_clauses: u32,
  pub max_nesting_depth: u32,
  pub cost: f64,
  pub level: ComplexityLevel,
  /// Human-readable suggestions to surface alongside a `TOO_COMPLEX`
  /// warning (spec.md §4.2 "log with suggestions").
  pub suggestions: Vec<String>,
}

fn is_operator_token(token: &str) -> bool {
  matches!(token.to_ascii_uppercase().as_str(), "AND" | "OR" | "NOT")
}

/// `*` occurrences not preceded by an odd number of `\` (spec.md §4.2
/// "escape-aware").
fn count_wildcards(query: &str) -> u32 {
  let chars: Vec<char> = query.chars().collect();
  let mut count = 0;
  for (i, &c) in chars.iter().enumerate() {
    if c != '*' {
      continue;
    }
    let mut backslashes = 0;
    let mut j = i;
    while j > 0 && chars[j - 1] == '\\' {
      backslashes += 1;
      j -= 1;
    }
    if backslashes % 2 == 0 {
      count += 1;
    }
  }
  count
}

fn count_near_clauses(query: &str) -> u32 {
  let lower = query.to_ascii_lowercase();
  lower.matches("near(").count() as u32
}

/// Max depth of balanced `(`/`)`.
fn max_nesting_depth(query: &str) -> u32 {
  let mut depth: i32 = 0;
  let mut max_depth: i32 = 0;
  for c in query.chars() {
    match c {
      '(' => {
        depth += 1;
        max_depth = max_depth.max(depth);
      }
      ')' => depth = (depth - 1).max(0),
      _ => {}
    }
  }
  max_depth.max(0) as u32
}

fn count_terms_and_operators(query: &str) -> (u32, u32) {
  let mut terms = 0;
  let mut operators = 0;
  for token in query.split_whitespace() {
    if is_operator_token(token) {
      operators += 1;
    } else {
      terms += 1;
    }
  }
  (terms, operators)
}

/// `analyze(query, cfg)` (spec.md C2). Hard per-metric thresholds force
/// `TOO_COMPLEX` outright (an attacker maxing out one dimension shouldn't
/// be bailed out by a low score on the others); otherwise the level follows
/// the cost-based mapping.
pub fn analyze(query: &str, cfg: ComplexityConfig) -> ComplexityReport {
  let (terms, operators) = count_terms_and_operators(query);
  let wildcards = count_wildcards(query);
  let near_clauses = count_near_clauses(query);
  let depth = max_nesting_depth(query);

  let cost = cfg.weight_terms * terms as f64 + cfg.weight_wildcards * wildcards as f64 + cfg.weight_near * near_clauses as f64 + cfg.nesting_base.powi(depth as i32);

  let mut suggestions = Vec::new();
  let mut over_hard_limit = false;

  if wildcards > cfg.max_wildcards {
    over_hard_limit = true;
    suggestions.push(format!("reduce wildcards ({wildcards} > {})", cfg.max_wildcards));
  }
  if terms > cfg.max_terms {
    over_hard_limit = true;
    suggestions.push(format!("reduce term count ({terms} > {})", cfg.max_terms));
  }
  if near_clauses > cfg.max_near {
    over_hard_limit = true;
    suggestions.push(format!("reduce NEAR() clauses ({near_clauses} > {})", cfg.max_near));
  }
  if depth > cfg.max_nesting_depth {
    over_hard_limit = true;
    suggestions.push(format!("reduce parenthesis nesting depth ({depth} > {})", cfg.max_nesting_depth));
  }

  let level = if over_hard_limit || cost >= cfg.max_cost {
    if suggestions.is_empty() {
      suggestions.push("simplify the query: fewer terms, wildcards, or nested groups".to_string());
    }
    ComplexityLevel::TooComplex
  } else if cost < 20.0 {
    ComplexityLevel::Simple
  } else if cost < 50.0 {
    ComplexityLevel::Moderate
  } else {
    ComplexityLevel::Complex
  };

  ComplexityReport {
    terms,
    operators,
    wildcards,
    near_clauses,
    max_nesting_depth: depth,
    cost,
    level,
    suggestions,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn simple_query_is_simple() {
    let report = analyze("validate_token", ComplexityConfig::default());
    assert_eq!(report.level, ComplexityLevel::Simple);
  }

  #[test]
  fn deeply_nested_parens_are_too_complex() {
    let report = analyze("((((a))))", ComplexityConfig::default());
    assert_eq!(report.level, ComplexityLevel::TooComplex);
    assert!(!report.suggestions.is_empty());
  }

  #[test]
  fn escaped_wildcard_is_not_counted() {
    let report = analyze(r"foo\*bar", ComplexityConfig::default());
    assert_eq!(report.wildcards, 0);
  }

  #[test]
  fn unescaped_wildcard_is_counted() {
    let report = analyze("foo*bar", ComplexityConfig::default());
    assert_eq!(report.wildcards, 1);
  }

  #[test]
  fn excess_wildcards_force_too_complex_even_with_low_cost() {
    let report = analyze("a* b* c* d*", ComplexityConfig::default());
    assert_eq!(report.wildcards, 4);
    assert_eq!(report.level, ComplexityLevel::TooComplex);
  }

  #[test]
  fn near_clauses_are_counted_case_insensitively() {
    let report = analyze("Near(a b, 3) near(c d, 2)", ComplexityConfig::default());
    assert_eq!(report.near_clauses, 2);
  }

  #[test]
  fn operators_are_not_counted_as_terms() {
    let report = analyze("auth AND login OR NOT admin", ComplexityConfig::default());
    assert_eq!(report.terms, 3);
    assert_eq!(report.operators, 3);
  }

  #[test]
  fn hard_limit_overrides_low_cost() {
    let cfg = ComplexityConfig::default();
    let report = analyze(&"term ".repeat(25), cfg); // 25 > max_terms=20
    assert_eq!(report.level, ComplexityLevel::TooComplex);
  }

  #[test]
  fn moderate_and_complex_bands() {
    let relaxed = ComplexityConfig { max_terms: 1000, ..ComplexityConfig::default() };
    let moderate = analyze(&"term ".repeat(30), relaxed); // cost ~31 -> [20, 50)
    assert_eq!(moderate.level, ComplexityLevel::Moderate);
    let complex = analyze(&"term ".repeat(60), relaxed); // cost ~61 -> [50, 100)
    assert_eq!(complex.level, ComplexityLevel::Complex);
  }
}
