use once_cell::sync::Lazy;
use regex::Regex;

/// Query Sanitizer (spec.md C1). Pure, stateless, thread-safe: no instance
/// state is threaded between calls (spec.md §5/§9 — every query-pipeline
/// component takes its configuration per call).
#[derive(Debug, Clone, Copy, Default)]
pub struct SanitizeConfig;

/// Characters the whitelist approach neutralizes when a token isn't a
/// reserved operator (spec.md §4.1). `>` is included alongside the listed
/// set since it only ever appears as half of the `->` sequence the spec
/// calls out by name.
const SPECIAL_CHARS: &[char] = &['*', '(', ')', '^', '{', '}', ':', '[', ']', '-', '+', '@', '#', '$', '>'];

static QUOTED_PHRASE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""(?:[^"]|"")*""#).unwrap());
static NEAR_CLAUSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)near\s*\([^()]*\)").unwrap());

const PLACEHOLDER_OPEN: char = '\u{E000}';
const PLACEHOLDER_CLOSE: char = '\u{E001}';

fn placeholder(index: usize) -> String {
  format!("{PLACEHOLDER_OPEN}{index}{PLACEHOLDER_CLOSE}")
}

/// Pull every quoted phrase and `NEAR(...)` clause out of `input`, leaving a
/// placeholder token in their place, so tokenization in step 3 can't split
/// them apart (spec.md §4.1 steps 1-2).
fn extract_placeholders(input: &str) -> (String, Vec<String>) {
  let mut extracted = Vec::new();
  let mut residue = String::with_capacity(input.len());
  let mut last_end = 0;

  // Quoted phrases take priority: a NEAR(...) clause inside a quoted phrase
  // should not itself be extracted.
  let mut spans: Vec<(usize, usize)> = QUOTED_PHRASE_RE.find_iter(input).map(|m| (m.start(), m.end())).collect();
  for m in NEAR_CLAUSE_RE.find_iter(input) {
    if !spans.iter().any(|(s, e)| m.start() >= *s && m.end() <= *e) {
      spans.push((m.start(), m.end()));
    }
  }
  spans.sort_unstable();

  for (start, end) in spans {
    if start < last_end {
      continue; // overlapping match, already covered
    }
    residue.push_str(&input[last_end..start]);
    let idx = extracted.len();
    extracted.push(input[start..end].to_string());
    residue.push(' ');
    residue.push_str(&placeholder(idx));
    residue.push(' ');
    last_end = end;
  }
  residue.push_str(&input[last_end..]);

  (residue, extracted)
}

fn placeholder_index(token: &str) -> Option<usize> {
  let token = token.strip_prefix(PLACEHOLDER_OPEN)?;
  let token = token.strip_suffix(PLACEHOLDER_CLOSE)?;
  token.parse().ok()
}

fn is_reserved_operator(token: &str) -> Option<&'static str> {
  match token.to_ascii_uppercase().as_str() {
    "AND" => Some("AND"),
    "OR" => Some("OR"),
    "NOT" => Some("NOT"),
    _ => None,
  }
}

/// Whitelist a token: bare reserved operators pass through uppercased;
/// everything else is wrapped in a quoted phrase with internal quotes
/// doubled, neutralizing every FTS metacharacter by making it literal text
/// (spec.md §4.1 step 3, P3). A token made entirely of metacharacters
/// collapses to nothing rather than surviving as literal punctuation
/// (spec.md: "become an empty quoted term and are dropped").
pub(crate) fn sanitize_token(token: &str) -> Option<String> {
  if let Some(op) = is_reserved_operator(token) {
    return Some(op.to_string());
  }
  if !token.is_empty() && token.chars().all(|c| SPECIAL_CHARS.contains(&c)) {
    return None;
  }
  Some(format!("\"{}\"", token.replace('"', "\"\"")))
}

/// Sentinel returned for an empty (or entirely-dropped) query: an empty
/// quoted phrase, which FTS5 parses as syntactically valid but matches
/// nothing (spec.md §4.1 "Empty input yields the empty-match sentinel").
pub const EMPTY_MATCH_SENTINEL: &str = "\"\"";

/// `sanitize(user_query, cfg) -> String` (spec.md C1). Always returns a
/// syntactically valid FTS query string; never errors (spec.md "Errors:
/// None").
pub fn sanitize(user_query: &str, _cfg: SanitizeConfig) -> String {
  let trimmed = user_query.trim();
  if trimmed.is_empty() {
    return EMPTY_MATCH_SENTINEL.to_string();
  }

  let (residue, placeholders) = extract_placeholders(trimmed);

  let mut out_tokens = Vec::new();
  for token in residue.split_whitespace() {
    if let Some(idx) = placeholder_index(token) {
      if let Some(original) = placeholders.get(idx) {
        out_tokens.push(original.clone());
      }
      continue;
    }
    if let Some(sanitized) = sanitize_token(token) {
      out_tokens.push(sanitized);
    }
  }

  if out_tokens.is_empty() {
    return EMPTY_MATCH_SENTINEL.to_string();
  }
  out_tokens.join(" ")
}
