use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
  pub field: String,
  pub message: String,
}

impl ValidationError {
  pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      field: field.into(),
      message: message.into(),
    }
  }

  pub fn missing(field: impl Into<String>) -> Self {
    let field = field.into();
    Self::new(field.clone(), format!("missing required field `{field}`"))
  }

  pub fn invalid_type(field: impl Into<String>, expected: &str) -> Self {
    let field = field.into();
    Self::new(field.clone(), format!("field `{field}` must be {expected}"))
  }

  pub fn out_of_range(field: impl Into<String>, detail: impl Into<String>) -> Self {
    let field = field.into();
    Self::new(field.clone(), format!("field `{field}` out of range: {}", detail.into()))
  }
}

impl std::fmt::Display for ValidationError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.field, self.message)
  }
}

impl From<ValidationError> for Error {
  fn from(e: ValidationError) -> Self {
    Error::validation(e.to_string())
  }
}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

pub fn require_string(value: Option<&Value>, field: &str) -> ValidationResult<String> {
  match value {
    Some(Value::String(s)) => Ok(s.clone()),
    Some(_) => Err(ValidationError::invalid_type(field, "a string")),
    None => Err(ValidationError::missing(field)),
  }
}

pub fn optional_string(value: Option<&Value>, field: &str) -> ValidationResult<Option<String>> {
  match value {
    Some(Value::Null) | None => Ok(None),
    Some(Value::String(s)) => Ok(Some(s.clone())),
    Some(_) => Err(ValidationError::invalid_type(field, "a string")),
  }
}

pub fn require_u64(value: Option<&Value>, field: &str) -> ValidationResult<u64> {
  match value {
    Some(Value::Number(n)) => n.as_u64().ok_or_else(|| ValidationError::invalid_type(field, "a non-negative integer")),
    Some(_) => Err(ValidationError::invalid_type(field, "a non-negative integer")),
    None => Err(ValidationError::missing(field)),
  }
}

pub fn require_u64_range(value: Option<&Value>, field: &str, min: u64, max: u64) -> ValidationResult<u64> {
  let v = require_u64(value, field)?;
  if v < min || v > max {
    return Err(ValidationError::out_of_range(field, format!("{v} not in [{min}, {max}]")));
  }
  Ok(v)
}

pub fn require_bool(value: Option<&Value>, field: &str) -> ValidationResult<bool> {
  match value {
    Some(Value::Bool(b)) => Ok(*b),
    Some(_) => Err(ValidationError::invalid_type(field, "a boolean")),
    None => Err(ValidationError::missing(field)),
  }
}

pub fn require_string_array(value: Option<&Value>, field: &str) -> ValidationResult<Vec<String>> {
  match value {
    Some(Value::Array(items)) => items
      .iter()
      .map(|v| v.as_str().map(str::to_string).ok_or_else(|| ValidationError::invalid_type(field, "an array of strings")))
      .collect(),
    Some(_) => Err(ValidationError::invalid_type(field, "an array of strings")),
    None => Err(ValidationError::missing(field)),
  }
}

/// Dataset id, per spec.md §3: `^[A-Za-z0-9][A-Za-z0-9_-]{0,99}$`, never
/// `.`/`..`, not in the reserved set.
pub static DATASET_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,99}$").unwrap());

/// Internal table/column names and filesystem-unsafe tokens a dataset id
/// must not collide with.
pub const RESERVED_DATASET_NAMES: &[&str] = &["files", "files_fts", "dataset_metadata", "schema_version", "con", "prn", "aux", "nul"];

pub fn validate_dataset_id(id: &str) -> ValidationResult<()> {
  if id == "." || id == ".." {
    return Err(ValidationError::new("dataset_id", "must not be `.` or `..`"));
  }
  if !DATASET_ID_RE.is_match(id) {
    return Err(ValidationError::new(
      "dataset_id",
      "must match ^[A-Za-z0-9][A-Za-z0-9_-]{0,99}$",
    ));
  }
  if RESERVED_DATASET_NAMES.contains(&id.to_ascii_lowercase().as_str()) {
    return Err(ValidationError::new("dataset_id", format!("`{id}` is a reserved name")));
  }
  Ok(())
}

/// VCS ref, per spec.md §7: `^[A-Za-z0-9_./-]+$`, must not start with `-`.
pub static VCS_REF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_./-]+$").unwrap());

pub fn validate_vcs_ref(r: &str) -> ValidationResult<()> {
  if r.starts_with('-') {
    return Err(ValidationError::new("vcs_ref", "must not start with `-`"));
  }
  if r.is_empty() || !VCS_REF_RE.is_match(r) {
    return Err(ValidationError::new("vcs_ref", "must match ^[A-Za-z0-9_./-]+$"));
  }
  Ok(())
}

/// Compile a glob pattern to validate it without keeping the matcher
/// around; callers that need to actually match use their own compiled set.
pub fn validate_glob_pattern(pattern: &str) -> ValidationResult<()> {
  glob_syntax::Pattern::new(pattern).map(|_| ()).map_err(|e| ValidationError::new("exclude_pattern", e.to_string()))
}

/// Minimal glob syntax checker: balanced brackets/braces, no empty pattern.
/// Kept local (no extra dependency) since we only need syntax validation,
/// not matching — matching itself is done by `ignore`'s own glob engine at
/// discovery time.
mod glob_syntax {
  pub struct Pattern;

  impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, String> {
      if pattern.is_empty() {
        return Err("pattern must not be empty".into());
      }
      let mut bracket_depth = 0i32;
      let mut brace_depth = 0i32;
      for c in pattern.chars() {
        match c {
          '[' => bracket_depth += 1,
          ']' => bracket_depth -= 1,
          '{' => brace_depth += 1,
          '}' => brace_depth -= 1,
          _ => {}
        }
        if bracket_depth < 0 || brace_depth < 0 {
          return Err(format!("unbalanced bracket/brace in `{pattern}`"));
        }
      }
      if bracket_depth != 0 || brace_depth != 0 {
        return Err(format!("unbalanced bracket/brace in `{pattern}`"));
      }
      Ok(Pattern)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn dataset_id_accepts_valid() {
    assert!(validate_dataset_id("core").is_ok());
    assert!(validate_dataset_id("core__wt_feature_x").is_ok());
    assert!(validate_dataset_id("a").is_ok());
  }

  #[test]
  fn dataset_id_rejects_dot_and_dotdot() {
    assert!(validate_dataset_id(".").is_err());
    assert!(validate_dataset_id("..").is_err());
  }

  #[test]
  fn dataset_id_rejects_reserved() {
    assert!(validate_dataset_id("files").is_err());
    assert!(validate_dataset_id("schema_version").is_err());
  }

  #[test]
  fn dataset_id_rejects_bad_chars() {
    assert!(validate_dataset_id("core/feature").is_err());
    assert!(validate_dataset_id("").is_err());
    assert!(validate_dataset_id(" core").is_err());
  }

  #[test]
  fn vcs_ref_rejects_leading_dash() {
    assert!(validate_vcs_ref("-rf").is_err());
  }

  #[test]
  fn vcs_ref_accepts_branch_names() {
    assert!(validate_vcs_ref("feature/x-1").is_ok());
    assert!(validate_vcs_ref("refs/heads/main").is_ok());
  }

  #[test]
  fn require_string_reports_missing() {
    let err = require_string(None, "dataset_name").unwrap_err();
    assert_eq!(err.field, "dataset_name");
  }

  #[test]
  fn require_u64_range_bounds() {
    assert!(require_u64_range(Some(&json!(500)), "queue_batch_size", 1, 1000).is_ok());
    assert!(require_u64_range(Some(&json!(0)), "queue_batch_size", 1, 1000).is_err());
    assert!(require_u64_range(Some(&json!(5000)), "queue_batch_size", 1, 1000).is_err());
  }

  #[test]
  fn glob_pattern_rejects_unbalanced() {
    assert!(validate_glob_pattern("*.rs").is_ok());
    assert!(validate_glob_pattern("{a,b").is_err());
  }
}
