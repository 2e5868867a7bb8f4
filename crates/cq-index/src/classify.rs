use std::path::Path;

/// Tag returned for any extension not in the known map (spec.md §4.7 step 2
/// "unknown -> fallback tag").
pub const UNKNOWN_LANGUAGE: &str = "unknown";

const EXTENSION_MAP: &[(&str, &str)] = &[
  ("rs", "rust"),
  ("py", "python"),
  ("ts", "typescript"),
  ("tsx", "typescript"),
  ("js", "javascript"),
  ("jsx", "javascript"),
  ("go", "go"),
  ("java", "java"),
  ("c", "c"),
  ("h", "c"),
  ("cpp", "cpp"),
  ("cc", "cpp"),
  ("hpp", "cpp"),
  ("cs", "csharp"),
  ("rb", "ruby"),
  ("php", "php"),
  ("swift", "swift"),
  ("kt", "kotlin"),
  ("kts", "kotlin"),
  ("scala", "scala"),
  ("sh", "shell"),
  ("bash", "shell"),
  ("zsh", "shell"),
  ("sql", "sql"),
  ("proto", "protobuf"),
  ("toml", "toml"),
  ("yaml", "yaml"),
  ("yml", "yaml"),
  ("json", "json"),
  ("html", "html"),
  ("css", "css"),
  ("scss", "scss"),
  ("vue", "vue"),
  ("svelte", "svelte"),
  ("md", "markdown"),
  ("mdx", "markdown"),
];

/// Classify a file by its extension into a language tag (spec.md §4.7 step
/// 2). Files without a recognized extension (or with none at all) fall
/// back to [`UNKNOWN_LANGUAGE`].
pub fn classify(path: &Path) -> &'static str {
  let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
    return UNKNOWN_LANGUAGE;
  };
  let lower = ext.to_ascii_lowercase();
  EXTENSION_MAP.iter().find(|(e, _)| *e == lower).map(|(_, lang)| *lang).unwrap_or(UNKNOWN_LANGUAGE)
}

/// Extensions with a known language mapping, dot-prefixed so callers can
/// match them against a path's string suffix directly (e.g. `git diff
/// --name-only` output).
pub fn known_extensions() -> Vec<String> {
  EXTENSION_MAP.iter().map(|(ext, _)| format!(".{ext}")).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classifies_known_extensions() {
    assert_eq!(classify(Path::new("main.rs")), "rust");
    assert_eq!(classify(Path::new("app.py")), "python");
    assert_eq!(classify(Path::new("index.tsx")), "typescript");
  }

  #[test]
  fn unknown_extension_falls_back() {
    assert_eq!(classify(Path::new("notes.xyz")), UNKNOWN_LANGUAGE);
    assert_eq!(classify(Path::new("Makefile")), UNKNOWN_LANGUAGE);
  }

  #[test]
  fn extension_matching_is_case_insensitive() {
    assert_eq!(classify(Path::new("Main.RS")), "rust");
  }
}
