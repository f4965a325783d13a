//! Validated shell command text and code-fence stripping.

use std::fmt;

const FENCE: &str = "```";

/// Remove every line containing a markdown code-fence marker.
///
/// The result has surrounding whitespace trimmed and, when non-empty, ends with
/// exactly one `\n`. Blank input (or fences only) yields an empty string.
pub fn strip_code_fences(raw: &str) -> String {
    let kept: Vec<&str> = raw.lines().filter(|line| !line.contains(FENCE)).collect();
    let joined = kept.join("\n");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{trimmed}\n")
}

/// A shell command that is non-blank and free of code-fence markers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandText(String);

impl CommandText {
    /// Accept an already-clean command (e.g. read back from the store) as-is.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() || text.contains(FENCE) {
            return None;
        }
        Some(Self(text))
    }

    /// Build a command from raw suggester output by stripping code fences.
    pub fn from_suggestion(raw: &str) -> Option<Self> {
        Self::new(strip_code_fences(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CommandText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.trim_end())
    }
}

impl AsRef<str> for CommandText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
