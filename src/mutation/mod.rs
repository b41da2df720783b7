// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Validated text mutations over markdown documents.
//!
//! Every operation is a pure function from the current document text to a
//! [`MutationResult`]. Nothing here touches the filesystem or holds state, so
//! the functions are safe to call from any number of tasks at once; mutual
//! exclusion on the persisted document is the job of
//! [`DocumentStore`](crate::store::DocumentStore).
//!
//! The common precondition is uniqueness: a replacement target must occur
//! exactly once. Zero matches and multiple matches are both refused, and the
//! result reports how many occurrences were found so the caller can tell the
//! two apart.
//!
//! ```rust,ignore
//! use concord::mutation::{section_replace, exact_replace};
//!
//! let doc = "# Plan\nold\n# Notes\nkeep";
//! let result = section_replace(doc, "Plan", "new");
//! assert_eq!(result.new_content.as_deref(), Some("# Plan\nnew\n# Notes\nkeep"));
//!
//! let result = exact_replace("a b a", "a", "c");
//! assert_eq!(result.occurrences, 2);
//! assert!(!result.success);
//! ```

mod sections;

pub use sections::{
    add_to_section, count_sections, is_top_level_heading, parse_sections, section_body,
    section_replace, InsertPosition, Section,
};

/// Why a mutation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationFailure {
    /// The target text or section does not exist.
    NotFound,
    /// The target matches more than once.
    Ambiguous,
    /// The request itself is unusable (empty target, for example).
    InvalidInput,
}

/// Outcome of a text mutation.
///
/// Built once by the operation that produced it and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationResult {
    /// Whether the mutation was applied.
    pub success: bool,
    /// Human-readable description of what happened.
    pub message: String,
    /// The rewritten document, present only on success.
    pub new_content: Option<String>,
    /// Number of matches found for the target.
    pub occurrences: usize,
    /// Failure kind, present only when `success` is false.
    pub failure: Option<MutationFailure>,
}

impl MutationResult {
    /// Create a successful result.
    pub fn applied(new_content: String, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            new_content: Some(new_content),
            occurrences: 1,
            failure: None,
        }
    }

    /// Create a "not found" failure.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::failed(MutationFailure::NotFound, message, 0)
    }

    /// Create an "ambiguous" failure with the number of matches found.
    pub fn ambiguous(message: impl Into<String>, occurrences: usize) -> Self {
        Self::failed(MutationFailure::Ambiguous, message, occurrences)
    }

    /// Create an invalid-input failure.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::failed(MutationFailure::InvalidInput, message, 0)
    }

    fn failed(kind: MutationFailure, message: impl Into<String>, occurrences: usize) -> Self {
        Self {
            success: false,
            message: message.into(),
            new_content: None,
            occurrences,
            failure: Some(kind),
        }
    }

    /// Check if the target was missing.
    pub fn is_not_found(&self) -> bool {
        self.failure == Some(MutationFailure::NotFound)
    }

    /// Check if the target matched more than once.
    pub fn is_ambiguous(&self) -> bool {
        self.failure == Some(MutationFailure::Ambiguous)
    }

    /// Consume the result, returning the new content on success.
    pub fn into_content(self) -> Option<String> {
        self.new_content
    }
}

/// Replace the single occurrence of `old` with `new`.
///
/// Fails when `old` is empty, missing, or occurs more than once.
pub fn exact_replace(content: &str, old: &str, new: &str) -> MutationResult {
    if old.is_empty() {
        return MutationResult::not_found("search text must not be empty");
    }

    let count = content.matches(old).count();

    match count {
        0 => MutationResult::not_found(format!(
            "text not found: '{}'",
            truncate_for_message(old, 50)
        )),
        1 => MutationResult::applied(
            content.replacen(old, new, 1),
            "replaced 1 occurrence",
        ),
        n => MutationResult::ambiguous(
            format!(
                "ambiguous: '{}' appears {n} times",
                truncate_for_message(old, 50)
            ),
            n,
        ),
    }
}

/// Truncate a string for log and result messages.
pub(crate) fn truncate_for_message(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_replace_single() {
        let result = exact_replace("hello world", "world", "rust");
        assert!(result.success);
        assert_eq!(result.occurrences, 1);
        assert_eq!(result.new_content.as_deref(), Some("hello rust"));
    }

    #[test]
    fn test_exact_replace_result_contains_new_once() {
        let content = "alpha\nbeta\ngamma";
        let result = exact_replace(content, "beta", "delta");
        let new_content = result.into_content().unwrap();
        assert_eq!(new_content.matches("delta").count(), 1);
        assert!(!new_content.contains("beta"));
    }

    #[test]
    fn test_exact_replace_not_found() {
        let result = exact_replace("hello world", "nonexistent", "x");
        assert!(!result.success);
        assert!(result.is_not_found());
        assert_eq!(result.occurrences, 0);
        assert!(result.new_content.is_none());
        assert!(result.message.contains("not found"));
    }

    #[test]
    fn test_exact_replace_ambiguous_reports_true_count() {
        let result = exact_replace("foo bar foo baz foo", "foo", "qux");
        assert!(!result.success);
        assert!(result.is_ambiguous());
        assert_eq!(result.occurrences, 3);
        assert!(result.new_content.is_none());
        assert!(result.message.contains("3 times"));
    }

    #[test]
    fn test_exact_replace_empty_search() {
        let result = exact_replace("hello", "", "x");
        assert!(!result.success);
        assert_eq!(result.occurrences, 0);
    }

    #[test]
    fn test_exact_replace_multiline() {
        let result = exact_replace("line1\nline2\nline3", "line1\nline2", "new1\nnew2");
        assert_eq!(result.new_content.as_deref(), Some("new1\nnew2\nline3"));
    }

    #[test]
    fn test_truncate_for_message() {
        assert_eq!(truncate_for_message("short", 10), "short");
        assert_eq!(truncate_for_message("ééééé", 2), "éé...");
    }
}
