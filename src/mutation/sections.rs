// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Section view over markdown documents and section-level mutations.
//!
//! A section starts at a top-level heading (`# Title`, exactly one `#`) and
//! runs up to the next top-level heading or the end of the document. Lines
//! inside fenced code blocks are never headings. Sections are recomputed from
//! the text on every call.

use std::ops::Range;

use super::MutationResult;

/// A titled span of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Full heading text after `# `, trimmed.
    pub title: String,
    /// Trailing parenthesised note in the heading, if any.
    pub constraints: Option<String>,
    /// Text between the heading line and the next top-level heading.
    pub body: String,
}

/// Where to insert an entry in [`add_to_section`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Start,
    End,
}

impl std::str::FromStr for InsertPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "start" | "top" => Ok(Self::Start),
            "end" | "bottom" => Ok(Self::End),
            other => Err(format!("invalid insert position: {other}")),
        }
    }
}

/// Byte layout of one section inside a document.
struct SectionSpan {
    title: String,
    /// Heading line, without its line terminator.
    heading: Range<usize>,
    /// Body, from just after the heading's newline to the next heading.
    body: Range<usize>,
}

/// Check whether a line is a top-level heading.
pub fn is_top_level_heading(line: &str) -> bool {
    let line = line.trim_end_matches(['\r', '\n']);
    line == "#" || (line.starts_with("# ") && !line.starts_with("##"))
}

fn heading_title(line: &str) -> String {
    line.trim_end_matches(['\r', '\n'])
        .trim_start_matches('#')
        .trim()
        .to_string()
}

fn split_constraints(title: &str) -> Option<String> {
    let open = title.rfind(" (")?;
    if !title.ends_with(')') {
        return None;
    }
    let inner = title[open + 2..title.len() - 1].trim();
    (!inner.is_empty()).then(|| inner.to_string())
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

fn scan(content: &str) -> Vec<SectionSpan> {
    let mut spans: Vec<SectionSpan> = Vec::new();
    let mut in_fence = false;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence || !is_top_level_heading(line) {
            continue;
        }

        if let Some(previous) = spans.last_mut() {
            previous.body.end = start;
        }
        let bare = line.trim_end_matches(['\r', '\n']);
        spans.push(SectionSpan {
            title: heading_title(line),
            heading: start..start + bare.len(),
            body: offset..content.len(),
        });
    }

    spans
}

/// Parse a document into its top-level sections, in order.
///
/// Text before the first heading belongs to no section and is not returned.
pub fn parse_sections(content: &str) -> Vec<Section> {
    scan(content)
        .into_iter()
        .map(|span| Section {
            constraints: split_constraints(&span.title),
            body: content[span.body].to_string(),
            title: span.title,
        })
        .collect()
}

/// Count the top-level sections whose title equals `title`.
pub fn count_sections(content: &str, title: &str) -> usize {
    let title = title.trim();
    scan(content).iter().filter(|s| s.title == title).count()
}

/// Body of the unique section titled `title`, if exactly one exists.
pub fn section_body<'a>(content: &'a str, title: &str) -> Option<&'a str> {
    let spans = scan(content);
    let title = title.trim();
    let mut matches = spans.iter().filter(|s| s.title == title);
    let first = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    Some(&content[first.body.clone()])
}

fn locate(content: &str, title: &str) -> Result<SectionSpan, MutationResult> {
    let title = title.trim();
    let mut found: Vec<SectionSpan> = scan(content)
        .into_iter()
        .filter(|s| s.title == title)
        .collect();

    match found.len() {
        0 => Err(MutationResult::not_found(format!(
            "section not found: '{title}'"
        ))),
        1 => Ok(found.remove(0)),
        n => Err(MutationResult::ambiguous(
            format!("ambiguous: section '{title}' appears {n} times"),
            n,
        )),
    }
}

/// Replace the body of the unique section titled `title` with `new_body`.
///
/// The heading line is kept verbatim. When another section follows, a line
/// break is kept between the new body and its heading.
pub fn section_replace(content: &str, title: &str, new_body: &str) -> MutationResult {
    let span = match locate(content, title) {
        Ok(span) => span,
        Err(failure) => return failure,
    };

    let mut out = String::with_capacity(content.len() + new_body.len());
    out.push_str(&content[..span.heading.end]);
    out.push('\n');
    out.push_str(new_body);

    let rest = &content[span.body.end..];
    if !rest.is_empty() && !new_body.is_empty() && !new_body.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(rest);

    MutationResult::applied(out, format!("replaced section '{}'", span.title))
}

/// Insert `entry` as a new line at the start or end of a section's body.
///
/// The existing body is trimmed of surrounding blank space first; every other
/// body line is kept as is. The new body always ends with a line break.
pub fn add_to_section(
    content: &str,
    title: &str,
    entry: &str,
    position: InsertPosition,
) -> MutationResult {
    let span = match locate(content, title) {
        Ok(span) => span,
        Err(failure) => return failure,
    };

    let existing = content[span.body.clone()]
        .trim_start_matches(['\r', '\n'])
        .trim_end();
    let entry = entry.trim_end_matches(['\r', '\n']);

    let new_body = match (existing.is_empty(), position) {
        (true, _) => format!("{entry}\n"),
        (false, InsertPosition::Start) => format!("{entry}\n{existing}\n"),
        (false, InsertPosition::End) => format!("{existing}\n{entry}\n"),
    };

    let mut result = section_replace(content, &span.title, &new_body);
    if result.success {
        result.message = format!("added entry to section '{}'", span.title);
    }
    result
}
