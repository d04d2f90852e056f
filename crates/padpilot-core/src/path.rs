//! Hierarchical paths and the wildcard path matcher.
//!
//! A hierarchical path is the ancestor chain of an element inside its surface,
//! written as `Name:Type` segments joined by `/`:
//!
//! ```text
//! Main:Window#1/Toolbar:ToolBar/Save:Button
//! ```
//!
//! Top-level segments carry a `#<surface>` suffix so that several surfaces of
//! the same type (two open popups, say) never share a path.
//!
//! # Pattern grammar
//!
//! | Token | Matches |
//! |-------|---------|
//! | `*`   | exactly one segment |
//! | `**`  | zero or more segments |
//! | `***` | one or more segments |
//! | other | one segment, literally (case-insensitive) |
//!
//! A literal segment without `#` ignores the surface suffix of the segment it
//! matches, so `Main:Window/**` matches `Main:Window#1/...`. Patterns are
//! anchored at both ends; there is no substring matching.
//!
//! Patterns are compiled once into a [`regex::Regex`] and reused.

use regex::Regex;
use thiserror::Error;

/// Separator between path segments.
pub const SEPARATOR: char = '/';

/// Separator between the name and type halves of a segment.
pub const TYPE_MARK: char = ':';

/// Marker that introduces a surface suffix on a top-level segment.
pub const SURFACE_MARK: char = '#';

/// Placeholder used for elements without a name.
pub const UNNAMED: &str = "_";

/// Errors produced when compiling a path pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,
    #[error("pattern '{pattern}' contains an empty segment")]
    EmptySegment { pattern: String },
    #[error("pattern '{pattern}' has unsupported wildcard run '{segment}' (use *, ** or ***)")]
    StarRun { pattern: String, segment: String },
    #[error("pattern '{pattern}' mixes wildcards and text in segment '{segment}'")]
    MixedWildcard { pattern: String, segment: String },
    #[error("pattern '{pattern}' failed to compile: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Replace characters that would break path structure.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            SEPARATOR | TYPE_MARK | SURFACE_MARK => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        UNNAMED.to_string()
    } else {
        cleaned
    }
}

/// Build one `Name:Type` segment.
///
/// `surface` is only passed for the top-level segment of a surface.
#[must_use]
pub fn segment(name: Option<&str>, type_name: &str, surface: Option<u32>) -> String {
    let name = name.map_or_else(|| UNNAMED.to_string(), sanitize);
    let mut seg = format!("{}{}{}", name, TYPE_MARK, sanitize(type_name));
    if let Some(tag) = surface {
        seg.push(SURFACE_MARK);
        seg.push_str(&tag.to_string());
    }
    seg
}

/// Join root-first segments into a path.
#[must_use]
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for (i, seg) in segments.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(seg.as_ref());
    }
    out
}

/// Whether `path` is `scope` itself or lies strictly below it.
///
/// Prefix matching is segment-aware: `A:Panel/B` is not inside `A:Pan`.
#[must_use]
pub fn is_within_scope(path: &str, scope: &str) -> bool {
    match path.strip_prefix(scope) {
        Some("") => true,
        Some(rest) => rest.starts_with(SEPARATOR),
        None => false,
    }
}

/// A compiled wildcard path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

impl PathPattern {
    /// Compile a pattern. Matching is case-insensitive and anchored.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(PatternError::Empty);
        }

        // Every piece carries its own leading separator and the subject is
        // matched with a separator prepended. That keeps `**` at any position
        // free of special cases.
        let mut expr = String::from("(?i)^");
        for raw in trimmed.split(SEPARATOR) {
            let seg = raw.trim();
            if seg.is_empty() {
                return Err(PatternError::EmptySegment {
                    pattern: trimmed.to_string(),
                });
            }
            match seg {
                "*" => expr.push_str("/[^/]+"),
                "**" => expr.push_str("(?:/[^/]+)*"),
                "***" => expr.push_str("(?:/[^/]+)+"),
                s if s.chars().all(|c| c == '*') => {
                    return Err(PatternError::StarRun {
                        pattern: trimmed.to_string(),
                        segment: s.to_string(),
                    });
                }
                s if s.contains('*') => {
                    return Err(PatternError::MixedWildcard {
                        pattern: trimmed.to_string(),
                        segment: s.to_string(),
                    });
                }
                s => {
                    expr.push('/');
                    expr.push_str(&regex::escape(s));
                    if !s.contains(SURFACE_MARK) {
                        expr.push_str("(?:#[^/]*)?");
                    }
                }
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|source| PatternError::Regex {
            pattern: trimmed.to_string(),
            source,
        })?;

        Ok(Self {
            source: trimmed.to_string(),
            regex,
        })
    }

    /// Test a full hierarchical path against this pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let mut subject = String::with_capacity(path.len() + 1);
        subject.push(SEPARATOR);
        subject.push_str(path);
        self.regex.is_match(&subject)
    }

    /// The pattern text as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// One-shot match. Compiles the pattern on every call; rule matching uses
/// [`PathPattern`] directly. Invalid patterns match nothing.
#[must_use]
pub fn matches(path: &str, pattern: &str) -> bool {
    PathPattern::compile(pattern).is_ok_and(|p| p.matches(path))
}
