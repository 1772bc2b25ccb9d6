//! # Path Patterns
//!
//! Segment-prefix globs used by the ignored/white/black lists.
//!
//! A pattern matches a path when its segments equal the leading segments of
//! the path. `*`, `{name}` and `:name` match any single segment. Empty
//! segments (leading, trailing or doubled slashes) are ignored on both
//! sides, and matching is case-sensitive:
//!
//! | pattern          | matches                         | does not match |
//! |------------------|---------------------------------|----------------|
//! | `/users`         | `/users`, `/users/7/posts`      | `/users2`      |
//! | `/users/{id}`    | `/users/7`, `/users/7/posts`    | `/users`       |
//! | `/`              | everything                      |                |

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Wildcard,
}

impl Segment {
    fn parse(raw: &str) -> Self {
        let is_wildcard = raw == "*"
            || (raw.len() > 2 && raw.starts_with('{') && raw.ends_with('}'))
            || (raw.len() > 1 && raw.starts_with(':'));
        if is_wildcard {
            Self::Wildcard
        } else {
            Self::Literal(raw.to_string())
        }
    }

    fn matches(&self, segment: &str) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Literal(lit) => lit == segment,
        }
    }
}

/// Non-empty segments of `path`.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile `raw`. Returns `None` for blank patterns.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            raw: trimmed.to_string(),
            segments: segments(trimmed).map(Segment::parse).collect(),
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `path` starts with this pattern's segments.
    pub fn matches(&self, path: &str) -> bool {
        let mut path_segments = segments(path);
        self.segments
            .iter()
            .all(|pattern| path_segments.next().is_some_and(|s| pattern.matches(s)))
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Whether any of `patterns` matches `path`.
pub fn matches_any(patterns: &[PathPattern], path: &str) -> bool {
    patterns.iter().any(|p| p.matches(path))
}
