//! Wildcard patterns for target addressing.
//!
//! A pattern is either a literal task name (`"ttf"`) or a path template with
//! `*` wildcard segments (`"build/ws0/*-*-*.ttf"`). Each wildcard matches the
//! shortest non-empty run of characters up to the next literal, never
//! crossing a `/` separator, mirroring filesystem-glob semantics. Matching a
//! target string yields the captured substrings in left-to-right order, and
//! re-expanding the pattern with those captures reproduces the exact target.

use std::fmt;

use regex::Regex;

use crate::error::{ForgeResult, ResolveError};

/// One piece of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Wildcard,
}

/// A compiled target pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
    regex: Regex,
}

impl Pattern {
    /// Parses and compiles a pattern string.
    ///
    /// # Errors
    /// Returns [`ResolveError::InvalidPattern`] for empty patterns or
    /// adjacent wildcards (`**`), which would make captures ambiguous.
    pub fn parse(source: &str) -> ForgeResult<Self> {
        if source.is_empty() {
            return Err(ResolveError::InvalidPattern {
                pattern: source.to_string(),
                reason: "pattern is empty".to_string(),
            }
            .into());
        }
        if source.contains("**") {
            return Err(ResolveError::InvalidPattern {
                pattern: source.to_string(),
                reason: "adjacent wildcards are ambiguous".to_string(),
            }
            .into());
        }

        let mut segments = Vec::new();
        let mut regex_src = String::from("^");
        let mut literal = String::new();
        for ch in source.chars() {
            if ch == '*' {
                if !literal.is_empty() {
                    regex_src.push_str(&regex::escape(&literal));
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                // Non-greedy so each capture binds the shortest run up to the
                // next literal; `[^/]` keeps wildcards within one path segment.
                regex_src.push_str("([^/]+?)");
                segments.push(Segment::Wildcard);
            } else {
                literal.push(ch);
            }
        }
        if !literal.is_empty() {
            regex_src.push_str(&regex::escape(&literal));
            segments.push(Segment::Literal(literal));
        }
        regex_src.push('$');

        let regex = Regex::new(&regex_src).map_err(|e| ResolveError::InvalidPattern {
            pattern: source.to_string(),
            reason: format!("regex compilation failed: {e}"),
        })?;

        Ok(Self {
            source: source.to_string(),
            segments,
            regex,
        })
    }

    /// Returns the original pattern string.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the number of wildcard segments.
    #[must_use]
    pub fn wildcard_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Wildcard))
            .count()
    }

    /// Returns true if the pattern contains no wildcards.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.wildcard_count() == 0
    }

    /// Matches a target string, returning the ordered captures on success.
    #[must_use]
    pub fn matches(&self, target: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(target)?;
        Some(
            caps.iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect(),
        )
    }

    /// Expands the pattern with concrete capture values.
    ///
    /// Guarantees the "build-by-name and build-by-pattern-expansion agree"
    /// contract: `expand(matches(t)) == t` for any matching target `t`.
    ///
    /// # Errors
    /// Returns [`ResolveError::CaptureCountMismatch`] when the value count
    /// does not equal the wildcard count.
    pub fn expand(&self, values: &[&str]) -> ForgeResult<String> {
        let expected = self.wildcard_count();
        if values.len() != expected {
            return Err(ResolveError::CaptureCountMismatch {
                pattern: self.source.clone(),
                expected,
                actual: values.len(),
            }
            .into());
        }

        let mut out = String::with_capacity(self.source.len());
        let mut next = 0;
        for seg in &self.segments {
            match seg {
                Segment::Literal(lit) => out.push_str(lit),
                Segment::Wildcard => {
                    out.push_str(values[next]);
                    next += 1;
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern_matches_itself_only() {
        let p = Pattern::parse("ttf").unwrap();
        assert!(p.is_literal());
        assert_eq!(p.matches("ttf"), Some(vec![]));
        assert_eq!(p.matches("ttc"), None);
        assert_eq!(p.matches("ttf2"), None);
        assert_eq!(p.expand(&[]).unwrap(), "ttf");
    }

    #[test]
    fn test_three_wildcard_capture_order() {
        let p = Pattern::parse("build/ws0/*-*-*.ttf").unwrap();
        let caps = p.matches("build/ws0/sarasa-jp-regular.ttf").unwrap();
        assert_eq!(caps, vec!["sarasa", "jp", "regular"]);
    }

    #[test]
    fn test_expand_roundtrip_reproduces_target() {
        let p = Pattern::parse("build/ws0/*-*-*.ttf").unwrap();
        let target = "build/ws0/sarasa-jp-regular.ttf";
        let caps = p.matches(target).unwrap();
        let values: Vec<&str> = caps.iter().map(String::as_str).collect();
        assert_eq!(p.expand(&values).unwrap(), target);
    }

    #[test]
    fn test_shortest_match_binds_leading_segments_first() {
        // Four hyphen-separated words against three wildcards: the trailing
        // capture absorbs the rest, as in "gothic-regular" style names.
        let p = Pattern::parse("*-*-*.ttf").unwrap();
        let caps = p.matches("sarasa-latin-gothic-regular.ttf").unwrap();
        assert_eq!(caps, vec!["sarasa", "latin", "gothic-regular"]);
    }

    #[test]
    fn test_wildcard_does_not_cross_directory_separator() {
        let p = Pattern::parse("build/*.ttf").unwrap();
        assert!(p.matches("build/a.ttf").is_some());
        assert!(p.matches("build/sub/a.ttf").is_none());
    }

    #[test]
    fn test_wildcard_requires_nonempty_capture() {
        let p = Pattern::parse("build/shs/*-*.otd").unwrap();
        assert!(p.matches("build/shs/-regular.otd").is_none());
        assert!(p.matches("build/shs/sc-regular.otd").is_some());
    }

    #[test]
    fn test_trailing_group_key() {
        let p = Pattern::parse("cache-hint-*").unwrap();
        assert_eq!(p.matches("cache-hint-jp").unwrap(), vec!["jp"]);
        assert_eq!(p.expand(&["jp"]).unwrap(), "cache-hint-jp");
    }

    #[test]
    fn test_regex_metacharacters_in_literals_are_escaped() {
        let p = Pattern::parse("out/sarasa-ttc-*.7z").unwrap();
        assert_eq!(p.matches("out/sarasa-ttc-1.0.0.7z").unwrap(), vec!["1.0.0"]);
        // The '.' before '7z' must not act as a regex any-char.
        assert!(p.matches("out/sarasa-ttc-1X7z").is_none());
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let err = Pattern::parse("").unwrap_err();
        assert!(err.is_resolve());
    }

    #[test]
    fn test_adjacent_wildcards_rejected() {
        let err = Pattern::parse("build/**.ttf").unwrap_err();
        assert!(err.is_resolve());
    }

    #[test]
    fn test_expand_capture_count_mismatch() {
        let p = Pattern::parse("build/ws0/*-*-*.ttf").unwrap();
        let err = p.expand(&["a", "b"]).unwrap_err();
        assert!(err.is_resolve());
    }
}
