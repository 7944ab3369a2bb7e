//! Patterns used by `find` and `find_by_tag`.
//!
//! A string pattern is a glob: `*` matches any run of characters other than
//! `.` and `:`, `?` matches exactly one such character, everything else
//! matches itself. A pattern without wildcards is an exact match. Globs are
//! compiled once into an anchored regular expression.

use std::fmt;

use regex::Regex;

use crate::error::DeclarationError;

/// A binding key or tag pattern.
#[derive(Clone)]
pub enum Pattern {
    /// A glob with the anchored expression it compiles to. `compiled` is
    /// `None` only when the expression exceeds the regex size limit, in
    /// which case the glob matches nothing.
    Glob {
        glob: String,
        compiled: Option<Regex>,
    },
    Regex(Regex),
}

impl Pattern {
    /// Compiles a glob pattern.
    pub fn glob(glob: impl Into<String>) -> Self {
        let glob = glob.into();
        let compiled = match Regex::new(&glob_to_regex(&glob)) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(glob = %glob, error = %e, "glob does not compile");
                None
            }
        };
        Self::Glob { glob, compiled }
    }

    /// Compiles a regular expression pattern.
    pub fn regex(pattern: &str) -> Result<Self, DeclarationError> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| DeclarationError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
    }

    /// Tests a key or tag against this pattern.
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            Self::Glob { compiled, .. } => {
                compiled.as_ref().is_some_and(|re| re.is_match(candidate))
            }
            Self::Regex(re) => re.is_match(candidate),
        }
    }

    /// Source text of the pattern.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Glob { glob, .. } => glob,
            Self::Regex(re) => re.as_str(),
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Glob { glob, .. } => write!(f, "Glob({glob:?})"),
            Self::Regex(re) => write!(f, "Regex({:?})", re.as_str()),
        }
    }
}

impl From<&str> for Pattern {
    fn from(glob: &str) -> Self {
        Self::glob(glob)
    }
}

impl From<String> for Pattern {
    fn from(glob: String) -> Self {
        Self::glob(glob)
    }
}

impl From<&String> for Pattern {
    fn from(glob: &String) -> Self {
        Self::glob(glob.as_str())
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Self::Regex(re)
    }
}

/// Translates a glob into an anchored regular expression.
fn glob_to_regex(glob: &str) -> String {
    let mut re = String::with_capacity(glob.len() + 8);
    re.push('^');
    let mut literal = [0u8; 4];
    for c in glob.chars() {
        match c {
            '*' => re.push_str("[^.:]*"),
            '?' => re.push_str("[^.:]"),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut literal))),
        }
    }
    re.push('$');
    re
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_glob() {
        let p = Pattern::from("servers.rest");
        assert!(p.matches("servers.rest"));
        assert!(!p.matches("servers.rest2"));
        assert!(!p.matches("servers"));
    }

    #[test]
    fn test_star_stays_within_segment() {
        let p = Pattern::from("servers.*");
        assert!(p.matches("servers.rest"));
        assert!(p.matches("servers."));
        assert!(!p.matches("servers.rest.v1"));
        assert!(!p.matches("other.rest"));
    }

    #[test]
    fn test_star_backtracks() {
        let p = Pattern::from("a*b*c");
        assert!(p.matches("axxbyyc"));
        assert!(p.matches("abc"));
        assert!(!p.matches("axxbyy"));
    }

    #[test]
    fn test_question_mark() {
        let p = Pattern::from("my.?ey");
        assert!(p.matches("my.key"));
        assert!(!p.matches("my.kkey"));
        assert!(!p.matches("my..ey"));
    }

    #[test]
    fn test_tag_with_colon_separator() {
        let p = Pattern::from("extensionPoint:*");
        assert!(p.matches("extensionPoint:authenticators"));
        assert!(!p.matches("name:basic"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let p = Pattern::from("a+b.(c)");
        assert!(p.matches("a+b.(c)"));
        assert!(!p.matches("aab.(c)"));
        assert!(!p.matches("a+bx(c)"));
    }

    #[test]
    fn test_glob_translation() {
        assert_eq!(glob_to_regex("servers.*"), "^servers\\.[^.:]*$");
        assert_eq!(glob_to_regex("a?b"), "^a[^.:]b$");
        assert_eq!(Pattern::from("servers.*").as_str(), "servers.*");
    }

    #[test]
    fn test_regex() {
        let p = Pattern::regex("^controllers\\.").unwrap();
        assert!(p.matches("controllers.Home"));
        assert!(!p.matches("servers.rest"));
    }

    #[test]
    fn test_invalid_regex() {
        let err = Pattern::regex("(").unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidPattern { pattern, .. } if pattern == "("));
    }
}
