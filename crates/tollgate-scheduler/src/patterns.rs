//! Path pattern matching for change detection.

use std::fmt;

/// A single relevance pattern.
///
/// Plain strings match as case-sensitive prefixes. Strings containing `*`
/// are globs matched segment by segment: `*` matches within one path
/// segment and a `**` segment matches any number of segments. A trailing
/// `**` needs at least one segment, so `dir/**` matches files under `dir`.
/// Globs without a `/` match the file name at any depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    Prefix(String),
    Glob(String),
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        if pattern.contains('*') {
            PathPattern::Glob(pattern.to_string())
        } else {
            PathPattern::Prefix(pattern.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PathPattern::Prefix(p) | PathPattern::Glob(p) => p,
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
            PathPattern::Glob(pattern) => glob_match(pattern, path),
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn glob_match(pattern: &str, path: &str) -> bool {
    let segments: Vec<&str> = path.split('/').collect();
    if !pattern.contains('/') {
        return segments
            .last()
            .is_some_and(|name| segment_match(pattern, name));
    }
    let pattern: Vec<&str> = pattern.split('/').collect();
    segments_match(&pattern, &segments)
}

fn segments_match(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", [])) => !path.is_empty(),
        Some((&"**", rest)) => (0..=path.len()).any(|skip| segments_match(rest, &path[skip..])),
        Some((segment, rest)) => match path.split_first() {
            Some((name, remaining)) => {
                segment_match(segment, name) && segments_match(rest, remaining)
            }
            None => false,
        },
    }
}

/// Wildcard match within one segment; every `*` matches any run of characters.
fn segment_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();

    let mut pi = 0;
    let mut ni = 0;
    let mut last_star: Option<usize> = None;
    let mut star_ni = 0;

    while ni < n.len() {
        if pi < p.len() && p[pi] == '*' {
            last_star = Some(pi);
            pi += 1;
            star_ni = ni;
        } else if pi < p.len() && p[pi] == n[ni] {
            pi += 1;
            ni += 1;
        } else if let Some(star) = last_star {
            star_ni += 1;
            ni = star_ni;
            pi = star + 1;
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}

/// The ordered set of patterns that make a change relevant.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<PathPattern>,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(patterns: impl IntoIterator<Item = S>) -> Self {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| PathPattern::parse(p.as_ref()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathPattern> {
        self.patterns.iter()
    }

    /// First pattern matching `path`, if any.
    pub fn matching(&self, path: &str) -> Option<&PathPattern> {
        self.patterns.iter().find(|p| p.matches(path))
    }

    /// First (path, pattern) pair where a changed path is relevant.
    ///
    /// An empty set applies no filtering, so any path is relevant.
    pub fn find_relevant<'a, S: AsRef<str>>(&self, paths: &'a [S]) -> Option<(&'a str, String)> {
        paths.iter().map(|p| p.as_ref()).find_map(|path| {
            if self.is_empty() {
                return Some((path, "*".to_string()));
            }
            self.matching(path).map(|p| (path, p.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_is_case_sensitive() {
        let p = PathPattern::parse("src/");
        assert!(p.matches("src/main.rs"));
        assert!(!p.matches("Src/main.rs"));
        assert!(!p.matches("docs/src/readme.md"));
    }

    #[test]
    fn test_plain_file_pattern_is_prefix() {
        let p = PathPattern::parse("pyproject.toml");
        assert!(matches!(p, PathPattern::Prefix(_)));
        assert!(p.matches("pyproject.toml"));
    }

    #[test]
    fn test_glob_forms() {
        assert!(PathPattern::parse("**").matches("anything/at/all"));
        assert!(PathPattern::parse("tests/**").matches("tests/unit/test_a.py"));
        assert!(!PathPattern::parse("tests/**").matches("tests_old/a.py"));
        assert!(PathPattern::parse("ci/*").matches("ci/lint.yml"));
        assert!(!PathPattern::parse("ci/*").matches("ci/nested/lint.yml"));
        assert!(PathPattern::parse("*.py").matches("pkg/mod.py"));
        assert!(!PathPattern::parse("*.py").matches("pkg/mod.pyc"));
        assert!(PathPattern::parse("setup*.cfg").matches("setup.cfg"));
    }

    #[test]
    fn test_multi_wildcard_globs() {
        let py = PathPattern::parse("src/**/*.py");
        assert!(py.matches("src/pkg/mod.py"));
        assert!(py.matches("src/a/b/c/mod.py"));
        assert!(py.matches("src/mod.py"));
        assert!(!py.matches("src/pkg/mod.rs"));
        assert!(!py.matches("lib/pkg/mod.py"));

        let nested_tests = PathPattern::parse("*/tests/*");
        assert!(nested_tests.matches("pkg/tests/test_io.py"));
        assert!(!nested_tests.matches("tests/test_io.py"));
        assert!(!nested_tests.matches("pkg/tests/unit/test_io.py"));

        assert!(PathPattern::parse("**/conftest.py").matches("conftest.py"));
        assert!(PathPattern::parse("**/conftest.py").matches("a/b/conftest.py"));
        assert!(PathPattern::parse("test_*_*.py").matches("tests/test_io_fast.py"));
        assert!(!PathPattern::parse("test_*_*.py").matches("tests/test_io.py"));
    }

    #[test]
    fn test_find_relevant() {
        let set = PatternSet::new(["src/", "tests/"]);
        let paths = vec!["docs/readme.md".to_string(), "tests/test_x.py".to_string()];
        let (path, pattern) = set.find_relevant(&paths).unwrap();
        assert_eq!(path, "tests/test_x.py");
        assert_eq!(pattern, "tests/");

        assert!(set.find_relevant(&["docs/readme.md"]).is_none());
    }

    #[test]
    fn test_empty_set_matches_any_path() {
        let set = PatternSet::default();
        assert!(set.find_relevant(&["docs/readme.md"]).is_some());
        assert!(set.find_relevant::<String>(&[]).is_none());
    }
}
