//! Include/exclude filtering of units of work.
//!
//! Patterns are globs over the whole canonical reference
//! `group:artifact:version:goal@executionId`. `*` matches any run of
//! characters (including none); every other character, `:` and `@` included,
//! matches itself. Matching is anchored at both ends.

use ffwd_config::ExecutionFilterConfig;

/// A compiled `*`-glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    source: String,
    /// Literal runs between `*` wildcards. A pattern without `*` has one part.
    parts: Vec<String>,
}

impl GlobPattern {
    /// Compiles a pattern.
    pub fn compile(pattern: &str) -> Self {
        Self {
            source: pattern.to_string(),
            parts: pattern.split('*').map(str::to_string).collect(),
        }
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns `true` if the pattern consumes all of `text`.
    pub fn matches(&self, text: &str) -> bool {
        let (first, rest_parts) = match self.parts.split_first() {
            Some(split) => split,
            None => return text.is_empty(),
        };
        let Some((last, middle_parts)) = rest_parts.split_last() else {
            return text == first;
        };

        let Some(rest) = text.strip_prefix(first.as_str()) else {
            return false;
        };
        let Some(mut middle) = rest.strip_suffix(last.as_str()) else {
            return false;
        };

        // Leftmost placement of each literal leaves the most room for the rest.
        for part in middle_parts.iter().filter(|p| !p.is_empty()) {
            match middle.find(part.as_str()) {
                Some(pos) => middle = &middle[pos + part.len()..],
                None => return false,
            }
        }
        true
    }
}

/// Returns `true` if `reference` participates in caching.
///
/// Exclusion wins over inclusion; absent and empty include lists both mean
/// "everything not excluded".
pub fn matches(reference: &str, includes: Option<&[String]>, excludes: Option<&[String]>) -> bool {
    if let Some(excludes) = excludes {
        if excludes
            .iter()
            .any(|p| GlobPattern::compile(p).matches(reference))
        {
            return false;
        }
    }
    match includes {
        None => true,
        Some(includes) if includes.is_empty() => true,
        Some(includes) => includes
            .iter()
            .any(|p| GlobPattern::compile(p).matches(reference)),
    }
}

/// Pre-compiled include/exclude lists.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    includes: Vec<GlobPattern>,
    excludes: Vec<GlobPattern>,
}

impl ExecutionFilter {
    /// Compiles the given pattern lists.
    pub fn new(includes: &[String], excludes: &[String]) -> Self {
        Self {
            includes: includes.iter().map(|p| GlobPattern::compile(p)).collect(),
            excludes: excludes.iter().map(|p| GlobPattern::compile(p)).collect(),
        }
    }

    /// Compiles the `[executions]` section of the configuration.
    pub fn from_config(config: &ExecutionFilterConfig) -> Self {
        Self::new(&config.include, &config.exclude)
    }

    /// Same decision as [`matches`], with pre-compiled patterns.
    pub fn is_cacheable(&self, reference: &str) -> bool {
        if self.excludes.iter().any(|p| p.matches(reference)) {
            return false;
        }
        self.includes.is_empty() || self.includes.iter().any(|p| p.matches(reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REF: &str = "com.acme:my-plugin:1.0:do-something@default-do-something";

    fn strings(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn star_matches_everything() {
        let p = GlobPattern::compile("*");
        assert!(p.matches(REF));
        assert!(p.matches(""));
    }

    #[test]
    fn prefix_glob() {
        assert!(GlobPattern::compile("com.acme*").matches(REF));
        assert!(!GlobPattern::compile("foo*").matches(REF));
    }

    #[test]
    fn match_is_anchored() {
        assert!(!GlobPattern::compile("my-plugin").matches(REF));
        assert!(!GlobPattern::compile("com.acme").matches(REF));
        assert!(GlobPattern::compile("*my-plugin*").matches(REF));
    }

    #[test]
    fn literal_pattern_needs_full_reference() {
        assert!(GlobPattern::compile(REF).matches(REF));
        assert!(!GlobPattern::compile("com.acme:my-plugin:1.0:do-something").matches(REF));
        assert!(GlobPattern::compile("com.acme:my-plugin:1.0:do-something*").matches(REF));
    }

    #[test]
    fn inner_wildcards() {
        assert!(GlobPattern::compile("com.acme:*:do-something@*").matches(REF));
        assert!(GlobPattern::compile("*:1.0:*@default-*").matches(REF));
        assert!(!GlobPattern::compile("*:2.0:*").matches(REF));
    }

    #[test]
    fn overlapping_prefix_and_suffix() {
        let p = GlobPattern::compile("ab*ba");
        assert!(p.matches("aba ba"));
        assert!(p.matches("abba"));
        assert!(!p.matches("aba"));
    }

    #[test]
    fn consecutive_stars() {
        assert!(GlobPattern::compile("com**thing").matches(REF));
    }

    #[test]
    fn absent_and_empty_includes_match_all() {
        assert!(matches(REF, None, None));
        assert!(matches(REF, Some(&[]), None));
        assert!(matches(REF, Some(&[]), Some(&[])));
    }

    #[test]
    fn exclude_always_wins() {
        let includes = strings(&["*"]);
        let excludes = strings(&["*@default-do-something"]);
        assert!(!matches(REF, Some(&includes), Some(&excludes)));
        assert!(!matches(REF, None, Some(&excludes)));
        assert!(!matches(REF, Some(&[]), Some(&excludes)));
    }

    #[test]
    fn non_matching_includes_reject() {
        let includes = strings(&["org.other*", "foo*"]);
        assert!(!matches(REF, Some(&includes), None));
        let includes = strings(&["org.other*", "com.acme*"]);
        assert!(matches(REF, Some(&includes), None));
    }

    #[test]
    fn compiled_filter_agrees_with_function() {
        let cases: [(&[&str], &[&str]); 4] = [
            (&[], &[]),
            (&["com.acme*"], &[]),
            (&["foo*"], &[]),
            (&["*"], &["*:do-something@*"]),
        ];
        for (inc, exc) in cases {
            let inc = strings(inc);
            let exc = strings(exc);
            let filter = ExecutionFilter::new(&inc, &exc);
            assert_eq!(
                filter.is_cacheable(REF),
                matches(REF, Some(&inc), Some(&exc)),
                "includes={inc:?} excludes={exc:?}"
            );
        }
    }

    #[test]
    fn filter_from_config() {
        let config = ExecutionFilterConfig {
            include: vec![],
            exclude: vec!["*@deploy".to_string()],
        };
        let filter = ExecutionFilter::from_config(&config);
        assert!(filter.is_cacheable("g:a:1:compile@default"));
        assert!(!filter.is_cacheable("g:a:1:deploy@deploy"));
    }
}
