use regex::Regex;
use std::collections::BTreeSet;

use crate::error::PatternError;

/// Selection of classes to decompile. Names use the `/`-separated internal form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamePattern {
    /// A single class, matched by its whole name.
    Exact(String),
    /// Every class under a package, including nested packages.
    Package(String),
    /// Everything.
    All,
    /// A regular expression that must match the whole name.
    Regex(String),
}

impl NamePattern {
    pub fn exact(name: &str) -> Self {
        Self::Exact(normalize_name(name))
    }

    pub fn package(name: &str) -> Self {
        Self::Package(normalize_name(name))
    }

    /// Parses the textual forms accepted on the command line:
    /// `*`, `.*` and `all` select everything, `pkg/.*` and `pkg/*` select a package,
    /// `re:<expr>` is a raw regex, and anything else is an exact class name.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let raw = raw.trim();
        if matches!(raw, "*" | ".*" | "all") {
            return Ok(Self::All);
        }
        if let Some(expr) = raw.strip_prefix("re:") {
            let pattern = Self::Regex(expr.to_string());
            pattern.compile()?;
            return Ok(pattern);
        }
        if let Some(pkg) = raw
            .strip_suffix("/.*")
            .or_else(|| raw.strip_suffix("/*"))
            .or_else(|| raw.strip_suffix(".*"))
        {
            return Self::parse_package(pkg);
        }
        Self::parse_exact(raw)
    }

    /// Like [`NamePattern::exact`], rejecting an empty name.
    pub fn parse_exact(raw: &str) -> Result<Self, PatternError> {
        let pattern = Self::exact(raw);
        pattern.compile()?;
        Ok(pattern)
    }

    pub fn parse_package(raw: &str) -> Result<Self, PatternError> {
        let pattern = Self::package(raw);
        pattern.compile()?;
        Ok(pattern)
    }

    fn compile(&self) -> Result<Matcher, PatternError> {
        match self {
            Self::All => Ok(Matcher::All),
            Self::Exact(name) if name.is_empty() => Err(PatternError::EmptyName),
            Self::Exact(name) => Ok(Matcher::Exact(name.clone())),
            Self::Package(pkg) if pkg.is_empty() => Err(PatternError::EmptyPackage),
            Self::Package(pkg) => Ok(Matcher::Prefix(format!("{pkg}/"))),
            Self::Regex(expr) => Regex::new(&format!("^(?:{expr})$"))
                .map(Matcher::Regex)
                .map_err(|source| PatternError::InvalidRegex {
                    pattern: expr.clone(),
                    source,
                }),
        }
    }
}

enum Matcher {
    All,
    Exact(String),
    Prefix(String),
    Regex(Regex),
}

impl Matcher {
    fn is_match(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Exact(exact) => name == exact,
            Self::Prefix(prefix) => name.len() > prefix.len() && name.starts_with(prefix.as_str()),
            Self::Regex(re) => re.is_match(name),
        }
    }
}

/// Returns the subset of `all_names` selected by `pattern`, in sorted order.
pub fn match_names<'a, I>(all_names: I, pattern: &NamePattern) -> Result<BTreeSet<String>, PatternError>
where
    I: IntoIterator<Item = &'a String>,
{
    let matcher = pattern.compile()?;
    Ok(all_names
        .into_iter()
        .filter(|name| matcher.is_match(name))
        .cloned()
        .collect())
}

/// Accepts `a.b.C`, `a/b/C` and `a/b/C.class` alike.
pub fn normalize_name(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    let trimmed = trimmed.strip_suffix(".class").unwrap_or(trimmed);
    trimmed.replace(['.', '\\'], "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn all_returns_every_name() -> Result<(), PatternError> {
        let all = names(&["a/B", "a/C", "b/D"]);
        assert_eq!(match_names(&all, &NamePattern::All)?, all);
        Ok(())
    }

    #[test]
    fn exact_matches_whole_name_only() -> Result<(), PatternError> {
        let all = names(&["a/B", "a/BB", "x/a/B"]);
        assert_eq!(match_names(&all, &NamePattern::exact("a/B"))?, names(&["a/B"]));
        assert!(match_names(&all, &NamePattern::exact("a/Z"))?.is_empty());
        Ok(())
    }

    #[test]
    fn package_prefix_selects_names_under_namespace() -> Result<(), PatternError> {
        let all = names(&["a/B", "a/C", "b/D", "ab/E", "a/sub/F"]);
        let matched = match_names(&all, &NamePattern::parse("a/.*")?)?;
        assert_eq!(matched, names(&["a/B", "a/C", "a/sub/F"]));
        Ok(())
    }

    #[test]
    fn dotted_names_are_normalized() -> Result<(), PatternError> {
        let all = names(&["org/example/Demo", "org/example/Other"]);
        let matched = match_names(&all, &NamePattern::parse("org.example.Demo")?)?;
        assert_eq!(matched, names(&["org/example/Demo"]));
        let matched = match_names(&all, &NamePattern::package("org.example"))?;
        assert_eq!(matched.len(), 2);
        Ok(())
    }

    #[test]
    fn regex_is_anchored() -> Result<(), PatternError> {
        let all = names(&["a/Foo", "a/FooBar", "b/Foo"]);
        let matched = match_names(&all, &NamePattern::parse("re:a/Foo")?)?;
        assert_eq!(matched, names(&["a/Foo"]));
        let matched = match_names(&all, &NamePattern::parse("re:.*/Foo")?)?;
        assert_eq!(matched, names(&["a/Foo", "b/Foo"]));
        Ok(())
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        assert!(matches!(
            NamePattern::parse("re:a/(unclosed"),
            Err(PatternError::InvalidRegex { .. })
        ));
        assert!(matches!(NamePattern::parse("  "), Err(PatternError::EmptyName)));
        assert!(matches!(NamePattern::parse("/.*"), Err(PatternError::EmptyPackage)));
        assert!(matches!(
            match_names(&names(&["a/B"]), &NamePattern::Package(String::new())),
            Err(PatternError::EmptyPackage)
        ));
    }
}
