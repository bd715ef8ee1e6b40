use regex::Regex;
use std::fmt;

/// Matches window origins against an allow-list. Origins are compared as
/// full serialized origins (`https://host:port`), never substrings.
#[derive(Debug, Clone)]
pub enum DomainMatcher {
    Any,
    Exact(String),
    Pattern(Regex),
    AnyOf(Vec<DomainMatcher>),
}

impl DomainMatcher {
    pub fn exact(domain: impl Into<String>) -> Self {
        Self::Exact(domain.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Pattern(Regex::new(pattern)?))
    }

    pub fn any_of(matchers: impl IntoIterator<Item = DomainMatcher>) -> Self {
        Self::AnyOf(matchers.into_iter().collect())
    }

    pub fn matches(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(domain) => domain == origin,
            Self::Pattern(regex) => regex.is_match(origin),
            Self::AnyOf(matchers) => matchers.iter().any(|m| m.matches(origin)),
        }
    }
}

impl Default for DomainMatcher {
    fn default() -> Self {
        Self::Any
    }
}

impl From<&str> for DomainMatcher {
    fn from(domain: &str) -> Self {
        if domain == "*" {
            Self::Any
        } else {
            Self::Exact(domain.to_string())
        }
    }
}

impl fmt::Display for DomainMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Exact(domain) => write!(f, "{domain}"),
            Self::Pattern(regex) => write!(f, "/{regex}/"),
            Self::AnyOf(matchers) => {
                write!(f, "[")?;
                for (i, matcher) in matchers.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{matcher}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_everything() {
        let matcher = DomainMatcher::Any;
        assert!(matcher.matches("https://example.com"));
        assert!(matcher.matches("http://localhost:8080"));
        assert!(matcher.matches(""));
    }

    #[test]
    fn exact_requires_full_equality() {
        let matcher = DomainMatcher::exact("https://example.com");
        assert!(matcher.matches("https://example.com"));
        assert!(!matcher.matches("https://example.com.evil.net"));
        assert!(!matcher.matches("https://sub.example.com"));
        assert!(!matcher.matches("http://example.com"));
    }

    #[test]
    fn pattern_matches_by_regex() {
        let matcher = DomainMatcher::pattern(r"^https://([a-z]+\.)?example\.com$").unwrap();
        assert!(matcher.matches("https://example.com"));
        assert!(matcher.matches("https://pay.example.com"));
        assert!(!matcher.matches("https://example.org"));
    }

    #[test]
    fn pattern_rejects_invalid_regex() {
        assert!(DomainMatcher::pattern("(unclosed").is_err());
    }

    #[test]
    fn any_of_matches_if_any_member_matches() {
        let matcher = DomainMatcher::any_of([
            DomainMatcher::exact("https://one.example.com"),
            DomainMatcher::pattern(r"^https://two\.").unwrap(),
        ]);
        assert!(matcher.matches("https://one.example.com"));
        assert!(matcher.matches("https://two.example.org"));
        assert!(!matcher.matches("https://three.example.com"));
    }

    #[test]
    fn wildcard_string_becomes_any() {
        let matcher = DomainMatcher::from("*");
        assert!(matches!(matcher, DomainMatcher::Any));

        let matcher = DomainMatcher::from("https://example.com");
        assert!(matches!(matcher, DomainMatcher::Exact(_)));
    }

    #[test]
    fn display_forms() {
        assert_eq!(DomainMatcher::Any.to_string(), "*");
        assert_eq!(
            DomainMatcher::exact("https://example.com").to_string(),
            "https://example.com"
        );
        let matcher = DomainMatcher::any_of([
            DomainMatcher::Any,
            DomainMatcher::exact("https://example.com"),
        ]);
        assert_eq!(matcher.to_string(), "[*, https://example.com]");
    }
}
