//! Response header access with pattern matching.

use http::header::HeaderMap;
use regex::Regex;

/// Read-only view over response headers.
#[derive(Debug, Clone, Default)]
pub struct Headers(HeaderMap);

impl Headers {
    pub fn new(map: HeaderMap) -> Self {
        Self(map)
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values for `name`.
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.0
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Whether any value of `name` matches the pattern. String patterns
    /// match case-insensitively as literals; regex patterns match as-is.
    pub fn contains(&self, name: &str, pattern: impl HeaderMatch) -> bool {
        self.values(name)
            .iter()
            .any(|value| pattern.matches_value(value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The underlying header map.
    pub fn inner(&self) -> &HeaderMap {
        &self.0
    }
}

impl From<HeaderMap> for Headers {
    fn from(map: HeaderMap) -> Self {
        Self(map)
    }
}

/// A pattern a header value can be tested against.
pub trait HeaderMatch {
    fn matches_value(&self, value: &str) -> bool;
}

impl HeaderMatch for &str {
    fn matches_value(&self, value: &str) -> bool {
        value.to_lowercase().contains(&self.to_lowercase())
    }
}

impl HeaderMatch for String {
    fn matches_value(&self, value: &str) -> bool {
        self.as_str().matches_value(value)
    }
}

impl HeaderMatch for &[&str] {
    fn matches_value(&self, value: &str) -> bool {
        self.iter().any(|p| p.matches_value(value))
    }
}

impl<const N: usize> HeaderMatch for [&str; N] {
    fn matches_value(&self, value: &str) -> bool {
        self.as_slice().matches_value(value)
    }
}

impl HeaderMatch for &Regex {
    fn matches_value(&self, value: &str) -> bool {
        self.is_match(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{HeaderName, HeaderValue};

    fn sample() -> Headers {
        let mut map = HeaderMap::new();
        map.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/JSON; charset=utf-8"),
        );
        map.append(
            HeaderName::from_static("set-cookie"),
            HeaderValue::from_static("a=1"),
        );
        map.append(
            HeaderName::from_static("set-cookie"),
            HeaderValue::from_static("b=2"),
        );
        Headers::new(map)
    }

    #[test]
    fn test_get_and_values() {
        let headers = sample();
        assert_eq!(headers.get("Content-Type"), Some("application/JSON; charset=utf-8"));
        assert_eq!(headers.values("set-cookie"), vec!["a=1", "b=2"]);
        assert!(headers.get("missing").is_none());
    }

    #[test]
    fn test_contains_literal_case_insensitive() {
        let headers = sample();
        assert!(headers.contains("content-type", "json"));
        assert!(headers.contains("content-type", "JSON"));
        assert!(!headers.contains("content-type", "xml"));
    }

    #[test]
    fn test_contains_list_and_regex() {
        let headers = sample();
        assert!(headers.contains("set-cookie", ["z=9", "b=2"]));
        let re = Regex::new(r"^a=\d$").unwrap();
        assert!(headers.contains("set-cookie", &re));
    }
}
