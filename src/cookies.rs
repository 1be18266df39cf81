//! RFC 6265 cookies: parsing, matching, and the session jar.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use url::Url;

/// SameSite attribute (RFC 6265bis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// One cookie with its RFC 6265 attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
    /// Set when the Domain attribute was absent; the cookie then matches
    /// its origin host exactly.
    pub host_only: bool,
    /// Creation time, used for RFC 6265 §5.4 ordering.
    pub creation_time: DateTime<Utc>,
}

impl Cookie {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: normalize_domain(&domain.into()),
            path: "/".to_string(),
            secure: false,
            http_only: false,
            same_site: None,
            expires: None,
            max_age: None,
            host_only: true,
            creation_time: Utc::now(),
        }
    }

    /// Parse a `Set-Cookie` header value received for `request_url`.
    pub fn from_set_cookie_header(header: &str, request_url: &Url) -> Option<Self> {
        let request_domain = request_url.host_str()?;

        let mut parts = header.split(';').map(str::trim);
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(name, value.trim(), request_domain);
        let mut domain_attr_present = false;

        for attr in parts {
            let lower = attr.to_lowercase();
            if lower == "secure" {
                cookie.secure = true;
            } else if lower == "httponly" {
                cookie.http_only = true;
            } else if let Some((key, val)) = attr.split_once('=') {
                match key.trim().to_lowercase().as_str() {
                    "domain" => {
                        cookie.domain = normalize_domain(val.trim());
                        domain_attr_present = true;
                    }
                    "path" => cookie.path = val.trim().to_string(),
                    "expires" => cookie.expires = parse_cookie_date(val.trim()),
                    "max-age" => cookie.max_age = val.trim().parse().ok(),
                    "samesite" => {
                        cookie.same_site = match val.trim().to_lowercase().as_str() {
                            "strict" => Some(SameSite::Strict),
                            "lax" => Some(SameSite::Lax),
                            "none" => Some(SameSite::None),
                            _ => None,
                        };
                    }
                    _ => {}
                }
            }
        }

        // RFC 6265 §5.3: host-only unless a Domain attribute was present.
        cookie.host_only = !domain_attr_present;

        // Max-Age takes precedence over Expires; zero or negative deletes.
        if let Some(max_age) = cookie.max_age {
            cookie.expires = if max_age > 0 {
                Some(Utc::now() + chrono::Duration::seconds(max_age))
            } else {
                Some(Utc::now() - chrono::Duration::seconds(1))
            };
        }

        // Never accept a cookie scoped to a public suffix.
        if is_public_suffix(&cookie.domain) {
            return None;
        }

        Some(cookie)
    }

    /// Whether this cookie should be sent with a request to `url`.
    pub fn matches_url(&self, url: &Url) -> bool {
        if self.secure && url.scheme() != "https" {
            return false;
        }

        if let Some(expires) = self.expires {
            if expires < Utc::now() {
                return false;
            }
        }

        let request_domain = match url.host_str() {
            Some(h) => h.to_lowercase(),
            None => return false,
        };

        self.domain_matches(&request_domain) && self.path_matches(url.path())
    }

    /// RFC 6265 §5.1.3 domain matching.
    pub fn domain_matches(&self, request_domain: &str) -> bool {
        let cookie_domain = self.domain.to_lowercase();
        let request_domain = request_domain.to_lowercase();

        if self.host_only {
            return request_domain == cookie_domain;
        }
        if request_domain == cookie_domain {
            return true;
        }
        request_domain.ends_with(&format!(".{cookie_domain}"))
    }

    /// RFC 6265 §5.1.4 path matching.
    pub fn path_matches(&self, request_path: &str) -> bool {
        if request_path == self.path {
            return true;
        }
        if !request_path.starts_with(&self.path) {
            return false;
        }
        if self.path.ends_with('/') {
            return true;
        }
        // "/api" must not match "/apiv2".
        request_path.as_bytes().get(self.path.len()) == Some(&b'/')
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// The cookies attached to one response, with pattern matching.
#[derive(Debug, Clone, Default)]
pub struct Cookies(pub Vec<Cookie>);

impl Cookies {
    /// Parse every `Set-Cookie` header of a response.
    pub fn from_headers(headers: &http::HeaderMap, request_url: &Url) -> Self {
        let cookies = headers
            .get_all(http::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| Cookie::from_set_cookie_header(v, request_url))
            .collect();
        Self(cookies)
    }

    /// Case-insensitive literal match against each cookie's
    /// `name=value` rendering.
    pub fn contains(&self, pattern: &str) -> bool {
        let pattern = pattern.to_lowercase();
        self.0
            .iter()
            .any(|c| c.to_string().to_lowercase().contains(&pattern))
    }

    /// Regex match against each cookie's `name=value` rendering.
    pub fn contains_regex(&self, pattern: &Regex) -> bool {
        self.0.iter().any(|c| pattern.is_match(&c.to_string()))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cookie> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Cookies {
    type Item = &'a Cookie;
    type IntoIter = std::slice::Iter<'a, Cookie>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Thread-safe cookie jar for session handling.
///
/// Writes happen on Set-Cookie receipt (including redirect hops); reads
/// happen when building the Cookie header of each outgoing request.
#[derive(Debug, Default)]
pub struct Jar {
    cookies: RwLock<HashMap<String, Vec<Cookie>>>,
}

impl Jar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cookie, replacing any existing one with the same name,
    /// domain, and path (RFC 6265 §5.3).
    pub fn store(&self, cookie: Cookie) {
        let mut cookies = self.cookies.write().expect("cookie jar lock poisoned");
        let list = cookies.entry(cookie.domain.clone()).or_default();
        if let Some(pos) = list
            .iter()
            .position(|c| c.name == cookie.name && c.path == cookie.path)
        {
            list[pos] = cookie;
        } else {
            list.push(cookie);
        }
    }

    /// Record every `Set-Cookie` of a response received for `request_url`.
    pub fn store_from_headers(&self, headers: &http::HeaderMap, request_url: &Url) {
        for value in headers.get_all(http::header::SET_COOKIE) {
            if let Ok(value) = value.to_str() {
                if let Some(cookie) = Cookie::from_set_cookie_header(value, request_url) {
                    self.store(cookie);
                }
            }
        }
    }

    /// Cookies applicable to `url`.
    pub fn cookies_for_url(&self, url: &Url) -> Vec<Cookie> {
        self.cookies
            .read()
            .expect("cookie jar lock poisoned")
            .values()
            .flatten()
            .filter(|c| c.matches_url(url))
            .cloned()
            .collect()
    }

    /// Render the `Cookie` header value for `url`, ordered per RFC 6265
    /// §5.4: longest path first, then earliest creation.
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        let mut cookies = self.cookies_for_url(url);
        if cookies.is_empty() {
            return None;
        }

        cookies.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| a.creation_time.cmp(&b.creation_time))
        });

        Some(
            cookies
                .iter()
                .map(Cookie::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn get(&self, domain: &str, name: &str) -> Option<Cookie> {
        self.cookies
            .read()
            .expect("cookie jar lock poisoned")
            .get(&normalize_domain(domain))?
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn clear(&self) {
        self.cookies
            .write()
            .expect("cookie jar lock poisoned")
            .clear();
    }

    pub fn len(&self) -> usize {
        self.cookies
            .read()
            .expect("cookie jar lock poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize_domain(domain: &str) -> String {
    domain
        .trim_start_matches('.')
        .trim_end_matches('.')
        .to_lowercase()
}

fn parse_cookie_date(date_str: &str) -> Option<DateTime<Utc>> {
    // RFC 6265 §5.1.1 date formats plus common variations.
    const FORMATS: &[&str] = &[
        "%a, %d %b %Y %H:%M:%S GMT",
        "%A, %d-%b-%y %H:%M:%S GMT",
        "%a %b %e %H:%M:%S %Y",
        "%a, %d-%b-%Y %H:%M:%S GMT",
        "%d %b %Y %H:%M:%S GMT",
        "%a, %d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%SZ",
    ];

    for fmt in FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(date_str, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(date_str, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }

    date_str
        .parse::<i64>()
        .ok()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

/// Reject cookies scoped to a whole public suffix like `.com` or `.co.uk`
/// (RFC 6265 §5.3).
fn is_public_suffix(domain: &str) -> bool {
    let domain = domain.strip_prefix('.').unwrap_or(domain);
    psl::suffix(domain.as_bytes())
        .map(|suffix| suffix.is_known() && suffix.as_bytes() == domain.as_bytes())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_parse_simple_set_cookie() {
        let cookie =
            Cookie::from_set_cookie_header("session=abc123; Path=/; HttpOnly", &url("http://example.com/"))
                .unwrap();
        assert_eq!(cookie.name, "session");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.domain, "example.com");
        assert!(cookie.http_only);
        assert!(cookie.host_only);
    }

    #[test]
    fn test_domain_attribute_enables_subdomains() {
        let cookie = Cookie::from_set_cookie_header(
            "id=1; Domain=example.com",
            &url("http://www.example.com/"),
        )
        .unwrap();
        assert!(!cookie.host_only);
        assert!(cookie.domain_matches("app.example.com"));
        assert!(cookie.domain_matches("example.com"));
        assert!(!cookie.domain_matches("notexample.com"));
    }

    #[test]
    fn test_public_suffix_rejected() {
        assert!(Cookie::from_set_cookie_header("id=1; Domain=com", &url("http://example.com/")).is_none());
    }

    #[test]
    fn test_path_matching() {
        let mut cookie = Cookie::new("a", "b", "example.com");
        cookie.path = "/api".to_string();
        assert!(cookie.path_matches("/api"));
        assert!(cookie.path_matches("/api/v2"));
        assert!(!cookie.path_matches("/apiv2"));
    }

    #[test]
    fn test_expired_cookie_not_sent() {
        let cookie = Cookie::from_set_cookie_header(
            "gone=1; Max-Age=0",
            &url("http://example.com/"),
        )
        .unwrap();
        assert!(!cookie.matches_url(&url("http://example.com/")));
    }

    #[test]
    fn test_secure_requires_https() {
        let cookie =
            Cookie::from_set_cookie_header("s=1; Secure", &url("https://example.com/")).unwrap();
        assert!(cookie.matches_url(&url("https://example.com/")));
        assert!(!cookie.matches_url(&url("http://example.com/")));
    }

    #[test]
    fn test_jar_replaces_same_name_domain_path() {
        let jar = Jar::new();
        jar.store(Cookie::new("id", "old", "example.com"));
        jar.store(Cookie::new("id", "new", "example.com"));
        assert_eq!(jar.len(), 1);
        assert_eq!(jar.get("example.com", "id").unwrap().value, "new");
    }

    #[test]
    fn test_jar_header_ordering() {
        let jar = Jar::new();
        let mut long_path = Cookie::new("b", "2", "example.com");
        long_path.path = "/deep/path".to_string();
        jar.store(Cookie::new("a", "1", "example.com"));
        jar.store(long_path);

        let header = jar.cookie_header(&url("http://example.com/deep/path")).unwrap();
        assert_eq!(header, "b=2; a=1");
    }

    #[test]
    fn test_cookies_contains() {
        let mut headers = http::HeaderMap::new();
        headers.append(
            http::header::SET_COOKIE,
            http::HeaderValue::from_static("Token=SeCrEt; Path=/"),
        );
        let cookies = Cookies::from_headers(&headers, &url("http://example.com/"));
        assert!(cookies.contains("token=secret"));
        assert!(!cookies.contains("missing"));
        assert!(cookies.contains_regex(&Regex::new(r"Token=\w+").unwrap()));
    }

    #[test]
    fn test_parse_cookie_dates() {
        assert!(parse_cookie_date("Mon, 01 Jan 2024 12:00:00 GMT").is_some());
        assert!(parse_cookie_date("1704110400").is_some());
        assert!(parse_cookie_date("not a date").is_none());
    }
}
