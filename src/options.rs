//! Declarative client configuration.
//!
//! An `Options` value accumulates client middlewares (applied once when the
//! options are attached with `set_options`) and request middlewares
//! (applied to every outgoing request), plus scalar flags the client
//! consults per request (retry budget, body caching, history).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use url::Url;

use crate::dns::{CacheDialer, HostResolver};
use crate::error::{Error, Result};
use crate::middleware::{client_mw, request_mw, ClientMiddleware, RequestMiddleware};
use crate::redirect::{RedirectAttempt, RedirectAction, RedirectPolicyFn};

/// Scalar settings the client consults on every request.
#[derive(Debug, Clone)]
pub struct AppliedOptions {
    pub retry_max: u32,
    pub retry_wait: Duration,
    pub cache_body: bool,
    pub history: bool,
    pub remote_address: bool,
}

impl Default for AppliedOptions {
    fn default() -> Self {
        Self {
            retry_max: 0,
            retry_wait: Duration::from_secs(1),
            cache_body: false,
            history: false,
            remote_address: false,
        }
    }
}

/// Builder of client behavior, attached with `Client::set_options`.
#[derive(Default)]
pub struct Options {
    pub(crate) cli_mw: Vec<ClientMiddleware>,
    pub(crate) req_mw: Vec<RequestMiddleware>,
    pub(crate) applied: AppliedOptions,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_cli_mw(mut self, mw: ClientMiddleware) -> Self {
        self.cli_mw.push(mw);
        self
    }

    fn add_req_mw(mut self, mw: RequestMiddleware) -> Self {
        self.req_mw.push(mw);
        self
    }

    /// Connect through a Unix domain socket instead of TCP.
    pub fn unix_domain_socket(self, socket_path: impl Into<std::path::PathBuf>) -> Self {
        let path = socket_path.into();
        self.add_cli_mw(client_mw(move |client| {
            client.dial.unix_socket = Some(path);
            Ok(())
        }))
    }

    /// Cache DNS lookups for `ttl`, reusing each result at most
    /// `max_usage` times. Zero values disable the cache.
    pub fn dns_cache(self, ttl: Duration, max_usage: u64) -> Self {
        self.add_cli_mw(client_mw(move |client| {
            if !ttl.is_zero() && max_usage != 0 {
                let resolver = Arc::clone(&client.dial.resolver);
                client.dial.dns_cache = Some(CacheDialer::new(resolver, ttl, max_usage));
            }
            Ok(())
        }))
    }

    /// Resolve hostnames against a custom UDP nameserver, e.g. `"1.1.1.1:53"`.
    pub fn dns(self, nameserver: impl Into<String>) -> Self {
        let nameserver = nameserver.into();
        self.add_cli_mw(client_mw(move |client| {
            client.dial.resolver = Arc::new(HostResolver::udp(&nameserver)?);
            Ok(())
        }))
    }

    /// Configure DNS over TLS; continue with a provider method.
    pub fn dns_over_tls(self) -> DnsOverTls {
        DnsOverTls { opt: self }
    }

    /// Hard wall-clock limit for each request attempt.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.add_cli_mw(client_mw(move |client| {
            client.timeout = timeout;
            Ok(())
        }))
    }

    /// Bind outgoing sockets to a local interface address.
    pub fn interface_addr(self, address: impl Into<String>) -> Self {
        let address = address.into();
        self.add_cli_mw(client_mw(move |client| {
            let ip = address
                .parse()
                .map_err(|_| Error::config(format!("cannot resolve interface address {address}")))?;
            client.dial.local_addr = Some(ip);
            Ok(())
        }))
    }

    /// Route requests through an HTTP proxy. A list picks one at random.
    pub fn proxy(self, proxy: impl Into<ProxySelector>) -> Self {
        let selector = proxy.into();
        self.add_cli_mw(client_mw(move |client| {
            let Some(chosen) = selector.pick() else {
                return Ok(());
            };
            let url = Url::parse(&chosen)
                .map_err(|e| Error::config(format!("invalid proxy URL {chosen}: {e}")))?;
            client.transport.config.proxy = Some(url);
            Ok(())
        }))
    }

    /// Send Basic credentials with every request that has no Authorization
    /// header yet. Accepts `"user:pass"`, a pair, or a one-entry map.
    pub fn basic_auth(self, auth: impl Into<BasicAuth>) -> Self {
        let auth = auth.into();
        self.add_req_mw(request_mw(move |req: &mut crate::request::Request<'_>| {
            if req.headers().contains_key(AUTHORIZATION) {
                return Ok(());
            }
            let (user, password) = auth.credentials()?;
            let encoded = BASE64.encode(format!("{user}:{password}"));
            let value = HeaderValue::from_str(&format!("Basic {encoded}"))
                .map_err(|e| Error::config(format!("invalid basic auth value: {e}")))?;
            req.headers_mut().insert(AUTHORIZATION, value);
            Ok(())
        }))
    }

    /// Send a Bearer token with every request.
    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.add_req_mw(request_mw(move |req: &mut crate::request::Request<'_>| {
            if !token.is_empty() {
                let value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| Error::config(format!("invalid bearer token: {e}")))?;
                req.headers_mut().append(AUTHORIZATION, value);
            }
            Ok(())
        }))
    }

    /// Override the User-Agent header. A list picks one at random per
    /// request.
    pub fn user_agent(self, agent: impl Into<UserAgents>) -> Self {
        let agents = agent.into();
        self.add_req_mw(request_mw(move |req: &mut crate::request::Request<'_>| {
            let Some(ua) = agents.pick() else {
                return Ok(());
            };
            let value = HeaderValue::from_str(&ua)
                .map_err(|e| Error::config(format!("invalid user agent: {e}")))?;
            req.headers_mut().insert(USER_AGENT, value);
            Ok(())
        }))
    }

    /// Override the Content-Type header on every request.
    pub fn content_type(self, content_type: impl Into<String>) -> Self {
        let content_type = content_type.into();
        self.add_req_mw(request_mw(move |req: &mut crate::request::Request<'_>| {
            if !content_type.is_empty() {
                let value = HeaderValue::from_str(&content_type)
                    .map_err(|e| Error::config(format!("invalid content type: {e}")))?;
                req.headers_mut().insert(CONTENT_TYPE, value);
            }
            Ok(())
        }))
    }

    /// Retain response bodies so terminal reads can repeat.
    pub fn cache_body(mut self) -> Self {
        self.applied.cache_body = true;
        self
    }

    /// Capture the server's remote address into each response.
    pub fn get_remote_address(mut self) -> Self {
        self.applied.remote_address = true;
        self
    }

    /// Send `Connection: close` and disable connection reuse.
    pub fn disable_keep_alive(self) -> Self {
        self.add_cli_mw(client_mw(|client| {
            client.transport.config.disable_keep_alive = true;
            Ok(())
        }))
    }

    /// Re-execute requests answered with a retriable status, up to
    /// `retry_max` extra attempts spaced by `retry_wait` (default 1 s).
    pub fn retry(mut self, retry_max: u32, retry_wait: Option<Duration>) -> Self {
        self.applied.retry_max = retry_max;
        self.applied.retry_wait = retry_wait.unwrap_or(Duration::from_secs(1));
        self
    }

    /// Record intermediate redirect responses on the client.
    ///
    /// Debugging aid only: the history buffer is not meant for concurrent
    /// requests.
    pub fn history(mut self) -> Self {
        self.applied.history = true;
        self
    }

    /// Force HTTP/2 (offer `h2` via ALPN and use it when negotiated).
    pub fn http2(self, enable: bool) -> Self {
        self.add_cli_mw(client_mw(move |client| {
            client.transport.config.http2 = enable;
            client.tls.alpn_h2 = enable;
            Ok(())
        }))
    }

    /// Maintain a cookie session across requests.
    pub fn session(self) -> Self {
        self.add_cli_mw(client_mw(|client| {
            client.jar = Some(Arc::new(crate::cookies::Jar::new()));
            Ok(())
        }))
    }

    /// Follow at most `max_redirects` redirects.
    pub fn max_redirects(self, max_redirects: usize) -> Self {
        self.add_cli_mw(client_mw(move |client| {
            client.redirect.max_redirects = max_redirects;
            Ok(())
        }))
    }

    /// Stop at the first redirect leaving the original host.
    pub fn follow_only_host_redirects(self) -> Self {
        self.add_cli_mw(client_mw(|client| {
            client.redirect.only_same_host = true;
            Ok(())
        }))
    }

    /// Copy the original request headers onto every redirect hop.
    pub fn forward_headers_on_redirect(self) -> Self {
        self.add_cli_mw(client_mw(|client| {
            client.redirect.forward_headers = true;
            Ok(())
        }))
    }

    /// Replace the redirect decision logic entirely.
    pub fn redirect_policy(
        self,
        policy: impl Fn(&RedirectAttempt<'_>) -> RedirectAction + Send + Sync + 'static,
    ) -> Self {
        let policy: RedirectPolicyFn = Arc::new(policy);
        self.add_cli_mw(client_mw(move |client| {
            client.redirect.custom = Some(policy);
            Ok(())
        }))
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("client_middlewares", &self.cli_mw.len())
            .field("request_middlewares", &self.req_mw.len())
            .field("applied", &self.applied)
            .finish()
    }
}

/// DNS-over-TLS provider selection.
///
/// Provider addresses follow the AdGuard DNS providers knowledge base.
pub struct DnsOverTls {
    opt: Options,
}

impl DnsOverTls {
    /// AdGuard DNS.
    pub fn adguard(self) -> Options {
        self.add_provider("dns.adguard-dns.com", &["94.140.14.14:853", "94.140.15.15:853"])
    }

    /// Google Public DNS.
    pub fn google(self) -> Options {
        self.add_provider("dns.google", &["8.8.8.8:853", "8.8.4.4:853"])
    }

    /// Cloudflare DNS.
    pub fn cloudflare(self) -> Options {
        self.add_provider(
            "1dot1dot1dot1.cloudflare-dns.com",
            &["1.1.1.1:853", "1.0.0.1:853"],
        )
    }

    /// Quad9 DNS.
    pub fn quad9(self) -> Options {
        self.add_provider("dns.quad9.net", &["9.9.9.9:853", "149.112.112.112:853"])
    }

    /// SWITCH DNS.
    pub fn switch(self) -> Options {
        self.add_provider("dns.switch.ch", &["130.59.31.248:853", "130.59.31.251:853"])
    }

    /// CIRA Canadian Shield.
    pub fn cira_shield(self) -> Options {
        self.add_provider(
            "private.canadianshield.cira.ca",
            &["149.112.121.10:853", "149.112.122.10:853"],
        )
    }

    /// AliDNS.
    pub fn ali(self) -> Options {
        self.add_provider("dns.alidns.com", &["223.5.5.5:853", "223.6.6.6:853"])
    }

    /// Quad101 DNS.
    pub fn quad101(self) -> Options {
        self.add_provider(
            "101.101.101.101",
            &["101.101.101.101:853", "101.102.103.104:853"],
        )
    }

    /// Secure DNS (dot.sb).
    pub fn sb(self) -> Options {
        self.add_provider("dot.sb", &["185.222.222.222:853", "45.11.45.11:853"])
    }

    /// DNS Forge.
    pub fn forge(self) -> Options {
        self.add_provider("dnsforge.de", &["176.9.93.198:853", "176.9.1.117:853"])
    }

    /// LibreDNS.
    pub fn libredns(self) -> Options {
        self.add_provider("dot.libredns.gr", &["116.202.176.26:853"])
    }

    /// A custom DNS-over-TLS provider.
    pub fn add_provider(self, server_name: &str, addresses: &[&str]) -> Options {
        let server_name = server_name.to_string();
        let addresses: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
        self.opt.add_cli_mw(client_mw(move |client| {
            let addrs: Vec<&str> = addresses.iter().map(String::as_str).collect();
            client.dial.resolver = Arc::new(HostResolver::dot(&server_name, &addrs)?);
            Ok(())
        }))
    }
}

/// One proxy or a list to pick from at random.
pub enum ProxySelector {
    Single(String),
    List(Vec<String>),
}

impl ProxySelector {
    fn pick(&self) -> Option<String> {
        match self {
            Self::Single(proxy) if proxy.is_empty() => None,
            Self::Single(proxy) => Some(proxy.clone()),
            Self::List(list) => list.get(random_index(list.len())?).cloned(),
        }
    }
}

impl From<&str> for ProxySelector {
    fn from(proxy: &str) -> Self {
        Self::Single(proxy.to_string())
    }
}

impl From<String> for ProxySelector {
    fn from(proxy: String) -> Self {
        Self::Single(proxy)
    }
}

impl From<Vec<String>> for ProxySelector {
    fn from(list: Vec<String>) -> Self {
        Self::List(list)
    }
}

impl From<&[&str]> for ProxySelector {
    fn from(list: &[&str]) -> Self {
        Self::List(list.iter().map(|s| s.to_string()).collect())
    }
}

/// One user agent or a list to pick from per request.
pub enum UserAgents {
    Single(String),
    List(Vec<String>),
}

impl UserAgents {
    fn pick(&self) -> Option<String> {
        match self {
            Self::Single(ua) => Some(ua.clone()),
            Self::List(list) => list.get(random_index(list.len())?).cloned(),
        }
    }
}

impl From<&str> for UserAgents {
    fn from(ua: &str) -> Self {
        Self::Single(ua.to_string())
    }
}

impl From<String> for UserAgents {
    fn from(ua: String) -> Self {
        Self::Single(ua)
    }
}

impl From<Vec<String>> for UserAgents {
    fn from(list: Vec<String>) -> Self {
        Self::List(list)
    }
}

impl From<&[&str]> for UserAgents {
    fn from(list: &[&str]) -> Self {
        Self::List(list.iter().map(|s| s.to_string()).collect())
    }
}

/// Basic-auth credentials in any of the accepted shapes.
pub enum BasicAuth {
    /// `"user:password"`.
    Joined(String),
    /// Separate user and password.
    Pair(String, String),
    /// One-entry map of user to password.
    Map(HashMap<String, String>),
}

impl BasicAuth {
    fn credentials(&self) -> Result<(String, String)> {
        let (user, password) = match self {
            Self::Joined(joined) => {
                let (user, password) = joined.split_once(':').ok_or_else(|| {
                    Error::config(format!("malformed basic authorization string: {joined}"))
                })?;
                (user.to_string(), password.to_string())
            }
            Self::Pair(user, password) => (user.clone(), password.clone()),
            Self::Map(map) => {
                if map.len() != 1 {
                    return Err(Error::config(
                        "basic authorization map should contain one entry",
                    ));
                }
                let (user, password) = map.iter().next().expect("map checked non-empty");
                (user.clone(), password.clone())
            }
        };

        if user.is_empty() || password.is_empty() {
            return Err(Error::config("basic authorization fields cannot be empty"));
        }

        Ok((user, password))
    }
}

impl From<&str> for BasicAuth {
    fn from(joined: &str) -> Self {
        Self::Joined(joined.to_string())
    }
}

impl From<String> for BasicAuth {
    fn from(joined: String) -> Self {
        Self::Joined(joined)
    }
}

impl From<(&str, &str)> for BasicAuth {
    fn from((user, password): (&str, &str)) -> Self {
        Self::Pair(user.to_string(), password.to_string())
    }
}

impl From<(String, String)> for BasicAuth {
    fn from((user, password): (String, String)) -> Self {
        Self::Pair(user, password)
    }
}

impl From<HashMap<String, String>> for BasicAuth {
    fn from(map: HashMap<String, String>) -> Self {
        Self::Map(map)
    }
}

/// Uniform random index for selector lists.
fn random_index(len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let mut raw = [0u8; 8];
    if getrandom::getrandom(&mut raw).is_err() {
        return Some(0);
    }
    Some(u64::from_le_bytes(raw) as usize % len)
}
