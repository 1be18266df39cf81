//! Pretty-printed exchange reports for debugging.
//!
//! Built from a response: `resp.debug().request(true).response(false).print()`.
//! Sections are framed with `=` banners; the DNS section renders the cache
//! dialer counters when a DNS cache is installed.

use std::fmt::Write as _;

use crate::response::Response;

const BANNER_WIDTH: usize = 79;

/// Accumulates report sections over one response.
pub struct DebugReport<'r> {
    response: &'r Response,
    out: String,
}

impl<'r> DebugReport<'r> {
    pub(crate) fn new(response: &'r Response) -> Self {
        Self {
            response,
            out: String::new(),
        }
    }

    /// Append the DNS cache statistics section.
    pub fn dns_stats(mut self) -> Self {
        let Some(stats) = self.response.dns_stats() else {
            return self;
        };
        let snapshot = stats.snapshot();

        banner(&mut self.out, " DNS ");
        let _ = writeln!(self.out, "Total Connections: {}", snapshot.total_conn);
        let _ = writeln!(self.out, "Total DNS Queries: {}", snapshot.dns_query);
        let _ = writeln!(
            self.out,
            "Successful DNS Queries: {}",
            snapshot.successful_dns_query
        );
        let _ = writeln!(self.out, "Cache Hit: {}", snapshot.cache_hit);
        let _ = writeln!(self.out, "Cache Miss: {}", snapshot.cache_miss);
        banner(&mut self.out, "");
        self
    }

    /// Append the request section; `verbose` includes the retained body.
    pub fn request(mut self, verbose: bool) -> Self {
        let req = &self.response.request;

        banner(&mut self.out, " Request ");
        let target = match req.url.query() {
            Some(query) => format!("{}?{query}", req.url.path()),
            None => req.url.path().to_string(),
        };
        let _ = writeln!(self.out, "{} {} {}", req.method, target, self.response.proto);
        for (name, value) in &req.headers {
            let _ = writeln!(self.out, "{}: {}", name, value.to_str().unwrap_or("<binary>"));
        }

        let cookies = self.response.get_cookies(req.url.as_str());
        if !cookies.is_empty() {
            banner(&mut self.out, " Cookie ");
            for cookie in cookies {
                let _ = writeln!(self.out, "{cookie}");
            }
        }

        if verbose {
            if let Some(body) = &req.body {
                banner(&mut self.out, " ReqBody ");
                let _ = writeln!(self.out, "{}", String::from_utf8_lossy(body).trim());
            }
        }

        banner(&mut self.out, "");
        self
    }

    /// Append the response section; `verbose` includes the body (a
    /// terminal read unless body caching is enabled).
    pub fn response(mut self, verbose: bool) -> Self {
        banner(&mut self.out, " Response ");
        let _ = writeln!(self.out, "{} {}", self.response.proto, self.response.status);
        for (name, value) in self.response.headers.inner() {
            let _ = writeln!(self.out, "{}: {}", name, value.to_str().unwrap_or("<binary>"));
        }

        if verbose {
            if let Ok(body) = self.response.body.string() {
                banner(&mut self.out, " ResBody ");
                let _ = writeln!(self.out, "{}", body.trim());
            }
        }

        banner(&mut self.out, "");
        self
    }

    /// The accumulated report text.
    pub fn render(&self) -> &str {
        &self.out
    }

    /// Print the accumulated report to stdout.
    pub fn print(self) {
        println!("{}", self.out);
    }
}

fn banner(out: &mut String, title: &str) {
    let _ = writeln!(out, "{title:=^width$}", width = BANNER_WIDTH);
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_banner_centers_title() {
        let mut out = String::new();
        super::banner(&mut out, " DNS ");
        let line = out.trim_end();
        assert_eq!(line.len(), 79);
        assert!(line.contains(" DNS "));
        assert!(line.starts_with('='));
        assert!(line.ends_with('='));
    }
}
