//! Redirect policy.
//!
//! The default policy follows up to ten redirects. Variants restrict hops
//! to the original host, forward the original request headers on each hop,
//! or hand the decision to a caller-supplied function. Stopping always
//! means "use the last response": the terminating hop's response is
//! returned, never an error.

use std::sync::Arc;

use url::Url;

/// Default bound on followed redirects.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// One candidate hop presented to the policy.
#[derive(Debug)]
pub struct RedirectAttempt<'a> {
    /// Status code of the redirecting response.
    pub status: u16,
    /// Where the response points to.
    pub next_url: &'a Url,
    /// The URL the exchange started from.
    pub original_url: &'a Url,
    /// Redirects already followed in this exchange.
    pub hops: usize,
}

/// Policy verdict for one candidate hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectAction {
    /// Follow the hop.
    Follow,
    /// Stop and return the redirecting response.
    Stop,
}

/// Caller-supplied replacement policy.
pub type RedirectPolicyFn = Arc<dyn Fn(&RedirectAttempt<'_>) -> RedirectAction + Send + Sync>;

/// The client's redirect behavior.
#[derive(Clone)]
pub struct RedirectPolicy {
    /// Maximum redirects to follow.
    pub max_redirects: usize,
    /// Stop at the first hop leaving the original host.
    pub only_same_host: bool,
    /// Copy every original request header onto each hop.
    pub forward_headers: bool,
    /// Replaces the built-in decision logic entirely when set.
    pub custom: Option<RedirectPolicyFn>,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            only_same_host: false,
            forward_headers: false,
            custom: None,
        }
    }
}

impl RedirectPolicy {
    /// Decide whether to follow a candidate hop.
    pub fn evaluate(&self, attempt: &RedirectAttempt<'_>) -> RedirectAction {
        if let Some(custom) = &self.custom {
            return custom(attempt);
        }

        if attempt.hops >= self.max_redirects {
            return RedirectAction::Stop;
        }

        if self.only_same_host
            && attempt.next_url.host_str() != attempt.original_url.host_str()
        {
            return RedirectAction::Stop;
        }

        RedirectAction::Follow
    }
}

impl std::fmt::Debug for RedirectPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectPolicy")
            .field("max_redirects", &self.max_redirects)
            .field("only_same_host", &self.only_same_host)
            .field("forward_headers", &self.forward_headers)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt<'a>(
        next: &'a Url,
        original: &'a Url,
        hops: usize,
    ) -> RedirectAttempt<'a> {
        RedirectAttempt {
            status: 302,
            next_url: next,
            original_url: original,
            hops,
        }
    }

    #[test]
    fn test_bounded() {
        let policy = RedirectPolicy {
            max_redirects: 2,
            ..RedirectPolicy::default()
        };
        let original = Url::parse("http://a.test/").unwrap();
        let next = Url::parse("http://a.test/next").unwrap();

        assert_eq!(policy.evaluate(&attempt(&next, &original, 0)), RedirectAction::Follow);
        assert_eq!(policy.evaluate(&attempt(&next, &original, 1)), RedirectAction::Follow);
        assert_eq!(policy.evaluate(&attempt(&next, &original, 2)), RedirectAction::Stop);
    }

    #[test]
    fn test_host_restricted() {
        let policy = RedirectPolicy {
            only_same_host: true,
            ..RedirectPolicy::default()
        };
        let original = Url::parse("http://a.test/").unwrap();
        let same = Url::parse("http://a.test/next").unwrap();
        let cross = Url::parse("http://b.test/next").unwrap();

        assert_eq!(policy.evaluate(&attempt(&same, &original, 0)), RedirectAction::Follow);
        assert_eq!(policy.evaluate(&attempt(&cross, &original, 0)), RedirectAction::Stop);
    }

    #[test]
    fn test_custom_overrides_bound() {
        let policy = RedirectPolicy {
            max_redirects: 0,
            custom: Some(Arc::new(|_| RedirectAction::Follow)),
            ..RedirectPolicy::default()
        };
        let original = Url::parse("http://a.test/").unwrap();
        let next = Url::parse("http://b.test/").unwrap();
        assert_eq!(
            policy.evaluate(&attempt(&next, &original, 99)),
            RedirectAction::Follow
        );
    }
}
