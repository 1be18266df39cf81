//! DNS caching for the dial path.
//!
//! The cache dialer coalesces concurrent lookups of the same cold host into
//! a single resolver query (singleflight), stores IPv4 results with a TTL
//! and a usage budget, and hands out cached addresses round-robin. Counters
//! track connections, cache hits/misses, and resolver queries.

pub mod resolver;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex};

use crate::error::{Error, Result};

pub use resolver::HostResolver;

/// Monotonic dialer counters. All increments are atomic.
#[derive(Debug, Default)]
pub struct DialStats {
    total_conn: AtomicU64,
    cache_hit: AtomicU64,
    cache_miss: AtomicU64,
    dns_query: AtomicU64,
    successful_dns_query: AtomicU64,
}

/// A point-in-time copy of [`DialStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_conn: u64,
    pub cache_hit: u64,
    pub cache_miss: u64,
    pub dns_query: u64,
    pub successful_dns_query: u64,
}

impl DialStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_conn: self.total_conn.load(Ordering::Relaxed),
            cache_hit: self.cache_hit.load(Ordering::Relaxed),
            cache_miss: self.cache_miss.load(Ordering::Relaxed),
            dns_query: self.dns_query.load(Ordering::Relaxed),
            successful_dns_query: self.successful_dns_query.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// One cached resolution.
///
/// Valid while `now < expires_at` and the usage budget is not exhausted;
/// the first consumer to observe an invalid entry discards it.
#[derive(Debug)]
struct CacheEntry {
    ips: Vec<Ipv4Addr>,
    expires_at: Instant,
    usage_count: AtomicU64,
    max_usage: u64,
}

impl CacheEntry {
    fn new(ips: Vec<Ipv4Addr>, ttl: Duration, max_usage: u64) -> Self {
        Self {
            ips,
            expires_at: Instant::now() + ttl,
            usage_count: AtomicU64::new(0),
            max_usage,
        }
    }

    /// Take the next address round-robin; the bool reports validity.
    fn ip(&self) -> (Ipv4Addr, bool) {
        let count = self.usage_count.fetch_add(1, Ordering::Relaxed) + 1;
        let index = (count - 1) as usize % self.ips.len();
        let valid = count <= self.max_usage && Instant::now() < self.expires_at;
        (self.ips[index], valid)
    }
}

/// Resolution outcome broadcast to singleflight waiters.
type FlightResult = std::result::Result<(), ()>;

/// Host resolution with a TTL + usage-count cache in front of the resolver.
pub struct CacheDialer {
    resolver: Arc<HostResolver>,
    cache: RwLock<HashMap<String, Arc<CacheEntry>>>,
    inflight: Mutex<HashMap<String, broadcast::Sender<FlightResult>>>,
    ttl: Duration,
    max_usage: u64,
    stats: Arc<DialStats>,
}

impl CacheDialer {
    pub fn new(resolver: Arc<HostResolver>, ttl: Duration, max_usage: u64) -> Arc<Self> {
        Arc::new(Self {
            resolver,
            cache: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            ttl,
            max_usage,
            stats: Arc::new(DialStats::default()),
        })
    }

    /// Shared counters for this dialer.
    pub fn stats(&self) -> Arc<DialStats> {
        Arc::clone(&self.stats)
    }

    /// Resolve `host` to an IPv4 address through the cache.
    ///
    /// Cold hosts go through the singleflight path: the first caller spawns
    /// the resolver task, later callers wait on its broadcast. Only lookups
    /// answered from a pre-existing entry count as cache hits; resolver
    /// failure surfaces as `no dns records for host X`, leaves no entry,
    /// and counts as a miss.
    pub async fn resolve(self: &Arc<Self>, host: &str) -> Result<Ipv4Addr> {
        DialStats::bump(&self.stats.total_conn);

        if let Some(ip) = self.from_cache(host) {
            DialStats::bump(&self.stats.cache_hit);
            return Ok(ip);
        }

        loop {
            let mut rx = {
                let mut inflight = self.inflight.lock().await;
                match inflight.get(host) {
                    Some(tx) => tx.subscribe(),
                    None => {
                        // A flight may have completed between the cache
                        // check and taking this lock.
                        if let Some(ip) = self.from_cache(host) {
                            return Ok(ip);
                        }
                        let (tx, rx) = broadcast::channel(1);
                        inflight.insert(host.to_string(), tx);
                        let dialer = Arc::clone(self);
                        let host = host.to_string();
                        tokio::spawn(async move { dialer.resolve_and_cache(&host).await });
                        rx
                    }
                }
            };

            match rx.recv().await {
                Ok(Ok(())) => {
                    // The entry is cached now. A concurrent expiry between
                    // the fill and this read triggers a fresh flight.
                    if let Some(ip) = self.from_cache(host) {
                        return Ok(ip);
                    }
                }
                Ok(Err(())) | Err(_) => {
                    DialStats::bump(&self.stats.cache_miss);
                    return Err(Error::NoDnsRecords(host.to_string()));
                }
            }
        }
    }

    async fn resolve_and_cache(self: Arc<Self>, host: &str) {
        DialStats::bump(&self.stats.dns_query);

        let outcome = match self.resolver.lookup(host).await {
            Ok(ips) => {
                tracing::debug!(host, addrs = ips.len(), "dns cache fill");
                DialStats::bump(&self.stats.successful_dns_query);
                let entry = Arc::new(CacheEntry::new(ips, self.ttl, self.max_usage));
                self.cache
                    .write()
                    .expect("dns cache lock poisoned")
                    .insert(host.to_string(), entry);
                Ok(())
            }
            Err(_) => {
                tracing::debug!(host, "dns resolution failed");
                self.cache
                    .write()
                    .expect("dns cache lock poisoned")
                    .remove(host);
                Err(())
            }
        };

        if let Some(tx) = self.inflight.lock().await.remove(host) {
            let _ = tx.send(outcome);
        }
    }

    fn from_cache(&self, host: &str) -> Option<Ipv4Addr> {
        let entry = {
            let cache = self.cache.read().expect("dns cache lock poisoned");
            Arc::clone(cache.get(host)?)
        };

        let (ip, valid) = entry.ip();
        if !valid {
            self.cache
                .write()
                .expect("dns cache lock poisoned")
                .remove(host);
            return None;
        }

        Some(ip)
    }
}

impl std::fmt::Debug for CacheDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheDialer")
            .field("ttl", &self.ttl)
            .field("max_usage", &self.max_usage)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_round_robin() {
        let ips = vec![
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            Ipv4Addr::new(10, 0, 0, 3),
        ];
        let entry = CacheEntry::new(ips.clone(), Duration::from_secs(60), 100);
        for round in 0..2 {
            for expected in &ips {
                let (ip, valid) = entry.ip();
                assert_eq!(ip, *expected, "round {round}");
                assert!(valid);
            }
        }
    }

    #[test]
    fn test_entry_usage_budget() {
        let entry = CacheEntry::new(vec![Ipv4Addr::LOCALHOST], Duration::from_secs(60), 2);
        assert!(entry.ip().1);
        assert!(entry.ip().1);
        assert!(!entry.ip().1);
    }

    #[test]
    fn test_entry_ttl_expiry() {
        let entry = CacheEntry::new(vec![Ipv4Addr::LOCALHOST], Duration::ZERO, 100);
        assert!(!entry.ip().1);
    }

    #[tokio::test]
    async fn test_resolve_caches_and_counts() {
        let dialer = CacheDialer::new(Arc::new(HostResolver::System), Duration::from_secs(30), 100);

        for _ in 0..5 {
            let ip = dialer.resolve("localhost").await.unwrap();
            assert_eq!(ip, Ipv4Addr::LOCALHOST);
        }

        let stats = dialer.stats().snapshot();
        assert_eq!(stats.total_conn, 5);
        assert_eq!(stats.dns_query, 1);
        assert_eq!(stats.successful_dns_query, 1);
        assert_eq!(stats.cache_hit, 4);
        assert_eq!(stats.cache_miss, 0);
    }

    #[tokio::test]
    async fn test_singleflight_coalesces() {
        let dialer = CacheDialer::new(Arc::new(HostResolver::System), Duration::from_secs(30), 1000);

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let dialer = Arc::clone(&dialer);
            tasks.push(tokio::spawn(
                async move { dialer.resolve("localhost").await },
            ));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stats = dialer.stats().snapshot();
        assert_eq!(stats.dns_query, 1);
        assert_eq!(stats.cache_miss, 0);
        assert!(stats.cache_hit <= 15);
    }

    #[tokio::test]
    async fn test_usage_budget_triggers_requery() {
        let dialer = CacheDialer::new(Arc::new(HostResolver::System), Duration::from_secs(30), 3);

        for _ in 0..8 {
            dialer.resolve("localhost").await.unwrap();
        }

        let stats = dialer.stats().snapshot();
        // Every 3 uses exhaust an entry and force a new resolver query.
        assert!(stats.dns_query >= 2, "stats: {stats:?}");
    }

    #[tokio::test]
    async fn test_unresolvable_host_error() {
        let dialer = CacheDialer::new(Arc::new(HostResolver::System), Duration::from_secs(30), 10);
        let err = dialer
            .resolve("definitely-not-a-real-host.invalid")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoDnsRecords(_)));
        let stats = dialer.stats().snapshot();
        assert_eq!(stats.cache_miss, 1);
        assert_eq!(stats.successful_dns_query, 0);
    }
}
