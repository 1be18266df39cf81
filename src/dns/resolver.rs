//! Hostname resolution backends.
//!
//! The default backend delegates to the operating system resolver. Custom
//! nameservers (plain UDP or DNS over TLS) are served by hickory-resolver.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;

use crate::error::{Error, Result};

/// A hostname-to-IPv4 resolver.
#[derive(Debug)]
pub enum HostResolver {
    /// Operating system resolution via getaddrinfo.
    System,
    /// hickory-resolver against explicitly configured nameservers.
    Custom(TokioAsyncResolver),
}

impl Default for HostResolver {
    fn default() -> Self {
        Self::System
    }
}

impl HostResolver {
    /// Resolver using a single plain-UDP nameserver, e.g. `"8.8.8.8:53"`.
    /// A missing port defaults to 53.
    pub fn udp(addr: &str) -> Result<Self> {
        let addr = parse_nameserver_addr(addr, 53)?;
        let mut config = ResolverConfig::new();
        config.add_name_server(NameServerConfig::new(addr, Protocol::Udp));
        Ok(Self::Custom(TokioAsyncResolver::tokio(
            config,
            ResolverOpts::default(),
        )))
    }

    /// Resolver speaking DNS over TLS to the given provider addresses,
    /// verifying the provider certificate against `server_name`.
    pub fn dot(server_name: &str, addresses: &[&str]) -> Result<Self> {
        if addresses.is_empty() {
            return Err(Error::config("DNS over TLS requires at least one address"));
        }

        let mut config = ResolverConfig::new();
        for addr in addresses {
            let addr = parse_nameserver_addr(addr, 853)?;
            let mut ns = NameServerConfig::new(addr, Protocol::Tls);
            ns.tls_dns_name = Some(server_name.to_string());
            config.add_name_server(ns);
        }

        Ok(Self::Custom(TokioAsyncResolver::tokio(
            config,
            ResolverOpts::default(),
        )))
    }

    /// Resolve a hostname, keeping IPv4 addresses only.
    pub async fn lookup(&self, host: &str) -> Result<Vec<Ipv4Addr>> {
        let ips: Vec<Ipv4Addr> = match self {
            Self::System => tokio::net::lookup_host((host, 0))
                .await
                .map_err(|_| Error::NoDnsRecords(host.to_string()))?
                .filter_map(|addr| match addr.ip() {
                    IpAddr::V4(ip) => Some(ip),
                    IpAddr::V6(_) => None,
                })
                .collect(),
            Self::Custom(resolver) => resolver
                .lookup_ip(host)
                .await
                .map_err(|_| Error::NoDnsRecords(host.to_string()))?
                .iter()
                .filter_map(|ip| match ip {
                    IpAddr::V4(ip) => Some(ip),
                    IpAddr::V6(_) => None,
                })
                .collect(),
        };

        if ips.is_empty() {
            return Err(Error::NoDnsRecords(host.to_string()));
        }

        Ok(ips)
    }
}

fn parse_nameserver_addr(addr: &str, default_port: u16) -> Result<SocketAddr> {
    if let Ok(addr) = addr.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }
    Err(Error::config(format!("invalid nameserver address: {addr}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nameserver_addr() {
        assert_eq!(
            parse_nameserver_addr("8.8.8.8:53", 53).unwrap(),
            "8.8.8.8:53".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_nameserver_addr("9.9.9.9", 853).unwrap(),
            "9.9.9.9:853".parse::<SocketAddr>().unwrap()
        );
        assert!(parse_nameserver_addr("not an address", 53).is_err());
    }

    #[tokio::test]
    async fn test_system_lookup_localhost() {
        let resolver = HostResolver::System;
        let ips = resolver.lookup("localhost").await.unwrap();
        assert!(ips.contains(&Ipv4Addr::LOCALHOST));
    }

    #[tokio::test]
    async fn test_system_lookup_literal() {
        let resolver = HostResolver::System;
        let ips = resolver.lookup("127.0.0.1").await.unwrap();
        assert_eq!(ips, vec![Ipv4Addr::LOCALHOST]);
    }
}
