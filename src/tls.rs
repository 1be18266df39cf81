//! TLS session metadata extraction.
//!
//! After a handshake completes, the connector captures the peer leaf
//! certificate and negotiated parameters into a [`TlsInfo`] snapshot that
//! responses expose through `tls_grabber()`.

use boring::nid::Nid;
use boring::ssl::SslRef;
use boring::x509::{GeneralNameRef, X509NameRef, X509Ref};
use sha2::{Digest, Sha256};

/// Certificate and handshake metadata from a completed TLS session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsInfo {
    /// Server name sent in the handshake (SNI).
    pub extension_server_name: String,
    /// SHA-256 of the raw leaf certificate, lowercase hex.
    pub fingerprint_sha256: String,
    /// SHA-256 of the raw leaf certificate, colon-separated uppercase pairs.
    pub fingerprint_sha256_openssl: String,
    /// Negotiated protocol version: `SSL30`/`TLS10`/`TLS11`/`TLS12`/`TLS13`.
    pub tls_version: String,
    /// Leaf certificate subject common names.
    pub common_name: Vec<String>,
    /// DNS subject alternative names.
    pub dns_names: Vec<String>,
    /// Email subject alternative names.
    pub emails: Vec<String>,
    /// Issuer common names.
    pub issuer_common_name: Vec<String>,
    /// Issuer organizations.
    pub issuer_org: Vec<String>,
    /// Subject organizations.
    pub organization: Vec<String>,
}

impl TlsInfo {
    /// Capture metadata from a finished handshake.
    ///
    /// `server_name` is the SNI value the connector sent.
    pub(crate) fn from_ssl(ssl: &SslRef, server_name: &str) -> Self {
        let mut info = TlsInfo {
            extension_server_name: server_name.to_string(),
            tls_version: map_version(ssl.version_str()),
            ..TlsInfo::default()
        };

        if let Some(cert) = ssl.peer_certificate() {
            info.grab_certificate(&cert);
        }

        info
    }

    fn grab_certificate(&mut self, cert: &X509Ref) {
        self.common_name = name_entries(cert.subject_name(), Nid::COMMONNAME);
        self.organization = name_entries(cert.subject_name(), Nid::ORGANIZATIONNAME);
        self.issuer_common_name = name_entries(cert.issuer_name(), Nid::COMMONNAME);
        self.issuer_org = name_entries(cert.issuer_name(), Nid::ORGANIZATIONNAME);

        if let Some(sans) = cert.subject_alt_names() {
            for san in &sans {
                let san: &GeneralNameRef = san;
                if let Some(dns) = san.dnsname() {
                    self.dns_names.push(dns.to_string());
                } else if let Some(email) = san.email() {
                    self.emails.push(email.to_string());
                }
            }
        }

        if let Ok(der) = cert.to_der() {
            let digest = Sha256::digest(&der);
            self.fingerprint_sha256 = hex::encode(digest);
            self.fingerprint_sha256_openssl = openssl_format(&digest);
        }
    }
}

fn name_entries(name: &X509NameRef, nid: Nid) -> Vec<String> {
    name.entries_by_nid(nid)
        .filter_map(|entry| entry.data().as_utf8().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Map boring's version string onto the compact wire-version labels.
fn map_version(version: &str) -> String {
    match version {
        "SSLv3" => "SSL30",
        "TLSv1" => "TLS10",
        "TLSv1.1" => "TLS11",
        "TLSv1.2" => "TLS12",
        "TLSv1.3" => "TLS13",
        other => other,
    }
    .to_string()
}

/// Colon-separated uppercase hex pairs, as printed by `openssl x509`.
fn openssl_format(digest: &[u8]) -> String {
    digest
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_mapping() {
        assert_eq!(map_version("TLSv1.2"), "TLS12");
        assert_eq!(map_version("TLSv1.3"), "TLS13");
        assert_eq!(map_version("SSLv3"), "SSL30");
        assert_eq!(map_version("TLSv1"), "TLS10");
        assert_eq!(map_version("TLSv1.1"), "TLS11");
    }

    #[test]
    fn test_openssl_format() {
        assert_eq!(openssl_format(&[0x00, 0xab, 0x1f]), "00:AB:1F");
    }

    #[test]
    fn test_fingerprint_formats_agree() {
        let digest = Sha256::digest(b"certificate bytes");
        let hex_lower = hex::encode(digest);
        let colons = openssl_format(&digest);
        assert_eq!(
            colons.replace(':', "").to_lowercase(),
            hex_lower,
            "both renderings must encode the same digest"
        );
    }
}
