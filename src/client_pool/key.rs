//! Destination keys.

use std::fmt;
use url::Url;

use crate::error::TransportError;

/// Normalized `scheme://host:port` identifying one backend target.
///
/// Two targets that differ only in host case or in an omitted default port
/// map to the same key, and therefore to the same pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationKey {
    rendered: String,
    scheme: String,
    host: String,
    port: u16,
}

impl DestinationKey {
    /// Parse and normalize a target URL.
    pub fn parse(target: &str) -> Result<Self, TransportError> {
        let url = Url::parse(target)
            .map_err(|e| TransportError::InvalidDestination(format!("{}: {}", target, e)))?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TransportError::InvalidDestination(format!("{}: missing host", target)))?
            .to_ascii_lowercase();

        let port = url
            .port_or_known_default()
            .ok_or_else(|| TransportError::InvalidDestination(format!("{}: missing port", target)))?;

        let scheme = url.scheme().to_string();
        Ok(Self {
            rendered: format!("{}://{}:{}", scheme, host, port),
            scheme,
            host,
            port,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, as used for the `Host` header and for dialing.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_default_port_and_lowercases_host() {
        let key = DestinationKey::parse("http://Example").unwrap();
        assert_eq!(key.as_str(), "http://example:80");
        assert_eq!(key.authority(), "example:80");

        let tls = DestinationKey::parse("https://svc-a/some/path").unwrap();
        assert_eq!(tls.as_str(), "https://svc-a:443");
    }

    #[test]
    fn equivalent_targets_share_a_key() {
        let a = DestinationKey::parse("http://svc-a:80/").unwrap();
        let b = DestinationKey::parse("http://SVC-A").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_targets_without_host() {
        assert!(DestinationKey::parse("not a url").is_err());
        assert!(DestinationKey::parse("unix:/tmp/socket").is_err());
    }
}
