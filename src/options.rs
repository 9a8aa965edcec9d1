//! Server options and their defaults.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

pub const DEFAULT_ADDR: &str = ":8080";
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
/// 30 MiB.
pub const DEFAULT_MAX_POST_MEMORY: u64 = 30 << 20;
pub const DEFAULT_ACCESS_LOG_DIR: &str = "logs";
pub const DEFAULT_ACCESS_LOG_FILE: &str = "access.log";

/// How often the access log starts a new file.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AccessLogOptions {
    pub enabled: bool,
    pub dir: PathBuf,
    pub file_name: String,
    pub rotation: Rotation,
}

/// Server configuration.
///
/// `Options::default()` is an *unresolved* candidate where every field is
/// zero. [`Options::resolved`] fills in the defaults; [`Server::new`] does
/// that for you.
///
/// [`Server::new`]: crate::Server::new
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Options {
    /// `host:port`. A bare `:port` binds every interface.
    pub addr: String,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Hard cap, in bytes, on every request body, whatever the route or
    /// content type. The body is buffered in full before the chain runs, and
    /// a larger one is answered with `413 Payload Too Large` without reaching
    /// any stage. Nothing is spilled to disk.
    pub max_post_memory: u64,
    pub tls_cert_file: Option<PathBuf>,
    pub tls_key_file: Option<PathBuf>,
    /// Treat `/path/` and `/path` as the same route.
    pub ignore_path_last_slash: bool,
    pub access_log: AccessLogOptions,
}

impl Options {
    /// Replaces every zero-valued field with its default. TLS paths pass
    /// through untouched, except that empty paths count as absent.
    pub fn resolved(mut self) -> Self {
        if self.addr.is_empty() {
            self.addr = DEFAULT_ADDR.to_owned();
        }
        if self.read_timeout.is_zero() {
            self.read_timeout = DEFAULT_READ_TIMEOUT;
        }
        if self.write_timeout.is_zero() {
            self.write_timeout = DEFAULT_WRITE_TIMEOUT;
        }
        if self.max_post_memory == 0 {
            self.max_post_memory = DEFAULT_MAX_POST_MEMORY;
        }
        self.tls_cert_file = self.tls_cert_file.filter(|p| !p.as_os_str().is_empty());
        self.tls_key_file = self.tls_key_file.filter(|p| !p.as_os_str().is_empty());
        if self.access_log.dir.as_os_str().is_empty() {
            self.access_log.dir = PathBuf::from(DEFAULT_ACCESS_LOG_DIR);
        }
        if self.access_log.file_name.is_empty() {
            self.access_log.file_name = DEFAULT_ACCESS_LOG_FILE.to_owned();
        }
        self
    }

    /// Rejects a certificate without a key and vice versa.
    pub fn validate(&self) -> Result<(), Error> {
        match (&self.tls_cert_file, &self.tls_key_file) {
            (Some(_), None) => Err(Error::InvalidTls("certificate configured without a key")),
            (None, Some(_)) => Err(Error::InvalidTls("key configured without a certificate")),
            _ => Ok(()),
        }
    }

    /// Certificate and key paths, when both are configured.
    pub fn tls_pair(&self) -> Option<(&Path, &Path)> {
        Some((self.tls_cert_file.as_deref()?, self.tls_key_file.as_deref()?))
    }

    /// Parses [`addr`](Options::addr) into a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, Error> {
        let addr = match self.addr.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => self.addr.clone(),
        };
        if let Ok(parsed) = addr.parse() {
            return Ok(parsed);
        }
        addr.to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| Error::InvalidAddr(self.addr.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_candidate_gets_defaults() {
        let opts = Options::default().resolved();
        assert_eq!(opts.addr, ":8080");
        assert_eq!(opts.read_timeout, Duration::from_secs(30));
        assert_eq!(opts.write_timeout, Duration::from_secs(30));
        assert_eq!(opts.max_post_memory, 30 * 1024 * 1024);
        assert_eq!(opts.tls_pair(), None);
        assert_eq!(opts.access_log.file_name, "access.log");
        assert!(!opts.access_log.enabled);
    }

    #[test]
    fn explicit_values_survive() {
        let opts = Options {
            addr: "127.0.0.1:9000".into(),
            read_timeout: Duration::from_secs(5),
            max_post_memory: 1024,
            ..Options::default()
        }
        .resolved();
        assert_eq!(opts.addr, "127.0.0.1:9000");
        assert_eq!(opts.read_timeout, Duration::from_secs(5));
        assert_eq!(opts.write_timeout, DEFAULT_WRITE_TIMEOUT);
        assert_eq!(opts.max_post_memory, 1024);
    }

    #[test]
    fn resolution_is_idempotent() {
        let once = Options::default().resolved();
        assert_eq!(once.clone().resolved(), once);
    }

    #[test]
    fn partial_tls_is_rejected() {
        let cert_only = Options {
            tls_cert_file: Some("cert.pem".into()),
            ..Options::default()
        }
        .resolved();
        assert!(matches!(cert_only.validate(), Err(Error::InvalidTls(_))));

        let key_only = Options {
            tls_cert_file: Some(PathBuf::new()),
            tls_key_file: Some("key.pem".into()),
            ..Options::default()
        }
        .resolved();
        assert!(matches!(key_only.validate(), Err(Error::InvalidTls(_))));

        let both = Options {
            tls_cert_file: Some("cert.pem".into()),
            tls_key_file: Some("key.pem".into()),
            ..Options::default()
        };
        assert!(both.validate().is_ok());
        assert!(both.tls_pair().is_some());
    }

    #[test]
    fn bare_port_binds_all_interfaces() {
        let opts = Options::default().resolved();
        assert_eq!(opts.socket_addr().unwrap(), "0.0.0.0:8080".parse().unwrap());
    }

    #[test]
    fn garbage_address_is_rejected() {
        let opts = Options { addr: "not an address".into(), ..Options::default() };
        assert!(matches!(opts.socket_addr(), Err(Error::InvalidAddr(_))));
    }
}
