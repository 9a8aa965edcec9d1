//! Configuration file loading.
//!
//! Files are TOML. The server reads its settings from the `[http]` table:
//!
//! ```toml
//! [http]
//! addr = ":8080"
//! read_timeout_ms = 5000
//! write_timeout_ms = 5000
//! max_post_memory = "8M"
//! access_log = true
//! access_log_dir = "/var/log/app"
//! access_log_rotate = "hourly"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::options::{AccessLogOptions, Options, Rotation};

/// Deserialises the TOML file at `path` into `T`.
pub fn resolve<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, Error> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|source| Error::Config { path: path.to_owned(), source })
}

/// The `[http]` table as written in a config file. Every field is optional;
/// missing ones resolve to the [`Options`] defaults.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub service_name: String,
    pub addr: String,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// Byte count with an optional `K`, `M` or `G` suffix.
    pub max_post_memory: String,
    pub https_cert_file: String,
    pub https_key_file: String,
    pub ignore_path_last_slash: bool,
    pub access_log: bool,
    pub access_log_dir: String,
    pub access_log_file: String,
    /// `hourly`, `daily` or `never`.
    pub access_log_rotate: String,
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    http: HttpConfig,
}

impl HttpConfig {
    /// Reads the `[http]` table of `path`. A file without one yields defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        resolve::<ConfigFile>(path).map(|file| file.http)
    }
}

impl TryFrom<HttpConfig> for Options {
    type Error = Error;

    fn try_from(cfg: HttpConfig) -> Result<Self, Error> {
        let rotation = match cfg.access_log_rotate.to_ascii_lowercase().as_str() {
            "" | "daily" => Rotation::Daily,
            "hourly" => Rotation::Hourly,
            "never" => Rotation::Never,
            _ => {
                return Err(Error::ConfigValue {
                    field: "access_log_rotate",
                    value: cfg.access_log_rotate,
                });
            }
        };
        let max_post_memory = if cfg.max_post_memory.is_empty() {
            0
        } else {
            parse_size(&cfg.max_post_memory).ok_or_else(|| Error::ConfigValue {
                field: "max_post_memory",
                value: cfg.max_post_memory.clone(),
            })?
        };

        Ok(Options {
            addr: cfg.addr,
            read_timeout: Duration::from_millis(cfg.read_timeout_ms),
            write_timeout: Duration::from_millis(cfg.write_timeout_ms),
            max_post_memory,
            tls_cert_file: non_empty_path(cfg.https_cert_file),
            tls_key_file: non_empty_path(cfg.https_key_file),
            ignore_path_last_slash: cfg.ignore_path_last_slash,
            access_log: AccessLogOptions {
                enabled: cfg.access_log,
                dir: PathBuf::from(cfg.access_log_dir),
                file_name: cfg.access_log_file,
                rotation,
            },
        })
    }
}

fn non_empty_path(path: String) -> Option<PathBuf> {
    (!path.is_empty()).then(|| PathBuf::from(path))
}

/// Parses `"30M"`, `"512k"`, `"1G"` or a plain byte count.
fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let (digits, shift) = match s.char_indices().last()? {
        (i, 'k' | 'K') => (&s[..i], 10),
        (i, 'm' | 'M') => (&s[..i], 20),
        (i, 'g' | 'G') => (&s[..i], 30),
        _ => (s, 0),
    };
    digits.trim().parse::<u64>().ok()?.checked_mul(1 << shift)
}
