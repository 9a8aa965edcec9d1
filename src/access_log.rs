//! Access log: one JSON line per finished request.
//!
//! Lines go through `tracing-appender`'s non-blocking writer. A line is
//! handed to a dedicated writer thread as one message, so concurrent
//! requests never interleave bytes, and a saturated queue drops the line
//! instead of stalling the response.

use std::io::Write;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{self, RollingFileAppender};

use crate::error::Error;
use crate::options::{AccessLogOptions, Rotation};

pub struct AccessLog {
    writer: NonBlocking,
    _guard: WorkerGuard,
}

/// One access-log line.
#[derive(Debug, Serialize)]
pub struct AccessRecord<'a> {
    /// Seconds since the Unix epoch, millisecond precision.
    pub time: f64,
    pub method: &'a str,
    pub status: u16,
    pub path: &'a str,
    pub ip: &'a str,
    pub latency_ms: f64,
}

impl AccessLog {
    /// Opens `dir/file_name`, rotating as configured. Creates `dir` if needed.
    pub fn open(opts: &AccessLogOptions) -> Result<Self, Error> {
        let rotation = match opts.rotation {
            Rotation::Hourly => rolling::Rotation::HOURLY,
            Rotation::Daily => rolling::Rotation::DAILY,
            Rotation::Never => rolling::Rotation::NEVER,
        };
        let appender = RollingFileAppender::builder()
            .rotation(rotation)
            .filename_prefix(opts.file_name.as_str())
            .build(&opts.dir)?;
        Ok(Self::from_writer(appender))
    }

    /// Logs to an arbitrary sink.
    pub fn from_writer<W: Write + Send + 'static>(sink: W) -> Self {
        let (writer, _guard) = tracing_appender::non_blocking(sink);
        Self { writer, _guard }
    }

    /// Writes `record`. Failures are dropped.
    pub fn record(&self, record: &AccessRecord<'_>) {
        let Ok(mut line) = serde_json::to_vec(record) else { return };
        line.push(b'\n');
        let mut writer = self.writer.clone();
        let _ = writer.write_all(&line);
    }
}

impl<'a> AccessRecord<'a> {
    pub fn new(method: &'a str, status: u16, path: &'a str, ip: &'a str, latency: Duration) -> Self {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| (d.as_millis() as f64) / 1000.0)
            .unwrap_or_default();
        Self {
            time,
            method,
            status,
            path,
            ip,
            latency_ms: latency.as_secs_f64() * 1000.0,
        }
    }
}
