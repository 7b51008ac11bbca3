//! HTTP traffic dumping.
//!
//! A dumper tees the wire traffic of one message - the outgoing request
//! with headers and payload, and the incoming response - to some sink for
//! interoperability debugging. Dump failures never fail the message; the
//! sender logs them and moves on.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::transport::{HttpRequest, HttpResponse};

/// Environment variable the outer process may set to activate a default
/// outgoing dumper. The core itself only reads it through
/// [`FileDumper::from_env`].
pub const DUMP_DIRECTORY_ENV: &str = "AS2_HTTP_DUMP_DIRECTORY_OUTGOING";

/// Legacy spelling of [`DUMP_DIRECTORY_ENV`], kept for configurations
/// migrated from older deployments.
pub const DUMP_DIRECTORY_ENV_LEGACY: &str = "AS2.httpDumpDirectoryOutgoing";

/// Sink for per-message HTTP traffic.
pub trait Dumper: Send + Sync {
    /// Record the outgoing request: request line, headers, payload.
    fn dump_outgoing(&self, message_id: &str, request: &HttpRequest) -> std::io::Result<()>;

    /// Record the incoming response.
    fn dump_incoming(&self, message_id: &str, response: &HttpResponse) -> std::io::Result<()>;
}

/// Dumper writing one `.http` file per message into a directory.
///
/// Files are named `as2-outgoing-<millis>-<n>.http` /
/// `as2-incoming-<millis>-<n>.http`; the counter is process-wide so
/// concurrent senders never collide on a name.
pub struct FileDumper {
    directory: PathBuf,
    counter: AtomicU64,
}

impl FileDumper {
    /// Create a dumper writing into `directory` (created if missing).
    pub fn new(directory: impl Into<PathBuf>) -> std::io::Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            counter: AtomicU64::new(0),
        })
    }

    /// Build a dumper from the dump-directory environment variable, if
    /// set. Checks the current name first, then the legacy spelling.
    pub fn from_env() -> Option<std::io::Result<Self>> {
        let directory = std::env::var(DUMP_DIRECTORY_ENV)
            .or_else(|_| std::env::var(DUMP_DIRECTORY_ENV_LEGACY))
            .ok()
            .filter(|d| !d.is_empty())?;
        Some(Self::new(directory))
    }

    fn next_path(&self, direction: &str) -> PathBuf {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        self.directory
            .join(format!("as2-{direction}-{millis}-{count}.http"))
    }

    fn write_dump(
        path: &Path,
        first_line: &str,
        headers: &as2_types::HeaderMap,
        body: &[u8],
    ) -> std::io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        writeln!(file, "{first_line}\r")?;
        for (name, value) in headers.iter() {
            writeln!(file, "{name}: {value}\r")?;
        }
        writeln!(file, "\r")?;
        file.write_all(body)?;
        Ok(())
    }
}

impl Dumper for FileDumper {
    fn dump_outgoing(&self, message_id: &str, request: &HttpRequest) -> std::io::Result<()> {
        let path = self.next_path("outgoing");
        tracing::debug!("dumping outgoing request for {} to {:?}", message_id, path);
        Self::write_dump(
            &path,
            &format!("{} {} HTTP/1.1", request.method.as_str(), request.url),
            &request.headers,
            &request.body,
        )
    }

    fn dump_incoming(&self, message_id: &str, response: &HttpResponse) -> std::io::Result<()> {
        let path = self.next_path("incoming");
        tracing::debug!("dumping incoming response for {} to {:?}", message_id, path);
        Self::write_dump(
            &path,
            &format!("HTTP/1.1 {} {}", response.status, response.reason),
            &response.headers,
            &response.body,
        )
    }
}
