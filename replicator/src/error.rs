use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use audit_sync::error::SyncError;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

pub type ReplicatorResult<T> = Result<T, ReplicatorError>;

/// Backtrace captured when a non-pipeline error is created.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type of the replicator binary.
///
/// Pipeline failures keep their [`SyncError`], startup failures wrap their cause.
#[derive(Debug)]
pub enum ReplicatorError {
    Sync(SyncError),
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    Migration(sqlx::Error, CapturedBacktrace),
    Io(std::io::Error, CapturedBacktrace),
}

impl ReplicatorError {
    pub fn category(&self) -> &'static str {
        match self {
            ReplicatorError::Sync(_) => "pipeline error",
            ReplicatorError::Config(_, _) => "configuration error",
            ReplicatorError::Migration(_, _) => "migration error",
            ReplicatorError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            ReplicatorError::Sync(err) => err.backtrace(),
            ReplicatorError::Config(_, backtrace)
            | ReplicatorError::Migration(_, backtrace)
            | ReplicatorError::Io(_, backtrace) => Some(&backtrace.0),
        }
    }

    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        ReplicatorError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    pub fn migration(err: sqlx::Error) -> Self {
        ReplicatorError::Migration(err, CapturedBacktrace::capture())
    }

    /// Renders the error and its causes for terminal output.
    ///
    /// The backtrace is appended when `RUST_BACKTRACE` is `1` or `full`.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("audit replicator failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        // An aggregated pipeline error already lists every cause in its display.
        if !matches!(self, ReplicatorError::Sync(err) if err.kinds().len() > 1) {
            let mut source = Error::source(self);
            let mut index = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {index}: {err}\n"));
                source = err.source();
                index += 1;
            }
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for ReplicatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicatorError::Sync(err) => write!(f, "{err}"),
            ReplicatorError::Config(source, _) => write!(f, "configuration error: {source}"),
            ReplicatorError::Migration(source, _) => write!(f, "migration error: {source}"),
            ReplicatorError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for ReplicatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReplicatorError::Sync(err) => err.source(),
            ReplicatorError::Config(source, _) => Some(source.as_ref()),
            ReplicatorError::Migration(source, _) => Some(source),
            ReplicatorError::Io(source, _) => Some(source),
        }
    }
}

impl From<SyncError> for ReplicatorError {
    fn from(err: SyncError) -> Self {
        ReplicatorError::Sync(err)
    }
}

impl From<std::io::Error> for ReplicatorError {
    fn from(err: std::io::Error) -> Self {
        ReplicatorError::Io(err, CapturedBacktrace::capture())
    }
}
