use std::io;

/// Central error type for the nocturne event engine.
#[derive(Debug)]
pub enum NocturneError {
    /// Underlying I/O error from the OS or network.
    Io(io::Error),
    /// An OS readiness-facility call failed unrecoverably. These are fatal:
    /// the loop cannot continue without a working notification backend.
    Backend {
        op: &'static str,
        source: io::Error,
    },
    /// Connection table reached its maximum capacity.
    TableFull,
    /// Generic or miscellaneous error.
    Other(String),
}

impl std::fmt::Display for NocturneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NocturneError::Io(e) => write!(f, "I/O error: {}", e),
            NocturneError::Backend { op, source } => {
                write!(f, "Backend failure in {}: {}", op, source)
            }
            NocturneError::TableFull => write!(f, "Connection table is full"),
            NocturneError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for NocturneError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NocturneError::Io(e) => Some(e),
            NocturneError::Backend { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for NocturneError {
    fn from(e: io::Error) -> Self {
        NocturneError::Io(e)
    }
}

pub type NocturneResult<T> = Result<T, NocturneError>;
