use std::path::PathBuf;

/// Result type for denv library operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the reconciliation core.
///
/// Only `Configuration` aborts a whole run; everything else is scoped to a
/// single environment, directive, or binary and is collected into the sync
/// report instead of stopping later work.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Declarative config is malformed or ambiguous (fatal before any mutation)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Install method could not be inferred from the environment root
    #[error("Can't deduce install method for {}: no marker file found", .root.display())]
    Detection { root: PathBuf },

    /// A pythonpath target names neither a directory nor a known environment
    #[error("Cannot resolve pythonpath target '{target}': not a directory and not a declared environment")]
    Resolution { target: String },

    /// Export source binary does not exist in the environment's bin directory
    #[error("Binary '{name}' does not exist at {}", .path.display())]
    MissingBinary { name: String, path: PathBuf },

    /// Export link path is occupied by something we refuse to overwrite
    #[error("{0}")]
    ExportConflict(String),

    /// IDE registry file unreadable or malformed
    #[error("IDE registry error for {}: {message}", .path.display())]
    RegistryIo { path: PathBuf, message: String },

    /// The pythonpath state file contains a line that is not `mode|target`
    #[error("Malformed directive at {}:{line}: {content:?}", .path.display())]
    PathState {
        path: PathBuf,
        line: usize,
        content: String,
    },

    /// An external command (pyenv, pip, poetry, ...) exited non-zero
    #[error("Command '{command}' failed with {status}")]
    ExternalTool { command: String, status: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }
}
