//! Deskclaw error types.

/// Workspace-wide result alias.
pub type Result<T> = std::result::Result<T, DeskclawError>;

/// Errors surfaced by the automation core.
///
/// State conflicts (wrong-status transitions, double assigns) are NOT errors
/// — those are reported as `bool`/`Option` returns so racing callers can
/// back off without unwinding.
#[derive(Debug, thiserror::Error)]
pub enum DeskclawError {
    /// Configuration file could not be read or parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// Malformed cron expression or out-of-range field.
    #[error("Invalid cron expression: {0}")]
    Cron(String),

    /// A record failed validation at the boundary.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Persistence failure (read/write of a record file).
    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
