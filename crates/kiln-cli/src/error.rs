//! CLI error types.

use thiserror::Error;

use kiln_core::CoreError;

use crate::Exit;

/// Errors surfaced to the terminal.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Env(#[from] kiln_config::EnvError),

    #[error("invalid argument '{arg}': expected key=value")]
    BadArg { arg: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Exit code the process should terminate with.
    pub fn exit_code(&self) -> Exit {
        match self {
            CliError::Core(CoreError::Config(_)) => Exit::ConfigError,
            CliError::Env(_) | CliError::BadArg { .. } => Exit::UsageError,
            _ => Exit::GeneralError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let err = CliError::BadArg {
            arg: "=x".to_string(),
        };
        assert!(matches!(err.exit_code(), Exit::UsageError));

        let err = CliError::Core(CoreError::CommandNotFound("deploy".to_string()));
        assert!(matches!(err.exit_code(), Exit::GeneralError));
    }
}
