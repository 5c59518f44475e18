use faunus_core::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Process exit code: 1 for bad input, 2 for runtime failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Core(
                CoreError::Config(_)
                | CoreError::UnknownAtom(_)
                | CoreError::AtomTableInitialized
                | CoreError::AtomTableMissing
                | CoreError::StateVersion { .. },
            ) => 1,
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_problems_exit_with_one() {
        let err = CliError::Core(CoreError::Config("bad".into()));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn runtime_problems_exit_with_two() {
        let err = CliError::Core(CoreError::DriftExceeded {
            drift: 1.0,
            threshold: 0.1,
        });
        assert_eq!(err.exit_code(), 2);
    }
}
