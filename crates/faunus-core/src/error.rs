use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown atom type '{0}'")]
    UnknownAtom(String),

    #[error("Atom table already initialized with different content")]
    AtomTableInitialized,

    #[error("Atom table has not been initialized")]
    AtomTableMissing,

    #[error("Group window [{begin}, {cap}) outside particle arena of length {len}")]
    InvalidGroupRange {
        begin: usize,
        cap: usize,
        len: usize,
    },

    #[error("Group activation window violated: {0}")]
    Window(String),

    #[error("Cannot scale container to non-positive volume {0}")]
    NonPositiveVolume(f64),

    #[error("Anisotropic scaling is only supported for periodic boxes")]
    UnsupportedScaling,

    #[error("Initial placement failed after {attempts} attempts")]
    Placement { attempts: usize },

    #[error("Checkpoint version {found} does not match expected {expected}")]
    StateVersion { found: u32, expected: u32 },

    #[error("Checkpoint serialization failed: {0}")]
    StateEncoding(String),

    #[error("Energy drift {drift} exceeds threshold {threshold}")]
    DriftExceeded { drift: f64, threshold: f64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
