use thiserror::Error;

/// Every failure pkglab can report to a user. One variant per kind named in
/// the command surface; CLI exit codes and messages are derived from these,
/// never from the wrapped [`anyhow::Error`] directly.
#[derive(Debug, Error)]
pub enum PkglabError {
    #[error("ConflictingOptions: {0}")]
    ConflictingOptions(String),

    #[error("UnknownPackage: {0}")]
    UnknownPackage(String),

    #[error("UnknownTag: {0}")]
    UnknownTag(String),

    #[error("InvalidWorkspace: {0}")]
    InvalidWorkspace(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("RegistryDown: {0}")]
    RegistryDown(String),

    #[error("PackFailed: {0}")]
    PackFailed(String),

    #[error("PublishFailed: {0}")]
    PublishFailed(String),

    #[error("InstallFailed: {0}")]
    InstallFailed(String),

    #[error("StateCorrupt: {0}")]
    StateCorrupt(String),

    /// Catch-all for I/O and subprocess failures that don't map to a more
    /// specific kind. Kept last so `match` arms listing the named kinds above
    /// read as the exhaustive, meaningful set.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
