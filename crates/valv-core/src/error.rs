#![forbid(unsafe_code)]

/// Errors produced by the valv PKCS#12 codec.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("unsupported PFX version {0} (only version 3 is supported)")]
    UnsupportedVersion(u64),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("incorrect password: MAC verification failed")]
    IncorrectPassword,

    #[error("no MAC in data: only the empty password is accepted")]
    MissingMac,

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing entry: {0}")]
    MissingEntry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap a lower-level parse failure with the name of the structure being read.
    pub fn malformed(what: &str, err: impl std::fmt::Display) -> Self {
        Error::MalformedContainer(format!("{what}: {err}"))
    }
}
