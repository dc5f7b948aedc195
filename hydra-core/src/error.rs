//! Error types for Hydra core primitives

use thiserror::Error;

/// Main error type for the core crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    CryptoError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid data format or value
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Transaction related error
    #[error("Transaction error: {0}")]
    TxError(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// A specialized `Result` type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CryptoError(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Error::InvalidData(err.to_string())
    }
}
