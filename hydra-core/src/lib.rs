//! Hydra Core
//!
//! Core data structures and cryptography shared by the governance contracts
//! and the proof-of-stake consensus rules.

#![warn(missing_docs)]
#![warn(unused_extern_crates)]
#![forbid(unsafe_code)]

/// Cryptographic primitives and utilities.
pub mod crypto;

/// Core data structures.
pub mod types;

/// Common error types.
pub mod error;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::crypto::*;
    pub use crate::error::*;
    pub use crate::types::*;
}

/// Re-export the prelude for convenient access to common types.
pub use prelude::*;
