//! Cryptographic primitives and utilities for Hydra.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use ed25519_dalek::{Signature as Ed25519Signature, Signer, SigningKey, Verifier, VerifyingKey};
use log::debug;
use primitive_types::U256;
use rand_core::OsRng;
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// A 32-byte hash output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Hash(pub [u8; 32]);

impl From<blake3::Hash> for Hash {
    fn from(h: blake3::Hash) -> Self {
        Self(*h.as_bytes())
    }
}

impl Hash {
    /// Creates a new zero-initialized hash.
    pub fn zero() -> Self {
        Hash([0u8; 32])
    }

    /// Creates a hash from a byte slice.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() == 32 {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(bytes);
            Some(Self(hash))
        } else {
            None
        }
    }

    /// Returns the hash as a byte slice.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns true for the all-zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Computes the BLAKE3 hash of the given data.
    pub fn blake3(data: &[u8]) -> Self {
        Hash::from(blake3::hash(data))
    }

    /// Computes the SHA-256 hash of the given data.
    pub fn sha256(data: &[u8]) -> Self {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&Sha256::digest(data));
        Hash(hash)
    }

    /// Computes SHA-256 applied twice, the identity hash for transactions,
    /// headers and stake kernels.
    pub fn sha256d(data: &[u8]) -> Self {
        Self::sha256(Self::sha256(data).as_bytes())
    }

    /// Interprets the hash as a little-endian 256-bit integer.
    pub fn to_u256(&self) -> U256 {
        U256::from_little_endian(&self.0)
    }
}

impl Default for Hash {
    fn default() -> Self {
        Hash::zero()
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for Hash {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Hash::from_slice(&bytes)
            .ok_or_else(|| crate::Error::InvalidData(format!("hash must be 32 bytes, got {}", bytes.len())))
    }
}

/// Computes `ripemd160(sha256(data))`.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(sha));
    out
}

/// Computes the Keccak-256 digest used for contract function selectors.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// A 20-byte account or contract address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The all-zero address.
    pub fn zero() -> Self {
        Address([0u8; 20])
    }

    /// Creates an address from a 20-byte slice.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() == 20 {
            let mut out = [0u8; 20];
            out.copy_from_slice(bytes);
            Some(Self(out))
        } else {
            None
        }
    }

    /// Builds a low-numbered address such as the reserved system contracts
    /// (`0x…90`, `0x…91`, `0x…92`).
    pub fn from_low_u64_be(value: u64) -> Self {
        let mut out = [0u8; 20];
        out[12..].copy_from_slice(&value.to_be_bytes());
        Address(out)
    }

    /// Derives the address of a public key.
    pub fn from_public_key(key: &PublicKey) -> Self {
        Address(hash160(key.as_bytes()))
    }

    /// Returns the address bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns true for the all-zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Left-pads the address into a 32-byte ABI word.
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed)?;
        Address::from_slice(&bytes)
            .ok_or_else(|| crate::Error::InvalidData(format!("address must be 20 bytes, got {}", bytes.len())))
    }
}

/// Public key wrapper for ed25519
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Wraps raw key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(*bytes)
    }

    /// Placeholder key carried by coinbase inputs.
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Returns the key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The address this key controls.
    pub fn address(&self) -> Address {
        Address::from_public_key(self)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A digital signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    /// Parses a signature from its wire bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 64] = bytes.try_into().ok()?;
        Some(Signature(array))
    }

    /// Returns the signature as an owned byte vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl From<Ed25519Signature> for Signature {
    fn from(signature: Ed25519Signature) -> Self {
        Signature(signature.to_bytes())
    }
}

/// Key pair for signing and verification
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Secret signing key bytes.
    pub secret_key: [u8; 32],
    /// Matching public key.
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new key pair.
    pub fn generate() -> Result<Self> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let keypair = Self::from_signing_key(&signing_key);
        debug!("Generated key pair for address {}", keypair.address());
        Ok(keypair)
    }

    /// Derives a key pair from a fixed 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::from_signing_key(&SigningKey::from_bytes(seed))
    }

    fn from_signing_key(signing_key: &SigningKey) -> Self {
        Self {
            secret_key: signing_key.to_bytes(),
            public_key: PublicKey(signing_key.verifying_key().to_bytes()),
        }
    }

    /// Signs a message with the key pair's secret key.
    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        let signing_key = SigningKey::from_bytes(&self.secret_key);
        Ok(Signature(signing_key.sign(message).to_bytes()))
    }

    /// The address controlled by this key pair.
    pub fn address(&self) -> Address {
        self.public_key.address()
    }
}

/// Verifies an ed25519 signature. Malformed keys verify as `false`.
pub fn verify_signature(pubkey: &PublicKey, message: &[u8], signature: &Signature) -> Result<bool> {
    let verifying_key = match VerifyingKey::from_bytes(pubkey.as_bytes()) {
        Ok(key) => key,
        Err(_) => return Ok(false),
    };

    let ed25519_signature = Ed25519Signature::from_bytes(&signature.0);

    Ok(verifying_key.verify(message, &ed25519_signature).is_ok())
}
