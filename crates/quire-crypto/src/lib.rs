//! Cryptographic primitives for Quire.
//!
//! Provides domain-separated BLAKE3 block addressing, Ed25519 signing behind a
//! [`Signer`] capability, and link verification for append-only chains.
//!
//! All crypto operations wrap established libraries; nothing here is custom
//! cryptography.

pub mod chain;
pub mod hasher;
pub mod signer;

pub use chain::{ChainError, ChainLink, ChainVerifier};
pub use hasher::ContentHasher;
pub use signer::{SignError, Signature, SignatureError, Signer, SigningKey, VerifyingKey};
