//! Payload encryption for the valve records workspace
//!
//! Provides the primitives the on-device store is built on:
//! - AES-256-GCM authenticated encryption of whole serialized records
//! - Random 256-bit device keys with base64 persistence encoding
//! - Zeroization of key material on drop
//!
//! Key storage and key lifecycle live with the caller; this crate never
//! touches disk or network.

pub mod aes_gcm;
pub mod error;
pub mod keys;

pub use aes_gcm::Aes256GcmEncryptor;
pub use error::{CryptoError, CryptoResult};
pub use keys::{EncryptionKey, KEY_LEN};
