use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: authentication tag mismatch or wrong key")]
    DecryptionFailed,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Unsupported payload format version {version}, only version {supported} is supported")]
    UnsupportedFormatVersion { version: u32, supported: u32 },

    #[error("Invalid encrypted payload format: {0}")]
    InvalidFormat(String),

    #[error("Invalid nonce length: expected 12, got {0}")]
    InvalidNonce(usize),

    #[error("Invalid UTF-8 in decrypted data")]
    InvalidUtf8,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
