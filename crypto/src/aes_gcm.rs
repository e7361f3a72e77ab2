use crate::error::{CryptoError, CryptoResult};
use crate::keys::EncryptionKey;
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

const NONCE_LEN: usize = 12;

/// AES-256-GCM payload encryptor
///
/// Every call draws a fresh 96-bit nonce, so the same plaintext never
/// produces the same ciphertext twice. Output is a printable string:
/// `v{format}:{nonce_b64}:{ciphertext_b64}`, with the GCM tag appended to
/// the ciphertext.
pub struct Aes256GcmEncryptor {
    cipher: Aes256Gcm,
}

impl Aes256GcmEncryptor {
    /// Current payload format version
    pub const FORMAT_VERSION: u32 = 1;

    pub fn new(key: &EncryptionKey) -> CryptoResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Create from a base64-encoded key
    pub fn from_base64(key_b64: &str) -> CryptoResult<Self> {
        Self::new(&EncryptionKey::from_base64(key_b64)?)
    }

    pub fn algorithm(&self) -> &'static str {
        "AES-256-GCM"
    }

    /// Encrypt raw bytes into the versioned string format
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> CryptoResult<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(format!(
            "v{}:{}:{}",
            Self::FORMAT_VERSION,
            BASE64.encode(nonce),
            BASE64.encode(ciphertext)
        ))
    }

    /// Decrypt a versioned payload back into bytes, verifying the tag
    pub fn decrypt_bytes(&self, encrypted: &str) -> CryptoResult<Vec<u8>> {
        let mut parts = encrypted.splitn(3, ':');
        let (version, nonce_b64, ciphertext_b64) = match (parts.next(), parts.next(), parts.next()) {
            (Some(v), Some(n), Some(c)) => (v, n, c),
            _ => return Err(CryptoError::InvalidFormat("expected three ':'-separated parts".into())),
        };

        let version = version
            .strip_prefix('v')
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(|| CryptoError::InvalidFormat(format!("bad version tag {:?}", version)))?;

        if version != Self::FORMAT_VERSION {
            return Err(CryptoError::UnsupportedFormatVersion {
                version,
                supported: Self::FORMAT_VERSION,
            });
        }

        let nonce_bytes = BASE64
            .decode(nonce_b64)
            .map_err(|e| CryptoError::InvalidFormat(e.to_string()))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CryptoError::InvalidNonce(nonce_bytes.len()));
        }

        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| CryptoError::InvalidFormat(e.to_string()))?;

        self.cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Encrypt a string (the common case: serialized JSON)
    pub fn encrypt_string(&self, plaintext: &str) -> CryptoResult<String> {
        self.encrypt_bytes(plaintext.as_bytes())
    }

    pub fn decrypt_string(&self, encrypted: &str) -> CryptoResult<String> {
        let bytes = self.decrypt_bytes(encrypted)?;
        String::from_utf8(bytes).map_err(|_| CryptoError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encryptor() -> Aes256GcmEncryptor {
        Aes256GcmEncryptor::new(&EncryptionKey::generate()).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let encryptor = encryptor();

        let plaintext = r#"{"serialNumber":"SN-100"}"#;
        let encrypted = encryptor.encrypt_string(plaintext).unwrap();
        assert_eq!(encryptor.decrypt_string(&encrypted).unwrap(), plaintext);
    }

    #[test]
    fn test_versioned_format() {
        let encrypted = encryptor().encrypt_string("test data").unwrap();

        assert!(encrypted.starts_with("v1:"));
        assert_eq!(encrypted.split(':').count(), 3);
    }

    #[test]
    fn test_different_nonces() {
        let encryptor = encryptor();

        let encrypted1 = encryptor.encrypt_string("same plaintext").unwrap();
        let encrypted2 = encryptor.encrypt_string("same plaintext").unwrap();

        assert_ne!(encrypted1, encrypted2);
        assert_eq!(encryptor.decrypt_string(&encrypted1).unwrap(), "same plaintext");
        assert_eq!(encryptor.decrypt_string(&encrypted2).unwrap(), "same plaintext");
    }

    #[test]
    fn test_tampered_ciphertext() {
        let encryptor = encryptor();
        let mut encrypted = encryptor.encrypt_string("authenticated data").unwrap();
        encrypted.push('A');

        assert!(encryptor.decrypt_string(&encrypted).is_err());
    }

    #[test]
    fn test_wrong_key() {
        let encrypted = encryptor().encrypt_string("tag SV-12").unwrap();
        let err = encryptor().decrypt_string(&encrypted).unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed));
    }

    #[test]
    fn test_unsupported_version() {
        let encryptor = encryptor();
        let encrypted = encryptor.encrypt_string("x").unwrap();
        let bumped = encrypted.replacen("v1:", "v9:", 1);

        let err = encryptor.decrypt_string(&bumped).unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedFormatVersion { version: 9, supported: 1 }));
    }

    #[test]
    fn test_malformed_inputs() {
        let encryptor = encryptor();
        for input in ["", "garbage", "v1:only-two", "v1:AAAA:BBBB", "vX:a:b"] {
            assert!(encryptor.decrypt_string(input).is_err(), "{input:?} should not decrypt");
        }
    }

    #[test]
    fn test_from_base64() {
        let key = EncryptionKey::generate();
        let a = Aes256GcmEncryptor::new(&key).unwrap();
        let b = Aes256GcmEncryptor::from_base64(&key.to_base64()).unwrap();

        let encrypted = a.encrypt_string("shared key").unwrap();
        assert_eq!(b.decrypt_string(&encrypted).unwrap(), "shared key");
    }

    #[test]
    fn test_empty_plaintext() {
        let encryptor = encryptor();
        let encrypted = encryptor.encrypt_string("").unwrap();
        assert_eq!(encryptor.decrypt_string(&encrypted).unwrap(), "");
    }

    #[test]
    fn test_large_payload() {
        let encryptor = encryptor();
        // Inline photos push records into the megabyte range
        let plaintext = vec![0x42u8; 1024 * 1024];
        let encrypted = encryptor.encrypt_bytes(&plaintext).unwrap();
        assert_eq!(encryptor.decrypt_bytes(&encrypted).unwrap(), plaintext);
    }
}
