//! Encryption layer for locally stored entities
//!
//! Whole entities are serialized to JSON and sealed with AES-256-GCM under a
//! single device key. The key lives in [`KeyValueStorage`] next to the UI's
//! own preferences. There is no rotation and no remote escrow: if the device
//! storage is cleared, previously stored envelopes stop decrypting and are
//! treated as a lost cache, to be refilled from the backend.

use crate::error::{SyncError, SyncResult};
use crate::key_storage::KeyValueStorage;
use crypto::{Aes256GcmEncryptor, EncryptionKey};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Seals and opens entity payloads with the device key
pub struct RecordCipher {
    storage: Arc<dyn KeyValueStorage>,
    key_name: String,
    encryptor: OnceCell<Arc<Aes256GcmEncryptor>>,
}

impl RecordCipher {
    pub fn new(storage: Arc<dyn KeyValueStorage>, key_name: impl Into<String>) -> Self {
        Self {
            storage,
            key_name: key_name.into(),
            encryptor: OnceCell::new(),
        }
    }

    /// Return the persisted device key, generating and persisting one if absent
    ///
    /// Resolved once per process; afterwards the key is read-only and shared.
    /// A failed storage read is returned as an error and never replaces the
    /// stored key.
    pub async fn get_or_create_key(&self) -> SyncResult<Arc<Aes256GcmEncryptor>> {
        self.encryptor
            .get_or_try_init(|| self.load_or_generate())
            .await
            .cloned()
    }

    async fn load_or_generate(&self) -> SyncResult<Arc<Aes256GcmEncryptor>> {
        match self.storage.get(&self.key_name).await {
            Ok(Some(encoded)) => match EncryptionKey::from_base64(&encoded) {
                Ok(key) => return Ok(Arc::new(Aes256GcmEncryptor::new(&key)?)),
                Err(e) => tracing::warn!(
                    error = %e,
                    key_name = %self.key_name,
                    "Stored encryption key is unreadable; generating a new one"
                ),
            },
            Ok(None) => tracing::info!(key_name = %self.key_name, "No device encryption key found; generating one"),
            // A key may still be stored; leave the cell empty so the next call retries
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    key_name = %self.key_name,
                    "Device storage unavailable while reading encryption key"
                );
                return Err(e);
            }
        }

        let key = EncryptionKey::generate();

        if let Err(e) = self.storage.set(&self.key_name, &key.to_base64()).await {
            // Data sealed this session will not open after a restart
            tracing::warn!(
                error = %e,
                key_name = %self.key_name,
                "Could not persist device encryption key; using it for this session only"
            );
        }

        Ok(Arc::new(Aes256GcmEncryptor::new(&key)?))
    }

    /// Serialize `value` to JSON and encrypt it
    pub async fn encrypt<T: Serialize + ?Sized>(&self, value: &T) -> SyncResult<String> {
        let json = serde_json::to_string(value)
            .map_err(|e| SyncError::EncryptionFailure(format!("payload is not serializable: {}", e)))?;

        let encryptor = self.get_or_create_key().await.map_err(|e| match e {
            SyncError::EncryptionFailure(_) => e,
            other => SyncError::EncryptionFailure(format!("device key unavailable: {}", other)),
        })?;

        Ok(encryptor.encrypt_string(&json)?)
    }

    /// Decrypt a payload back into JSON
    ///
    /// `None` means "data unavailable": empty input, a different key,
    /// tampered or garbage ciphertext, or a plaintext that is not JSON.
    pub async fn decrypt(&self, cipher_text: &str) -> Option<Value> {
        if cipher_text.is_empty() {
            return None;
        }

        let encryptor = match self.get_or_create_key().await {
            Ok(encryptor) => encryptor,
            Err(e) => {
                tracing::warn!(error = %e, "Encryption key unavailable; cannot decrypt");
                return None;
            }
        };

        let plaintext = match encryptor.decrypt_string(cipher_text) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::debug!(error = %e, "Payload did not decrypt");
                return None;
            }
        };

        match serde_json::from_str(&plaintext) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(error = %e, "Decrypted payload is not JSON");
                None
            }
        }
    }

    /// Decrypt straight into a domain type
    pub async fn decrypt_as<T: DeserializeOwned>(&self, cipher_text: &str) -> Option<T> {
        let value = self.decrypt(cipher_text).await?;
        match serde_json::from_value(value) {
            Ok(entity) => Some(entity),
            Err(e) => {
                tracing::warn!(error = %e, "Decrypted payload does not match the expected shape");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_storage::MemoryKeyValueStorage;
    use proptest::prelude::*;
    use serde_json::json;

    const KEY_NAME: &str = "test.encryption_key";

    fn cipher_with(storage: Arc<MemoryKeyValueStorage>) -> RecordCipher {
        RecordCipher::new(storage, KEY_NAME)
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let cipher = cipher_with(Arc::new(MemoryKeyValueStorage::new()));
        let value = json!({"id": "v1", "serialNumber": "SN-100", "files": []});

        let sealed = cipher.encrypt(&value).await.unwrap();
        assert!(!sealed.contains("SN-100"));
        assert_eq!(cipher.decrypt(&sealed).await, Some(value));
    }

    #[tokio::test]
    async fn test_key_is_persisted_and_reused() {
        let storage = Arc::new(MemoryKeyValueStorage::new());

        let first = cipher_with(storage.clone());
        let sealed = first.encrypt(&json!({"tag": "PSV-7"})).await.unwrap();
        assert!(storage.get(KEY_NAME).await.unwrap().is_some());

        // A new process reading the same device storage
        let second = cipher_with(storage);
        assert_eq!(second.decrypt(&sealed).await, Some(json!({"tag": "PSV-7"})));
    }

    #[tokio::test]
    async fn test_decrypt_failures_are_none() {
        let cipher = cipher_with(Arc::new(MemoryKeyValueStorage::new()));
        let other = cipher_with(Arc::new(MemoryKeyValueStorage::new()));

        let foreign = other.encrypt(&json!({"a": 1})).await.unwrap();

        assert_eq!(cipher.decrypt("").await, None);
        assert_eq!(cipher.decrypt("garbage_string").await, None);
        assert_eq!(cipher.decrypt("v1:AAAA:AAAA").await, None);
        assert_eq!(cipher.decrypt(&foreign).await, None);
    }

    #[tokio::test]
    async fn test_non_json_plaintext_is_none() {
        let storage = Arc::new(MemoryKeyValueStorage::new());
        let cipher = cipher_with(storage);
        let encryptor = cipher.get_or_create_key().await.unwrap();

        let sealed = encryptor.encrypt_string("not json {").unwrap();
        assert_eq!(cipher.decrypt(&sealed).await, None);
    }

    #[tokio::test]
    async fn test_corrupt_stored_key_is_replaced() {
        let storage = Arc::new(MemoryKeyValueStorage::new());
        storage.set(KEY_NAME, "short").await.unwrap();

        let cipher = cipher_with(storage.clone());
        let sealed = cipher.encrypt(&json!(1)).await.unwrap();

        let stored = storage.get(KEY_NAME).await.unwrap().unwrap();
        assert_ne!(stored, "short");
        assert_eq!(cipher.decrypt(&sealed).await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_unpersistable_key_still_works_for_session() {
        let storage = Arc::new(MemoryKeyValueStorage::new());
        storage.set_read_only(true);

        let cipher = cipher_with(storage.clone());
        let sealed = cipher.encrypt(&json!({"x": true})).await.unwrap();
        assert_eq!(cipher.decrypt(&sealed).await, Some(json!({"x": true})));

        // Nothing was persisted, so the next process cannot read it
        assert!(storage.get(KEY_NAME).await.unwrap().is_none());
        let restarted = cipher_with(Arc::new(MemoryKeyValueStorage::new()));
        assert_eq!(restarted.decrypt(&sealed).await, None);
    }

    #[tokio::test]
    async fn test_storage_read_error_keeps_stored_key() {
        let storage = Arc::new(MemoryKeyValueStorage::new());
        let sealed = cipher_with(storage.clone()).encrypt(&json!({"serial": "SN-1"})).await.unwrap();
        let stored = storage.get(KEY_NAME).await.unwrap();

        // Restart while the device store is briefly busy
        let restarted = cipher_with(storage.clone());
        storage.fail_next_reads(1);
        assert_eq!(restarted.decrypt(&sealed).await, None);
        assert_eq!(storage.get(KEY_NAME).await.unwrap(), stored);

        // The next call retries the read and finds the original key
        assert_eq!(restarted.decrypt(&sealed).await, Some(json!({"serial": "SN-1"})));
    }

    #[tokio::test]
    async fn test_encrypt_fails_while_storage_unreadable() {
        let storage = Arc::new(MemoryKeyValueStorage::new());
        let cipher = cipher_with(storage.clone());
        storage.fail_next_reads(1);

        assert!(matches!(
            cipher.encrypt(&json!(1)).await,
            Err(SyncError::EncryptionFailure(_))
        ));
        assert!(storage.get(KEY_NAME).await.unwrap().is_none());
        assert!(cipher.encrypt(&json!(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_decrypt_as_shape_mismatch() {
        #[derive(serde::Deserialize, Debug)]
        struct Tagged {
            #[allow(dead_code)]
            tag: String,
        }

        let cipher = cipher_with(Arc::new(MemoryKeyValueStorage::new()));
        let sealed = cipher.encrypt(&json!({"tag": 5})).await.unwrap();
        assert!(cipher.decrypt_as::<Tagged>(&sealed).await.is_none());
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            ".{0,24}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::hash_map("[a-zA-Z]{1,10}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_encrypt_decrypt_roundtrip(value in arb_json()) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let cipher = cipher_with(Arc::new(MemoryKeyValueStorage::new()));

            let sealed = rt.block_on(cipher.encrypt(&value)).unwrap();
            prop_assert_eq!(rt.block_on(cipher.decrypt(&sealed)), Some(value));
        }
    }
}
