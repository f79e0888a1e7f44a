//! Encrypting store wrapper.
//!
//! This module provides a store that wraps any other [`KvStore`] and
//! encrypts values at rest with AES-256-GCM.
//!
//! ## Security Model
//!
//! - Each value is encrypted independently with a random 96-bit nonce
//! - Stored layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`
//! - The row key is bound as associated data, so ciphertexts can't be
//!   swapped between keys without failing authentication
//! - Keys are never stored and are zeroized on drop
//!
//! ## Keyspaces
//!
//! Only rows whose key falls in a designated keyspace are encrypted.
//! Other rows pass through to the inner store unchanged.

use crate::error::{StorageError, StorageResult};
use crate::store::KvStore;
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Encryption key for AES-256-GCM.
///
/// The key is automatically zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random encryption key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(StorageError::Encryption(format!(
                "invalid key size: expected {KEY_SIZE}, got {}",
                bytes.len()
            )));
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Derives a key from a high-entropy secret using HKDF-SHA256.
    ///
    /// `salt` should be random per installation and stored alongside the data.
    ///
    /// # Errors
    ///
    /// Returns an error if HKDF expansion fails.
    pub fn derive_from_secret(secret: &[u8], salt: &[u8]) -> StorageResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), secret);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(b"tessera-store-key-v1", &mut bytes)
            .map_err(|_| StorageError::Encryption("HKDF expand failed".into()))?;
        Ok(Self { bytes })
    }

    /// Returns the key as a byte slice.
    ///
    /// Don't log or persist the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Selects which keys an [`EncryptedStore`] encrypts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyspaces {
    /// Every key is encrypted.
    All,
    /// Only keys starting with one of these prefixes are encrypted.
    Prefixes(Vec<String>),
}

impl Keyspaces {
    /// Creates a prefix selector.
    pub fn prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Prefixes(prefixes.into_iter().map(Into::into).collect())
    }

    /// Returns true if `key` belongs to an encrypted keyspace.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        match self {
            Keyspaces::All => true,
            Keyspaces::Prefixes(prefixes) => prefixes.iter().any(|p| key.starts_with(p.as_str())),
        }
    }
}

/// A store that encrypts values in selected keyspaces.
///
/// # Example
///
/// ```rust
/// use tessera_storage::{EncryptedStore, EncryptionKey, InMemoryStore, KvStore, Keyspaces};
///
/// let store = EncryptedStore::new(
///     InMemoryStore::new(),
///     EncryptionKey::generate(),
///     Keyspaces::prefixes(["auth/"]),
/// );
/// store.put("auth/token", b"secret").unwrap();
/// assert_eq!(store.get("auth/token").unwrap(), Some(b"secret".to_vec()));
/// assert_ne!(store.inner().raw("auth/token"), Some(b"secret".to_vec()));
/// ```
pub struct EncryptedStore<S> {
    inner: S,
    cipher: Aes256Gcm,
    keyspaces: Keyspaces,
}

impl<S: KvStore> EncryptedStore<S> {
    /// Wraps `inner`, encrypting rows whose keys fall in `keyspaces`.
    pub fn new(inner: S, key: EncryptionKey, keyspaces: Keyspaces) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self {
            inner,
            cipher,
            keyspaces,
        }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns the keyspace selector.
    pub fn keyspaces(&self) -> &Keyspaces {
        &self.keyspaces
    }

    fn seal(&self, key: &str, plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| StorageError::Encryption(format!("failed to encrypt {key}")))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend(ciphertext);
        Ok(sealed)
    }

    fn open(&self, key: &str, sealed: &[u8]) -> StorageResult<Vec<u8>> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(StorageError::Encryption(format!(
                "ciphertext for {key} too short"
            )));
        }
        let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
        self.cipher
            .decrypt(
                nonce,
                Payload {
                    msg: &sealed[NONCE_SIZE..],
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| StorageError::Encryption(format!("failed to decrypt {key}")))
    }

    fn encode(&self, key: &str, value: &[u8]) -> StorageResult<Vec<u8>> {
        if self.keyspaces.contains(key) {
            self.seal(key, value)
        } else {
            Ok(value.to_vec())
        }
    }

    fn decode(&self, key: &str, stored: Vec<u8>) -> StorageResult<Vec<u8>> {
        if self.keyspaces.contains(key) {
            self.open(key, &stored)
        } else {
            Ok(stored)
        }
    }
}

impl<S: KvStore> KvStore for EncryptedStore<S> {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner
            .get(key)?
            .map(|stored| self.decode(key, stored))
            .transpose()
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let stored = self.encode(key, value)?;
        self.inner.put(key, &stored)
    }

    fn insert(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let stored = self.encode(key, value)?;
        self.inner.insert(key, &stored)
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        self.inner.delete(key)
    }

    fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        self.inner
            .scan_prefix(prefix)?
            .into_iter()
            .map(|(key, stored)| {
                let value = self.decode(&key, stored)?;
                Ok((key, value))
            })
            .collect()
    }

    fn flush(&self) -> StorageResult<()> {
        self.inner.flush()
    }
}

impl<S> std::fmt::Debug for EncryptedStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedStore")
            .field("cipher", &"Aes256Gcm")
            .field("keyspaces", &self.keyspaces)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;

    fn store(keyspaces: Keyspaces) -> EncryptedStore<InMemoryStore> {
        let key = EncryptionKey::from_bytes(&[0x42u8; KEY_SIZE]).unwrap();
        EncryptedStore::new(InMemoryStore::new(), key, keyspaces)
    }

    #[test]
    fn key_wrong_size() {
        assert!(EncryptionKey::from_bytes(&[0u8; 16]).is_err());
    }

    #[test]
    fn generated_keys_differ() {
        let a = EncryptionKey::generate();
        let b = EncryptionKey::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn derived_key_is_deterministic() {
        let a = EncryptionKey::derive_from_secret(b"secret", b"salt").unwrap();
        let b = EncryptionKey::derive_from_secret(b"secret", b"salt").unwrap();
        let c = EncryptionKey::derive_from_secret(b"secret", b"pepper").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
    }

    #[test]
    fn debug_redacts_key() {
        let key = EncryptionKey::from_bytes(&[7u8; KEY_SIZE]).unwrap();
        assert!(format!("{key:?}").contains("REDACTED"));
    }

    #[test]
    fn encrypts_only_designated_keyspaces() {
        let store = store(Keyspaces::prefixes(["auth/"]));
        store.put("auth/token", b"secret").unwrap();
        store.put("feed/page1", b"public").unwrap();

        let raw_secret = store.inner().raw("auth/token").unwrap();
        assert_ne!(raw_secret, b"secret".to_vec());
        assert_eq!(raw_secret.len(), NONCE_SIZE + 6 + TAG_SIZE);
        assert_eq!(store.inner().raw("feed/page1").unwrap(), b"public".to_vec());

        assert_eq!(store.get("auth/token").unwrap(), Some(b"secret".to_vec()));
        assert_eq!(store.get("feed/page1").unwrap(), Some(b"public".to_vec()));
    }

    #[test]
    fn tampered_value_fails() {
        let store = store(Keyspaces::All);
        store.put("k", b"secret data").unwrap();

        let mut raw = store.inner().raw("k").unwrap();
        raw[NONCE_SIZE + 1] ^= 0xFF;
        store.inner().put("k", &raw).unwrap();

        assert!(matches!(store.get("k"), Err(StorageError::Encryption(_))));
    }

    #[test]
    fn ciphertext_is_bound_to_key() {
        let store = store(Keyspaces::All);
        store.put("a", b"value").unwrap();

        let raw = store.inner().raw("a").unwrap();
        store.inner().put("b", &raw).unwrap();

        assert!(store.get("b").is_err());
    }

    #[test]
    fn different_keys_fail() {
        let first = store(Keyspaces::All);
        first.put("k", b"value").unwrap();
        let raw = first.inner().raw("k").unwrap();

        let other_key = EncryptionKey::from_bytes(&[0x43u8; KEY_SIZE]).unwrap();
        let second = EncryptedStore::new(InMemoryStore::new(), other_key, Keyspaces::All);
        second.inner().put("k", &raw).unwrap();

        assert!(second.get("k").is_err());
    }

    #[test]
    fn scan_decrypts_rows() {
        let store = store(Keyspaces::prefixes(["user/"]));
        store.put("user/1", b"alice").unwrap();
        store.put("user/2", b"bob").unwrap();

        let rows = store.scan_prefix("user/").unwrap();
        assert_eq!(
            rows,
            vec![
                ("user/1".to_string(), b"alice".to_vec()),
                ("user/2".to_string(), b"bob".to_vec()),
            ]
        );
    }
}
