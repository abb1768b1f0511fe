//! Per-field encryption using AES-256-CBC.
//!
//! ## Stored format
//!
//! `<iv as 32 hex chars>:<ciphertext as hex>`, PKCS#7 padded, with a fresh
//! random IV for every value.
//!
//! ## Failure policy
//!
//! Decryption never raises. Anything that is not a well-formed ciphertext
//! for the configured key comes back as [`Decrypted::FailedOpen`] carrying
//! the stored string unchanged, which is how plaintext written before a
//! key was configured stays readable. Callers decide whether that is
//! acceptable for a given field.

use crate::error::{CoreError, CoreResult};
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the CBC initialisation vector in bytes.
pub const IV_SIZE: usize = 16;

/// Encryption key for AES-256-CBC.
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
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CoreError::invalid_key_size(bytes.len(), KEY_SIZE));
        }

        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Returns the key as a byte slice.
    ///
    /// # Security
    ///
    /// Be careful with this method - don't log or serialize the result.
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

/// Outcome of decrypting a stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decrypted {
    /// Decryption succeeded.
    Plain(String),
    /// Decryption failed; the stored string is returned unchanged.
    FailedOpen(String),
}

impl Decrypted {
    /// Returns the usable string regardless of outcome.
    #[must_use]
    pub fn into_inner(self) -> String {
        match self {
            Decrypted::Plain(s) | Decrypted::FailedOpen(s) => s,
        }
    }
}

/// Encrypts and decrypts individual field values.
#[derive(Clone)]
pub struct FieldCipher {
    key: EncryptionKey,
}

impl FieldCipher {
    /// Creates a cipher using `key`.
    #[must_use]
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Encrypts `plaintext` into the stored `ivHex:cipherHex` form.
    #[must_use]
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(self.key.as_bytes().into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        format!("{}:{}", hex::encode(iv), hex::encode(ciphertext))
    }

    /// Decrypts a stored value, failing open on any malformed input.
    #[must_use]
    pub fn decrypt(&self, stored: &str) -> Decrypted {
        match self.try_decrypt(stored) {
            Some(plain) => Decrypted::Plain(plain),
            None => Decrypted::FailedOpen(stored.to_string()),
        }
    }

    fn try_decrypt(&self, stored: &str) -> Option<String> {
        let mut parts = stored.split(':');
        let (iv_hex, cipher_hex) = (parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }

        let iv: [u8; IV_SIZE] = hex::decode(iv_hex).ok()?.try_into().ok()?;
        let ciphertext = hex::decode(cipher_hex).ok()?;

        let plain = Aes256CbcDec::new(self.key.as_bytes().into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .ok()?;
        String::from_utf8(plain).ok()
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cipher() -> FieldCipher {
        FieldCipher::new(EncryptionKey::generate())
    }

    #[test]
    fn key_from_bytes_checks_length() {
        assert!(EncryptionKey::from_bytes(&[7u8; 32]).is_ok());
        let err = EncryptionKey::from_bytes(&[7u8; 31]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidKeySize {
                expected: 32,
                actual: 31
            }
        ));
    }

    #[test]
    fn key_debug_is_redacted() {
        let key = EncryptionKey::from_bytes(&[0xAB; 32]).unwrap();
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("171"));
    }

    #[test]
    fn stored_format_is_iv_colon_ciphertext() {
        let stored = cipher().encrypt("hello");
        let (iv, body) = stored.split_once(':').unwrap();
        assert_eq!(iv.len(), IV_SIZE * 2);
        // One full block after padding.
        assert_eq!(body.len(), 32);
        assert!(stored.chars().all(|c| c == ':' || c.is_ascii_hexdigit()));
    }

    #[test]
    fn fresh_iv_per_call() {
        let cipher = cipher();
        assert_ne!(cipher.encrypt("same"), cipher.encrypt("same"));
    }

    #[test]
    fn decrypt_roundtrip() {
        let cipher = cipher();
        let stored = cipher.encrypt("a@test.com");
        assert_eq!(cipher.decrypt(&stored), Decrypted::Plain("a@test.com".into()));
    }

    #[test]
    fn wrong_key_fails_open() {
        let stored = cipher().encrypt("secret");
        let outcome = cipher().decrypt(&stored);
        // A wrong key almost always breaks the padding; if it happens to
        // survive, the plaintext still cannot match.
        assert_ne!(outcome, Decrypted::Plain("secret".into()));
    }

    #[test]
    fn malformed_input_fails_open() {
        let cipher = cipher();
        for stored in ["plain text", "a:b:c", "zz:00", "00:zz", "", "00:"] {
            assert_eq!(
                cipher.decrypt(stored),
                Decrypted::FailedOpen(stored.to_string()),
                "input {stored:?}"
            );
        }
    }

    proptest! {
        #[test]
        fn any_text_roundtrips(text in ".*") {
            let cipher = FieldCipher::new(EncryptionKey::from_bytes(&[3u8; 32]).unwrap());
            let stored = cipher.encrypt(&text);
            prop_assert_eq!(cipher.decrypt(&stored), Decrypted::Plain(text));
        }
    }
}
