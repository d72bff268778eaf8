use aes_kw::Kek;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand_core::{OsRng, RngCore};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public};
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};
use crate::keys::{Fingerprint, PublicKey, SecretKey};

const NONCE_LEN: usize = 12;
const SYMKEY_LEN: usize = 32;

/// One recipient's wrapped copy of the data-encryption key.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WrappedKey {
    pub recipient: Fingerprint,
    /// Ephemeral X25519 public key used for this recipient's ECDH exchange.
    pub ephemeral_public: [u8; 32],
    /// The 32-byte data key, AES-KW wrapped under the ECDH shared secret.
    pub wrapped: Vec<u8>,
}

/// `encrypted:{encrypted-data, encrypted-keys[]}` per the manifest envelope.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Encrypted {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub encrypted_keys: Vec<WrappedKey>,
}

/// Symmetric-encrypts `cleartext` once and wraps the data key once per
/// recipient, per spec.md §4.1/§3 "encrypted manifest" semantics.
pub fn encrypt(cleartext: &[u8], recipients: &[PublicKey]) -> Result<Encrypted> {
    if recipients.is_empty() {
        return Err(CryptoError::Malformed(
            "encrypt requires at least one recipient".into(),
        ));
    }

    let mut data_key = [0u8; SYMKEY_LEN];
    OsRng.fill_bytes(&mut data_key);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&data_key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), cleartext)
        .map_err(|_| CryptoError::Malformed("symmetric encryption failed".into()))?;

    let mut encrypted_keys = Vec::with_capacity(recipients.len());
    for recipient in recipients {
        let recipient_x25519 = recipient.to_x25519()?;
        let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = X25519Public::from(&ephemeral_secret);
        let shared = ephemeral_secret.diffie_hellman(&recipient_x25519);

        let kek = Kek::from(*shared.as_bytes());
        let mut wrapped = vec![0u8; SYMKEY_LEN + 8];
        kek.wrap(&data_key, &mut wrapped)
            .map_err(|_| CryptoError::Malformed("key wrap failed".into()))?;

        encrypted_keys.push(WrappedKey {
            recipient: recipient.fingerprint(),
            ephemeral_public: ephemeral_public.to_bytes(),
            wrapped,
        });
    }

    data_key.zeroize();

    Ok(Encrypted {
        nonce: nonce_bytes,
        ciphertext,
        encrypted_keys,
    })
}

/// Attempts to unwrap the data key with `secret` against each entry, in
/// order, and decrypt the payload with whichever unwraps successfully.
pub fn decrypt(payload: &Encrypted, secret: &SecretKey) -> Result<Vec<u8>> {
    let static_secret = secret.to_x25519();

    for entry in &payload.encrypted_keys {
        let ephemeral_public = X25519Public::from(entry.ephemeral_public);
        let shared = static_secret.diffie_hellman(&ephemeral_public);
        let kek = Kek::from(*shared.as_bytes());

        let mut data_key = [0u8; SYMKEY_LEN];
        if kek.unwrap(&entry.wrapped, &mut data_key).is_err() {
            continue;
        }

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&data_key));
        let result = cipher
            .decrypt(Nonce::from_slice(&payload.nonce), payload.ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptError);
        data_key.zeroize();
        if let Ok(cleartext) = result {
            return Ok(cleartext);
        }
    }

    Err(CryptoError::DecryptError)
}
