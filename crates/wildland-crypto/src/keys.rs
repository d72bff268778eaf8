use std::fmt;

use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;

use crate::error::{CryptoError, Result};

const DUMMY_TAG: &str = "dummy";

/// A key fingerprint: `0x<hex>`, optionally carrying the dummy-mode tag so
/// dummy and real key material can never satisfy each other's verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_public(public: &PublicKey) -> Self {
        Self(format!("0x{}", hex::encode(public.0.as_bytes())))
    }

    pub fn dummy_from_public(public: &PublicKey) -> Self {
        Self(format!("0x{}_{}", DUMMY_TAG, hex::encode(public.0.as_bytes())))
    }

    pub fn is_dummy(&self) -> bool {
        self.0.starts_with(&format!("0x{}_", DUMMY_TAG))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self> {
        if !value.starts_with("0x") || value.len() < 3 {
            return Err(CryptoError::Malformed(format!(
                "fingerprint must be 0x-prefixed, got {value:?}"
            )));
        }
        Ok(Self(value))
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

/// An Ed25519 verification key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(pub(crate) VerifyingKey);

impl PublicKey {
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::Malformed(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::Malformed("public key must be 32 bytes".into()))?;
        let key = VerifyingKey::from_bytes(&arr)
            .map_err(|e| CryptoError::Malformed(e.to_string()))?;
        Ok(Self(key))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_public(self)
    }

    /// Converts the Edwards-form Ed25519 public key into its Montgomery-form
    /// X25519 counterpart for Diffie-Hellman key agreement.
    pub fn to_x25519(&self) -> Result<x25519_dalek::PublicKey> {
        let compressed = CompressedEdwardsY(*self.0.as_bytes());
        let edwards = compressed
            .decompress()
            .ok_or_else(|| CryptoError::Malformed("invalid Edwards point".into()))?;
        Ok(x25519_dalek::PublicKey::from(edwards.to_montgomery().to_bytes()))
    }

    pub fn verify(&self, bytes: &[u8], signature: &Signature) -> bool {
        self.0.verify(bytes, signature).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_hex()).finish()
    }
}

/// An Ed25519 signing key. `SigningKey` itself implements `ZeroizeOnDrop`
/// (ed25519-dalek's `zeroize` feature), so the live key material is wiped
/// when the last owner drops — not a copy of it.
pub struct SecretKey(SigningKey);

impl SecretKey {
    pub fn generate() -> Self {
        Self(SigningKey::generate(&mut OsRng))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::Malformed(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::Malformed("secret key must be 32 bytes".into()))?;
        Ok(Self(SigningKey::from_bytes(&arr)))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    /// Converts to the Montgomery-form X25519 secret used for ECDH.
    pub fn to_x25519(&self) -> x25519_dalek::StaticSecret {
        // The lower 32 bytes of the SHA-512 clamp used by Ed25519 form a
        // valid X25519 scalar; dalek exposes this via the scalar bytes of
        // the expanded signing key.
        let expanded = ed25519_dalek::hazmat::ExpandedSecretKey::from(&self.0);
        let scalar_bytes: [u8; 32] = expanded.scalar.to_bytes();
        x25519_dalek::StaticSecret::from(scalar_bytes)
    }

    pub fn sign(&self, bytes: &[u8]) -> Signature {
        self.0.sign(bytes)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretKey").field(&"<redacted>").finish()
    }
}
