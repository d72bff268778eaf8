use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::encrypt::{self, Encrypted};
use crate::error::{CryptoError, Result};
use crate::keys::{Fingerprint, PublicKey, SecretKey};

/// The signing/verification/encryption boundary described in spec.md §4.1.
///
/// Key material lives in `key_dir` as `<fpr>.pub` / `<fpr>.sec` (hex-encoded
/// text files). When `dummy` is set, `generate`/`sign`/`verify`/`encrypt`
/// operate on identity transforms instead of real cryptography; dummy
/// fingerprints are tagged so a dummy context can never verify real
/// signatures and vice versa.
pub struct SigContext {
    key_dir: PathBuf,
    dummy: bool,
    cache: HashMap<Fingerprint, SecretKey>,
}

impl SigContext {
    pub fn new(key_dir: impl Into<PathBuf>, dummy: bool) -> Self {
        Self {
            key_dir: key_dir.into(),
            dummy,
            cache: HashMap::new(),
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.dummy
    }

    fn pub_path(&self, fpr: &Fingerprint) -> PathBuf {
        self.key_dir.join(format!("{}.pub", sanitize(fpr.as_str())))
    }

    fn sec_path(&self, fpr: &Fingerprint) -> PathBuf {
        self.key_dir.join(format!("{}.sec", sanitize(fpr.as_str())))
    }

    /// Generates a new keypair, persists it under `key_dir`, and returns its
    /// fingerprint and public key. The secret key is cached in-process.
    pub fn generate(&mut self) -> Result<(Fingerprint, PublicKey)> {
        std::fs::create_dir_all(&self.key_dir)?;
        let secret = SecretKey::generate();
        let public = secret.public_key();
        let fpr = if self.dummy {
            Fingerprint::dummy_from_public(&public)
        } else {
            Fingerprint::from_public(&public)
        };

        std::fs::write(self.pub_path(&fpr), public.to_hex())?;
        std::fs::write(self.sec_path(&fpr), secret.to_hex())?;
        self.cache.insert(fpr.clone(), secret);
        Ok((fpr, public))
    }

    fn load_secret(&mut self, fpr: &Fingerprint) -> Result<&SecretKey> {
        if !self.cache.contains_key(fpr) {
            let path = self.sec_path(fpr);
            let hex = std::fs::read_to_string(&path)
                .map_err(|_| CryptoError::KeyMissing(fpr.to_string()))?;
            let secret = SecretKey::from_hex(hex.trim())?;
            self.cache.insert(fpr.clone(), secret);
        }
        Ok(self.cache.get(fpr).expect("just inserted"))
    }

    pub fn load_public(&self, fpr: &Fingerprint) -> Result<PublicKey> {
        let path = self.pub_path(fpr);
        let hex = std::fs::read_to_string(&path)
            .map_err(|_| CryptoError::KeyMissing(fpr.to_string()))?;
        PublicKey::from_hex(hex.trim())
    }

    /// Known secret-key fingerprints available for decrypt attempts.
    pub fn owned_fingerprints(&self) -> Result<Vec<Fingerprint>> {
        let mut out = Vec::new();
        if !self.key_dir.exists() {
            return Ok(out);
        }
        for entry in std::fs::read_dir(&self.key_dir)? {
            let entry = entry?;
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if entry.path().extension().and_then(|e| e.to_str()) == Some("sec") {
                    out.push(Fingerprint::try_from(format!("0x{name}"))?);
                }
            }
        }
        Ok(out)
    }

    pub fn sign(&mut self, fpr: &Fingerprint, bytes: &[u8]) -> Result<Vec<u8>> {
        if self.dummy {
            return Ok(identity_signature(fpr, bytes));
        }
        let secret = self.load_secret(fpr)?;
        Ok(secret.sign(bytes).to_bytes().to_vec())
    }

    pub fn verify(&self, fpr: &Fingerprint, public: &PublicKey, bytes: &[u8], signature: &[u8]) -> Result<bool> {
        if self.dummy != fpr.is_dummy() {
            return Err(CryptoError::Untrusted);
        }
        if self.dummy {
            return Ok(signature == identity_signature(fpr, bytes));
        }
        let arr: [u8; 64] = signature
            .try_into()
            .map_err(|_| CryptoError::Malformed("signature must be 64 bytes".into()))?;
        let sig = ed25519_dalek::Signature::from_bytes(&arr);
        Ok(public.verify(bytes, &sig))
    }

    pub fn encrypt(&self, cleartext: &[u8], recipients: &[PublicKey]) -> Result<Encrypted> {
        if self.dummy {
            return Err(CryptoError::Untrusted);
        }
        encrypt::encrypt(cleartext, recipients)
    }

    /// Tries every locally known secret key until one unwraps the payload.
    pub fn decrypt(&mut self, payload: &Encrypted) -> Result<Vec<u8>> {
        if self.dummy {
            return Err(CryptoError::Untrusted);
        }
        for fpr in self.owned_fingerprints()? {
            let secret = match self.load_secret(&fpr) {
                Ok(s) => s,
                Err(_) => continue,
            };
            if let Ok(cleartext) = encrypt::decrypt(payload, secret) {
                return Ok(cleartext);
            }
        }
        Err(CryptoError::DecryptError)
    }
}

fn sanitize(fpr: &str) -> String {
    fpr.trim_start_matches("0x").replace(':', "_")
}

fn identity_signature(fpr: &Fingerprint, bytes: &[u8]) -> Vec<u8> {
    let mut out = blake3::hash(bytes).as_bytes().to_vec();
    out.extend_from_slice(fpr.as_str().as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_sign_verify_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = SigContext::new(dir.path(), false);
        let (fpr, public) = ctx.generate().unwrap();
        let sig = ctx.sign(&fpr, b"container body bytes").unwrap();
        assert!(ctx.verify(&fpr, &public, b"container body bytes", &sig).unwrap());
        assert!(!ctx.verify(&fpr, &public, b"tampered", &sig).unwrap());
    }

    #[test]
    fn test_dummy_mode_refuses_real_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut real_ctx = SigContext::new(dir.path(), false);
        let (real_fpr, real_public) = real_ctx.generate().unwrap();
        let real_sig = real_ctx.sign(&real_fpr, b"data").unwrap();

        let dummy_ctx = SigContext::new(dir.path(), true);
        assert!(dummy_ctx.verify(&real_fpr, &real_public, b"data", &real_sig).is_err());
    }

    #[test]
    fn test_dummy_mode_self_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = SigContext::new(dir.path(), true);
        let (fpr, public) = ctx.generate().unwrap();
        assert!(fpr.is_dummy());
        let sig = ctx.sign(&fpr, b"dummy payload").unwrap();
        assert!(ctx.verify(&fpr, &public, b"dummy payload", &sig).unwrap());
    }

    #[test]
    fn test_encrypt_decrypt_via_context() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = SigContext::new(dir.path(), false);
        let (_fpr, public) = ctx.generate().unwrap();
        let payload = ctx.encrypt(b"secret body", &[public]).unwrap();
        let cleartext = ctx.decrypt(&payload).unwrap();
        assert_eq!(cleartext, b"secret body");
    }

    #[test]
    fn test_dummy_mode_refuses_encrypt() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = SigContext::new(dir.path(), true);
        let (_fpr, public) = ctx.generate().unwrap();
        assert!(ctx.encrypt(b"x", &[public]).is_err());
    }
}
