use serde::de::DeserializeOwned;
use serde::Serialize;
use wildland_crypto::{Fingerprint, PublicKey, SigContext};

use crate::envelope::{build_envelope, parse_envelope};
use crate::error::{ManifestError, Result};
use crate::wire::EncryptedWire;

/// The schema version every manifest body must carry. Frozen: an unknown
/// version is rejected rather than silently upgraded (spec.md §9).
pub const SCHEMA_VERSION: &str = "1";

/// Implemented by every manifest body type (user/container/storage/bridge/
/// link/control-command) so the codec can enforce the frozen version.
pub trait Versioned {
    fn version(&self) -> &str;
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
enum BodyFrame<T> {
    Encrypted { encrypted: EncryptedWire },
    Cleartext(T),
}

/// Canonical serialization, envelope framing, signing, verification, and
/// transparent decrypt-on-load for Wildland manifest bodies.
pub struct ManifestCodec;

impl ManifestCodec {
    /// Produces the canonical YAML byte form of `body` that is both
    /// persisted and signed. Key order follows `T`'s field declaration
    /// order (serde_yaml preserves struct field order), newline-terminated
    /// `\n` line endings.
    pub fn encode_body<T: Serialize>(body: &T) -> Result<String> {
        let mut s = serde_yaml::to_string(body)?;
        if !s.ends_with('\n') {
            s.push('\n');
        }
        Ok(s)
    }

    /// Signs `body` with `fpr`'s key and frames the full envelope.
    pub fn encode<T: Serialize>(
        body: &T,
        fpr: &Fingerprint,
        sig_ctx: &mut SigContext,
    ) -> Result<String> {
        let body_text = Self::encode_body(body)?;
        let signature = sig_ctx
            .sign(fpr, body_text.as_bytes())
            .map_err(|e| ManifestError::SignatureError(e.to_string()))?;
        Ok(build_envelope(fpr, &signature, &body_text))
    }

    /// Encrypts `body` for `recipients` and frames a signed, encrypted
    /// envelope.
    pub fn encode_encrypted<T: Serialize>(
        body: &T,
        fpr: &Fingerprint,
        recipients: &[PublicKey],
        sig_ctx: &mut SigContext,
    ) -> Result<String> {
        let body_text = Self::encode_body(body)?;
        let encrypted = sig_ctx
            .encrypt(body_text.as_bytes(), recipients)
            .map_err(|e| ManifestError::SignatureError(e.to_string()))?;
        let wire = EncryptedWire::from(&encrypted);
        let frame_text = serde_yaml::to_string(&BodyFrameWire::Encrypted { encrypted: wire })?;
        let signature = sig_ctx
            .sign(fpr, frame_text.as_bytes())
            .map_err(|e| ManifestError::SignatureError(e.to_string()))?;
        Ok(build_envelope(fpr, &signature, &frame_text))
    }

    /// Parses an envelope, verifies its signature against `public`,
    /// decrypts the body if wrapped, validates the frozen schema version,
    /// and returns the typed body.
    ///
    /// `public` must already be established as one of the claimed owner's
    /// known pubkeys by the caller (ObjectModel/Resolver); this function
    /// only checks that the envelope's signature matches the bytes it
    /// frames.
    pub fn decode<T: DeserializeOwned + Versioned>(
        text: &str,
        public: &PublicKey,
        sig_ctx: &mut SigContext,
    ) -> Result<T> {
        let (header, body_text) = parse_envelope(text)?;

        let ok = sig_ctx
            .verify(
                &header.fingerprint,
                public,
                body_text.as_bytes(),
                &header.signature,
            )
            .map_err(|e| ManifestError::SignatureError(e.to_string()))?;
        if !ok {
            return Err(ManifestError::SignatureError(
                "signature does not match body bytes".into(),
            ));
        }

        let frame: BodyFrame<T> = serde_yaml::from_str(&body_text)?;
        let body = match frame {
            BodyFrame::Cleartext(body) => body,
            BodyFrame::Encrypted { encrypted } => {
                let encrypted = wildland_crypto::Encrypted::try_from(&encrypted)
                    .map_err(ManifestError::Envelope)?;
                let cleartext = sig_ctx
                    .decrypt(&encrypted)
                    .map_err(|_| ManifestError::Unencryptable)?;
                let cleartext = String::from_utf8(cleartext)
                    .map_err(|e| ManifestError::Envelope(e.to_string()))?;
                serde_yaml::from_str(&cleartext)?
            }
        };

        if body.version() != SCHEMA_VERSION {
            return Err(ManifestError::VersionMismatch(body.version().to_string()));
        }

        Ok(body)
    }
}

#[derive(serde::Serialize)]
#[serde(untagged)]
enum BodyFrameWire {
    Encrypted { encrypted: EncryptedWire },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Dummy {
        version: String,
        owner: String,
        value: u32,
    }

    impl Versioned for Dummy {
        fn version(&self) -> &str {
            &self.version
        }
    }

    #[test]
    fn test_sign_then_verify_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = SigContext::new(dir.path(), false);
        let (fpr, public) = ctx.generate().unwrap();

        let body = Dummy {
            version: "1".into(),
            owner: fpr.to_string(),
            value: 42,
        };
        let text = ManifestCodec::encode(&body, &fpr, &mut ctx).unwrap();
        let decoded: Dummy = ManifestCodec::decode(&text, &public, &mut ctx).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_tamper_detection() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = SigContext::new(dir.path(), false);
        let (fpr, public) = ctx.generate().unwrap();

        let body = Dummy {
            version: "1".into(),
            owner: fpr.to_string(),
            value: 1,
        };
        let text = ManifestCodec::encode(&body, &fpr, &mut ctx).unwrap();
        let tampered = text.replace("value: 1", "value: 999");
        let result: Result<Dummy> = ManifestCodec::decode(&tampered, &public, &mut ctx);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = SigContext::new(dir.path(), false);
        let (fpr, public) = ctx.generate().unwrap();

        let body = Dummy {
            version: "2".into(),
            owner: fpr.to_string(),
            value: 1,
        };
        let text = ManifestCodec::encode(&body, &fpr, &mut ctx).unwrap();
        let result: Result<Dummy> = ManifestCodec::decode(&text, &public, &mut ctx);
        assert!(matches!(result, Err(ManifestError::VersionMismatch(_))));
    }

    #[test]
    fn test_encrypt_then_decode_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = SigContext::new(dir.path(), false);
        let (fpr, public) = ctx.generate().unwrap();

        let body = Dummy {
            version: "1".into(),
            owner: fpr.to_string(),
            value: 7,
        };
        let text =
            ManifestCodec::encode_encrypted(&body, &fpr, &[public.clone()], &mut ctx).unwrap();
        let decoded: Dummy = ManifestCodec::decode(&text, &public, &mut ctx).unwrap();
        assert_eq!(decoded, body);
    }
}
