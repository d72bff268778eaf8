use base64::Engine;
use serde::{Deserialize, Serialize};
use wildland_crypto::{Encrypted, Fingerprint, WrappedKey};

/// Base64-friendly YAML representation of [`wildland_crypto::Encrypted`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedWire {
    pub nonce: String,
    pub data: String,
    pub keys: Vec<WrappedKeyWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedKeyWire {
    pub user: Fingerprint,
    pub ephemeral: String,
    pub wrapped: String,
}

impl From<&Encrypted> for EncryptedWire {
    fn from(value: &Encrypted) -> Self {
        let engine = &base64::engine::general_purpose::STANDARD;
        Self {
            nonce: engine.encode(value.nonce),
            data: engine.encode(&value.ciphertext),
            keys: value
                .encrypted_keys
                .iter()
                .map(|k| WrappedKeyWire {
                    user: k.recipient.clone(),
                    ephemeral: engine.encode(k.ephemeral_public),
                    wrapped: engine.encode(&k.wrapped),
                })
                .collect(),
        }
    }
}

impl TryFrom<&EncryptedWire> for Encrypted {
    type Error = String;

    fn try_from(value: &EncryptedWire) -> Result<Self, Self::Error> {
        let engine = &base64::engine::general_purpose::STANDARD;
        let nonce_vec = engine.decode(&value.nonce).map_err(|e| e.to_string())?;
        let nonce: [u8; 12] = nonce_vec
            .try_into()
            .map_err(|_| "nonce must be 12 bytes".to_string())?;
        let ciphertext = engine.decode(&value.data).map_err(|e| e.to_string())?;

        let mut encrypted_keys = Vec::with_capacity(value.keys.len());
        for key in &value.keys {
            let ephemeral_vec = engine.decode(&key.ephemeral).map_err(|e| e.to_string())?;
            let ephemeral_public: [u8; 32] = ephemeral_vec
                .try_into()
                .map_err(|_| "ephemeral key must be 32 bytes".to_string())?;
            let wrapped = engine.decode(&key.wrapped).map_err(|e| e.to_string())?;
            encrypted_keys.push(WrappedKey {
                recipient: key.user.clone(),
                ephemeral_public,
                wrapped,
            });
        }

        Ok(Encrypted {
            nonce,
            ciphertext,
            encrypted_keys,
        })
    }
}
