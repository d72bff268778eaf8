//! Keypair generation, detached signatures, and per-recipient asymmetric
//! encryption of symmetric keys, as used by Wildland's manifest envelopes.
//!
//! [`SigContext`] is the single entry point: it owns a key directory on
//! disk (`<fpr>.pub` / `<fpr>.sec`) and exposes `generate`/`sign`/`verify`/
//! `encrypt`/`decrypt`. A context constructed with `dummy: true` swaps every
//! operation for an identity transform, for use in tests that don't want to
//! pay for real cryptography — and is tagged so it can never cross-verify
//! against real key material.

mod context;
mod encrypt;
mod error;
mod keys;

pub use context::SigContext;
pub use encrypt::{Encrypted, WrappedKey};
pub use error::{CryptoError, Result};
pub use keys::{Fingerprint, PublicKey, SecretKey};
