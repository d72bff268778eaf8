//! Manifest envelope parsing, canonical serialization, signing/verification
//! framing, and transparent decrypt-on-load.
//!
//! The wire format is the two-part text described by the external
//! interfaces: a `signature: |` header line holding `<fpr>:<base64>`, a
//! `---` separator, and a YAML body. The body is either the cleartext
//! object or an `encrypted: {...}` wrapper produced by `wildland-crypto`.

mod codec;
mod envelope;
mod error;
mod wire;

pub use codec::{ManifestCodec, Versioned, SCHEMA_VERSION};
pub use envelope::{build_envelope, parse_envelope, SignatureHeader};
pub use error::{ManifestError, Result};
pub use wire::EncryptedWire;
