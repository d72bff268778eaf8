use base64::Engine;
use wildland_crypto::Fingerprint;

use crate::error::{ManifestError, Result};

const SEPARATOR: &str = "\n---\n";

/// The parsed signature header of a manifest envelope.
#[derive(Debug, Clone)]
pub struct SignatureHeader {
    pub fingerprint: Fingerprint,
    pub signature: Vec<u8>,
}

/// Splits a manifest envelope (`signature: |\n  <fpr>:<b64>\n---\n<body>`)
/// into its signature header and the raw YAML body bytes that were signed.
pub fn parse_envelope(text: &str) -> Result<(SignatureHeader, String)> {
    let (header_part, body) = text
        .split_once(SEPARATOR)
        .ok_or_else(|| ManifestError::Envelope("missing '---' body separator".into()))?;

    let sig_line = header_part
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && *line != "signature: |")
        .ok_or_else(|| ManifestError::Envelope("missing signature line".into()))?;

    let (fpr_str, b64_sig) = sig_line
        .split_once(':')
        .ok_or_else(|| ManifestError::Envelope("signature line must be '<fpr>:<base64>'".into()))?;

    let fingerprint = Fingerprint::try_from(fpr_str.to_string())
        .map_err(|e| ManifestError::Envelope(e.to_string()))?;
    let signature = base64::engine::general_purpose::STANDARD
        .decode(b64_sig)
        .map_err(|e| ManifestError::Envelope(format!("invalid base64 signature: {e}")))?;

    Ok((
        SignatureHeader {
            fingerprint,
            signature,
        },
        body.to_string(),
    ))
}

/// Builds the two-part envelope text from a signature header and an
/// already-canonically-serialized body.
pub fn build_envelope(fingerprint: &Fingerprint, signature: &[u8], body: &str) -> String {
    let b64_sig = base64::engine::general_purpose::STANDARD.encode(signature);
    format!("signature: |\n  {fingerprint}:{b64_sig}{SEPARATOR}{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_then_parse_roundtrip() {
        let fpr = Fingerprint::try_from("0xabc123".to_string()).unwrap();
        let body = "owner: \"0xabc123\"\npaths:\n  - /users/alice\n";
        let text = build_envelope(&fpr, &[1, 2, 3, 4], body);
        let (header, parsed_body) = parse_envelope(&text).unwrap();
        assert_eq!(header.fingerprint, fpr);
        assert_eq!(header.signature, vec![1, 2, 3, 4]);
        assert_eq!(parsed_body, body);
    }

    #[test]
    fn test_missing_separator_is_rejected() {
        assert!(parse_envelope("signature: |\n  0x1:AAAA\nbody: only\n").is_err());
    }
}
