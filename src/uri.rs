//! Metadata URI encoding.
//!
//! The registry stores a single string per agent. Rather than depending on an
//! external host, the metadata document is embedded whole in a `data:` URI,
//! base64-encoded. Encoding is deterministic and lossless: decoding always
//! reproduces the exact input bytes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

const DATA_URI_PREFIX: &str = "data:application/json;base64,";

/// Errors from [`decode_metadata`].
#[derive(Debug, thiserror::Error)]
pub enum UriError {
    #[error("not a base64 application/json data URI")]
    UnsupportedScheme,
    #[error("data URI payload is not valid base64: {0}")]
    InvalidPayload(#[from] base64::DecodeError),
}

/// Embed serialized metadata bytes in a self-describing data URI.
pub fn encode_metadata(bytes: &[u8]) -> String {
    format!("{DATA_URI_PREFIX}{}", BASE64.encode(bytes))
}

/// Recover the exact bytes previously encoded with [`encode_metadata`].
pub fn decode_metadata(uri: &str) -> Result<Vec<u8>, UriError> {
    let payload = uri
        .strip_prefix(DATA_URI_PREFIX)
        .ok_or(UriError::UnsupportedScheme)?;
    Ok(BASE64.decode(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encode_matches_known_vector() {
        // {"name":"A"} is the canonical worked example for this format.
        let uri = encode_metadata(br#"{"name":"A"}"#);
        assert_eq!(uri, "data:application/json;base64,eyJuYW1lIjoiQSJ9");
    }

    #[test]
    fn decode_inverts_encode() {
        let inputs: &[&[u8]] = &[
            b"",
            br#"{"name":"A"}"#,
            br#"{"name":"Frack","services":[{"name":"web"}]}"#,
            &[0u8, 159, 146, 150], // not UTF-8; encoding is byte-level
        ];
        for input in inputs {
            let uri = encode_metadata(input);
            assert_eq!(decode_metadata(&uri).unwrap(), input.to_vec());
        }
    }

    #[test]
    fn encode_is_deterministic() {
        let doc = br#"{"name":"A","description":"agent"}"#;
        assert_eq!(encode_metadata(doc), encode_metadata(doc));
    }

    #[test]
    fn decode_rejects_foreign_uris() {
        assert!(matches!(
            decode_metadata("https://example.com/agent.json"),
            Err(UriError::UnsupportedScheme)
        ));
        assert!(matches!(
            decode_metadata("data:application/json;base64,!!!"),
            Err(UriError::InvalidPayload(_))
        ));
    }
}
