//! One-shot gzip + base64 text codec.
//!
//! Used by the dispatcher when a caller sends `accept: gzip`, and exposed for
//! callers that pre/post-process payloads themselves.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{Error, Result};

/// Gzip the UTF-8 bytes of `text` and return them base64-encoded.
pub fn compress(text: &str) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .map_err(|e| Error::Compression(e.to_string()))?;
    let bytes = encoder
        .finish()
        .map_err(|e| Error::Compression(e.to_string()))?;
    Ok(STANDARD.encode(bytes))
}

/// Inverse of [`compress`]: base64-decode, then inflate back to text.
pub fn decompress(compressed: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(compressed.trim())
        .map_err(|e| Error::Compression(format!("invalid base64: {}", e)))?;
    let mut decoder = GzDecoder::new(bytes.as_slice());
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|e| Error::Compression(e.to_string()))?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_text() {
        for text in ["", "Hi", "Hello world!", "{\"msg\":\"Hi!\"}", "ünïcødé ✓"] {
            let packed = compress(text).unwrap();
            assert_eq!(decompress(&packed).unwrap(), text);
        }
    }

    #[test]
    fn output_is_base64_gzip() {
        let packed = compress("Hi").unwrap();
        let raw = STANDARD.decode(&packed).unwrap();
        // gzip magic
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = decompress("not base64 !!").unwrap_err();
        assert!(matches!(err, Error::Compression(_)));
    }

    #[test]
    fn rejects_non_gzip_payload() {
        let bogus = STANDARD.encode(b"plain bytes");
        assert!(matches!(decompress(&bogus), Err(Error::Compression(_))));
    }
}
