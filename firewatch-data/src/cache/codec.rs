//! Payload encoding: JSON, gzip-compressed above a size threshold.

use std::io::{Read, Write};

use firewatch_core::EventRecord;
use flate2::{Compression, read::GzDecoder, write::GzEncoder};

use super::CacheError;

/// Encoded payload plus whether it was compressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Encoded {
    pub(crate) bytes: Vec<u8>,
    pub(crate) compressed: bool,
}

/// Serialise `events`, compressing when the JSON exceeds `threshold` bytes.
pub(crate) fn encode(events: &[EventRecord], threshold: usize) -> Result<Encoded, CacheError> {
    let json = serde_json::to_vec(events).map_err(|source| CacheError::Encode { source })?;
    if json.len() <= threshold {
        return Ok(Encoded {
            bytes: json,
            compressed: false,
        });
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|source| CacheError::Compress { source })?;
    let bytes = encoder
        .finish()
        .map_err(|source| CacheError::Compress { source })?;
    Ok(Encoded {
        bytes,
        compressed: true,
    })
}

/// Recover the JSON text of a stored payload.
pub(crate) fn decode(bytes: &[u8], compressed: bool) -> Result<String, CacheError> {
    if !compressed {
        return String::from_utf8(bytes.to_vec()).map_err(|err| CacheError::Decompress {
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        });
    }
    let mut text = String::new();
    GzDecoder::new(bytes)
        .read_to_string(&mut text)
        .map_err(|source| CacheError::Decompress { source })?;
    Ok(text)
}
