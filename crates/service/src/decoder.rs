//! Exit-Request Payload Decoder
//!
//! The oracle packs exit requests as fixed 64-byte records:
//!
//! ```text
//! bytes 0..3   moduleId         (big-endian u24)
//! bytes 3..8   nodeOpId         (big-endian u40)
//! bytes 8..16  validatorIndex   (big-endian u64)
//! bytes 16..64 pubkey           (48 bytes)
//! ```

use thiserror::Error;

/// Packed record stride.
pub const EXIT_REQUEST_RECORD_BYTES: usize = 64;

/// Errors from exit-request decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("exit data length {0} is not a multiple of {EXIT_REQUEST_RECORD_BYTES}")]
    MalformedExitData(usize),

    #[error("exit data is not valid hex: {0}")]
    MalformedHex(String),
}

/// One decoded exit request entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedValidator {
    /// Ordinal within the packed payload, starting at 0.
    pub exit_data_index: u32,
    pub module_id: u64,
    pub node_op_id: u64,
    pub validator_index: u64,
    pub pubkey: [u8; 48],
}

/// Decode a packed exit-request payload. A leading ASCII `0x` marks a
/// hex-encoded payload and is stripped first.
pub fn decode_exit_requests(data: &[u8]) -> Result<Vec<DecodedValidator>, DecodeError> {
    let raw: Vec<u8>;
    let bytes: &[u8] = if data.starts_with(b"0x") {
        raw = hex::decode(&data[2..]).map_err(|e| DecodeError::MalformedHex(e.to_string()))?;
        &raw
    } else {
        data
    };

    if bytes.len() % EXIT_REQUEST_RECORD_BYTES != 0 {
        return Err(DecodeError::MalformedExitData(bytes.len()));
    }

    let mut validators = Vec::with_capacity(bytes.len() / EXIT_REQUEST_RECORD_BYTES);
    for (ordinal, record) in bytes.chunks_exact(EXIT_REQUEST_RECORD_BYTES).enumerate() {
        let mut pubkey = [0u8; 48];
        pubkey.copy_from_slice(&record[16..64]);
        validators.push(DecodedValidator {
            exit_data_index: ordinal as u32,
            module_id: be_uint(&record[0..3]),
            node_op_id: be_uint(&record[3..8]),
            validator_index: be_uint(&record[8..16]),
            pubkey,
        });
    }
    Ok(validators)
}

/// Re-pack decoded entries into the oracle's byte layout. Used by tests to
/// pin the round-trip property and by log output.
#[must_use]
pub fn encode_exit_requests(validators: &[DecodedValidator]) -> Vec<u8> {
    let mut out = Vec::with_capacity(validators.len() * EXIT_REQUEST_RECORD_BYTES);
    for v in validators {
        out.extend_from_slice(&v.module_id.to_be_bytes()[5..]);
        out.extend_from_slice(&v.node_op_id.to_be_bytes()[3..]);
        out.extend_from_slice(&v.validator_index.to_be_bytes());
        out.extend_from_slice(&v.pubkey);
    }
    out
}

fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}
