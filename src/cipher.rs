//! Single-byte XOR cipher over base64-encoded payloads.
//!
//! Every encrypted blob on the wire (identity payloads, position updates,
//! intercepted message fragments) is base64 text whose decoded bytes are
//! XOR-ed with one key byte. The operation is symmetric, so the same
//! function serves the key-recovery search and normal traffic decoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Sentinel returned when the input is not valid base64.
///
/// Decode faults are recovered locally: callers get a plain string that
/// never parses as a profile or position record, so a corrupt payload
/// simply fails the downstream parse instead of erroring the session.
pub const BASE64_DECODE_ERROR: &str = "<base64 decode error>";

/// Decrypt base64 `text` by XOR-ing every decoded byte with `key`.
///
/// Returns [`BASE64_DECODE_ERROR`] if the input is not valid base64.
/// Non-UTF-8 results (the common case while probing wrong keys) are
/// replaced lossily, which is fine: the search only cares whether the
/// output parses as JSON.
pub fn xor_decrypt(text: &str, key: u8) -> String {
    match STANDARD.decode(text) {
        Ok(bytes) => {
            let plain: Vec<u8> = bytes.iter().map(|b| b ^ key).collect();
            String::from_utf8_lossy(&plain).into_owned()
        }
        Err(e) => {
            log::debug!("base64 decode failed: {e}");
            BASE64_DECODE_ERROR.to_string()
        }
    }
}

/// Encrypt `text` with `key` and base64-encode the result.
///
/// Exact inverse of [`xor_decrypt`]; used by tests and benches to build
/// wire-shaped payloads.
pub fn xor_encrypt(text: &str, key: u8) -> String {
    let bytes: Vec<u8> = text.bytes().map(|b| b ^ key).collect();
    STANDARD.encode(bytes)
}
