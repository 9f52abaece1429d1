//! Content transfer decoding for fetched body parts.

use log::warn;

/// Decode body bytes according to their `Content-Transfer-Encoding`.
///
/// `7bit`, `8bit` and `binary` (and the empty default) pass through
/// untouched. An encoding we do not know also passes through, with a
/// warning, so the raw bytes at least reach the caller.
pub fn decode_body(encoding: &str, data: &[u8]) -> Vec<u8> {
    match encoding {
        "quoted-printable" => {
            match quoted_printable::decode(data, quoted_printable::ParseMode::Robust) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!("quoted-printable decode failed ({}), passing through", e);
                    data.to_vec()
                }
            }
        }
        "base64" => {
            // servers wrap base64 bodies in CRLFs; strip all whitespace first
            let filtered: Vec<u8> = data
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            match base64::decode(&filtered) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!("base64 decode failed ({}), passing through", e);
                    data.to_vec()
                }
            }
        }
        "" | "7bit" | "8bit" | "binary" => data.to_vec(),
        other => {
            warn!("unknown encoding {}", other);
            data.to_vec()
        }
    }
}
