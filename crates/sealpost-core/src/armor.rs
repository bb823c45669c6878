//! ASCII armor: a labelled BEGIN/END block around hex-encoded bytes.

use crate::error::{CryptoError, CryptoResult};

/// Label for armored messages.
pub const MESSAGE: &str = "SEALPOST MESSAGE";

/// Label for armored key blocks.
pub const KEY_BLOCK: &str = "SEALPOST KEY BLOCK";

const LINE_WIDTH: usize = 64;

/// Armor `data` under `label`.
pub fn encode(label: &str, data: &[u8]) -> String {
    let hex = hex::encode(data);
    let mut out = format!("-----BEGIN {label}-----\n\n");
    for chunk in hex.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out
}

/// Extract the bytes of the first `label` block in `text`.
///
/// Surrounding text is ignored, so a block can be lifted out of a mail body.
pub fn decode(label: &str, text: &str) -> CryptoResult<Vec<u8>> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let mut lines = text.lines().map(str::trim);
    if !lines.any(|line| line == begin) {
        return Err(CryptoError::ArmorParse(format!("missing '{begin}'")));
    }

    let mut hex = String::new();
    let mut closed = false;
    for line in lines {
        if line == end {
            closed = true;
            break;
        }
        // header lines ("Version: ...") and blank separators
        if line.is_empty() || line.contains(':') {
            continue;
        }
        hex.push_str(line);
    }
    if !closed {
        return Err(CryptoError::ArmorParse(format!("missing '{end}'")));
    }
    hex::decode(&hex).map_err(|e| CryptoError::ArmorParse(e.to_string()))
}
