//! Windows-1251 bridge.
//!
//! The device speaks Windows-1251 in both directions. Outgoing commands are
//! encoded strictly (an unmappable character fails the call). Incoming bytes
//! are decoded either lossily, for traffic logs that must never abort an
//! exchange, or strictly, when the text feeds structured parsing.

use crate::kkt::error::{KktError, Result};
use encoding_rs::WINDOWS_1251;

/// The one byte Windows-1251 leaves unassigned. encoding_rs passes it
/// through as U+0098; the device never sends it in valid text.
const UNASSIGNED: u8 = 0x98;

/// Encode UTF-8 text into Windows-1251 bytes.
pub fn encode(text: &str) -> Result<Vec<u8>> {
    let unmappable = |c: char| {
        let mut buf = [0u8; 4];
        c == char::from(UNASSIGNED) || WINDOWS_1251.encode(c.encode_utf8(&mut buf)).2
    };
    if let Some(c) = text.chars().find(|&c| unmappable(c)) {
        return Err(KktError::Encoding(format!(
            "{c:?} (U+{:04X}) has no Windows-1251 representation",
            c as u32
        )));
    }
    Ok(WINDOWS_1251.encode(text).0.into_owned())
}

/// Decode Windows-1251 bytes, failing on the unassigned byte 0x98.
pub fn decode(bytes: &[u8]) -> Result<String> {
    if let Some(pos) = bytes.iter().position(|&b| b == UNASSIGNED) {
        return Err(KktError::Encoding(format!(
            "unassigned Windows-1251 byte 0x{UNASSIGNED:02X} at offset {pos}"
        )));
    }
    Ok(WINDOWS_1251
        .decode_without_bom_handling(bytes)
        .0
        .into_owned())
}

/// Decode for display only. The unassigned byte becomes U+FFFD.
pub fn decode_lossy(bytes: &[u8]) -> String {
    let text = WINDOWS_1251.decode_without_bom_handling(bytes).0;
    if bytes.contains(&UNASSIGNED) {
        text.replace(char::from(UNASSIGNED), "\u{FFFD}")
    } else {
        text.into_owned()
    }
}

/// Escape text for embedding as XML element content.
///
/// Only `&`, `<` and `>` are replaced. Quotes are left as they are because the
/// device prints `&quot;` literally in OFD and organization names. The result
/// is therefore not safe inside a single-quoted attribute if the input holds
/// `'`; callers must keep apostrophes out of attribute values.
pub fn escape_xml_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
