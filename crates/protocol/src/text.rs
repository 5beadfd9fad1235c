//! Text helpers for strings received from Unreal Engine 2 servers
//!
//! Wire strings are 8-bit Latin-1, not UTF-8. Server and player names may
//! embed colour codes: an ESC byte (0x1B) followed by three RGB bytes.

const COLOR_ESCAPE: u8 = 0x1B;
const COLOR_CODE_LEN: usize = 4;

/// Decode Latin-1 bytes; every byte maps to the code point of the same value
pub fn decode_latin1(data: &[u8]) -> String {
    data.iter().map(|&b| b as char).collect()
}

/// Encode to Latin-1, replacing characters above U+00FF with `?`
pub fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Remove `ESC R G B` colour sequences
///
/// A truncated sequence at the end of the input is dropped as well.
pub fn strip_color_codes(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == COLOR_ESCAPE {
            i += COLOR_CODE_LEN;
            continue;
        }
        out.push(data[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_roundtrip() {
        let raw = b"J\xe4ger \xa9";
        let text = decode_latin1(raw);
        assert_eq!(text, "J\u{e4}ger \u{a9}");
        assert_eq!(encode_latin1(&text), raw.to_vec());
        assert_eq!(encode_latin1("snow \u{2603}"), b"snow ?".to_vec());
    }

    #[test]
    fn test_strip_color_codes() {
        assert_eq!(strip_color_codes(b"\x1b\xff\x00\x00Red\x1b\x01\x01\xffBlue"), b"RedBlue");
        assert_eq!(strip_color_codes(b"plain"), b"plain");
        assert_eq!(strip_color_codes(b"cut\x1b\xff"), b"cut");
    }
}
