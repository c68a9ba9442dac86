// encodings/utf8.rs - UTF-8 encoding (RFC 3629 range: U+0000 - U+10FFFF).
//
// Invalid sequences are not rejected: a stray continuation or an invalid
// lead byte is treated as a one-byte character, so the engine always makes
// progress.

use crate::regenc::*;

#[inline]
fn utf8_islead(c: u8) -> bool {
    (c & 0xc0) != 0x80
}

// Maps first byte to character length (RFC 3629: max 4 bytes).
static ENC_LEN_UTF8: [u8; 256] = [
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
];

pub struct Utf8Encoding;

pub static ENCODING_UTF8: Utf8Encoding = Utf8Encoding;

impl Encoding for Utf8Encoding {
    fn name(&self) -> &str {
        "UTF-8"
    }

    fn mbc_enc_len(&self, p: &[u8]) -> usize {
        ENC_LEN_UTF8[p[0] as usize] as usize
    }

    fn mbc_to_code(&self, p: &[u8]) -> CodePoint {
        let len = (ENC_LEN_UTF8[p[0] as usize] as usize).min(p.len());
        let c = p[0] as u32;
        if len > 1 {
            let remaining = len - 1;
            let mut n = c & ((1u32 << (6 - remaining)) - 1);
            for &b in &p[1..len] {
                n = (n << 6) | (b as u32 & 0x3f);
            }
            n
        } else {
            c
        }
    }

    fn is_code_word(&self, code: CodePoint) -> bool {
        if code < 128 {
            return (code as u8).is_ascii_alphanumeric() || code == b'_' as CodePoint;
        }
        char::from_u32(code).is_some_and(|c| c.is_alphanumeric())
    }

    fn case_fold(&self, code: CodePoint) -> CodePoint {
        if code < 128 {
            return (code as u8).to_ascii_lowercase() as CodePoint;
        }
        // Only one-to-one mappings; multi-char folds are resolved at compile time.
        let Some(c) = char::from_u32(code) else {
            return code;
        };
        let mut lower = c.to_lowercase();
        match (lower.next(), lower.next()) {
            (Some(l), None) => l as CodePoint,
            _ => code,
        }
    }

    fn left_adjust_char_head(&self, start: usize, s: usize, data: &[u8]) -> usize {
        if s <= start {
            return s;
        }
        let mut p = s;
        // A lead byte is at most three bytes before the tail.
        while p > start && s - p < 3 && !utf8_islead(data[p]) {
            p -= 1;
        }
        // The lead only owns `s` if its sequence reaches that far; otherwise
        // `s` is a stray continuation byte and stands alone.
        if utf8_islead(data[p]) && p + self.mbc_enc_len(&data[p..]) > s {
            p
        } else {
            s
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_lengths() {
        let s = "aé€😀".as_bytes();
        assert_eq!(ENCODING_UTF8.mbc_enc_len(&s[0..]), 1);
        assert_eq!(ENCODING_UTF8.mbc_enc_len(&s[1..]), 2);
        assert_eq!(ENCODING_UTF8.mbc_enc_len(&s[3..]), 3);
        assert_eq!(ENCODING_UTF8.mbc_enc_len(&s[6..]), 4);
        assert_eq!(ENCODING_UTF8.mbc_to_code(&s[1..]), 'é' as u32);
        assert_eq!(ENCODING_UTF8.mbc_to_code(&s[3..]), '€' as u32);
        assert_eq!(ENCODING_UTF8.mbc_to_code(&s[6..]), '😀' as u32);
    }

    #[test]
    fn left_adjust_finds_lead_byte() {
        let s = "a€b".as_bytes();
        assert_eq!(ENCODING_UTF8.left_adjust_char_head(0, 3, s), 1);
        assert_eq!(ENCODING_UTF8.left_adjust_char_head(0, 2, s), 1);
        assert_eq!(ENCODING_UTF8.left_adjust_char_head(0, 4, s), 4);
        assert_eq!(ENCODING_UTF8.left_adjust_char_head(2, 3, s), 3);
    }

    #[test]
    fn left_adjust_stray_continuation() {
        // [c3 a9] [a9] x: the second a9 is a character of its own.
        let s = [0xc3, 0xa9, 0xa9, b'x'];
        assert_eq!(ENCODING_UTF8.left_adjust_char_head(0, 1, &s), 0);
        assert_eq!(ENCODING_UTF8.left_adjust_char_head(0, 2, &s), 2);
        // Lead of a two-byte sequence cannot own a byte three ahead.
        let s = [0xc3, 0x80, 0x80, 0x80];
        assert_eq!(ENCODING_UTF8.left_adjust_char_head(0, 3, &s), 3);
        // ASCII lead never owns what follows.
        let s = [b'a', 0x80];
        assert_eq!(ENCODING_UTF8.left_adjust_char_head(0, 1, &s), 1);
    }

    #[test]
    fn fold_and_word() {
        assert_eq!(ENCODING_UTF8.case_fold('É' as u32), 'é' as u32);
        assert_eq!(ENCODING_UTF8.case_fold('B' as u32), 'b' as u32);
        assert!(ENCODING_UTF8.is_code_word('ß' as u32));
        assert!(!ENCODING_UTF8.is_code_word('·' as u32));
    }
}
