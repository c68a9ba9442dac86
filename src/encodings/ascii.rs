// encodings/ascii.rs - US-ASCII encoding.
// One byte per character; bytes 0x80-0xff are never word characters and
// fold to themselves.

use crate::regenc::*;

pub struct AsciiEncoding;

pub static ENCODING_ASCII: AsciiEncoding = AsciiEncoding;

impl Encoding for AsciiEncoding {
    fn name(&self) -> &str {
        "US-ASCII"
    }

    fn mbc_enc_len(&self, _p: &[u8]) -> usize {
        1
    }

    fn mbc_to_code(&self, p: &[u8]) -> CodePoint {
        p[0] as CodePoint
    }

    fn is_code_word(&self, code: CodePoint) -> bool {
        code < 128 && ((code as u8).is_ascii_alphanumeric() || code == b'_' as CodePoint)
    }

    fn case_fold(&self, code: CodePoint) -> CodePoint {
        if code < 128 {
            (code as u8).to_ascii_lowercase() as CodePoint
        } else {
            code
        }
    }

    fn left_adjust_char_head(&self, _start: usize, s: usize, _data: &[u8]) -> usize {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_chars() {
        assert!(ENCODING_ASCII.is_code_word('a' as u32));
        assert!(ENCODING_ASCII.is_code_word('Z' as u32));
        assert!(ENCODING_ASCII.is_code_word('7' as u32));
        assert!(ENCODING_ASCII.is_code_word('_' as u32));
        assert!(!ENCODING_ASCII.is_code_word('-' as u32));
        assert!(!ENCODING_ASCII.is_code_word(0xe9));
    }

    #[test]
    fn fold_is_ascii_only() {
        assert_eq!(ENCODING_ASCII.case_fold('Q' as u32), 'q' as u32);
        assert_eq!(ENCODING_ASCII.case_fold('q' as u32), 'q' as u32);
        assert_eq!(ENCODING_ASCII.case_fold(0xc9), 0xc9);
    }
}
