// regenc.rs - Encoding trait and shared character-stepping helpers.
//
// The engine never inspects a character table directly. Everything it needs
// to know about the text encoding goes through this trait: char length,
// decoding, line terminators, word classification, single-char case folding,
// code-range membership and head adjustment for stepping backwards.

/// A decoded character.
pub type CodePoint = u32;

/// Encodings are stateless singletons shared by every program using them.
pub type EncodingRef = &'static dyn Encoding;

pub const NEWLINE_CODE: CodePoint = 0x0a;

/// Code points below this are tested against a class's bitset,
/// everything at or above it against its range table.
pub const SINGLE_BYTE_SIZE: CodePoint = 256;

/// Inclusive code point range used by multi-byte class tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodeRange {
    pub from: CodePoint,
    pub to: CodePoint,
}

impl CodeRange {
    pub const fn new(from: CodePoint, to: CodePoint) -> Self {
        CodeRange { from, to }
    }
}

pub trait Encoding: Send + Sync {
    /// Encoding name (e.g. "US-ASCII", "UTF-8")
    fn name(&self) -> &str;

    /// Byte length of the character starting at `p[0]`. `p` is never empty.
    fn mbc_enc_len(&self, p: &[u8]) -> usize;

    /// Decode the character starting at `p[0]`.
    fn mbc_to_code(&self, p: &[u8]) -> CodePoint;

    /// Is the character starting at `p[0]` a line terminator?
    fn is_mbc_newline(&self, p: &[u8]) -> bool {
        p.first() == Some(&(NEWLINE_CODE as u8))
    }

    /// Word-character classification (`\w`).
    fn is_code_word(&self, code: CodePoint) -> bool;

    /// Fold one character for case-insensitive comparison.
    fn case_fold(&self, code: CodePoint) -> CodePoint;

    /// Find the head of the character containing byte `s`, not going below `start`.
    fn left_adjust_char_head(&self, start: usize, s: usize, data: &[u8]) -> usize;

    /// Membership test against a sorted, non-overlapping range table.
    fn is_in_code_range(&self, ranges: &[CodeRange], code: CodePoint) -> bool {
        is_in_code_range(ranges, code)
    }
}

/// Binary search over a sorted range table.
pub fn is_in_code_range(ranges: &[CodeRange], code: CodePoint) -> bool {
    let mut low = 0;
    let mut high = ranges.len();
    while low < high {
        let x = (low + high) >> 1;
        if code > ranges[x].to {
            low = x + 1;
        } else {
            high = x;
        }
    }
    low < ranges.len() && code >= ranges[low].from
}

/// Length of the character at `s`, clamped to the bytes that are actually there.
#[inline]
pub fn enclen(enc: EncodingRef, data: &[u8], s: usize) -> usize {
    if s >= data.len() {
        return 1;
    }
    enc.mbc_enc_len(&data[s..]).clamp(1, data.len() - s)
}

/// Decode the character at `s`.
#[inline]
pub fn code_at(enc: EncodingRef, data: &[u8], s: usize, end: usize) -> CodePoint {
    let len = enclen(enc, data, s);
    enc.mbc_to_code(&data[s..end.min(s + len)])
}

#[inline]
pub fn is_newline_at(enc: EncodingRef, data: &[u8], s: usize, end: usize) -> bool {
    s < end && enc.is_mbc_newline(&data[s..end])
}

#[inline]
pub fn is_word_at(enc: EncodingRef, data: &[u8], s: usize, end: usize) -> bool {
    s < end && enc.is_code_word(code_at(enc, data, s, end))
}

/// Head of the character before `s`, or `None` at `start`.
pub fn prev_char_head(enc: EncodingRef, start: usize, s: usize, data: &[u8]) -> Option<usize> {
    if s <= start {
        None
    } else {
        Some(enc.left_adjust_char_head(start, s - 1, data))
    }
}

/// Step back `n` characters from `s`. `None` if the text before `s` is too short.
pub fn step_back(enc: EncodingRef, start: usize, s: usize, data: &[u8], n: usize) -> Option<usize> {
    let mut s = s;
    for _ in 0..n {
        s = prev_char_head(enc, start, s, data)?;
    }
    Some(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encodings::utf8::ENCODING_UTF8;

    #[test]
    fn code_range_lookup() {
        let ranges = [
            CodeRange::new(0x100, 0x17f),
            CodeRange::new(0x3040, 0x309f),
            CodeRange::new(0x1f600, 0x1f64f),
        ];
        assert!(is_in_code_range(&ranges, 0x100));
        assert!(is_in_code_range(&ranges, 0x3042));
        assert!(is_in_code_range(&ranges, 0x1f64f));
        assert!(!is_in_code_range(&ranges, 0xff));
        assert!(!is_in_code_range(&ranges, 0x2000));
        assert!(!is_in_code_range(&ranges, 0x1f650));
        assert!(!is_in_code_range(&[], 0x41));
    }

    #[test]
    fn step_back_over_multibyte() {
        let text = "aéz".as_bytes(); // a, é (2 bytes), z
        assert_eq!(step_back(&ENCODING_UTF8, 0, 4, text, 1), Some(3));
        assert_eq!(step_back(&ENCODING_UTF8, 0, 4, text, 2), Some(1));
        assert_eq!(step_back(&ENCODING_UTF8, 0, 4, text, 3), Some(0));
        assert_eq!(step_back(&ENCODING_UTF8, 0, 4, text, 4), None);
    }

    #[test]
    fn enclen_clamps_truncated_sequence() {
        let text = [b'a', 0xe3, 0x81];
        assert_eq!(enclen(&ENCODING_UTF8, &text, 1), 2);
    }
}
