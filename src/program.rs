// program.rs - Compiled program: instructions, operand tables, repeat ranges.
//
// A `Program` is produced by a compiler front end and never mutated
// afterwards; any number of engines may run it concurrently.
// `ProgramBuilder` assembles one by hand with symbolic labels.

use std::fmt;

use smallvec::SmallVec;

use crate::error::{Corruption, MatchError};
use crate::options::MatchOptions;
use crate::regenc::*;

// === Bytecode Types ===
pub type RelAddrType = i32;
pub type AbsAddrType = usize;
pub type MemNumType = usize;
pub type RepeatNumType = usize;

pub const INFINITE_REPEAT: u32 = u32::MAX;

// === MemStatus (bit status for captures) ===
// Bit n marks group n; groups past 31 all share bit 0.
pub type MemStatusType = u32;

pub const MEM_STATUS_BITS_NUM: usize = 32;

#[inline]
pub fn mem_status_at(stats: MemStatusType, n: usize) -> bool {
    if n < MEM_STATUS_BITS_NUM {
        (stats & (1u32 << n)) != 0
    } else {
        (stats & 1) != 0
    }
}

#[inline]
pub fn mem_status_on(stats: &mut MemStatusType, n: usize) {
    if n < MEM_STATUS_BITS_NUM {
        if n != 0 {
            *stats |= 1u32 << n;
        }
    } else {
        *stats |= 1;
    }
}

// === BitSet (256 bits for single-byte character classes) ===
pub const BITS_IN_ROOM: usize = 32;
pub const BITSET_REAL_SIZE: usize = SINGLE_BYTE_SIZE as usize / BITS_IN_ROOM;
pub type Bits = u32;
pub type BitSet = [Bits; BITSET_REAL_SIZE];

#[inline]
pub fn bs_room(pos: usize) -> usize {
    pos >> 5
}

#[inline]
pub fn bs_bit(pos: usize) -> u32 {
    1u32 << (pos & 0x1f)
}

#[inline]
pub fn bitset_at(bs: &BitSet, pos: usize) -> bool {
    pos < SINGLE_BYTE_SIZE as usize && (bs[bs_room(pos)] & bs_bit(pos)) != 0
}

#[inline]
pub fn bitset_set_bit(bs: &mut BitSet, pos: usize) {
    bs[bs_room(pos)] |= bs_bit(pos);
}

pub fn bitset_set_range(bs: &mut BitSet, from: u8, to: u8) {
    for c in from..=to {
        bitset_set_bit(bs, c as usize);
    }
}

/// Build a bitset holding exactly the given bytes.
pub fn bitset_of(bytes: &[u8]) -> BitSet {
    let mut bs = [0; BITSET_REAL_SIZE];
    for &b in bytes {
        bitset_set_bit(&mut bs, b as usize);
    }
    bs
}

// === Node-based character class ===
/// A class queried as a whole object, for classes too irregular to inline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CharClass {
    pub bits: BitSet,
    pub ranges: Vec<CodeRange>,
    pub not: bool,
}

impl CharClass {
    pub fn is_code_in(&self, enc: EncodingRef, code: CodePoint) -> bool {
        let found = if code < SINGLE_BYTE_SIZE {
            bitset_at(&self.bits, code as usize)
        } else {
            enc.is_in_code_range(&self.ranges, code)
        };
        found != self.not
    }
}

// === RepeatRange ===
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepeatRange {
    pub lower: u32,
    pub upper: u32,
}

// === Instruction ===
//
// Branch addresses (`addr`) are relative to the instruction's own index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Match candidate; applies the find-longest / find-not-empty policy.
    End,
    /// Stop and report the best candidate recorded so far.
    Finish,
    Fail,

    Exact1 { c: u8 },
    ExactN { s: SmallVec<[u8; 16]> },
    /// Literal stored in the program's template table.
    ExactTemplate { index: usize, offset: usize, len: usize },
    /// Case-insensitive literal; operands are already folded.
    Exact1Ic { c: CodePoint },
    ExactNIc { s: SmallVec<[CodePoint; 8]> },

    CClass { bits: Box<BitSet> },
    CClassMb { ranges: Box<[CodeRange]> },
    CClassMix { bits: Box<BitSet>, ranges: Box<[CodeRange]> },
    CClassNot { bits: Box<BitSet> },
    CClassMbNot { ranges: Box<[CodeRange]> },
    CClassMixNot { bits: Box<BitSet>, ranges: Box<[CodeRange]> },
    CClassNode { index: usize },

    AnyChar,
    AnyCharMl,
    AnyCharStar,
    AnyCharMlStar,
    AnyCharStarPeekNext { c: u8 },
    AnyCharMlStarPeekNext { c: u8 },

    Word,
    NotWord,
    WordBound,
    NotWordBound,
    WordBegin,
    WordEnd,

    BeginBuf,
    EndBuf,
    BeginLine,
    EndLine,
    SemiEndBuf,
    /// Matches only at the position the outer search started from.
    BeginPosition,

    MemStartPush { num: MemNumType },
    MemStart { num: MemNumType },
    MemEndPush { num: MemNumType },
    MemEnd { num: MemNumType },
    /// Unset groups `from..to`.
    MemClear { from: MemNumType, to: MemNumType },

    BackRef1,
    BackRef2,
    BackRefN { num: MemNumType },
    BackRefNIc { num: MemNumType },
    BackRefMulti { nums: SmallVec<[MemNumType; 4]> },
    BackRefMultiIc { nums: SmallVec<[MemNumType; 4]> },
    BackRefWithLevel { ignore_case: bool, level: i32, nums: SmallVec<[MemNumType; 4]> },

    NullCheckStart { id: usize },
    NullCheckEnd { id: usize },
    /// Like `NullCheckEnd`, but an iteration that changed one of `nums` is not empty.
    NullCheckEndMemSt { id: usize, nums: SmallVec<[MemNumType; 4]> },

    Jump { addr: RelAddrType },
    Push { addr: RelAddrType },
    Pop,
    PushOrJumpExact1 { addr: RelAddrType, c: u8 },
    PushIfPeekNext { addr: RelAddrType, c: u8 },

    Repeat { id: RepeatNumType, addr: RelAddrType },
    RepeatNg { id: RepeatNumType, addr: RelAddrType },
    RepeatInc { id: RepeatNumType },
    RepeatIncSg { id: RepeatNumType },
    RepeatIncNg { id: RepeatNumType },
    RepeatIncNgSg { id: RepeatNumType },

    PushPos,
    PopPos,
    PushPosNot { addr: RelAddrType },
    FailPos,
    PushStopBt,
    PopStopBt,
    LookBehind { len: usize },
    PushLookBehindNot { addr: RelAddrType, len: usize },
    FailLookBehindNot,

    Call { addr: AbsAddrType },
    Return,
}

impl Instruction {
    /// The instructions a null check may skip when the loop body was empty.
    pub fn is_loop_back(&self) -> bool {
        matches!(
            self,
            Instruction::Jump { .. }
                | Instruction::Push { .. }
                | Instruction::RepeatInc { .. }
                | Instruction::RepeatIncSg { .. }
                | Instruction::RepeatIncNg { .. }
                | Instruction::RepeatIncNgSg { .. }
        )
    }
}

// === Program ===
pub struct Program {
    pub code: Vec<Instruction>,
    pub templates: Vec<Vec<u8>>,
    pub classes: Vec<CharClass>,
    pub repeat_range: Vec<RepeatRange>,
    pub num_mem: usize,
    pub num_null_check: usize,
    /// Groups whose start/end are recorded with undo frames.
    pub push_mem_start: MemStatusType,
    pub push_mem_end: MemStatusType,
    pub options: MatchOptions,
    pub enc: EncodingRef,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("code", &self.code)
            .field("num_mem", &self.num_mem)
            .field("repeat_range", &self.repeat_range)
            .field("options", &self.options)
            .field("enc", &self.enc.name())
            .finish()
    }
}

impl Program {
    pub fn builder(enc: EncodingRef) -> ProgramBuilder {
        ProgramBuilder::new(enc)
    }

    /// Number of region slots a match fills (group 0 included).
    pub fn num_regs(&self) -> usize {
        self.num_mem + 1
    }
}

// === ProgramBuilder ===

/// Forward-referencable program position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Label(usize);

pub struct ProgramBuilder {
    code: Vec<Instruction>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
    templates: Vec<Vec<u8>>,
    classes: Vec<CharClass>,
    repeat_range: Vec<RepeatRange>,
    num_mem: usize,
    num_null_check: usize,
    push_mem_start: MemStatusType,
    push_mem_end: MemStatusType,
    options: MatchOptions,
    enc: EncodingRef,
}

impl ProgramBuilder {
    pub fn new(enc: EncodingRef) -> Self {
        ProgramBuilder {
            code: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            templates: Vec::new(),
            classes: Vec::new(),
            repeat_range: Vec::new(),
            num_mem: 0,
            num_null_check: 0,
            push_mem_start: 0,
            push_mem_end: 0,
            options: MatchOptions::empty(),
            enc,
        }
    }

    pub fn options(&mut self, options: MatchOptions) -> &mut Self {
        self.options = options;
        self
    }

    /// Declare the number of capture groups (group 0 excluded).
    pub fn groups(&mut self, n: usize) -> &mut Self {
        self.num_mem = n;
        self
    }

    /// Register a repeat range and return its id.
    pub fn repeat_range(&mut self, lower: u32, upper: u32) -> RepeatNumType {
        self.repeat_range.push(RepeatRange { lower, upper });
        self.repeat_range.len() - 1
    }

    /// Allocate a null-check id.
    pub fn null_check(&mut self) -> usize {
        self.num_null_check += 1;
        self.num_null_check - 1
    }

    pub fn template(&mut self, s: &[u8]) -> usize {
        self.templates.push(s.to_vec());
        self.templates.len() - 1
    }

    pub fn class(&mut self, cc: CharClass) -> usize {
        self.classes.push(cc);
        self.classes.len() - 1
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the next emitted instruction.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.code.len());
        self
    }

    pub fn emit(&mut self, inst: Instruction) -> &mut Self {
        match inst {
            Instruction::MemStartPush { num } => mem_status_on(&mut self.push_mem_start, num),
            Instruction::MemEndPush { num } => mem_status_on(&mut self.push_mem_end, num),
            _ => {}
        }
        self.code.push(inst);
        self
    }

    fn emit_to(&mut self, inst: Instruction, target: Label) -> &mut Self {
        self.fixups.push((self.code.len(), target));
        self.emit(inst)
    }

    /// Literal bytes, as `Exact1` or `ExactN`.
    pub fn exact(&mut self, s: &[u8]) -> &mut Self {
        match s {
            [c] => self.emit(Instruction::Exact1 { c: *c }),
            _ => self.emit(Instruction::ExactN { s: SmallVec::from_slice(s) }),
        }
    }

    /// Case-insensitive literal, folded through the program's encoding.
    pub fn exact_ic(&mut self, s: &[u8]) -> &mut Self {
        let enc = self.enc;
        let mut folded: SmallVec<[CodePoint; 8]> = SmallVec::new();
        let mut p = 0;
        while p < s.len() {
            folded.push(enc.case_fold(code_at(enc, s, p, s.len())));
            p += enclen(enc, s, p);
        }
        if folded.len() == 1 {
            self.emit(Instruction::Exact1Ic { c: folded[0] })
        } else {
            self.emit(Instruction::ExactNIc { s: folded })
        }
    }

    pub fn jump(&mut self, target: Label) -> &mut Self {
        self.emit_to(Instruction::Jump { addr: 0 }, target)
    }

    pub fn push(&mut self, target: Label) -> &mut Self {
        self.emit_to(Instruction::Push { addr: 0 }, target)
    }

    pub fn push_or_jump_exact1(&mut self, target: Label, c: u8) -> &mut Self {
        self.emit_to(Instruction::PushOrJumpExact1 { addr: 0, c }, target)
    }

    pub fn push_if_peek_next(&mut self, target: Label, c: u8) -> &mut Self {
        self.emit_to(Instruction::PushIfPeekNext { addr: 0, c }, target)
    }

    /// `exit` must be bound right after the matching `RepeatInc*`.
    pub fn repeat(&mut self, id: RepeatNumType, exit: Label) -> &mut Self {
        self.emit_to(Instruction::Repeat { id, addr: 0 }, exit)
    }

    pub fn repeat_ng(&mut self, id: RepeatNumType, exit: Label) -> &mut Self {
        self.emit_to(Instruction::RepeatNg { id, addr: 0 }, exit)
    }

    pub fn push_pos_not(&mut self, target: Label) -> &mut Self {
        self.emit_to(Instruction::PushPosNot { addr: 0 }, target)
    }

    pub fn push_look_behind_not(&mut self, target: Label, len: usize) -> &mut Self {
        self.emit_to(Instruction::PushLookBehindNot { addr: 0, len }, target)
    }

    pub fn call(&mut self, target: Label) -> &mut Self {
        self.emit_to(Instruction::Call { addr: 0 }, target)
    }

    pub fn build(&mut self) -> Result<Program, MatchError> {
        let mut code = std::mem::take(&mut self.code);
        for &(at, label) in &self.fixups {
            let target = self.labels[label.0]
                .ok_or_else(|| MatchError::corrupt(at, Corruption::IpOutOfRange))?;
            let rel = target as RelAddrType - at as RelAddrType;
            match &mut code[at] {
                Instruction::Jump { addr }
                | Instruction::Push { addr }
                | Instruction::PushOrJumpExact1 { addr, .. }
                | Instruction::PushIfPeekNext { addr, .. }
                | Instruction::Repeat { addr, .. }
                | Instruction::RepeatNg { addr, .. }
                | Instruction::PushPosNot { addr }
                | Instruction::PushLookBehindNot { addr, .. } => *addr = rel,
                Instruction::Call { addr } => *addr = target,
                _ => {}
            }
        }
        self.fixups.clear();
        Ok(Program {
            code,
            templates: std::mem::take(&mut self.templates),
            classes: std::mem::take(&mut self.classes),
            repeat_range: std::mem::take(&mut self.repeat_range),
            num_mem: self.num_mem,
            num_null_check: self.num_null_check,
            push_mem_start: self.push_mem_start,
            push_mem_end: self.push_mem_end,
            options: self.options,
            enc: self.enc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encodings::ENCODING_UTF8;

    #[test]
    fn labels_resolve_to_relative_offsets() {
        let mut b = ProgramBuilder::new(&ENCODING_UTF8);
        let alt = b.label();
        let done = b.label();
        b.push(alt).exact(b"a").jump(done);
        b.bind(alt).exact(b"b");
        b.bind(done).emit(Instruction::End);
        let prog = b.build().unwrap();
        assert_eq!(prog.code[0], Instruction::Push { addr: 3 });
        assert_eq!(prog.code[2], Instruction::Jump { addr: 2 });
    }

    #[test]
    fn call_uses_absolute_address() {
        let mut b = ProgramBuilder::new(&ENCODING_UTF8);
        let sub = b.label();
        b.call(sub).emit(Instruction::End);
        b.bind(sub).exact(b"x").emit(Instruction::Return);
        let prog = b.build().unwrap();
        assert_eq!(prog.code[0], Instruction::Call { addr: 2 });
    }

    #[test]
    fn unbound_label_is_an_error() {
        let mut b = ProgramBuilder::new(&ENCODING_UTF8);
        let nowhere = b.label();
        b.jump(nowhere);
        assert!(b.build().is_err());
    }

    #[test]
    fn push_variants_mark_groups() {
        let mut b = ProgramBuilder::new(&ENCODING_UTF8);
        b.groups(2)
            .emit(Instruction::MemStartPush { num: 2 })
            .emit(Instruction::MemEnd { num: 2 });
        let prog = b.build().unwrap();
        assert!(mem_status_at(prog.push_mem_start, 2));
        assert!(!mem_status_at(prog.push_mem_end, 2));
        assert_eq!(prog.num_regs(), 3);
    }

    #[test]
    fn exact_ic_folds_operands() {
        let mut b = ProgramBuilder::new(&ENCODING_UTF8);
        b.exact_ic("AÉ".as_bytes());
        let prog = b.build().unwrap();
        assert_eq!(
            prog.code[0],
            Instruction::ExactNIc { s: SmallVec::from_slice(&['a' as u32, 'é' as u32]) }
        );
    }

    #[test]
    fn node_class_membership() {
        let mut bits = [0; BITSET_REAL_SIZE];
        bitset_set_range(&mut bits, b'a', b'f');
        let cc = CharClass { bits, ranges: vec![CodeRange::new(0x3b1, 0x3c9)], not: false };
        assert!(cc.is_code_in(&ENCODING_UTF8, 'c' as u32));
        assert!(cc.is_code_in(&ENCODING_UTF8, 'λ' as u32));
        assert!(!cc.is_code_in(&ENCODING_UTF8, 'z' as u32));
        let neg = CharClass { not: true, ..cc };
        assert!(neg.is_code_in(&ENCODING_UTF8, 'z' as u32));
    }
}
