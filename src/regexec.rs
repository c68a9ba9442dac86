// regexec.rs - Backtracking bytecode interpreter.
//
// `MatchEngine` executes one compiled `Program` against one input span per
// run. The dispatch loop is a single `loop { match }` over the instruction
// at `ip`; every local mismatch sets `goto_fail` and goes through the one
// shared fail path at the bottom of the loop, which resumes from the most
// recent choice point on the `BacktrackStack`.

use std::time::Instant;

use memchr::memchr;
use tracing::{debug, trace};

use crate::config::{MatchConfig, CHECK_INTERVAL};
use crate::error::{Corruption, MatchError};
use crate::options::MatchOptions;
use crate::program::*;
use crate::regenc::*;
use crate::region::Region;
use crate::stack::{BacktrackStack, Frame, MemPtr, Slots, MEM_CLEARED};

// ============================================================================
// Input / MatchOutcome
// ============================================================================

/// Text plus the span one run may look at.
///
/// `start` is where the match attempt begins and `range` bounds how far it
/// may consume. Assertions still see the whole text, so lookbehind and
/// word boundaries can inspect bytes before `start`.
#[derive(Clone, Copy, Debug)]
pub struct Input<'t> {
    text: &'t [u8],
    start: usize,
    range: usize,
    search_start: Option<usize>,
}

impl<'t> Input<'t> {
    pub fn new(text: &'t [u8]) -> Self {
        Input { text, start: 0, range: text.len(), search_start: None }
    }

    /// Attempt a match at `start`, consuming nothing past `range`.
    /// Both are clamped to the text.
    pub fn span(mut self, start: usize, range: usize) -> Self {
        self.range = range.min(self.text.len());
        self.start = start.min(self.range);
        self
    }

    /// Position `BeginPosition` matches at. Defaults to `start`.
    pub fn search_start(mut self, pos: usize) -> Self {
        self.search_start = Some(pos);
        self
    }

    pub fn text(&self) -> &'t [u8] {
        self.text
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn range(&self) -> usize {
        self.range
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchOutcome {
    NoMatch,
    Matched(Region),
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched(_))
    }

    pub fn region(&self) -> Option<&Region> {
        match self {
            MatchOutcome::Matched(region) => Some(region),
            MatchOutcome::NoMatch => None,
        }
    }

    pub fn into_region(self) -> Option<Region> {
        match self {
            MatchOutcome::Matched(region) => Some(region),
            MatchOutcome::NoMatch => None,
        }
    }
}

/// Run `program` once over `text[start..end]`, with default limits.
pub fn run(
    program: &Program,
    text: &[u8],
    start: usize,
    end: usize,
) -> Result<MatchOutcome, MatchError> {
    MatchEngine::new(program).run(&Input::new(text).span(start, end))
}

// ============================================================================
// Helper functions
// ============================================================================

#[inline]
fn corrupt<T>(ip: usize, reason: Corruption) -> Result<T, MatchError> {
    Err(MatchError::corrupt(ip, reason))
}

/// Resolve a relative branch target.
#[inline]
fn rel_target(ip: usize, addr: RelAddrType, code_len: usize) -> Result<usize, MatchError> {
    let target = ip as i64 + addr as i64;
    if target < 0 || target as usize >= code_len {
        return corrupt(ip, Corruption::IpOutOfRange);
    }
    Ok(target as usize)
}

#[inline]
fn check_mem(ip: usize, num: MemNumType, num_mem: usize) -> Result<(), MatchError> {
    if num == 0 || num > num_mem {
        return corrupt(ip, Corruption::InvalidGroup(num));
    }
    Ok(())
}

#[inline]
fn repeat_range_of(
    prog: &Program,
    ip: usize,
    id: RepeatNumType,
) -> Result<RepeatRange, MatchError> {
    match prog.repeat_range.get(id) {
        Some(r) => Ok(*r),
        None => corrupt(ip, Corruption::InvalidRepeat(id)),
    }
}

/// After a null check found an empty iteration: step over the loop-back
/// instruction that follows it.
#[inline]
fn skip_loop_back(code: &[Instruction], ip: usize) -> Result<usize, MatchError> {
    match code.get(ip + 1) {
        Some(next) if next.is_loop_back() => Ok(ip + 2),
        _ => corrupt(ip, Corruption::UnexpectedAfterNullCheck),
    }
}

/// Character at `s` if it lies wholly before `range`: `(code, byte length)`.
#[inline]
fn char_at(enc: EncodingRef, text: &[u8], s: usize, range: usize) -> Option<(CodePoint, usize)> {
    if s >= range {
        return None;
    }
    let len = enclen(enc, text, s);
    if s + len > range {
        return None;
    }
    Some((enc.mbc_to_code(&text[s..s + len]), len))
}

/// End of the last whole character in `s..range`. A character cut by `range`
/// is left out.
fn fitting_end(enc: EncodingRef, text: &[u8], s: usize, range: usize) -> usize {
    if range <= s {
        return s;
    }
    let head = enc.left_adjust_char_head(s, range - 1, text);
    if head + enclen(enc, text, head) <= range {
        range
    } else {
        head
    }
}

/// `sprev` after consuming `from..to`: head of the last consumed character.
#[inline]
fn last_char_head(enc: EncodingRef, text: &[u8], from: usize, to: usize, sprev: usize) -> usize {
    if to > from {
        enc.left_adjust_char_head(from, to - 1, text)
    } else {
        sprev
    }
}

/// Match the literal `lit` at `s`, folding both sides when `fold` is set.
/// Returns the new position.
fn literal_at(
    enc: EncodingRef,
    text: &[u8],
    s: usize,
    range: usize,
    lit: &[u8],
    fold: bool,
) -> Option<usize> {
    if !fold {
        let e = s + lit.len();
        return (e <= range && text[s..e] == *lit).then_some(e);
    }
    let (mut p, mut s) = (0, s);
    while p < lit.len() {
        let (c1, len1) = char_at(enc, lit, p, lit.len())?;
        let (c2, len2) = char_at(enc, text, s, range)?;
        if enc.case_fold(c1) != enc.case_fold(c2) {
            return None;
        }
        p += len1;
        s += len2;
    }
    Some(s)
}

/// Match case-folded `codes` at `s`. Returns the new position.
fn match_folded(
    enc: EncodingRef,
    text: &[u8],
    mut s: usize,
    range: usize,
    codes: &[CodePoint],
) -> Option<usize> {
    for &c in codes {
        let (code, len) = char_at(enc, text, s, range)?;
        if enc.case_fold(code) != c {
            return None;
        }
        s += len;
    }
    Some(s)
}

/// Case-insensitive comparison of `text[p..pend]` with the text at `s`.
/// Returns the position after the matched run at `s`.
fn string_cmp_ic(
    enc: EncodingRef,
    text: &[u8],
    mut p: usize,
    pend: usize,
    mut s: usize,
    range: usize,
) -> Option<usize> {
    while p < pend {
        let (c1, len1) = char_at(enc, text, p, pend)?;
        let (c2, len2) = char_at(enc, text, s, range)?;
        if enc.case_fold(c1) != enc.case_fold(c2) {
            return None;
        }
        p += len1;
        s += len2;
    }
    Some(s)
}

/// Class membership of `code` for any of the `CClass*` instructions.
fn class_matches(
    prog: &Program,
    inst: &Instruction,
    ip: usize,
    code: CodePoint,
) -> Result<bool, MatchError> {
    let enc = prog.enc;
    let single = code < SINGLE_BYTE_SIZE;
    Ok(match inst {
        Instruction::CClass { bits } => single && bitset_at(bits, code as usize),
        Instruction::CClassNot { bits } => !(single && bitset_at(bits, code as usize)),
        Instruction::CClassMb { ranges } => !single && enc.is_in_code_range(ranges, code),
        Instruction::CClassMbNot { ranges } => single || !enc.is_in_code_range(ranges, code),
        Instruction::CClassMix { bits, ranges } => {
            if single {
                bitset_at(bits, code as usize)
            } else {
                enc.is_in_code_range(ranges, code)
            }
        }
        Instruction::CClassMixNot { bits, ranges } => {
            if single {
                !bitset_at(bits, code as usize)
            } else {
                !enc.is_in_code_range(ranges, code)
            }
        }
        Instruction::CClassNode { index } => match prog.classes.get(*index) {
            Some(cc) => cc.is_code_in(enc, code),
            None => return corrupt(ip, Corruption::InvalidClass(*index)),
        },
        _ => false,
    })
}

/// Compare the captured `text[pstart..pend]` at `s`.
#[inline]
fn backref_cmp(
    enc: EncodingRef,
    text: &[u8],
    pstart: usize,
    pend: usize,
    s: usize,
    range: usize,
    ignore_case: bool,
) -> Option<usize> {
    if ignore_case {
        return string_cmp_ic(enc, text, pstart, pend, s, range);
    }
    let n = pend.saturating_sub(pstart);
    if s + n > range || text[pstart..pstart + n] != text[s..s + n] {
        return None;
    }
    Some(s + n)
}

/// Current span of a group, when both bounds are set.
#[inline]
fn mem_span(stack: &BacktrackStack, slots: &Slots, num: usize) -> Option<(usize, usize)> {
    Some((stack.mem_pos(slots.mem_start[num])?, stack.mem_pos(slots.mem_end[num])?))
}

/// Backreference to a group at nesting level `nest` relative to the current
/// call depth. Uses the most recently closed instance at that level.
fn backref_match_at_nested_level(
    enc: EncodingRef,
    text: &[u8],
    frames: &[Frame],
    ignore_case: bool,
    nest: i32,
    nums: &[MemNumType],
    s: usize,
    range: usize,
) -> Option<usize> {
    let mut level: i32 = 0;
    let mut pend: Option<usize> = None;

    for frame in frames.iter().rev() {
        match *frame {
            Frame::CallFrame { .. } => level -= 1,
            Frame::Return => level += 1,
            Frame::MemEnd { num, pos, .. } if level == nest && pos != MEM_CLEARED => {
                if nums.contains(&num) {
                    pend = Some(pos);
                }
            }
            Frame::MemStart { num, pos, .. } if level == nest && pos != MEM_CLEARED => {
                if nums.contains(&num) {
                    if let Some(pe) = pend {
                        return backref_cmp(enc, text, pos, pe, s, range, ignore_case);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Did the loop iteration guarded by the null check at stack index `k`
/// leave the listed groups exactly as it found them?
fn null_check_mem_unchanged(
    stack: &BacktrackStack,
    slots: &Slots,
    k: usize,
    nums: &[MemNumType],
) -> bool {
    let above = &stack.frames()[k + 1..];
    for &num in nums {
        let entry = above.iter().find_map(|f| match *f {
            Frame::MemStart { num: n, prev_start, prev_end, .. }
            | Frame::MemEnd { num: n, prev_start, prev_end, .. }
                if n == num =>
            {
                Some((prev_start, prev_end))
            }
            _ => None,
        });
        if let Some((prev_start, prev_end)) = entry {
            let before = (stack.mem_pos(prev_start), stack.mem_pos(prev_end));
            let now = (stack.mem_pos(slots.mem_start[num]), stack.mem_pos(slots.mem_end[num]));
            if before != now {
                return false;
            }
        }
    }
    true
}

#[inline]
fn is_word_boundary(enc: EncodingRef, text: &[u8], s: usize, sprev: usize, range: usize) -> bool {
    let end = text.len();
    if s == 0 {
        s < range && is_word_at(enc, text, s, end)
    } else if s == end {
        is_word_at(enc, text, sprev, end)
    } else {
        is_word_at(enc, text, s, end) != is_word_at(enc, text, sprev, end)
    }
}

#[inline]
fn is_not_word_boundary(
    enc: EncodingRef,
    text: &[u8],
    s: usize,
    sprev: usize,
    range: usize,
) -> bool {
    let end = text.len();
    if s == 0 {
        !(s < range && is_word_at(enc, text, s, end))
    } else if s == end {
        !is_word_at(enc, text, sprev, end)
    } else {
        is_word_at(enc, text, s, end) == is_word_at(enc, text, sprev, end)
    }
}

/// `$`-style test at `s`. `single_line` restricts the mid-text case to a
/// newline that is the last character of the text.
fn is_end_line(
    enc: EncodingRef,
    text: &[u8],
    s: usize,
    sprev: usize,
    options: MatchOptions,
    single_line: bool,
) -> bool {
    let end = text.len();
    if s == end {
        if end == 0 || !is_newline_at(enc, text, sprev, end) {
            return !options.contains(MatchOptions::NOTEOL);
        }
        return true;
    }
    if !is_newline_at(enc, text, s, end) {
        return false;
    }
    !single_line || s + enclen(enc, text, s) == end
}

fn make_region(
    stack: &BacktrackStack,
    slots: &Slots,
    num_regs: usize,
    sstart: usize,
    s: usize,
) -> Region {
    let mut region = Region::with_capacity(num_regs);
    region.beg[0] = sstart;
    region.end[0] = s;
    for i in 1..num_regs {
        if let Some((beg, end)) = mem_span(stack, slots, i) {
            region.beg[i] = beg;
            region.end[i] = end;
        }
    }
    region
}

// ============================================================================
// MatchEngine
// ============================================================================

/// Per-thread executor for one `Program`.
///
/// Owns all mutable match state; the program is only borrowed. Reusing an
/// engine across runs keeps its allocations, but nothing else survives
/// from one run to the next.
pub struct MatchEngine<'p> {
    program: &'p Program,
    config: MatchConfig,
    stack: BacktrackStack,
    slots: Slots,
}

impl<'p> MatchEngine<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self::with_config(program, MatchConfig::default())
    }

    pub fn with_config(program: &'p Program, config: MatchConfig) -> Self {
        MatchEngine {
            program,
            stack: BacktrackStack::new(config.match_stack_limit),
            slots: Slots::new(program.num_mem, program.repeat_range.len()),
            config,
        }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Effective options: the program's own plus the configured ones.
    pub fn options(&self) -> MatchOptions {
        self.program.options | self.config.options
    }

    pub fn run(&mut self, input: &Input) -> Result<MatchOutcome, MatchError> {
        Ok(match self.exec(input, &mut || true)? {
            Some(region) => MatchOutcome::Matched(region),
            None => MatchOutcome::NoMatch,
        })
    }

    /// Run and write the result into `region`. Returns the match length.
    ///
    /// On no match the region is reset to all-unset, unless `POSIX_REGION`
    /// is in effect, in which case it keeps whatever it held.
    pub fn run_in_region(
        &mut self,
        input: &Input,
        region: &mut Region,
    ) -> Result<Option<usize>, MatchError> {
        self.run_with_hook(input, region, || true)
    }

    /// Like `run_in_region`, calling `hook` every `CHECK_INTERVAL` dispatched
    /// instructions. The run stops with `MatchError::Aborted` as soon as the
    /// hook returns `false`.
    pub fn run_with_hook<F>(
        &mut self,
        input: &Input,
        region: &mut Region,
        mut hook: F,
    ) -> Result<Option<usize>, MatchError>
    where
        F: FnMut() -> bool,
    {
        match self.exec(input, &mut hook)? {
            Some(best) => {
                region.copy_from(&best);
                Ok(best.match_len())
            }
            None => {
                if !self.options().contains(MatchOptions::POSIX_REGION) {
                    region.resize(self.program.num_regs());
                    region.clear();
                }
                Ok(None)
            }
        }
    }

    fn exec(
        &mut self,
        input: &Input,
        hook: &mut dyn FnMut() -> bool,
    ) -> Result<Option<Region>, MatchError> {
        debug!(
            start = input.start,
            range = input.range,
            len = input.text.len(),
            code_len = self.program.code.len(),
            "match run start"
        );
        let result = self.match_at(input, hook);
        match &result {
            Ok(Some(region)) => debug!(beg = region.beg[0], end = region.end[0], "match found"),
            Ok(None) => debug!("no match"),
            Err(err) => debug!(error = %err, code = err.code(), "match run aborted"),
        }
        result
    }

    fn match_at(
        &mut self,
        input: &Input,
        hook: &mut dyn FnMut() -> bool,
    ) -> Result<Option<Region>, MatchError> {
        let prog = self.program;
        let code = &prog.code[..];
        let enc = prog.enc;
        let num_mem = prog.num_mem;
        let num_regs = prog.num_regs();
        let options = prog.options | self.config.options;
        let tracing_on = options.contains(MatchOptions::TRACE);
        let find_condition = options.is_find_condition();
        let fold = options.contains(MatchOptions::IGNORECASE);
        let dot_all = options.contains(MatchOptions::MULTILINE);

        let text = input.text;
        let end = text.len();
        let sstart = input.start;
        let range = input.range;
        let search_start = input.search_start.unwrap_or(sstart);

        let retry_limit_in_match = self.config.retry_limit_in_match;
        let time_limit = self.config.time_limit;
        let time_start = time_limit.map(|_| Instant::now());
        let mut retry_in_match_counter: u64 = 0;
        let mut steps: u64 = 0;

        let stack = &mut self.stack;
        let slots = &mut self.slots;
        stack.clear();
        slots.reset();

        let mut ip: usize = 0;
        let mut s: usize = sstart;
        let mut sprev: usize = prev_char_head(enc, 0, sstart, text).unwrap_or(sstart);
        let mut best: Option<Region> = None;
        let mut best_len: Option<usize> = None;

        // ---- Main dispatch loop ----
        loop {
            let Some(inst) = code.get(ip) else {
                return corrupt(ip, Corruption::IpOutOfRange);
            };

            steps += 1;
            if steps % CHECK_INTERVAL == 0 && !hook() {
                return Err(MatchError::Aborted);
            }
            if tracing_on {
                trace!(ip, s, sprev, depth = stack.len(), ?inst, "exec");
            }

            let mut goto_fail = false;

            match inst {
                // ============================================================
                // Terminals
                // ============================================================
                Instruction::End if !find_condition => {
                    return Ok(Some(make_region(stack, slots, num_regs, sstart, s)));
                }
                Instruction::End => {
                    let n = s.saturating_sub(sstart);
                    if options.contains(MatchOptions::FIND_NOT_EMPTY) && s == sstart {
                        goto_fail = true;
                    } else {
                        if best_len.map_or(true, |len| n > len) {
                            best_len = Some(n);
                            best = Some(make_region(stack, slots, num_regs, sstart, s));
                        }
                        if options.contains(MatchOptions::FIND_LONGEST) && s < range {
                            goto_fail = true; // keep looking for a longer candidate
                        } else {
                            return Ok(best);
                        }
                    }
                }
                Instruction::Finish => return Ok(best),
                Instruction::Fail => goto_fail = true,

                // ============================================================
                // Literals
                // ============================================================
                Instruction::Exact1 { c } => {
                    match literal_at(enc, text, s, range, std::slice::from_ref(c), fold) {
                        Some(ns) => {
                            sprev = s;
                            s = ns;
                            ip += 1;
                        }
                        None => goto_fail = true,
                    }
                }
                Instruction::ExactN { s: lit } => match literal_at(enc, text, s, range, lit, fold) {
                    Some(ns) => {
                        sprev = last_char_head(enc, text, s, ns, sprev);
                        s = ns;
                        ip += 1;
                    }
                    None => goto_fail = true,
                },
                Instruction::ExactTemplate { index, offset, len } => {
                    let lit = prog
                        .templates
                        .get(*index)
                        .and_then(|t| t.get(*offset..*offset + *len));
                    let lit = match lit {
                        Some(lit) => lit,
                        None => return corrupt(ip, Corruption::InvalidTemplate(*index)),
                    };
                    match literal_at(enc, text, s, range, lit, fold) {
                        Some(ns) => {
                            sprev = last_char_head(enc, text, s, ns, sprev);
                            s = ns;
                            ip += 1;
                        }
                        None => goto_fail = true,
                    }
                }
                Instruction::Exact1Ic { c } => match char_at(enc, text, s, range) {
                    Some((code, len)) if enc.case_fold(code) == *c => {
                        sprev = s;
                        s += len;
                        ip += 1;
                    }
                    _ => goto_fail = true,
                },
                Instruction::ExactNIc { s: codes } => {
                    match match_folded(enc, text, s, range, codes) {
                        Some(ns) => {
                            sprev = last_char_head(enc, text, s, ns, sprev);
                            s = ns;
                            ip += 1;
                        }
                        None => goto_fail = true,
                    }
                }

                // ============================================================
                // Character classes
                // ============================================================
                Instruction::CClass { .. }
                | Instruction::CClassNot { .. }
                | Instruction::CClassMb { .. }
                | Instruction::CClassMbNot { .. }
                | Instruction::CClassMix { .. }
                | Instruction::CClassMixNot { .. }
                | Instruction::CClassNode { .. } => {
                    let hit = match char_at(enc, text, s, range) {
                        Some((code, len)) => class_matches(prog, inst, ip, code)?.then_some(len),
                        None => None,
                    };
                    match hit {
                        Some(len) => {
                            sprev = s;
                            s += len;
                            ip += 1;
                        }
                        None => goto_fail = true,
                    }
                }

                // ============================================================
                // Any char
                // ============================================================
                Instruction::AnyChar => match char_at(enc, text, s, range) {
                    Some((_, len)) if dot_all || !is_newline_at(enc, text, s, end) => {
                        sprev = s;
                        s += len;
                        ip += 1;
                    }
                    _ => goto_fail = true,
                },
                Instruction::AnyCharMl => match char_at(enc, text, s, range) {
                    Some((_, len)) => {
                        sprev = s;
                        s += len;
                        ip += 1;
                    }
                    None => goto_fail = true,
                },
                Instruction::AnyCharStar | Instruction::AnyCharMlStar => {
                    let ml = dot_all || matches!(inst, Instruction::AnyCharMlStar);
                    while let Some((_, len)) = char_at(enc, text, s, range) {
                        steps += 1;
                        if steps % CHECK_INTERVAL == 0 && !hook() {
                            return Err(MatchError::Aborted);
                        }
                        stack.push(Frame::Alt { ip: ip + 1, s, sprev })?;
                        if !ml && is_newline_at(enc, text, s, end) {
                            goto_fail = true;
                            break;
                        }
                        sprev = s;
                        s += len;
                    }
                    if !goto_fail {
                        ip += 1;
                    }
                }
                Instruction::AnyCharMlStarPeekNext { c } if c.is_ascii() => {
                    // Only positions holding `c` can continue, so jump between them.
                    let limit = fitting_end(enc, text, s, range);
                    let mut from = s;
                    while from < limit {
                        let Some(off) = memchr(*c, &text[from..limit]) else {
                            break;
                        };
                        steps += 1;
                        if steps % CHECK_INTERVAL == 0 && !hook() {
                            return Err(MatchError::Aborted);
                        }
                        let p = from + off;
                        let psprev = last_char_head(enc, text, s, p, sprev);
                        stack.push(Frame::Alt { ip: ip + 1, s: p, sprev: psprev })?;
                        from = p + 1;
                    }
                    if limit > s {
                        sprev = last_char_head(enc, text, s, limit, sprev);
                        s = limit;
                    }
                    ip += 1;
                }
                Instruction::AnyCharStarPeekNext { c }
                | Instruction::AnyCharMlStarPeekNext { c } => {
                    let ml = dot_all || matches!(inst, Instruction::AnyCharMlStarPeekNext { .. });
                    while let Some((_, len)) = char_at(enc, text, s, range) {
                        steps += 1;
                        if steps % CHECK_INTERVAL == 0 && !hook() {
                            return Err(MatchError::Aborted);
                        }
                        if text[s] == *c {
                            stack.push(Frame::Alt { ip: ip + 1, s, sprev })?;
                        }
                        if !ml && is_newline_at(enc, text, s, end) {
                            goto_fail = true;
                            break;
                        }
                        sprev = s;
                        s += len;
                    }
                    if !goto_fail {
                        ip += 1;
                    }
                }

                // ============================================================
                // Word
                // ============================================================
                Instruction::Word | Instruction::NotWord => {
                    let want = matches!(inst, Instruction::Word);
                    match char_at(enc, text, s, range) {
                        Some((code, len)) if enc.is_code_word(code) == want => {
                            sprev = s;
                            s += len;
                            ip += 1;
                        }
                        _ => goto_fail = true,
                    }
                }
                Instruction::WordBound => {
                    if is_word_boundary(enc, text, s, sprev, range) {
                        ip += 1;
                    } else {
                        goto_fail = true;
                    }
                }
                Instruction::NotWordBound => {
                    if is_not_word_boundary(enc, text, s, sprev, range) {
                        ip += 1;
                    } else {
                        goto_fail = true;
                    }
                }
                Instruction::WordBegin => {
                    if s < range
                        && is_word_at(enc, text, s, end)
                        && (s == 0 || !is_word_at(enc, text, sprev, end))
                    {
                        ip += 1;
                    } else {
                        goto_fail = true;
                    }
                }
                Instruction::WordEnd => {
                    if s != 0
                        && is_word_at(enc, text, sprev, end)
                        && (s == end || !is_word_at(enc, text, s, end))
                    {
                        ip += 1;
                    } else {
                        goto_fail = true;
                    }
                }

                // ============================================================
                // Anchors
                // ============================================================
                Instruction::BeginBuf => {
                    if s == 0 {
                        ip += 1;
                    } else {
                        goto_fail = true;
                    }
                }
                Instruction::EndBuf => {
                    if s == end {
                        ip += 1;
                    } else {
                        goto_fail = true;
                    }
                }
                Instruction::BeginLine => {
                    let ok = if s == 0 {
                        !options.contains(MatchOptions::NOTBOL)
                    } else {
                        is_newline_at(enc, text, sprev, end) && s != end
                    };
                    if ok {
                        ip += 1;
                    } else {
                        goto_fail = true;
                    }
                }
                Instruction::EndLine => {
                    if is_end_line(enc, text, s, sprev, options, false) {
                        ip += 1;
                    } else {
                        goto_fail = true;
                    }
                }
                Instruction::SemiEndBuf => {
                    if is_end_line(enc, text, s, sprev, options, true) {
                        ip += 1;
                    } else {
                        goto_fail = true;
                    }
                }
                Instruction::BeginPosition => {
                    if s == search_start {
                        ip += 1;
                    } else {
                        goto_fail = true;
                    }
                }

                // ============================================================
                // Captures
                // ============================================================
                Instruction::MemStartPush { num } => {
                    let num = *num;
                    check_mem(ip, num, num_mem)?;
                    let idx = stack.len();
                    stack.push(Frame::MemStart {
                        num,
                        pos: s,
                        prev_start: slots.mem_start[num],
                        prev_end: slots.mem_end[num],
                    })?;
                    slots.mem_start[num] = MemPtr::StackIdx(idx);
                    slots.mem_end[num] = MemPtr::Invalid;
                    ip += 1;
                }
                Instruction::MemStart { num } => {
                    check_mem(ip, *num, num_mem)?;
                    slots.mem_start[*num] = MemPtr::Pos(s);
                    ip += 1;
                }
                Instruction::MemEndPush { num } => {
                    let num = *num;
                    check_mem(ip, num, num_mem)?;
                    let idx = stack.len();
                    stack.push(Frame::MemEnd {
                        num,
                        pos: s,
                        prev_start: slots.mem_start[num],
                        prev_end: slots.mem_end[num],
                    })?;
                    slots.mem_end[num] = MemPtr::StackIdx(idx);
                    ip += 1;
                }
                Instruction::MemEnd { num } => {
                    check_mem(ip, *num, num_mem)?;
                    slots.mem_end[*num] = MemPtr::Pos(s);
                    ip += 1;
                }
                Instruction::MemClear { from, to } => {
                    if *from == 0 || from > to || *to > num_mem + 1 {
                        return corrupt(ip, Corruption::InvalidGroup(*to));
                    }
                    for num in *from..*to {
                        if mem_status_at(prog.push_mem_start, num)
                            || mem_status_at(prog.push_mem_end, num)
                        {
                            stack.push(Frame::MemStart {
                                num,
                                pos: MEM_CLEARED,
                                prev_start: slots.mem_start[num],
                                prev_end: slots.mem_end[num],
                            })?;
                        }
                        slots.mem_start[num] = MemPtr::Invalid;
                        slots.mem_end[num] = MemPtr::Invalid;
                    }
                    ip += 1;
                }

                // ============================================================
                // Backreferences
                // ============================================================
                Instruction::BackRef1
                | Instruction::BackRef2
                | Instruction::BackRefN { .. }
                | Instruction::BackRefNIc { .. } => {
                    let (num, ignore_case) = match *inst {
                        Instruction::BackRef1 => (1, fold),
                        Instruction::BackRef2 => (2, fold),
                        Instruction::BackRefN { num } => (num, fold),
                        Instruction::BackRefNIc { num } => (num, true),
                        _ => (0, false),
                    };
                    check_mem(ip, num, num_mem)?;
                    // An unset group matches the empty string.
                    let matched = match mem_span(stack, slots, num) {
                        Some((pstart, pend)) => {
                            backref_cmp(enc, text, pstart, pend, s, range, ignore_case)
                        }
                        None => Some(s),
                    };
                    match matched {
                        Some(ns) => {
                            sprev = last_char_head(enc, text, s, ns, sprev);
                            s = ns;
                            ip += 1;
                        }
                        None => goto_fail = true,
                    }
                }
                Instruction::BackRefMulti { nums } | Instruction::BackRefMultiIc { nums } => {
                    let ignore_case = fold || matches!(inst, Instruction::BackRefMultiIc { .. });
                    let mut matched = None;
                    for &num in nums.iter() {
                        check_mem(ip, num, num_mem)?;
                        let Some((pstart, pend)) = mem_span(stack, slots, num) else {
                            continue;
                        };
                        let ns = backref_cmp(enc, text, pstart, pend, s, range, ignore_case);
                        if let Some(ns) = ns {
                            matched = Some(ns);
                            break;
                        }
                    }
                    match matched {
                        Some(ns) => {
                            sprev = last_char_head(enc, text, s, ns, sprev);
                            s = ns;
                            ip += 1;
                        }
                        None => goto_fail = true,
                    }
                }
                Instruction::BackRefWithLevel { ignore_case, level, nums } => {
                    for &num in nums.iter() {
                        check_mem(ip, num, num_mem)?;
                    }
                    let frames = stack.frames();
                    match backref_match_at_nested_level(
                        enc,
                        text,
                        frames,
                        *ignore_case,
                        *level,
                        nums,
                        s,
                        range,
                    ) {
                        Some(ns) => {
                            sprev = last_char_head(enc, text, s, ns, sprev);
                            s = ns;
                            ip += 1;
                        }
                        None => goto_fail = true,
                    }
                }

                // ============================================================
                // Null checks
                // ============================================================
                Instruction::NullCheckStart { id } => {
                    if *id >= prog.num_null_check {
                        return corrupt(ip, Corruption::InvalidNullCheck(*id));
                    }
                    stack.push(Frame::NullCheckStart { id: *id, s })?;
                    ip += 1;
                }
                Instruction::NullCheckEnd { id } | Instruction::NullCheckEndMemSt { id, .. } => {
                    if *id >= prog.num_null_check {
                        return corrupt(ip, Corruption::InvalidNullCheck(*id));
                    }
                    let Some(k) = stack.null_check_start(*id) else {
                        return corrupt(ip, Corruption::MissingMark("null-check"));
                    };
                    let empty = match stack.get(k) {
                        Some(Frame::NullCheckStart { s: entry, .. }) if *entry == s => match inst {
                            Instruction::NullCheckEndMemSt { nums, .. } => {
                                null_check_mem_unchanged(stack, slots, k, nums)
                            }
                            _ => true,
                        },
                        _ => false,
                    };
                    if empty {
                        if tracing_on {
                            trace!(ip, id = *id, s, "empty loop iteration, skipping loop-back");
                        }
                        ip = skip_loop_back(code, ip)?;
                    } else {
                        ip += 1;
                    }
                }

                // ============================================================
                // Branching
                // ============================================================
                Instruction::Jump { addr } => {
                    ip = rel_target(ip, *addr, code.len())?;
                }
                Instruction::Push { addr } => {
                    let target = rel_target(ip, *addr, code.len())?;
                    stack.push(Frame::Alt { ip: target, s, sprev })?;
                    ip += 1;
                }
                Instruction::Pop => {
                    if stack.pop_one().is_none() {
                        return corrupt(ip, Corruption::EmptyStack);
                    }
                    ip += 1;
                }
                Instruction::PushOrJumpExact1 { addr, c } => {
                    let target = rel_target(ip, *addr, code.len())?;
                    if s < range && text[s] == *c {
                        stack.push(Frame::Alt { ip: target, s, sprev })?;
                        ip += 1;
                    } else {
                        ip = target;
                    }
                }
                Instruction::PushIfPeekNext { addr, c } => {
                    let target = rel_target(ip, *addr, code.len())?;
                    if s < range && text[s] == *c {
                        stack.push(Frame::Alt { ip: target, s, sprev })?;
                    }
                    ip += 1;
                }

                // ============================================================
                // Bounded repeats
                // ============================================================
                Instruction::Repeat { id, addr } | Instruction::RepeatNg { id, addr } => {
                    let id = *id;
                    let rr = repeat_range_of(prog, ip, id)?;
                    let exit = rel_target(ip, *addr, code.len())?;
                    let body = ip + 1;
                    let idx = stack.len();
                    stack.push(Frame::Repeat {
                        id,
                        count: 0,
                        body,
                        prev_stk: slots.repeat_stk[id],
                        prev_count: slots.repeat_count[id],
                    })?;
                    slots.repeat_stk[id] = Some(idx);
                    slots.repeat_count[id] = 0;
                    slots.repeat_body[id] = body;

                    let greedy = matches!(inst, Instruction::Repeat { .. });
                    if rr.lower == 0 {
                        if greedy {
                            stack.push(Frame::Alt { ip: exit, s, sprev })?;
                            ip = body;
                        } else {
                            stack.push(Frame::Alt { ip: body, s, sprev })?;
                            ip = exit;
                        }
                    } else {
                        ip = body;
                    }
                }
                Instruction::RepeatInc { id }
                | Instruction::RepeatIncSg { id }
                | Instruction::RepeatIncNg { id }
                | Instruction::RepeatIncNgSg { id } => {
                    let id = *id;
                    let rr = repeat_range_of(prog, ip, id)?;
                    let Some(si) = slots.repeat_stk[id] else {
                        return corrupt(ip, Corruption::RepeatNotEntered(id));
                    };
                    let direct = matches!(
                        inst,
                        Instruction::RepeatIncSg { .. } | Instruction::RepeatIncNgSg { .. }
                    );
                    let (old, body, undo) = if direct {
                        let old = slots.repeat_count[id];
                        slots.repeat_count[id] = old.saturating_add(1);
                        (old, slots.repeat_body[id], Frame::RepeatCount { id, prev_count: old })
                    } else {
                        match stack.bump_repeat(si) {
                            Some((old, body)) => {
                                (old, body, Frame::RepeatInc { si, prev_count: old })
                            }
                            None => return corrupt(ip, Corruption::RepeatNotEntered(id)),
                        }
                    };
                    let count = old.saturating_add(1);
                    let greedy = matches!(
                        inst,
                        Instruction::RepeatInc { .. } | Instruction::RepeatIncSg { .. }
                    );

                    if greedy {
                        if count >= rr.upper {
                            ip += 1;
                        } else if count >= rr.lower {
                            stack.push(Frame::Alt { ip: ip + 1, s, sprev })?;
                            ip = body;
                        } else {
                            ip = body;
                        }
                        stack.push(undo)?;
                    } else {
                        stack.push(undo)?;
                        if count < rr.upper && count >= rr.lower {
                            stack.push(Frame::Alt { ip: body, s, sprev })?;
                            ip += 1;
                        } else if count < rr.upper {
                            ip = body;
                        } else {
                            ip += 1;
                        }
                    }
                }

                // ============================================================
                // Lookaround and atomic groups
                // ============================================================
                Instruction::PushPos => {
                    stack.push(Frame::Pos { s, sprev })?;
                    ip += 1;
                }
                Instruction::PopPos => match stack.void_to_pos() {
                    Some((ps, psprev)) => {
                        s = ps;
                        sprev = psprev;
                        ip += 1;
                    }
                    None => return corrupt(ip, Corruption::MissingMark("position")),
                },
                Instruction::PushPosNot { addr } => {
                    let target = rel_target(ip, *addr, code.len())?;
                    stack.push(Frame::PosNot { ip: target, s, sprev })?;
                    ip += 1;
                }
                Instruction::FailPos => {
                    if !stack.pop_to_pos_not(slots) {
                        return corrupt(ip, Corruption::MissingMark("negative lookahead"));
                    }
                    goto_fail = true;
                }
                Instruction::PushStopBt => {
                    stack.push(Frame::StopBt)?;
                    ip += 1;
                }
                Instruction::PopStopBt => {
                    if !stack.void_to_stop_bt() {
                        return corrupt(ip, Corruption::MissingMark("stop-backtrack"));
                    }
                    ip += 1;
                }
                Instruction::LookBehind { len } => match step_back(enc, 0, s, text, *len) {
                    Some(q) => {
                        s = q;
                        sprev = prev_char_head(enc, 0, q, text).unwrap_or(q);
                        ip += 1;
                    }
                    None => goto_fail = true,
                },
                Instruction::PushLookBehindNot { addr, len } => {
                    let target = rel_target(ip, *addr, code.len())?;
                    match step_back(enc, 0, s, text, *len) {
                        // Not enough text to look at: the assertion holds.
                        None => ip = target,
                        Some(q) => {
                            stack.push(Frame::LookBehindNot { ip: target, s, sprev })?;
                            s = q;
                            sprev = prev_char_head(enc, 0, q, text).unwrap_or(q);
                            ip += 1;
                        }
                    }
                }
                Instruction::FailLookBehindNot => {
                    if !stack.pop_to_look_behind_not(slots) {
                        return corrupt(ip, Corruption::MissingMark("negative lookbehind"));
                    }
                    goto_fail = true;
                }

                // ============================================================
                // Subexpression calls
                // ============================================================
                Instruction::Call { addr } => {
                    if *addr >= code.len() {
                        return corrupt(ip, Corruption::IpOutOfRange);
                    }
                    stack.push(Frame::CallFrame { ret: ip + 1 })?;
                    ip = *addr;
                }
                Instruction::Return => match stack.call_return() {
                    Some(ret) => {
                        stack.push(Frame::Return)?;
                        ip = ret;
                    }
                    None => return corrupt(ip, Corruption::MissingMark("call frame")),
                },
            }

            // Handle failure (backtracking)
            if goto_fail {
                retry_in_match_counter += 1;
                if retry_limit_in_match != 0 && retry_in_match_counter > retry_limit_in_match {
                    return Err(MatchError::RetryLimitInMatchOver);
                }
                if let (Some(limit), Some(t0)) = (time_limit, time_start) {
                    if retry_in_match_counter % CHECK_INTERVAL == 0 && t0.elapsed() >= limit {
                        return Err(MatchError::TimeLimitOver);
                    }
                }

                match stack.pop_alt(slots) {
                    Some((pip, ps, psprev)) => {
                        ip = pip;
                        s = ps;
                        sprev = psprev;
                    }
                    // Nothing left to try.
                    None => return Ok(best),
                }
            }
        }
    }
}
