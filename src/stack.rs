// stack.rs - Backtrack stack: frame model, restoring pops, scoped unwinds.
//
// Every alternative the engine may come back to, and every piece of engine
// state an alternative overwrote, lives here as a `Frame`. Popping a frame
// restores exactly what it saved. Nothing is ever recursed on; the depth of
// this vector is the only thing that grows with backtracking.

use crate::config::INIT_MATCH_STACK_SIZE;
use crate::error::MatchError;

/// Position stored in the undo frame of a cleared group. Never resolved.
pub const MEM_CLEARED: usize = usize::MAX;

/// Where a capture bound currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemPtr {
    /// Group bound not set.
    Invalid,
    /// Bound is the position stored in a `MemStart`/`MemEnd` frame at this index.
    StackIdx(usize),
    /// Bound set directly by a non-push capture instruction.
    Pos(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Choice point.
    Alt { ip: usize, s: usize, sprev: usize },
    /// Capture open, with the group's bounds before it.
    MemStart { num: usize, pos: usize, prev_start: MemPtr, prev_end: MemPtr },
    /// Capture close, with the group's bounds before it.
    MemEnd { num: usize, pos: usize, prev_start: MemPtr, prev_end: MemPtr },
    /// Active repeat. `count` is bumped in place by `RepeatInc*`.
    Repeat { id: usize, count: u32, body: usize, prev_stk: Option<usize>, prev_count: u32 },
    /// Undo for an in-place bump of the `Repeat` frame at `si`.
    RepeatInc { si: usize, prev_count: u32 },
    /// Undo for a bump of the engine's direct counter `id`.
    RepeatCount { id: usize, prev_count: u32 },
    NullCheckStart { id: usize, s: usize },
    /// Lookahead save point.
    Pos { s: usize, sprev: usize },
    /// Negative lookahead; resumes at `ip` when the guarded branch fails.
    PosNot { ip: usize, s: usize, sprev: usize },
    /// Atomic group barrier.
    StopBt,
    /// Negative lookbehind; resumes at `ip` when the guarded branch fails.
    LookBehindNot { ip: usize, s: usize, sprev: usize },
    CallFrame { ret: usize },
    Return,
    Void,
}

impl Frame {
    /// Frames the fail path resumes from.
    #[inline]
    pub fn is_resumable(&self) -> bool {
        matches!(self, Frame::Alt { .. } | Frame::PosNot { .. } | Frame::LookBehindNot { .. })
    }

    /// Frames discarded when an atomic group or lookahead commits.
    #[inline]
    fn is_void_target(&self) -> bool {
        self.is_resumable() || matches!(self, Frame::NullCheckStart { .. })
    }
}

/// Engine fields that frames save and restore.
#[derive(Clone, Debug, Default)]
pub struct Slots {
    pub mem_start: Vec<MemPtr>,
    pub mem_end: Vec<MemPtr>,
    /// Stack index of the active `Repeat` frame per repeat id.
    pub repeat_stk: Vec<Option<usize>>,
    /// Direct counters used by the single-group repeat forms.
    pub repeat_count: Vec<u32>,
    pub repeat_body: Vec<usize>,
}

impl Slots {
    pub fn new(num_mem: usize, num_repeat: usize) -> Self {
        Slots {
            mem_start: vec![MemPtr::Invalid; num_mem + 1],
            mem_end: vec![MemPtr::Invalid; num_mem + 1],
            repeat_stk: vec![None; num_repeat],
            repeat_count: vec![0; num_repeat],
            repeat_body: vec![0; num_repeat],
        }
    }

    pub fn reset(&mut self) {
        self.mem_start.fill(MemPtr::Invalid);
        self.mem_end.fill(MemPtr::Invalid);
        self.repeat_stk.fill(None);
        self.repeat_count.fill(0);
        self.repeat_body.fill(0);
    }
}

pub struct BacktrackStack {
    frames: Vec<Frame>,
    limit: u32,
}

impl BacktrackStack {
    /// `limit == 0` means unbounded.
    pub fn new(limit: u32) -> Self {
        let cap = if limit == 0 {
            INIT_MATCH_STACK_SIZE
        } else {
            INIT_MATCH_STACK_SIZE.min(limit as usize)
        };
        BacktrackStack { frames: Vec::with_capacity(cap), limit }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    #[inline]
    pub fn get(&self, i: usize) -> Option<&Frame> {
        self.frames.get(i)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    #[inline]
    pub fn push(&mut self, frame: Frame) -> Result<(), MatchError> {
        if self.limit != 0 && self.frames.len() >= self.limit as usize {
            return Err(MatchError::MatchStackLimitOver { limit: self.limit });
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Bump the count of the `Repeat` frame at `si`, returning the old count.
    pub fn bump_repeat(&mut self, si: usize) -> Option<(u32, usize)> {
        match self.frames.get_mut(si) {
            Some(Frame::Repeat { count, body, .. }) => {
                let old = *count;
                *count = old.saturating_add(1);
                Some((old, *body))
            }
            _ => None,
        }
    }

    fn restore(&mut self, frame: &Frame, slots: &mut Slots) {
        match *frame {
            Frame::MemStart { num, prev_start, prev_end, .. }
            | Frame::MemEnd { num, prev_start, prev_end, .. } => {
                slots.mem_start[num] = prev_start;
                slots.mem_end[num] = prev_end;
            }
            Frame::Repeat { id, prev_stk, prev_count, .. } => {
                slots.repeat_stk[id] = prev_stk;
                slots.repeat_count[id] = prev_count;
            }
            Frame::RepeatInc { si, prev_count } => {
                if let Some(Frame::Repeat { count, .. }) = self.frames.get_mut(si) {
                    *count = prev_count;
                }
            }
            Frame::RepeatCount { id, prev_count } => {
                slots.repeat_count[id] = prev_count;
            }
            _ => {}
        }
    }

    /// Pop down to the most recent resumable frame, undoing every frame on the
    /// way. Returns `(ip, s, sprev)` to resume at, or `None` once the stack is empty.
    pub fn pop_alt(&mut self, slots: &mut Slots) -> Option<(usize, usize, usize)> {
        loop {
            let frame = self.frames.pop()?;
            match frame {
                Frame::Alt { ip, s, sprev }
                | Frame::PosNot { ip, s, sprev }
                | Frame::LookBehindNot { ip, s, sprev } => return Some((ip, s, sprev)),
                _ => self.restore(&frame, slots),
            }
        }
    }

    /// Discard the top frame without restoring anything.
    pub fn pop_one(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Commit an atomic group: void choice points down to the nearest barrier,
    /// barrier included. Undo frames stay. `false` if there is no barrier.
    pub fn void_to_stop_bt(&mut self) -> bool {
        for frame in self.frames.iter_mut().rev() {
            if matches!(frame, Frame::StopBt) {
                *frame = Frame::Void;
                return true;
            }
            if frame.is_void_target() {
                *frame = Frame::Void;
            }
        }
        false
    }

    /// Close a lookahead: void choice points down to the nearest `Pos` mark
    /// and return its saved `(s, sprev)`.
    pub fn void_to_pos(&mut self) -> Option<(usize, usize)> {
        for frame in self.frames.iter_mut().rev() {
            if let Frame::Pos { s, sprev } = *frame {
                *frame = Frame::Void;
                return Some((s, sprev));
            }
            if frame.is_void_target() {
                *frame = Frame::Void;
            }
        }
        None
    }

    fn pop_through(&mut self, slots: &mut Slots, is_mark: fn(&Frame) -> bool) -> bool {
        while let Some(frame) = self.frames.pop() {
            if is_mark(&frame) {
                return true;
            }
            self.restore(&frame, slots);
        }
        false
    }

    /// Unwind, restoring, through the nearest negative-lookahead mark.
    pub fn pop_to_pos_not(&mut self, slots: &mut Slots) -> bool {
        self.pop_through(slots, |f| matches!(f, Frame::PosNot { .. }))
    }

    /// Unwind, restoring, through the nearest negative-lookbehind mark.
    pub fn pop_to_look_behind_not(&mut self, slots: &mut Slots) -> bool {
        self.pop_through(slots, |f| matches!(f, Frame::LookBehindNot { .. }))
    }

    /// Index of the innermost null-check entry for `id`.
    pub fn null_check_start(&self, id: usize) -> Option<usize> {
        self.frames
            .iter()
            .rposition(|f| matches!(*f, Frame::NullCheckStart { id: i, .. } if i == id))
    }

    /// Return address of the innermost call frame not yet returned from.
    pub fn call_return(&self) -> Option<usize> {
        let mut level = 0usize;
        for frame in self.frames.iter().rev() {
            match *frame {
                Frame::CallFrame { ret } => {
                    if level == 0 {
                        return Some(ret);
                    }
                    level -= 1;
                }
                Frame::Return => level += 1,
                _ => {}
            }
        }
        None
    }

    /// Resolve a capture bound to a text position.
    #[inline]
    pub fn mem_pos(&self, ptr: MemPtr) -> Option<usize> {
        match ptr {
            MemPtr::Invalid => None,
            MemPtr::Pos(p) => Some(p),
            MemPtr::StackIdx(i) => match self.frames.get(i) {
                Some(Frame::MemStart { pos, .. }) | Some(Frame::MemEnd { pos, .. })
                    if *pos != MEM_CLEARED =>
                {
                    Some(*pos)
                }
                _ => None,
            },
        }
    }
}
