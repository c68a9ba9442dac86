// region.rs - Match region: one (beg, end) byte-offset pair per group.

use std::ops::Range;

/// Offset of a group that did not participate in the match.
pub const REGION_NOTPOS: usize = usize::MAX;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Region {
    pub beg: Vec<usize>,
    pub end: Vec<usize>,
}

impl Region {
    pub fn new() -> Self {
        Region { beg: Vec::new(), end: Vec::new() }
    }

    /// Region with `num_regs` unset slots.
    pub fn with_capacity(num_regs: usize) -> Self {
        let mut region = Region::new();
        region.resize(num_regs);
        region
    }

    #[inline]
    pub fn num_regs(&self) -> usize {
        self.beg.len()
    }

    pub fn resize(&mut self, n: usize) {
        self.beg.resize(n, REGION_NOTPOS);
        self.end.resize(n, REGION_NOTPOS);
    }

    pub fn clear(&mut self) {
        self.beg.fill(REGION_NOTPOS);
        self.end.fill(REGION_NOTPOS);
    }

    /// Span of group `i`, or `None` if it is unset or out of range.
    pub fn pos(&self, i: usize) -> Option<Range<usize>> {
        let (beg, end) = (*self.beg.get(i)?, *self.end.get(i)?);
        if beg == REGION_NOTPOS || end == REGION_NOTPOS {
            None
        } else {
            Some(beg..end)
        }
    }

    /// Length of the whole match (group 0).
    pub fn match_len(&self) -> Option<usize> {
        self.pos(0).map(|r| r.len())
    }

    /// Copy every slot of `other`, growing to its size.
    pub fn copy_from(&mut self, other: &Region) {
        self.beg.clone_from(&other.beg);
        self.end.clone_from(&other.end);
    }
}
