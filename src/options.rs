// options.rs - Option flags shared by compiled programs and individual runs.
//
// A program carries the options it was compiled with; a run may add more
// through `MatchConfig`. The engine always looks at the union of both.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MatchOptions: u32 {
        /// Plain literal and backreference instructions compare case-folded.
        const IGNORECASE = 1 << 0;
        /// The non-multiline any-char instructions also match a line terminator.
        const MULTILINE = 1 << 2;
        /// Keep exploring after a candidate and report the longest span.
        const FIND_LONGEST = 1 << 4;
        /// Reject a zero-length candidate at the start offset.
        const FIND_NOT_EMPTY = 1 << 5;
        /// The start of the text is not the beginning of a line.
        const NOTBOL = 1 << 9;
        /// The end of the text is not the end of a line.
        const NOTEOL = 1 << 10;
        /// A failed run leaves the caller's region untouched instead of clearing it.
        const POSIX_REGION = 1 << 11;
        /// Emit a `tracing` event for every dispatched instruction.
        const TRACE = 1 << 31;
    }
}

impl MatchOptions {
    /// Options that change what counts as a successful candidate.
    pub const FIND_CONDITION: MatchOptions =
        MatchOptions::FIND_LONGEST.union(MatchOptions::FIND_NOT_EMPTY);

    #[inline]
    pub fn is_find_condition(self) -> bool {
        self.intersects(Self::FIND_CONDITION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_condition() {
        assert!(!MatchOptions::empty().is_find_condition());
        assert!(MatchOptions::FIND_LONGEST.is_find_condition());
        assert!(MatchOptions::FIND_NOT_EMPTY.is_find_condition());
        assert!(!(MatchOptions::NOTBOL | MatchOptions::NOTEOL).is_find_condition());
    }

    #[test]
    fn union_of_program_and_run_options() {
        let compiled = MatchOptions::IGNORECASE;
        let run = MatchOptions::NOTEOL;
        let all = compiled | run;
        assert!(all.contains(MatchOptions::IGNORECASE));
        assert!(all.contains(MatchOptions::NOTEOL));
        assert!(!all.contains(MatchOptions::NOTBOL));
    }
}
