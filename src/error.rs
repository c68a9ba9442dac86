// error.rs - Errors that end a run without an ordinary match/no-match answer.
//
// A pattern that simply does not match is not an error; it is
// `MatchOutcome::NoMatch`. Everything here aborts the run immediately.
// Codes follow Oniguruma's numbering so callers bridging to C keep working.

use std::fmt;

pub const ERR_UNDEFINED_BYTECODE: i32 = -13;
pub const ERR_MATCH_STACK_LIMIT_OVER: i32 = -15;
pub const ERR_RETRY_LIMIT_IN_MATCH_OVER: i32 = -17;
pub const ERR_TIME_LIMIT_OVER: i32 = -20;
pub const ERR_ABORTED: i32 = -21;

/// Why a program was judged malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    /// The instruction pointer left the code.
    IpOutOfRange,
    /// A capture group id beyond the declared group count.
    InvalidGroup(usize),
    /// A repeat id with no entry in the repeat-range table.
    InvalidRepeat(usize),
    /// A null-check id beyond the declared null-check count.
    InvalidNullCheck(usize),
    /// A class operand index with no entry in the class table.
    InvalidClass(usize),
    /// A literal template reference outside the template table.
    InvalidTemplate(usize),
    /// A loop guard whose following instruction is not a loop-back.
    UnexpectedAfterNullCheck,
    /// A scoped pop found no matching mark on the stack.
    MissingMark(&'static str),
    /// `Pop` with nothing to pop.
    EmptyStack,
    /// A repeat increment with no active repeat of that id.
    RepeatNotEntered(usize),
}

impl fmt::Display for Corruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Corruption::IpOutOfRange => write!(f, "instruction pointer out of range"),
            Corruption::InvalidGroup(n) => write!(f, "invalid capture group {}", n),
            Corruption::InvalidRepeat(n) => write!(f, "invalid repeat id {}", n),
            Corruption::InvalidNullCheck(n) => write!(f, "invalid null-check id {}", n),
            Corruption::InvalidClass(n) => write!(f, "invalid class index {}", n),
            Corruption::InvalidTemplate(n) => write!(f, "invalid template index {}", n),
            Corruption::UnexpectedAfterNullCheck => {
                write!(f, "unexpected bytecode after null check")
            }
            Corruption::MissingMark(kind) => write!(f, "no {} mark on the stack", kind),
            Corruption::EmptyStack => write!(f, "pop from an empty stack"),
            Corruption::RepeatNotEntered(n) => write!(f, "repeat {} was never entered", n),
        }
    }
}

/// Error type for a single engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// Backtrack stack reached its configured depth.
    MatchStackLimitOver { limit: u32 },
    /// Too many backtracks in one run.
    RetryLimitInMatchOver,
    /// Wall-clock budget exceeded.
    TimeLimitOver,
    /// The caller's budget hook asked to stop.
    Aborted,
    /// Malformed compiled program (compiler bug).
    ProgramCorruption { ip: usize, reason: Corruption },
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchError::MatchStackLimitOver { limit } => {
                write!(f, "match-stack limit over ({} frames)", limit)
            }
            MatchError::RetryLimitInMatchOver => write!(f, "retry-limit-in-match over"),
            MatchError::TimeLimitOver => write!(f, "time limit over"),
            MatchError::Aborted => write!(f, "match aborted by caller"),
            MatchError::ProgramCorruption { ip, reason } => {
                write!(f, "corrupt program at {}: {}", ip, reason)
            }
        }
    }
}

impl std::error::Error for MatchError {}

impl MatchError {
    /// Returns the Oniguruma-compatible error code.
    pub fn code(&self) -> i32 {
        match self {
            MatchError::MatchStackLimitOver { .. } => ERR_MATCH_STACK_LIMIT_OVER,
            MatchError::RetryLimitInMatchOver => ERR_RETRY_LIMIT_IN_MATCH_OVER,
            MatchError::TimeLimitOver => ERR_TIME_LIMIT_OVER,
            MatchError::Aborted => ERR_ABORTED,
            MatchError::ProgramCorruption { .. } => ERR_UNDEFINED_BYTECODE,
        }
    }

    /// Resource errors are recoverable: rerun with a larger budget.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(
            self,
            MatchError::MatchStackLimitOver { .. }
                | MatchError::RetryLimitInMatchOver
                | MatchError::TimeLimitOver
        )
    }

    pub(crate) fn corrupt(ip: usize, reason: Corruption) -> Self {
        MatchError::ProgramCorruption { ip, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_limit_error() {
        let err = MatchError::MatchStackLimitOver { limit: 100 };
        assert_eq!(err.code(), ERR_MATCH_STACK_LIMIT_OVER);
        assert!(err.is_resource_exhausted());
        assert_eq!(err.to_string(), "match-stack limit over (100 frames)");
    }

    #[test]
    fn corruption_is_not_resource_exhaustion() {
        let err = MatchError::corrupt(7, Corruption::InvalidGroup(9));
        assert!(!err.is_resource_exhausted());
        assert_eq!(err.code(), ERR_UNDEFINED_BYTECODE);
        assert_eq!(err.to_string(), "corrupt program at 7: invalid capture group 9");
    }

    #[test]
    fn aborted_is_distinct() {
        let err = MatchError::Aborted;
        assert!(!err.is_resource_exhausted());
        assert_eq!(err.code(), ERR_ABORTED);
    }

    #[test]
    fn error_trait() {
        let err: Box<dyn std::error::Error> = Box::new(MatchError::TimeLimitOver);
        assert_eq!(err.to_string(), "time limit over");
    }
}
