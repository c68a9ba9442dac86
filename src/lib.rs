//! # regvm
//!
//! Backtracking regular-expression matching engine: a bytecode interpreter
//! with an explicit, bounded backtrack stack.
//!
//! The engine does not parse patterns. A compiler front end (or a test)
//! produces an immutable [`Program`](program::Program), and a
//! [`MatchEngine`](regexec::MatchEngine) runs it against a byte text at one
//! start offset, yielding no match, a [`Region`](region::Region) of group
//! spans, or a [`MatchError`](error::MatchError).
//!
//! ## Quick Start
//!
//! ```rust
//! use regvm::prelude::*;
//!
//! // (a+)b
//! let mut b = Program::builder(&ENCODING_UTF8);
//! let again = b.label();
//! let done = b.label();
//! b.groups(1).emit(Instruction::MemStartPush { num: 1 });
//! b.bind(again).exact(b"a").push(done).jump(again);
//! b.bind(done)
//!     .emit(Instruction::MemEndPush { num: 1 })
//!     .exact(b"b")
//!     .emit(Instruction::End);
//! let program = b.build().unwrap();
//!
//! let outcome = regvm::regexec::run(&program, b"aaab!", 0, 5).unwrap();
//! let region = outcome.region().unwrap();
//! assert_eq!(region.pos(0), Some(0..4));
//! assert_eq!(region.pos(1), Some(0..3));
//! ```
//!
//! ## Module Structure
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`program`] | Instructions, operand tables, `ProgramBuilder` |
//! | [`regexec`] | VM executor |
//! | [`stack`] | Backtrack frames and stack operations |
//! | [`region`] | Match result |
//! | [`regenc`] | Encoding trait |
//! | [`encodings`] | ASCII and UTF-8 |
//! | [`options`] | Option flags |
//! | [`config`] | Resource limits |
//! | [`error`] | Error type and codes |

pub mod config;
pub mod encodings;
pub mod error;
pub mod options;
pub mod prelude;
pub mod program;
pub mod regenc;
pub mod regexec;
pub mod region;
pub mod stack;
