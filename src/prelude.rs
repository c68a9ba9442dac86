// prelude.rs - Convenient re-exports for building and running programs.
//
//! # Prelude
//!
//! ```
//! use regvm::prelude::*;
//!
//! let mut b = Program::builder(&ENCODING_ASCII);
//! b.exact(b"ok").emit(Instruction::End);
//! let program = b.build().unwrap();
//!
//! let mut engine = MatchEngine::new(&program);
//! let outcome = engine.run(&Input::new(b"ok!")).unwrap();
//! assert_eq!(outcome.region().and_then(|r| r.pos(0)), Some(0..2));
//! ```

pub use crate::config::MatchConfig;
pub use crate::encodings::{ENCODING_ASCII, ENCODING_UTF8};
pub use crate::error::MatchError;
pub use crate::options::MatchOptions;
pub use crate::program::{
    CharClass, Instruction, Label, Program, ProgramBuilder, RepeatRange, INFINITE_REPEAT,
};
pub use crate::regenc::{CodeRange, Encoding};
pub use crate::regexec::{Input, MatchEngine, MatchOutcome};
pub use crate::region::{Region, REGION_NOTPOS};
