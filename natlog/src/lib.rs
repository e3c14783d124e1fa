//! # natlog
//!
//! A small Prolog-family interpreter. Programs are `.nl` files: clause
//! blocks separated by blank lines, each line a row of whitespace-separated
//! tokens. Clauses compile to tagged integer cells at the bottom of a
//! growable heap; a depth-first resolution loop with chronological
//! backtracking enumerates answers to the last clause, the query.
//!
//! ```no_run
//! use natlog::Engine;
//!
//! let mut engine = Engine::from_source(
//!     "<demo>",
//!     "member X L\n  L cons X _\n\nmember X L\n  L cons _ T\n  member X T\n\n\
//!      goal X\n  L list 1 2 3\n  member X L\n",
//! )?;
//! for answer in engine.answers() {
//!     println!("{}", answer?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod compiler;
pub mod machine;
pub mod symbols;
pub mod term;

pub use compiler::parser::ParseErrorReport;
pub use compiler::CompileError;
pub use machine::{Answers, Engine, EngineError, LoadError};
pub use term::Term;
