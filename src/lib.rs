//! Sentence-Gen enumerates every sentence a BNF-style grammar can produce.
//!
//! Grammars are written as productions `<name> : alt1 | alt2 ;`, where
//! alternatives mix bare-word terminals, `<symbol>` references and optional
//! fragments in square brackets. Starting from a root symbol, the expansion
//! engine substitutes symbols round by round until only terminal sentences
//! remain, or until a configured limit cuts the search short.
//!
//! # Example
//!
//! ```rust
//! use sentence_gen::{Grammar, Outcome};
//!
//! let grammar = Grammar::parse(
//!     "<main> : hello [there] <name> ; <name> : Alice | Bob ;",
//!     "<main>",
//! )
//! .unwrap();
//!
//! let expansion = grammar.expand().unwrap();
//! assert_eq!(expansion.outcome, Outcome::Exhausted);
//! assert_eq!(
//!     expansion.sentences.into_iter().collect::<Vec<_>>(),
//!     vec!["hello Alice", "hello Bob", "hello there Alice", "hello there Bob"]
//! );
//! ```

pub mod expand;
pub mod grammar;
pub mod optional;
pub mod sink;
pub mod utils;

pub use expand::{CutoffReason, Expansion, ExpansionConfig, ExpansionReport, Outcome, expand};
pub use grammar::{Grammar, GrammarBuilder, ProductionTable};
pub use sink::{FileSink, MemorySink, SentenceSink};
pub use utils::{GrammarError, Result};
