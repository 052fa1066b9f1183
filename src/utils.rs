use std::io;
use thiserror::Error;

/// Custom error types for the sentence generator
#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Grammar file path required")]
    MissingGrammarFile,

    #[error("Root symbol required")]
    MissingRoot,

    #[error("Malformed grammar: {0}")]
    MalformedGrammar(String),

    #[error("Root symbol not found in grammar: {0}")]
    RootNotFound(String),

    /// Never raised by the expansion engine, which drops branches that
    /// reference undefined symbols. Available to callers that want to treat
    /// [`crate::Expansion::unresolved`] as fatal.
    #[error("Unknown symbol reference: {0}")]
    UnknownSymbolReference(String),
}

/// Result type for grammar operations
pub type Result<T> = std::result::Result<T, GrammarError>;

/// Trait extension for Option<T> to convert to GrammarError
pub trait OptionExt<T> {
    fn ok_or_grammar_err<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_grammar_err<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.ok_or_else(|| GrammarError::MalformedGrammar(f()))
    }
}
