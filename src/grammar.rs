use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::expand::{self, Expansion, ExpansionConfig};
use crate::optional;
use crate::utils::{GrammarError, OptionExt, Result};

/// Separates the alternatives of a production
pub const OR: char = '|';
/// Separates a production's name from its alternatives
pub const START: char = ':';
/// Terminates a production
pub const STOP: char = ';';

static SYMBOL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<[^<>\s]+>$").unwrap());

static PRODUCTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*(<[^<>\s]+>)\s*:(.*)$").unwrap());

/// Returns true if a whitespace-delimited token is a non-terminal reference
/// such as `<name>`. Tokens like `<=` or `<>` are terminals.
pub fn is_symbol(token: &str) -> bool {
    SYMBOL_REGEX.is_match(token)
}

/// The distinct symbols referenced by a string, in order of first appearance
pub fn symbols_in(text: &str) -> Vec<&str> {
    let mut found: Vec<&str> = Vec::new();
    for token in text.split_whitespace() {
        if is_symbol(token) && !found.contains(&token) {
            found.push(token);
        }
    }
    found
}

/// Normalize the whitespace of an alternative to single spaces
fn normalize(alternative: &str) -> String {
    alternative.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Mapping from each non-terminal to its ordered list of alternatives.
///
/// Symbols keep the order in which they were first defined and alternatives
/// keep their written order, so iteration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductionTable {
    productions: IndexMap<String, Vec<String>>,
}

impl ProductionTable {
    /// Create an empty table
    pub fn new() -> Self {
        ProductionTable {
            productions: IndexMap::new(),
        }
    }

    /// Parse grammar text of the form `<name> : alt1 | alt2 ;`
    pub fn parse(text: &str) -> Result<Self> {
        let content = strip_comments(text)?.join("\n");
        let mut table = ProductionTable::new();

        let mut pieces = content.split(STOP).collect::<Vec<_>>();
        // Whatever follows the last terminator must be empty.
        let trailing = pieces.pop().unwrap_or_default();
        if !trailing.trim().is_empty() {
            return Err(GrammarError::MalformedGrammar(format!(
                "unterminated production (missing '{}'): `{}`",
                STOP,
                excerpt(trailing)
            )));
        }

        for piece in pieces {
            if piece.trim().is_empty() {
                return Err(GrammarError::MalformedGrammar(
                    "empty production (stray ';')".to_string(),
                ));
            }

            let captures = PRODUCTION_REGEX.captures(piece).ok_or_grammar_err(|| {
                format!(
                    "expected `<name> {}` at start of production `{}`",
                    START,
                    excerpt(piece)
                )
            })?;
            let name = &captures[1];
            let body = &captures[2];

            let alternatives = body.split(OR).collect::<Vec<_>>();
            table.add_production(name, alternatives.as_slice())?;
        }

        Ok(table)
    }

    /// Read and parse a grammar file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Load a table stored as a JSON object of `"<name>": ["alt", ...]`
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: IndexMap<String, Vec<String>> = serde_json::from_str(json)?;
        let mut table = ProductionTable::new();
        for (name, alternatives) in &raw {
            table.add_production(name, alternatives.as_slice())?;
        }
        Ok(table)
    }

    /// Add alternatives to a symbol, appending if the symbol already exists.
    ///
    /// Alternatives are whitespace-normalized and their optional fragments
    /// validated.
    pub fn add_production<S: AsRef<str>>(
        &mut self,
        symbol: &str,
        alternatives: &[S],
    ) -> Result<&mut Self> {
        if !is_symbol(symbol) {
            return Err(GrammarError::MalformedGrammar(format!(
                "production name must look like `<name>`, got `{}`",
                symbol
            )));
        }
        if alternatives.is_empty() {
            return Err(GrammarError::MalformedGrammar(format!(
                "{} has no alternatives",
                symbol
            )));
        }

        let mut normalized = Vec::with_capacity(alternatives.len());
        for alternative in alternatives {
            let alternative = normalize(alternative.as_ref());
            if alternative.is_empty() {
                return Err(GrammarError::MalformedGrammar(format!(
                    "empty alternative in {}",
                    symbol
                )));
            }
            optional::fragment_count(&alternative)?;
            normalized.push(alternative);
        }

        self.productions
            .entry(symbol.to_string())
            .or_default()
            .extend(normalized);
        Ok(self)
    }

    /// Alternatives of a symbol
    pub fn get(&self, symbol: &str) -> Option<&[String]> {
        self.productions.get(symbol).map(Vec::as_slice)
    }

    /// Check if the table defines a symbol
    pub fn contains(&self, symbol: &str) -> bool {
        self.productions.contains_key(symbol)
    }

    /// Number of defined symbols
    pub fn len(&self) -> usize {
        self.productions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.productions.is_empty()
    }

    /// Defined symbols in definition order
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.productions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.productions
            .iter()
            .map(|(name, alts)| (name.as_str(), alts.as_slice()))
    }

    /// Symbols referenced by some alternative but never defined
    pub fn undefined_symbols(&self) -> BTreeSet<String> {
        self.productions
            .values()
            .flatten()
            .flat_map(|alt| alt.split_whitespace())
            .map(|token| token.trim_start_matches(optional::OPTIONAL_START))
            .map(|token| token.trim_end_matches(optional::OPTIONAL_STOP))
            .filter(|token| is_symbol(token) && !self.contains(token))
            .map(str::to_string)
            .collect()
    }
}

/// Drop comments and blank lines from grammar text.
///
/// Lines starting with `//` are discarded. Block comments `/* ... */` are
/// removed whether they sit inside one line or span several; text around them
/// on the same line is kept. Of what remains, lines containing `#` or `!` are
/// discarded outright.
pub fn strip_comments(text: &str) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    let mut in_block = false;

    for raw in text.lines() {
        if !in_block && raw.trim_start().starts_with("//") {
            continue;
        }

        let mut rest = raw;
        let mut kept = String::new();
        loop {
            if in_block {
                match rest.find("*/") {
                    Some(idx) => {
                        rest = &rest[idx + 2..];
                        in_block = false;
                    }
                    None => break,
                }
            } else {
                match rest.find("/*") {
                    Some(idx) => {
                        kept.push_str(&rest[..idx]);
                        kept.push(' ');
                        rest = &rest[idx + 2..];
                        in_block = true;
                    }
                    None => {
                        kept.push_str(rest);
                        break;
                    }
                }
            }
        }

        let kept = kept.trim();
        if kept.is_empty() || kept.starts_with("//") || kept.contains(['#', '!']) {
            continue;
        }
        lines.push(kept.to_string());
    }

    if in_block {
        return Err(GrammarError::MalformedGrammar(
            "unclosed block comment".to_string(),
        ));
    }

    Ok(lines)
}

fn excerpt(text: &str) -> String {
    let text = normalize(text);
    match text.char_indices().nth(40) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text,
    }
}

/// A production table together with the root to expand from
#[derive(Debug, Clone)]
pub struct Grammar {
    table: ProductionTable,
    root: String,
    config: ExpansionConfig,
}

impl Grammar {
    /// Pair a table with a root symbol, failing if the root is undefined
    pub fn new(table: ProductionTable, root: &str) -> Result<Self> {
        Self::with_config(table, root, ExpansionConfig::default())
    }

    /// Create a grammar with custom expansion limits
    pub fn with_config(table: ProductionTable, root: &str, config: ExpansionConfig) -> Result<Self> {
        if !table.contains(root) {
            return Err(GrammarError::RootNotFound(root.to_string()));
        }
        Ok(Grammar {
            table,
            root: root.to_string(),
            config,
        })
    }

    /// Parse a grammar from text
    pub fn parse(text: &str, root: &str) -> Result<Self> {
        Self::new(ProductionTable::parse(text)?, root)
    }

    /// Parse a grammar from a file. Files ending in `.json` are read as a
    /// serialized [`ProductionTable`].
    pub fn from_file<P: AsRef<Path>>(path: P, root: &str) -> Result<Self> {
        let path = path.as_ref();
        let table = if path.extension().is_some_and(|ext| ext == "json") {
            ProductionTable::from_json(&fs::read_to_string(path)?)?
        } else {
            ProductionTable::from_file(path)?
        };
        Self::new(table, root)
    }

    /// Enumerate every sentence reachable from the root
    pub fn expand(&self) -> Result<Expansion> {
        expand::expand(&self.table, &self.root, &self.config)
    }

    pub fn table(&self) -> &ProductionTable {
        &self.table
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    /// Set a new configuration
    pub fn set_config(&mut self, config: ExpansionConfig) {
        self.config = config;
    }
}

/// Builder for constructing Grammar instances
pub struct GrammarBuilder {
    root: String,
    table: ProductionTable,
    config: ExpansionConfig,
    error: Option<GrammarError>,
}

impl GrammarBuilder {
    /// Create a new grammar builder with default config
    pub fn new(root: &str) -> Self {
        GrammarBuilder {
            root: root.to_string(),
            table: ProductionTable::new(),
            config: ExpansionConfig::default(),
            error: None,
        }
    }

    /// Set the configuration
    pub fn config(mut self, config: ExpansionConfig) -> Self {
        self.config = config;
        self
    }

    /// Add alternatives for a symbol. The first error is kept and reported
    /// by [`GrammarBuilder::build`].
    pub fn production(mut self, symbol: &str, alternatives: &[&str]) -> Self {
        if self.error.is_none() {
            if let Err(err) = self.table.add_production(symbol, alternatives) {
                self.error = Some(err);
            }
        }
        self
    }

    /// Build the grammar
    pub fn build(self) -> Result<Grammar> {
        match self.error {
            Some(err) => Err(err),
            None => Grammar::with_config(self.table, &self.root, self.config),
        }
    }
}
