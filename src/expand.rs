//! The expansion engine.
//!
//! Starting from the root's alternatives, every round substitutes each
//! distinct symbol of each frontier string with every one of its
//! alternatives. Strings left without symbol references are sentences and
//! move into the result set; the rest form the next frontier. The loop ends
//! when the frontier runs dry or one of the configured limits fires.

use std::collections::BTreeSet;
use std::fmt;
use std::mem;
use std::time::{Duration, Instant};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::grammar::{ProductionTable, is_symbol, symbols_in};
use crate::optional::{has_optional, subsets};
use crate::utils::{GrammarError, Result};

/// Default upper bound on the number of sentences collected
pub const DEFAULT_CUTOFF: usize = 1_000_000;

/// Limits bounding an expansion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Stop once more than this many sentences have been collected
    pub cutoff: usize,
    /// Stop after this many substitution rounds
    pub max_rounds: Option<usize>,
    /// Stop once sentences and frontier together hold roughly this many bytes
    pub max_bytes: Option<usize>,
    /// Stop after this many milliseconds of wall-clock time
    pub timeout_ms: Option<u64>,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        ExpansionConfig {
            cutoff: DEFAULT_CUTOFF,
            max_rounds: None,
            max_bytes: None,
            timeout_ms: None,
        }
    }
}

impl ExpansionConfig {
    pub fn with_cutoff(mut self, cutoff: usize) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }

    /// Load a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Which limit ended a partial expansion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutoffReason {
    SentenceLimit,
    MemoryLimit,
    RoundLimit,
    Timeout,
}

impl fmt::Display for CutoffReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CutoffReason::SentenceLimit => "sentence limit",
            CutoffReason::MemoryLimit => "memory limit",
            CutoffReason::RoundLimit => "round limit",
            CutoffReason::Timeout => "timeout",
        };
        f.write_str(text)
    }
}

/// Terminal state of the expansion driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// Nothing left to expand; the sentence set is exact
    Exhausted,
    /// A limit fired; the sentence set is partial
    Cutoff(CutoffReason),
}

impl Outcome {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Outcome::Exhausted)
    }

    pub fn is_cutoff(&self) -> bool {
        matches!(self, Outcome::Cutoff(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Exhausted => f.write_str("exhausted"),
            Outcome::Cutoff(reason) => write!(f, "cut off ({})", reason),
        }
    }
}

/// The result of expanding a grammar
#[derive(Debug, Clone)]
pub struct Expansion {
    /// Every distinct sentence found
    pub sentences: BTreeSet<String>,
    pub outcome: Outcome,
    /// Substitution rounds run
    pub rounds: usize,
    /// Referenced symbols with no production; branches through them were dropped
    pub unresolved: BTreeSet<String>,
}

impl Expansion {
    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn contains(&self, sentence: &str) -> bool {
        self.sentences.contains(sentence)
    }

    /// Summary suitable for printing or serializing
    pub fn report(&self) -> ExpansionReport {
        ExpansionReport {
            outcome: self.outcome,
            sentences: self.sentences.len(),
            rounds: self.rounds,
            unresolved: self.unresolved.iter().cloned().collect(),
        }
    }
}

/// Serializable summary of an [`Expansion`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionReport {
    pub outcome: Outcome,
    pub sentences: usize,
    pub rounds: usize,
    pub unresolved: Vec<String>,
}

/// Expand `root` into every sentence it derives, within the limits of `config`.
///
/// References to symbols missing from the table are not an error: strings
/// containing them can never complete and are dropped. Such symbols are
/// listed in [`Expansion::unresolved`].
pub fn expand(table: &ProductionTable, root: &str, config: &ExpansionConfig) -> Result<Expansion> {
    let seeds = table
        .get(root)
        .ok_or_else(|| GrammarError::RootNotFound(root.to_string()))?;

    let mut expander = Expander::new(table, config);
    let mut frontier: IndexSet<String> = seeds.iter().cloned().collect();

    let outcome = loop {
        if frontier.is_empty() {
            break Outcome::Exhausted;
        }
        if config.max_rounds.is_some_and(|max| expander.rounds >= max) {
            break Outcome::Cutoff(CutoffReason::RoundLimit);
        }

        match expander.round(&frontier)? {
            Round::Continue(next) => frontier = next,
            Round::Stop(reason) => break Outcome::Cutoff(reason),
        }
    };

    let expansion = expander.finish(outcome);
    if !expansion.unresolved.is_empty() {
        warn!(
            symbols = ?expansion.unresolved,
            "undefined symbols referenced; branches through them were dropped"
        );
    }
    info!(
        root,
        outcome = %expansion.outcome,
        sentences = expansion.sentences.len(),
        rounds = expansion.rounds,
        "expansion finished"
    );

    Ok(expansion)
}

/// Result of a single substitution round
enum Round {
    Continue(IndexSet<String>),
    Stop(CutoffReason),
}

/// Owns the result set and the bookkeeping shared across rounds
struct Expander<'a> {
    table: &'a ProductionTable,
    config: &'a ExpansionConfig,
    deadline: Option<Instant>,
    sentences: BTreeSet<String>,
    sentence_bytes: usize,
    unresolved: BTreeSet<String>,
    rounds: usize,
}

impl<'a> Expander<'a> {
    fn new(table: &'a ProductionTable, config: &'a ExpansionConfig) -> Self {
        Expander {
            table,
            config,
            deadline: config
                .timeout_ms
                .and_then(|ms| Instant::now().checked_add(Duration::from_millis(ms))),
            sentences: BTreeSet::new(),
            sentence_bytes: 0,
            unresolved: BTreeSet::new(),
            rounds: 0,
        }
    }

    fn round(&mut self, frontier: &IndexSet<String>) -> Result<Round> {
        self.rounds += 1;
        let frontier_bytes = frontier.iter().map(|s| footprint(s)).sum::<usize>();
        debug!(
            round = self.rounds,
            frontier = frontier.len(),
            sentences = self.sentences.len(),
            "substitution round"
        );

        let mut next = IndexSet::new();
        let mut next_bytes = 0;

        for item in frontier {
            // Subsets are produced one at a time so the limits below can stop
            // an alternative with many optional fragments part way through.
            for candidate in subsets(item)? {
                if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    return Ok(Round::Stop(CutoffReason::Timeout));
                }

                let symbols = symbols_in(&candidate);
                if symbols.is_empty() {
                    if let Some(reason) = self.accept(candidate, frontier_bytes + next_bytes) {
                        return Ok(Round::Stop(reason));
                    }
                    continue;
                }

                for symbol in symbols {
                    let Some(alternatives) = self.table.get(symbol) else {
                        self.unresolved.insert(symbol.to_string());
                        continue;
                    };

                    for alternative in alternatives {
                        let emitted = replace_first(&candidate, symbol, alternative);
                        if is_complete(&emitted) {
                            if let Some(reason) = self.accept(emitted, frontier_bytes + next_bytes) {
                                return Ok(Round::Stop(reason));
                            }
                        } else {
                            let bytes = footprint(&emitted);
                            if next.insert(emitted) {
                                next_bytes += bytes;
                                if self.over_memory(frontier_bytes + next_bytes) {
                                    return Ok(Round::Stop(CutoffReason::MemoryLimit));
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(Round::Continue(next))
    }

    /// Record a finished sentence, returning the limit it crossed if any
    fn accept(&mut self, sentence: String, live_bytes: usize) -> Option<CutoffReason> {
        let bytes = footprint(&sentence);
        if self.sentences.insert(sentence) {
            self.sentence_bytes += bytes;
        }

        if self.sentences.len() > self.config.cutoff {
            Some(CutoffReason::SentenceLimit)
        } else if self.over_memory(live_bytes) {
            Some(CutoffReason::MemoryLimit)
        } else {
            None
        }
    }

    fn over_memory(&self, live_bytes: usize) -> bool {
        self.config
            .max_bytes
            .is_some_and(|max| self.sentence_bytes + live_bytes > max)
    }

    fn finish(self, outcome: Outcome) -> Expansion {
        Expansion {
            sentences: self.sentences,
            outcome,
            rounds: self.rounds,
            unresolved: self.unresolved,
        }
    }
}

/// Approximate heap and handle cost of holding a string in a set
fn footprint(text: &str) -> usize {
    text.len() + mem::size_of::<String>()
}

/// A string is a sentence once it has no symbol references and no
/// unexpanded optional fragments.
fn is_complete(text: &str) -> bool {
    !has_optional(text) && !text.split_whitespace().any(is_symbol)
}

/// Replace the first occurrence of `symbol` among the tokens of `text`
fn replace_first(text: &str, symbol: &str, alternative: &str) -> String {
    let mut replaced = false;
    text.split_whitespace()
        .map(|token| {
            if !replaced && token == symbol {
                replaced = true;
                alternative
            } else {
                token
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(grammar: &str, root: &str, config: &ExpansionConfig) -> Expansion {
        let table = ProductionTable::parse(grammar).unwrap();
        expand(&table, root, config).unwrap()
    }

    fn sentences(expansion: &Expansion) -> Vec<&str> {
        expansion.sentences.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_simple_substitution() {
        let expansion = run(
            "<main> : hello <name> ; <name> : Alice | Bob ;",
            "<main>",
            &ExpansionConfig::default(),
        );
        assert_eq!(sentences(&expansion), vec!["hello Alice", "hello Bob"]);
        assert_eq!(expansion.outcome, Outcome::Exhausted);
        assert_eq!(expansion.rounds, 1);
    }

    #[test]
    fn test_optional_fragment() {
        let expansion = run(
            "<main> : hello [there] <name> ; <name> : Sam ;",
            "<main>",
            &ExpansionConfig::default(),
        );
        assert_eq!(sentences(&expansion), vec!["hello Sam", "hello there Sam"]);
        assert!(expansion.outcome.is_exhausted());
    }

    #[test]
    fn test_optional_introduced_by_substitution() {
        let expansion = run(
            "<main> : <title> Smith ; <title> : [Dr] <first> ; <first> : Jo ;",
            "<main>",
            &ExpansionConfig::default(),
        );
        assert_eq!(sentences(&expansion), vec!["Dr Jo Smith", "Jo Smith"]);
    }

    #[test]
    fn test_terminal_root_alternatives() {
        let expansion = run(
            "<main> : hello | hi <x> ; <x> : there ;",
            "<main>",
            &ExpansionConfig::default(),
        );
        assert_eq!(sentences(&expansion), vec!["hello", "hi there"]);
    }

    #[test]
    fn test_optional_drops_every_reference() {
        let expansion = run("<main> : a [<b>] ; <b> : c ;", "<main>", &ExpansionConfig::default());
        assert_eq!(sentences(&expansion), vec!["a", "a c"]);
    }

    #[test]
    fn test_repeated_symbol_expands_independently() {
        let expansion = run("<main> : <d> <d> ; <d> : a | b ;", "<main>", &ExpansionConfig::default());
        assert_eq!(sentences(&expansion), vec!["a a", "a b", "b a", "b b"]);
        assert_eq!(expansion.rounds, 2);
    }

    #[test]
    fn test_no_duplicates_across_derivation_paths() {
        // "x y" is reached both through "x <b>" and "<a> y".
        let expansion = run(
            "<main> : <a> <b> | x y ; <a> : x ; <b> : y ;",
            "<main>",
            &ExpansionConfig::default(),
        );
        assert_eq!(sentences(&expansion), vec!["x y"]);
    }

    #[test]
    fn test_rounds_follow_nesting_depth() {
        let expansion = run(
            "<a> : <b> ; <b> : <c> ; <c> : z ;",
            "<a>",
            &ExpansionConfig::default(),
        );
        assert_eq!(sentences(&expansion), vec!["z"]);
        // The root's own alternatives seed the frontier, so <b> and <c> take a round each.
        assert_eq!(expansion.rounds, 2);
    }

    #[test]
    fn test_dead_branch_is_silent() {
        let expansion = run(
            "<main> : good <x> | bad <missing> ; <x> : one | two ;",
            "<main>",
            &ExpansionConfig::default(),
        );
        assert_eq!(sentences(&expansion), vec!["good one", "good two"]);
        assert!(expansion.outcome.is_exhausted());
        assert_eq!(
            expansion.unresolved.iter().collect::<Vec<_>>(),
            vec!["<missing>"]
        );
    }

    #[test]
    fn test_sentence_cutoff() {
        let config = ExpansionConfig::default().with_cutoff(100);
        let expansion = run(
            "<main> : <d> <d> <d> ; <d> : 0 | 1 | 2 | 3 | 4 | 5 | 6 | 7 | 8 | 9 ;",
            "<main>",
            &config,
        );
        assert_eq!(expansion.outcome, Outcome::Cutoff(CutoffReason::SentenceLimit));
        assert_eq!(expansion.len(), 101);
    }

    #[test]
    fn test_exact_count_at_cutoff_is_exhausted() {
        let config = ExpansionConfig::default().with_cutoff(4);
        let expansion = run("<main> : <d> <d> ; <d> : a | b ;", "<main>", &config);
        assert_eq!(expansion.outcome, Outcome::Exhausted);
        assert_eq!(expansion.len(), 4);
    }

    #[test]
    fn test_cyclic_grammar_hits_cutoff() {
        let config = ExpansionConfig::default().with_cutoff(50);
        let expansion = run("<a> : y | <a> x ;", "<a>", &config);
        assert_eq!(expansion.outcome, Outcome::Cutoff(CutoffReason::SentenceLimit));
        assert!(expansion.contains("y x x"));
    }

    #[test]
    fn test_unproductive_cycle_hits_round_limit() {
        let config = ExpansionConfig::default().with_max_rounds(25);
        let expansion = run("<a> : <a> x ;", "<a>", &config);
        assert_eq!(expansion.outcome, Outcome::Cutoff(CutoffReason::RoundLimit));
        assert_eq!(expansion.rounds, 25);
        assert!(expansion.is_empty());
    }

    #[test]
    fn test_memory_limit() {
        let config = ExpansionConfig::default().with_max_bytes(4096);
        let expansion = run("<a> : <a> x ;", "<a>", &config);
        assert_eq!(expansion.outcome, Outcome::Cutoff(CutoffReason::MemoryLimit));
    }

    #[test]
    fn test_timeout() {
        let config = ExpansionConfig::default().with_timeout(Duration::ZERO);
        let expansion = run("<a> : <a> x ;", "<a>", &config);
        assert_eq!(expansion.outcome, Outcome::Cutoff(CutoffReason::Timeout));
    }

    #[test]
    fn test_limits_bound_wide_optional_alternative() {
        // 2^20 subsets; the limits must fire long before they are all built.
        let wide = (0..20).map(|i| format!("[w{}]", i)).collect::<Vec<_>>().join(" ");
        let grammar = format!("<main> : {} end ;", wide);

        let config = ExpansionConfig::default().with_cutoff(10);
        let expansion = run(&grammar, "<main>", &config);
        assert_eq!(expansion.outcome, Outcome::Cutoff(CutoffReason::SentenceLimit));
        assert_eq!(expansion.len(), 11);

        let config = ExpansionConfig::default().with_max_bytes(2048);
        let expansion = run(&grammar, "<main>", &config);
        assert_eq!(expansion.outcome, Outcome::Cutoff(CutoffReason::MemoryLimit));
        assert!(expansion.len() < 64);
    }

    #[test]
    fn test_root_not_found() {
        let table = ProductionTable::parse("<a> : x ;").unwrap();
        let err = expand(&table, "<b>", &ExpansionConfig::default()).unwrap_err();
        assert!(matches!(err, GrammarError::RootNotFound(_)));
    }

    #[test]
    fn test_malformed_fragment_from_built_table() {
        // Tables assembled through serde bypass add_production validation.
        let table: ProductionTable =
            serde_json::from_str(r#"{"<main>": ["a [b [c] d]"]}"#).unwrap();
        let err = expand(&table, "<main>", &ExpansionConfig::default()).unwrap_err();
        assert!(matches!(err, GrammarError::MalformedGrammar(_)));
    }

    #[test]
    fn test_config_from_json() {
        let config = ExpansionConfig::from_json(r#"{"cutoff": 10, "max_rounds": 3}"#).unwrap();
        assert_eq!(config.cutoff, 10);
        assert_eq!(config.max_rounds, Some(3));
        assert_eq!(config.max_bytes, None);
        assert_eq!(ExpansionConfig::from_json("{}").unwrap(), ExpansionConfig::default());
    }

    #[test]
    fn test_report_serialization() {
        let expansion = run("<main> : a <x> ; ", "<main>", &ExpansionConfig::default());
        let json = serde_json::to_string(&expansion.report()).unwrap();
        assert_eq!(
            json,
            r#"{"outcome":{"state":"exhausted"},"sentences":0,"rounds":1,"unresolved":["<x>"]}"#
        );

        let report = ExpansionReport {
            outcome: Outcome::Cutoff(CutoffReason::RoundLimit),
            sentences: 3,
            rounds: 7,
            unresolved: vec![],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains(r#""outcome":{"state":"cutoff","reason":"round_limit"}"#));
    }

    #[test]
    fn test_replace_first() {
        assert_eq!(replace_first("<a> x <a>", "<a>", "b c"), "b c x <a>");
        assert_eq!(replace_first("x y", "<a>", "b"), "x y");
    }
}
