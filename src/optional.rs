//! Optional fragment expansion.
//!
//! An alternative such as `hello [dear old] <name>` carries optional
//! fragments: bracketed runs of tokens that may be kept or dropped
//! independently. Fragment markers are attached to the first and last token
//! of the run (`[there]` is a single-token fragment).

use std::ops::Range;

use indexmap::IndexSet;

use crate::utils::{GrammarError, Result};

/// Marker opening an optional fragment
pub const OPTIONAL_START: char = '[';
/// Marker closing an optional fragment
pub const OPTIONAL_STOP: char = ']';

/// Upper bound on fragments in one alternative; `2^k` strings are produced.
pub const MAX_FRAGMENTS: usize = 24;

/// Returns true if the text carries any optional fragment markers
pub fn has_optional(text: &str) -> bool {
    text.contains(OPTIONAL_START) || text.contains(OPTIONAL_STOP)
}

/// Count the optional fragments of an alternative, validating its markers
pub fn fragment_count(alternative: &str) -> Result<usize> {
    Ok(split_fragments(alternative)?.1.len())
}

/// Expand every combination of kept and dropped optional fragments.
///
/// Subsets are enumerated from "all fragments kept" down to "none kept".
/// Texts produced by two different subsets collapse into one entry.
pub fn expand_optional(alternative: &str) -> Result<Vec<String>> {
    let out = subsets(alternative)?.collect::<IndexSet<_>>();
    Ok(out.into_iter().collect())
}

/// Lazily enumerate the fragment subsets of an alternative.
///
/// Yields one string per subset in the same order as [`expand_optional`],
/// without collapsing duplicates, so callers can stop after any item.
pub fn subsets(alternative: &str) -> Result<Subsets<'_>> {
    let (tokens, fragments) = split_fragments(alternative)?;
    if fragments.len() > MAX_FRAGMENTS {
        return Err(GrammarError::MalformedGrammar(format!(
            "{} optional fragments in `{}` (at most {} supported)",
            fragments.len(),
            alternative,
            MAX_FRAGMENTS
        )));
    }

    let all_kept = (1u32 << fragments.len()) - 1;
    Ok(Subsets {
        tokens,
        fragments,
        next_mask: Some(all_kept),
    })
}

/// Iterator over the fragment subsets of one alternative
#[derive(Debug, Clone)]
pub struct Subsets<'a> {
    tokens: Vec<&'a str>,
    fragments: Vec<Range<usize>>,
    next_mask: Option<u32>,
}

impl Iterator for Subsets<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let mask = self.next_mask?;
        self.next_mask = mask.checked_sub(1);

        let kept = self
            .tokens
            .iter()
            .enumerate()
            .filter(|(idx, _)| {
                self.fragments
                    .iter()
                    .enumerate()
                    .all(|(bit, range)| mask & (1 << bit) != 0 || !range.contains(idx))
            })
            .map(|(_, token)| *token)
            .collect::<Vec<_>>();
        Some(kept.join(" "))
    }
}

/// Strip the markers off an alternative's tokens and record the token range
/// covered by each fragment.
fn split_fragments(alternative: &str) -> Result<(Vec<&str>, Vec<Range<usize>>)> {
    let malformed = |what: &str| {
        GrammarError::MalformedGrammar(format!("{} in `{}`", what, alternative.trim()))
    };

    let mut tokens = Vec::new();
    let mut fragments = Vec::new();
    let mut open: Option<usize> = None;

    for token in alternative.split_whitespace() {
        let opens = token.starts_with(OPTIONAL_START);
        let closes = token.ends_with(OPTIONAL_STOP);

        let mut inner = token;
        if opens {
            inner = &inner[OPTIONAL_START.len_utf8()..];
        }
        if closes && !inner.is_empty() {
            inner = &inner[..inner.len() - OPTIONAL_STOP.len_utf8()];
        }
        if inner.contains(OPTIONAL_START) || inner.contains(OPTIONAL_STOP) {
            return Err(malformed("nested or misplaced optional marker"));
        }

        if opens {
            if open.is_some() {
                return Err(malformed("nested optional fragment"));
            }
            open = Some(tokens.len());
        }
        if !inner.is_empty() {
            tokens.push(inner);
        }
        if closes {
            let start = open
                .take()
                .ok_or_else(|| malformed("unmatched closing bracket"))?;
            if start == tokens.len() {
                return Err(malformed("empty optional fragment"));
            }
            fragments.push(start..tokens.len());
        }
    }

    if open.is_some() {
        return Err(malformed("unterminated optional fragment"));
    }

    Ok((tokens, fragments))
}
