//! Phrase matcher over annotated tokens.

use std::collections::HashMap;

use crate::annotate::{Annotator, MatchAttribute, Token};
use crate::error::{Result, TermError};
use crate::stopwords::StopWords;
use crate::terminology::{Term, TermId};

/// One match: `tokens[start..end]` equals the pattern of `term_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Match {
    pub start: usize,
    pub end: usize,
    pub term_id: TermId,
}

#[derive(Debug, Clone)]
struct Pattern {
    tokens: Vec<String>,
    term_ids: Vec<TermId>,
}

/// Immutable index of term token sequences keyed by one token attribute.
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    attr: MatchAttribute,
    patterns: Vec<Pattern>,
    by_first: HashMap<String, Vec<usize>>,
}

impl PhraseMatcher {
    /// Index `terms` by `attr`. Terms spelled like a stop word are left out;
    /// an index that ends up empty is an error.
    pub fn build<'a>(
        terms: impl IntoIterator<Item = &'a Term>,
        attr: MatchAttribute,
        annotator: &dyn Annotator,
        stopwords: &StopWords,
        label: &str,
    ) -> Result<Self> {
        let mut patterns: Vec<Pattern> = Vec::new();
        let mut seen: HashMap<Vec<String>, usize> = HashMap::new();
        let mut skipped = 0usize;

        for term in terms {
            if stopwords.contains(&term.surface) {
                skipped += 1;
                continue;
            }
            annotator.ensure_capacity(term.surface.len(), 0);
            let doc = annotator.annotate(&term.surface)?;
            let key: Vec<String> = doc.tokens.iter().map(|t| t.attr(attr).to_string()).collect();
            if key.is_empty() {
                skipped += 1;
                continue;
            }
            match seen.get(&key) {
                Some(&idx) => patterns[idx].term_ids.push(term.id),
                None => {
                    seen.insert(key.clone(), patterns.len());
                    patterns.push(Pattern {
                        tokens: key,
                        term_ids: vec![term.id],
                    });
                }
            }
        }

        if patterns.is_empty() {
            return Err(TermError::EmptyIndex(label.to_string()));
        }

        let mut by_first: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, pattern) in patterns.iter().enumerate() {
            by_first.entry(pattern.tokens[0].clone()).or_default().push(idx);
        }

        tracing::debug!(
            matcher = label,
            patterns = patterns.len(),
            skipped,
            "built phrase matcher"
        );

        Ok(Self {
            attr,
            patterns,
            by_first,
        })
    }

    pub fn attribute(&self) -> MatchAttribute {
        self.attr
    }

    /// Number of distinct token sequences indexed.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// All matches in `tokens`, ordered by start, end, term id. Matches that
    /// overlap or share a start are all reported.
    pub fn find_matches(&self, tokens: &[Token]) -> Vec<Match> {
        let mut matches = Vec::new();
        for start in 0..tokens.len() {
            let Some(candidates) = self.by_first.get(tokens[start].attr(self.attr)) else {
                continue;
            };
            for &idx in candidates {
                let pattern = &self.patterns[idx];
                let end = start + pattern.tokens.len();
                if end > tokens.len() {
                    continue;
                }
                let equal = tokens[start..end]
                    .iter()
                    .zip(&pattern.tokens)
                    .all(|(token, expected)| token.attr(self.attr) == expected);
                if equal {
                    matches.extend(pattern.term_ids.iter().map(|&term_id| Match {
                        start,
                        end,
                        term_id,
                    }));
                }
            }
        }
        matches.sort_unstable();
        matches
    }

    pub fn is_match(&self, tokens: &[Token]) -> bool {
        !self.find_matches(tokens).is_empty()
    }
}
