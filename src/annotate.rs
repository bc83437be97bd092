//! Linguistic annotation port.
//!
//! Matching and replacement only need tokens carrying an orthographic form, a
//! lemma, trailing whitespace and a byte span, grouped into sentences. Any
//! tokenizer/lemmatizer that fills in [`Document`] can be plugged in through
//! the [`Annotator`] trait; [`RuleAnnotator`] is the built-in one.

use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::{Result, TermError};

/// Default capacity in bytes, matching common NLP pipeline limits.
pub const DEFAULT_CAPACITY: usize = 1_000_000;

lazy_static! {
    // Word runs (with inner hyphen, apostrophe, gender star/colon/slash joints)
    // or any other single non-space character.
    static ref TOKEN_PATTERN: Regex = Regex::new(r"\w+(?:[-'’*:/]\w+)*|[^\w\s]").unwrap();
}

const SENTENCE_FINAL: [&str; 4] = [".", "!", "?", "…"];

/// Token attribute a matcher compares on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchAttribute {
    Lemma,
    Orth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub orth: String,
    pub lemma: String,
    /// Whitespace between this token and the next one (or the end of text).
    pub whitespace: String,
    /// Byte range of `orth` in the document text.
    pub span: Range<usize>,
}

impl Token {
    pub fn attr(&self, attr: MatchAttribute) -> &str {
        match attr {
            MatchAttribute::Lemma => &self.lemma,
            MatchAttribute::Orth => &self.orth,
        }
    }
}

/// Token index range of one sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    pub tokens: Range<usize>,
}

/// Annotated text.
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    pub tokens: Vec<Token>,
    pub sentences: Vec<Sentence>,
}

impl Document {
    pub fn sentence_tokens(&self, sentence: &Sentence) -> &[Token] {
        &self.tokens[sentence.tokens.clone()]
    }

    /// Sentence text without trailing whitespace.
    pub fn sentence_text(&self, sentence: &Sentence) -> &str {
        let tokens = self.sentence_tokens(sentence);
        match (tokens.first(), tokens.last()) {
            (Some(first), Some(last)) => &self.text[first.span.start..last.span.end],
            _ => "",
        }
    }

    /// Whitespace before the first token.
    pub fn leading_whitespace(&self) -> &str {
        match self.tokens.first() {
            Some(first) => &self.text[..first.span.start],
            None => &self.text,
        }
    }
}

/// Black-box tokenizer, lemmatizer and sentence splitter.
pub trait Annotator: Send + Sync {
    /// Annotate `text`. Fails with `AnnotationOverflow` when `text` exceeds [`Annotator::capacity`].
    fn annotate(&self, text: &str) -> Result<Document>;

    /// Maximum text length in bytes currently admitted.
    fn capacity(&self) -> usize;

    /// Raise the capacity to at least `min` bytes.
    fn raise_capacity(&self, min: usize);

    /// Make sure a text of `len` bytes is admitted.
    fn ensure_capacity(&self, len: usize, headroom: usize) {
        if len > self.capacity() {
            let raised = len + headroom;
            tracing::debug!(len, raised, "raising annotator capacity");
            self.raise_capacity(raised);
        }
    }
}

/// `form<TAB>lemma` lookup applied after lowercasing.
#[derive(Debug, Clone, Default)]
pub struct LemmaTable {
    entries: HashMap<String, String>,
}

impl LemmaTable {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut entries = HashMap::new();
        for (i, line) in content.lines().enumerate() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((form, lemma)) = line.split_once('\t') else {
                return Err(TermError::Config(format!(
                    "{}:{}: expected `form<TAB>lemma`",
                    path.display(),
                    i + 1
                )));
            };
            entries.insert(normalize(form), normalize(lemma));
        }
        tracing::info!(path = %path.display(), entries = entries.len(), "loaded lemma table");
        Ok(Self { entries })
    }

    pub fn insert(&mut self, form: &str, lemma: &str) {
        self.entries.insert(normalize(form), normalize(lemma));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize(word: &str) -> String {
    word.nfc().collect::<String>().to_lowercase()
}

/// Regex tokenizer with lowercase lemmas and punctuation-based sentence splits.
#[derive(Debug)]
pub struct RuleAnnotator {
    capacity: AtomicUsize,
    lemmas: LemmaTable,
}

impl Default for RuleAnnotator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RuleAnnotator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: AtomicUsize::new(capacity),
            lemmas: LemmaTable::default(),
        }
    }

    pub fn with_lemmas(mut self, lemmas: LemmaTable) -> Self {
        self.lemmas = lemmas;
        self
    }

    fn lemmatize(&self, orth: &str) -> String {
        let lower = normalize(orth);
        match self.lemmas.entries.get(&lower) {
            Some(lemma) => lemma.clone(),
            None => lower,
        }
    }
}

impl Annotator for RuleAnnotator {
    fn annotate(&self, text: &str) -> Result<Document> {
        let capacity = self.capacity();
        if text.len() > capacity {
            return Err(TermError::AnnotationOverflow {
                len: text.len(),
                capacity,
            });
        }

        let spans: Vec<Range<usize>> = TOKEN_PATTERN.find_iter(text).map(|m| m.range()).collect();
        let mut tokens = Vec::with_capacity(spans.len());
        for (i, span) in spans.iter().enumerate() {
            let ws_end = spans.get(i + 1).map(|next| next.start).unwrap_or(text.len());
            let orth = &text[span.clone()];
            tokens.push(Token {
                orth: orth.to_string(),
                lemma: self.lemmatize(orth),
                whitespace: text[span.end..ws_end].to_string(),
                span: span.clone(),
            });
        }

        let mut sentences = Vec::new();
        let mut start = 0;
        for (i, token) in tokens.iter().enumerate() {
            let is_last = i + 1 == tokens.len();
            let line_break = token.whitespace.contains('\n');
            let final_punct = SENTENCE_FINAL.contains(&token.orth.as_str())
                && (!token.whitespace.is_empty() || is_last);
            if is_last || line_break || final_punct {
                sentences.push(Sentence { tokens: start..i + 1 });
                start = i + 1;
            }
        }

        Ok(Document {
            text: text.to_string(),
            tokens,
            sentences,
        })
    }

    fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    fn raise_capacity(&self, min: usize) {
        self.capacity.fetch_max(min, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orths(doc: &Document) -> Vec<&str> {
        doc.tokens.iter().map(|t| t.orth.as_str()).collect()
    }

    #[test]
    fn test_tokens_and_whitespace() {
        let doc = RuleAnnotator::default().annotate("Der Lehrer kam.").unwrap();
        assert_eq!(orths(&doc), vec!["Der", "Lehrer", "kam", "."]);
        let ws: Vec<&str> = doc.tokens.iter().map(|t| t.whitespace.as_str()).collect();
        assert_eq!(ws, vec![" ", " ", "", ""]);
        assert_eq!(doc.tokens[1].lemma, "lehrer");
        assert_eq!(doc.tokens[1].span, 4..10);
        assert_eq!(doc.sentences.len(), 1);
    }

    #[test]
    fn test_reconstruction_is_exact() {
        let text = "  Die Lehrer*innen,  sagte sie:\t„Gut!“ \n";
        let doc = RuleAnnotator::default().annotate(text).unwrap();
        let mut rebuilt = doc.leading_whitespace().to_string();
        for token in &doc.tokens {
            rebuilt.push_str(&token.orth);
            rebuilt.push_str(&token.whitespace);
        }
        assert_eq!(rebuilt, text);
        assert!(orths(&doc).contains(&"Lehrer*innen"));
    }

    #[test]
    fn test_sentence_boundaries() {
        let doc = RuleAnnotator::default()
            .annotate("Er kam spät. Sie ging!\nDann Ruhe")
            .unwrap();
        let sentences: Vec<&str> = doc.sentences.iter().map(|s| doc.sentence_text(s)).collect();
        assert_eq!(sentences, vec!["Er kam spät.", "Sie ging!", "Dann Ruhe"]);
    }

    #[test]
    fn test_empty_text() {
        let doc = RuleAnnotator::default().annotate("   ").unwrap();
        assert!(doc.tokens.is_empty());
        assert!(doc.sentences.is_empty());
        assert_eq!(doc.leading_whitespace(), "   ");
    }

    #[test]
    fn test_capacity_overflow_and_raise() {
        let annotator = RuleAnnotator::new(5);
        let err = annotator.annotate("Lehrerin").unwrap_err();
        assert!(matches!(err, TermError::AnnotationOverflow { len: 8, capacity: 5 }));

        annotator.ensure_capacity(8, 100);
        assert_eq!(annotator.capacity(), 108);
        assert!(annotator.annotate("Lehrerin").is_ok());

        // never lowered
        annotator.raise_capacity(10);
        assert_eq!(annotator.capacity(), 108);
    }

    #[test]
    fn test_lemma_table() {
        let mut lemmas = LemmaTable::default();
        lemmas.insert("Lehrerinnen", "Lehrerin");
        let annotator = RuleAnnotator::default().with_lemmas(lemmas);
        let doc = annotator.annotate("Die Lehrerinnen").unwrap();
        assert_eq!(doc.tokens[1].lemma, "lehrerin");
        assert_eq!(doc.tokens[0].lemma, "die");
    }
}
