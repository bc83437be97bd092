//! Term replacement.
//!
//! Each match puts a correspondence picked from the term graph in place of its
//! start token. Everything else, including the remaining tokens of a
//! multi-token match, is copied byte-for-byte from the input.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::annotate::{Annotator, Document, MatchAttribute};
use crate::error::Result;
use crate::matcher::{Match, PhraseMatcher};
use crate::stopwords::StopWords;
use crate::terminology::{Term, TermId, Terminology};

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 1234;

/// Direction of a replacement run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementTarget {
    /// Neutral terms become feminine forms.
    Feminine,
    /// Neutral terms become masculine forms.
    Masculine,
    /// Gendered terms become neutral forms.
    Neutral,
    /// Neutral terms become any gendered form.
    Gendered,
}

impl ReplacementTarget {
    /// Terms whose occurrences are replaced.
    pub fn source_terms<'a>(&self, terminology: &'a Terminology) -> Vec<&'a Term> {
        match self {
            ReplacementTarget::Neutral => terminology.gendered_terms().collect(),
            _ => terminology.neutral_terms().collect(),
        }
    }

    /// Edge set of `term` to draw replacements from.
    pub fn edges<'a>(&self, term: &'a Term) -> &'a [TermId] {
        match self {
            ReplacementTarget::Feminine => &term.feminine_correspondences,
            ReplacementTarget::Masculine => &term.masculine_correspondences,
            ReplacementTarget::Neutral | ReplacementTarget::Gendered => &term.correspondences,
        }
    }
}

/// When the random stream is reset to the seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReseedPolicy {
    /// Before every segment: a segment's choices depend only on its own matches.
    #[default]
    PerSegment,
    /// Once per input shard.
    PerShard,
}

/// A rewritten segment and the (matched, replacement) surfaces applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub text: String,
    pub pairs: Vec<(String, String)>,
}

/// Keep one match per start token; ties are broken uniformly at random.
/// `matches` must be sorted by start.
pub fn single_out_matches<R: Rng + ?Sized>(matches: &[Match], rng: &mut R) -> Vec<Match> {
    let mut singled = Vec::new();
    for group in matches.chunk_by(|a, b| a.start == b.start) {
        if let Some(choice) = group.choose(rng) {
            singled.push(*choice);
        }
    }
    singled
}

/// Surface to put in place of `term`. Falls back to the term itself when the
/// selected edge set is empty.
pub fn resolve_replacement<R: Rng + ?Sized>(
    term: &Term,
    target: ReplacementTarget,
    terminology: &Terminology,
    rng: &mut R,
) -> Result<String> {
    match target.edges(term).choose(rng) {
        Some(&id) => Ok(terminology.term(id)?.surface.clone()),
        None => Ok(term.surface.clone()),
    }
}

/// Put a replacement in place of the start token of every match in `doc`.
pub fn replace_document<R: Rng + ?Sized>(
    doc: &Document,
    matcher: &PhraseMatcher,
    terminology: &Terminology,
    target: ReplacementTarget,
    rng: &mut R,
) -> Result<Replacement> {
    let matches = matcher.find_matches(&doc.tokens);
    let singled = single_out_matches(&matches, rng);

    let mut pairs = Vec::with_capacity(singled.len());
    for m in &singled {
        let term = terminology.term(m.term_id)?;
        let replacement = resolve_replacement(term, target, terminology, rng)?;
        pairs.push((term.surface.clone(), replacement));
    }

    // only the start token is substituted; starts are strictly increasing
    let text = &doc.text;
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (m, (_, replacement)) in singled.iter().zip(&pairs) {
        let first = &doc.tokens[m.start];
        out.push_str(&text[cursor..first.span.start]);
        out.push_str(replacement);
        out.push_str(&first.whitespace);
        cursor = first.span.end + first.whitespace.len();
    }
    out.push_str(&text[cursor..]);

    Ok(Replacement { text: out, pairs })
}

/// Matcher over the source terms of one target direction plus its random policy.
#[derive(Debug, Clone)]
pub struct Replacer {
    matcher: PhraseMatcher,
    target: ReplacementTarget,
    seed: u64,
    policy: ReseedPolicy,
}

impl Replacer {
    pub fn new(
        terminology: &Terminology,
        annotator: &dyn Annotator,
        stopwords: &StopWords,
        attr: MatchAttribute,
        target: ReplacementTarget,
    ) -> Result<Self> {
        let matcher = PhraseMatcher::build(
            target.source_terms(terminology),
            attr,
            annotator,
            stopwords,
            "replacement",
        )?;
        Ok(Self {
            matcher,
            target,
            seed: DEFAULT_SEED,
            policy: ReseedPolicy::default(),
        })
    }

    pub fn with_seed(mut self, seed: u64, policy: ReseedPolicy) -> Self {
        self.seed = seed;
        self.policy = policy;
        self
    }

    pub fn target(&self) -> ReplacementTarget {
        self.target
    }

    pub fn matcher(&self) -> &PhraseMatcher {
        &self.matcher
    }

    /// Fresh random stream for one shard.
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }

    pub fn replace_document(
        &self,
        doc: &Document,
        terminology: &Terminology,
        rng: &mut StdRng,
    ) -> Result<Replacement> {
        if self.policy == ReseedPolicy::PerSegment {
            *rng = self.rng();
        }
        replace_document(doc, &self.matcher, terminology, self.target, rng)
    }

    /// Annotate `text` and rewrite it.
    pub fn replace_text(
        &self,
        text: &str,
        annotator: &dyn Annotator,
        terminology: &Terminology,
        rng: &mut StdRng,
    ) -> Result<Replacement> {
        annotator.ensure_capacity(text.len(), 100);
        let doc = annotator.annotate(text)?;
        self.replace_document(&doc, terminology, rng)
    }
}
