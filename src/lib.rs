//! Gender-terminology matching and replacement for German text corpora.
//!
//! A terminology table of masculine, feminine and gender-neutral person nouns
//! is turned into a correspondence graph ([`Terminology`]). Terms are located
//! in annotated text by a token-level [`PhraseMatcher`], counted and
//! classified over large sharded corpora by [`CorpusPipeline`], and rewritten
//! towards a target gender by [`Replacer`].

pub mod annotate;
pub mod config;
pub mod corpus;
pub mod error;
pub mod matcher;
pub mod output;
pub mod pipeline;
pub mod replace;
pub mod stopwords;
pub mod terminology;

#[cfg(feature = "python")]
mod python;

pub use annotate::{Annotator, Document, MatchAttribute, RuleAnnotator};
pub use config::EngineConfig;
pub use error::{Result, TermError};
pub use matcher::{Match, PhraseMatcher};
pub use pipeline::{CorpusPipeline, ExtractOptions, FilterTarget, RunSummary};
pub use replace::{ReplacementTarget, Replacer, ReseedPolicy};
pub use stopwords::StopWords;
pub use terminology::{Gender, Number, Term, TermId, Terminology};
