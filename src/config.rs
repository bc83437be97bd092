//! Run configuration shared by all pipelines.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::annotate::{DEFAULT_CAPACITY, LemmaTable, MatchAttribute, RuleAnnotator};
use crate::error::{Result, TermError};
use crate::replace::{DEFAULT_SEED, ReseedPolicy};
use crate::stopwords::StopWords;

/// Configuration for annotation, matching and the worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Token attribute terms are matched on.
    pub match_attribute: MatchAttribute,
    /// Worker count; defaults to two thirds of the available cores.
    pub workers: Option<usize>,
    /// Initial annotator capacity in bytes.
    pub annotator_capacity: usize,
    /// Extra bytes added when the capacity is raised for an oversized text.
    pub capacity_headroom: usize,
    pub seed: u64,
    pub reseed: ReseedPolicy,
    /// Stop-word file replacing the built-in German list.
    pub stopwords: Option<PathBuf>,
    /// `form<TAB>lemma` table for the built-in annotator.
    pub lemmas: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            match_attribute: MatchAttribute::Lemma,
            workers: None,
            annotator_capacity: DEFAULT_CAPACITY,
            capacity_headroom: 100,
            seed: DEFAULT_SEED,
            reseed: ReseedPolicy::PerSegment,
            stopwords: None,
            lemmas: None,
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file. Missing keys take their defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(TermError::Config("workers must be at least 1".into()));
        }
        if self.annotator_capacity == 0 {
            return Err(TermError::Config("annotator_capacity must be positive".into()));
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(default_workers).max(1)
    }

    pub fn load_stopwords(&self) -> Result<StopWords> {
        match &self.stopwords {
            Some(path) => StopWords::from_path(path),
            None => Ok(StopWords::german()),
        }
    }

    pub fn build_annotator(&self) -> Result<RuleAnnotator> {
        let annotator = RuleAnnotator::new(self.annotator_capacity);
        match &self.lemmas {
            Some(path) => Ok(annotator.with_lemmas(LemmaTable::from_path(path)?)),
            None => Ok(annotator),
        }
    }
}

/// Two thirds of the available hardware parallelism, at least one.
pub fn default_workers() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores / 3 * 2).max(1)
}
