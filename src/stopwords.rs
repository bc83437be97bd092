//! Stop words excluded from matcher indexes.
//!
//! High-frequency function words such as "man" or "jemand" appear in the
//! terminology as neutral forms but would flood every bucket with false
//! positives, so terms spelled like a stop word are never indexed.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use lazy_static::lazy_static;

use crate::error::Result;

lazy_static! {
    // German stop-word list (NLTK "german")
    static ref GERMAN_STOPWORDS: HashSet<&'static str> = {
        let words = [
            "aber", "alle", "allem", "allen", "aller", "alles", "als", "also", "am", "an",
            "ander", "andere", "anderem", "anderen", "anderer", "anderes", "anderm", "andern",
            "anderr", "anders", "auch", "auf", "aus", "bei", "bin", "bis", "bist", "da",
            "damit", "dann", "der", "den", "des", "dem", "die", "das", "dass", "daß",
            "derselbe", "derselben", "denselben", "desselben", "demselben", "dieselbe",
            "dieselben", "dasselbe", "dazu", "dein", "deine", "deinem", "deinen", "deiner",
            "deines", "denn", "derer", "dessen", "dich", "dir", "du", "dies", "diese",
            "diesem", "diesen", "dieser", "dieses", "doch", "dort", "durch", "ein", "eine",
            "einem", "einen", "einer", "eines", "einig", "einige", "einigem", "einigen",
            "einiger", "einiges", "einmal", "er", "ihn", "ihm", "es", "etwas", "euer", "eure",
            "eurem", "euren", "eurer", "eures", "für", "gegen", "gewesen", "hab", "habe",
            "haben", "hat", "hatte", "hatten", "hier", "hin", "hinter", "ich", "mich", "mir",
            "ihr", "ihre", "ihrem", "ihren", "ihrer", "ihres", "euch", "im", "in", "indem",
            "ins", "ist", "jede", "jedem", "jeden", "jeder", "jedes", "jene", "jenem", "jenen",
            "jener", "jenes", "jetzt", "kann", "kein", "keine", "keinem", "keinen", "keiner",
            "keines", "können", "könnte", "machen", "man", "manche", "manchem", "manchen",
            "mancher", "manches", "mein", "meine", "meinem", "meinen", "meiner", "meines",
            "mit", "muss", "musste", "nach", "nicht", "nichts", "noch", "nun", "nur", "ob",
            "oder", "ohne", "sehr", "sein", "seine", "seinem", "seinen", "seiner", "seines",
            "selbst", "sich", "sie", "ihnen", "sind", "so", "solche", "solchem", "solchen",
            "solcher", "solches", "soll", "sollte", "sondern", "sonst", "über", "um", "und",
            "uns", "unsere", "unserem", "unseren", "unser", "unseres", "unter", "viel", "vom",
            "von", "vor", "während", "war", "waren", "warst", "was", "weg", "weil", "weiter",
            "welche", "welchem", "welchen", "welcher", "welches", "wenn", "werde", "werden",
            "wie", "wieder", "will", "wir", "wird", "wirst", "wo", "wollen", "wollte", "würde",
            "würden", "zu", "zum", "zur", "zwar", "zwischen",
        ];
        words.iter().cloned().collect()
    };
}

/// Read-only stop-word set shared by every matcher of a run.
#[derive(Debug, Clone, Default)]
pub struct StopWords {
    words: HashSet<String>,
}

impl StopWords {
    /// The built-in German list.
    pub fn german() -> Self {
        Self {
            words: GERMAN_STOPWORDS.iter().map(|w| w.to_string()).collect(),
        }
    }

    /// No stop words at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// One word per line; blank lines and `#` comments are ignored.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let words: HashSet<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| line.to_string())
            .collect();
        tracing::info!(path = %path.display(), words = words.len(), "loaded stop words");
        Ok(Self { words })
    }

    /// Exact, case-sensitive membership.
    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
