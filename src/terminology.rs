//! Term correspondence graph.
//!
//! Loads term groups from the `;`-delimited terminology table. Each group row
//! holds up to six slots (singular/plural x masculine/feminine/neutral); every
//! gendered slot points to the neutral slot of the same number and the neutral
//! slot points back to each gendered slot.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TermError};

/// Dense id, assigned in order of first appearance.
pub type TermId = usize;

/// Partial occurrence counts produced by one unit of work.
pub type TermCounts = HashMap<TermId, u64>;

/// Only rows of this type are loaded (pair and star forms are skipped).
pub const NEUTRAL_KIND: &str = "neut";

/// Column layout of the terminology table.
pub const FIELDNAMES: [&str; 9] = [
    "type",
    "term",
    "alternative",
    "singular_masculine",
    "singular_feminine",
    "plural_masculine",
    "plural_feminine",
    "singular_gender_neutral",
    "plural_gender_neutral",
];

const SLOT_OFFSET: usize = 3;

const SG_MASCULINE: usize = 0;
const SG_FEMININE: usize = 1;
const PL_MASCULINE: usize = 2;
const PL_FEMININE: usize = 3;
const SG_NEUTRAL: usize = 4;
const PL_NEUTRAL: usize = 5;

const SLOTS: [(Gender, Number); 6] = [
    (Gender::Masculine, Number::Singular),
    (Gender::Feminine, Number::Singular),
    (Gender::Masculine, Number::Plural),
    (Gender::Feminine, Number::Plural),
    (Gender::Neutral, Number::Singular),
    (Gender::Neutral, Number::Plural),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "m")]
    Masculine,
    #[serde(rename = "f")]
    Feminine,
    #[serde(rename = "neut")]
    Neutral,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Masculine => "m",
            Gender::Feminine => "f",
            Gender::Neutral => "neut",
        }
    }

    pub fn is_gendered(&self) -> bool {
        !matches!(self, Gender::Neutral)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Number {
    #[serde(rename = "SG")]
    Singular,
    #[serde(rename = "PL")]
    Plural,
}

impl Number {
    pub fn as_str(&self) -> &'static str {
        match self {
            Number::Singular => "SG",
            Number::Plural => "PL",
        }
    }
}

/// One lexical entry of the terminology.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub id: TermId,
    pub surface: String,
    pub gender: Gender,
    pub number: Number,
    /// Row type the term was loaded from.
    pub kind: String,
    /// Occurrences accumulated over processing runs.
    pub count: u64,
    pub correspondences: Vec<TermId>,
    pub feminine_correspondences: Vec<TermId>,
    pub masculine_correspondences: Vec<TermId>,
}

impl Term {
    fn new(id: TermId, surface: &str, gender: Gender, number: Number, kind: &str) -> Self {
        Self {
            id,
            surface: surface.to_string(),
            gender,
            number,
            kind: kind.to_string(),
            count: 0,
            correspondences: Vec::new(),
            feminine_correspondences: Vec::new(),
            masculine_correspondences: Vec::new(),
        }
    }

    /// Add an edge to `target`. A gender tag also files it in that gender's edge set.
    fn add_correspondence(&mut self, target: TermId, tag: Gender) {
        push_unique(&mut self.correspondences, target);
        match tag {
            Gender::Feminine => push_unique(&mut self.feminine_correspondences, target),
            Gender::Masculine => push_unique(&mut self.masculine_correspondences, target),
            Gender::Neutral => {}
        }
    }
}

fn push_unique(edges: &mut Vec<TermId>, target: TermId) {
    if !edges.contains(&target) {
        edges.push(target);
    }
}

/// The term graph. Ids index directly into `terms`.
#[derive(Debug, Clone, Default)]
pub struct Terminology {
    terms: Vec<Term>,
    by_surface: HashMap<String, Vec<TermId>>,
}

impl Terminology {
    /// Load the terminology table from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    /// Load the terminology table. The first row is a header and is skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut terminology = Terminology::default();

        for record in rdr.records() {
            let record = record.map_err(|e| {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                TermError::load(line, e.to_string())
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            if record.len() < FIELDNAMES.len() {
                return Err(TermError::load(
                    line,
                    format!(
                        "expected {} columns, found {}",
                        FIELDNAMES.len(),
                        record.len()
                    ),
                ));
            }

            let kind = &record[0];
            if kind != NEUTRAL_KIND {
                continue;
            }

            let mut group: [Option<TermId>; 6] = [None; 6];
            for (slot, &(gender, number)) in SLOTS.iter().enumerate() {
                let surface = &record[SLOT_OFFSET + slot];
                if surface.is_empty() {
                    continue;
                }
                group[slot] = Some(terminology.intern(surface, gender, number, kind));
            }
            terminology.link_group(&group);
        }

        Ok(terminology)
    }

    /// Reuse the term with this exact (surface, gender, number, kind) or create it.
    fn intern(&mut self, surface: &str, gender: Gender, number: Number, kind: &str) -> TermId {
        if let Some(term) = self.find(surface, gender, number, kind) {
            return term.id;
        }
        let id = self.terms.len();
        self.terms.push(Term::new(id, surface, gender, number, kind));
        self.by_surface
            .entry(surface.to_string())
            .or_default()
            .push(id);
        id
    }

    fn link_group(&mut self, group: &[Option<TermId>; 6]) {
        let pairs = [
            (SG_NEUTRAL, [SG_MASCULINE, SG_FEMININE]),
            (PL_NEUTRAL, [PL_MASCULINE, PL_FEMININE]),
        ];
        for (neutral_slot, gendered_slots) in pairs {
            let Some(neutral) = group[neutral_slot] else {
                continue;
            };
            for slot in gendered_slots {
                if let Some(gendered) = group[slot] {
                    let (gender, _) = SLOTS[slot];
                    self.terms[gendered].add_correspondence(neutral, Gender::Neutral);
                    self.terms[neutral].add_correspondence(gendered, gender);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// All terms in id order.
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn get(&self, id: TermId) -> Option<&Term> {
        self.terms.get(id)
    }

    /// Like [`Terminology::get`], but a missing id is an error.
    pub fn term(&self, id: TermId) -> Result<&Term> {
        self.terms.get(id).ok_or(TermError::UnknownTermId(id))
    }

    /// Every term spelled `surface`, regardless of gender/number/kind.
    pub fn lookup(&self, surface: &str) -> Vec<&Term> {
        self.by_surface
            .get(surface)
            .map(|ids| ids.iter().map(|&id| &self.terms[id]).collect())
            .unwrap_or_default()
    }

    pub fn find(&self, surface: &str, gender: Gender, number: Number, kind: &str) -> Option<&Term> {
        self.by_surface.get(surface)?.iter().map(|&id| &self.terms[id]).find(|t| {
            t.gender == gender && t.number == number && t.kind == kind
        })
    }

    pub fn gendered_terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.iter().filter(|t| t.gender.is_gendered())
    }

    pub fn masculine_terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.iter().filter(|t| t.gender == Gender::Masculine)
    }

    pub fn feminine_terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.iter().filter(|t| t.gender == Gender::Feminine)
    }

    pub fn neutral_terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.iter().filter(|t| t.gender == Gender::Neutral)
    }

    /// Current count of every term, indexed by id.
    pub fn counts(&self) -> Vec<u64> {
        self.terms.iter().map(|t| t.count).collect()
    }

    /// Add `n` occurrences to one term.
    pub fn update_count(&mut self, id: TermId, n: u64) -> Result<()> {
        let term = self.terms.get_mut(id).ok_or(TermError::UnknownTermId(id))?;
        term.count += n;
        Ok(())
    }

    /// Fold one worker's partial counts into the running totals.
    pub fn add_counts(&mut self, partial: &TermCounts) -> Result<()> {
        for (&id, &n) in partial {
            self.update_count(id, n)?;
        }
        Ok(())
    }

    /// Surfaces of the general correspondences of `term`, in insertion order.
    pub fn correspondence_surfaces(&self, term: &Term) -> Vec<&str> {
        term.correspondences
            .iter()
            .filter_map(|&id| self.terms.get(id))
            .map(|t| t.surface.as_str())
            .collect()
    }

    /// Write the counts table to a file.
    pub fn write_counts(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.write_counts_to(file)
    }

    /// Write one row per term: type, number, gender, term, count, correspondences.
    pub fn write_counts_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().delimiter(b',').from_writer(writer);
        for term in &self.terms {
            wtr.serialize(CountRecord {
                kind: term.kind.clone(),
                number: term.number,
                gender: term.gender,
                term: term.surface.clone(),
                count: term.count,
                correspondences: self.correspondence_surfaces(term).join(";"),
            })?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// One row of the counts table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub number: Number,
    pub gender: Gender,
    pub term: String,
    pub count: u64,
    pub correspondences: String,
}

impl CountRecord {
    pub fn correspondence_surfaces(&self) -> Vec<&str> {
        if self.correspondences.is_empty() {
            return Vec::new();
        }
        self.correspondences.split(';').collect()
    }
}

/// Parse a counts table written by [`Terminology::write_counts`].
pub fn read_counts(path: impl AsRef<Path>) -> Result<Vec<CountRecord>> {
    let file = File::open(path.as_ref())?;
    read_counts_from(file)
}

pub fn read_counts_from<R: Read>(reader: R) -> Result<Vec<CountRecord>> {
    let mut rdr = csv::ReaderBuilder::new().delimiter(b',').from_reader(reader);
    let mut rows = Vec::new();
    for row in rdr.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}
