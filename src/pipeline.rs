//! Chunked parallel corpus processing.
//!
//! Every run owns one worker pool. A shard is read completely, split into as
//! many contiguous chunks as there are workers, and the chunks are mapped over
//! the pool. Workers only read the terminology and return partial results; the
//! coordinator folds partial counts into the terminology and writes the
//! shard's outputs before the next shard starts. Results are collected in
//! submission order, so outputs follow input order.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::annotate::{Annotator, Document};
use crate::config::EngineConfig;
use crate::corpus::{
    CorpusDocument, DOCUMENT_SUFFIXES, discover_shards, read_documents, read_segments, shard_stem,
};
use crate::error::{Result, TermError};
use crate::matcher::{Match, PhraseMatcher};
use crate::output::{DocumentSink, Segment, SegmentSink};
use crate::replace::{ReplacementTarget, Replacer};
use crate::stopwords::StopWords;
use crate::terminology::{Term, TermCounts, Terminology};

/// Per-run report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub processed: Vec<PathBuf>,
    /// Shards that could not be read and were left out.
    pub skipped: Vec<PathBuf>,
    /// Segments or documents seen in processed shards.
    pub items: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Write `;`-delimited tables with matched terms instead of plain text.
    pub inspection: bool,
    /// Only collect sentences without any match.
    pub unmatched_only: bool,
}

/// Sentences classified by which term subsets matched them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Buckets {
    pub neutral: Vec<Segment>,
    pub gendered: Vec<Segment>,
    pub both: Vec<Segment>,
}

impl Buckets {
    fn append(&mut self, mut other: Buckets) {
        self.neutral.append(&mut other.neutral);
        self.gendered.append(&mut other.gendered);
        self.both.append(&mut other.both);
    }
}

/// What one worker returns for one chunk of an extraction run.
#[derive(Debug, Default)]
pub struct ChunkResult {
    pub counts: TermCounts,
    /// Documents with at least one match (empty in unmatched-only mode).
    pub documents: Vec<CorpusDocument>,
    pub buckets: Buckets,
    pub unmatched: Vec<String>,
}

/// Neutral-only and gendered-only matchers used for bucket classification.
#[derive(Debug, Clone)]
pub struct Classifier {
    pub neutral: PhraseMatcher,
    pub gendered: PhraseMatcher,
}

/// Term subset a bitext filter keeps pairs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum FilterTarget {
    #[value(name = "m")]
    #[serde(rename = "m")]
    Masculine,
    #[value(name = "f")]
    #[serde(rename = "f")]
    Feminine,
    #[serde(rename = "all")]
    All,
}

impl FilterTarget {
    pub fn terms<'a>(&self, terminology: &'a Terminology) -> Vec<&'a Term> {
        match self {
            FilterTarget::Masculine => terminology.masculine_terms().collect(),
            FilterTarget::Feminine => terminology.feminine_terms().collect(),
            FilterTarget::All => terminology.terms().iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterSummary {
    pub kept: usize,
    pub removed: usize,
}

/// Contiguous chunk length giving (at most) one chunk per worker.
pub fn chunk_size(len: usize, workers: usize) -> usize {
    len.div_ceil(workers.max(1)).max(1)
}

/// Sort each sentence of `doc` into exactly one bucket. A sentence matched by
/// both matchers goes to `both` only.
pub fn classify_document(
    doc: &Document,
    classifier: &Classifier,
    terminology: &Terminology,
) -> Result<Buckets> {
    let mut buckets = Buckets::default();
    for sentence in &doc.sentences {
        let tokens = doc.sentence_tokens(sentence);
        let neutral = classifier.neutral.find_matches(tokens);
        let gendered = classifier.gendered.find_matches(tokens);
        let text = doc.sentence_text(sentence).to_string();

        if !neutral.is_empty() && !gendered.is_empty() {
            // gendered names follow the neutral ones; older outputs list only the neutral names
            let mut matched = surfaces(&neutral, terminology)?;
            matched.extend(surfaces(&gendered, terminology)?);
            buckets.both.push(Segment { matched, text });
        } else if !neutral.is_empty() {
            let matched = surfaces(&neutral, terminology)?;
            buckets.neutral.push(Segment { matched, text });
        } else if !gendered.is_empty() {
            let matched = surfaces(&gendered, terminology)?;
            buckets.gendered.push(Segment { matched, text });
        }
    }
    Ok(buckets)
}

fn surfaces(matches: &[Match], terminology: &Terminology) -> Result<Vec<String>> {
    matches
        .iter()
        .map(|m| terminology.term(m.term_id).map(|t| t.surface.clone()))
        .collect()
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Corpus runs sharing one annotator, stop-word list and configuration.
pub struct CorpusPipeline<'a> {
    annotator: &'a dyn Annotator,
    stopwords: &'a StopWords,
    config: EngineConfig,
}

impl<'a> std::fmt::Debug for CorpusPipeline<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorpusPipeline")
            .field("annotator", &"<Annotator>")
            .field("stopwords", &self.stopwords.len())
            .field("config", &self.config)
            .finish()
    }
}

impl<'a> CorpusPipeline<'a> {
    pub fn new(annotator: &'a dyn Annotator, stopwords: &'a StopWords, config: EngineConfig) -> Self {
        Self {
            annotator,
            stopwords,
            config,
        }
    }

    pub fn workers(&self) -> usize {
        self.config.worker_count()
    }

    fn pool(&self) -> Result<ThreadPool> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers())
            .thread_name(|i| format!("term-worker-{i}"))
            .build()?;
        Ok(pool)
    }

    fn matcher<'t>(&self, terms: impl IntoIterator<Item = &'t Term>, label: &str) -> Result<PhraseMatcher> {
        PhraseMatcher::build(
            terms,
            self.config.match_attribute,
            self.annotator,
            self.stopwords,
            label,
        )
    }

    /// Map `work` over worker-sized chunks of `items`; results keep chunk order.
    fn run_chunks<T, R, F>(&self, pool: &ThreadPool, items: &[T], work: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&[T]) -> Result<R> + Sync + Send,
    {
        let size = chunk_size(items.len(), self.workers());
        pool.install(|| items.par_chunks(size).map(|chunk| work(chunk)).collect())
    }

    fn annotate_all<'t>(&self, texts: impl Iterator<Item = &'t str> + Clone) -> Result<Vec<Document>> {
        for text in texts.clone() {
            self.annotator
                .ensure_capacity(text.len(), self.config.capacity_headroom);
        }
        texts.map(|text| self.annotator.annotate(text)).collect()
    }

    fn skip_shard(&self, summary: &mut RunSummary, shard: &Path, err: &TermError) {
        warn!(shard = %shard.display(), error = %err, "skipping shard");
        summary.skipped.push(shard.to_path_buf());
    }

    // =========================================================================
    // Counting
    // =========================================================================

    /// Count term occurrences in plain-text shards (one segment per line).
    pub fn count(&self, terminology: &mut Terminology, input: &Path) -> Result<RunSummary> {
        let matcher = self.matcher(terminology.terms(), "all")?;
        let shards = discover_shards(input, &[""])?;
        let pool = self.pool()?;
        info!(workers = self.workers(), shards = shards.len(), "counting terms");

        let mut summary = RunSummary::default();
        for shard in shards {
            let start = Instant::now();
            let segments = match read_segments(&shard) {
                Ok(segments) => segments,
                Err(e) => {
                    self.skip_shard(&mut summary, &shard, &e);
                    continue;
                }
            };

            let partials =
                self.run_chunks(&pool, &segments, |chunk| self.count_chunk(chunk, &matcher))?;
            for partial in &partials {
                terminology.add_counts(partial)?;
            }

            info!(
                shard = %shard.display(),
                segments = segments.len(),
                elapsed_secs = start.elapsed().as_secs_f64(),
                "counted shard"
            );
            summary.items += segments.len();
            summary.processed.push(shard);
        }
        Ok(summary)
    }

    fn count_chunk(&self, segments: &[String], matcher: &PhraseMatcher) -> Result<TermCounts> {
        let mut counts = TermCounts::new();
        for doc in self.annotate_all(segments.iter().map(String::as_str))? {
            for m in matcher.find_matches(&doc.tokens) {
                *counts.entry(m.term_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    // =========================================================================
    // Extraction
    // =========================================================================

    /// Count terms in JSONL document shards and write matched documents and
    /// classified sentences (or, in unmatched-only mode, sentences without any
    /// match) below `out_dir`.
    pub fn extract(
        &self,
        terminology: &mut Terminology,
        input: &Path,
        out_dir: &Path,
        options: ExtractOptions,
    ) -> Result<RunSummary> {
        let all = self.matcher(terminology.terms(), "all")?;
        let classifier = if options.unmatched_only {
            None
        } else {
            Some(Classifier {
                neutral: self.matcher(terminology.neutral_terms(), "neutral")?,
                gendered: self.matcher(terminology.gendered_terms(), "gendered")?,
            })
        };

        let shards = discover_shards(input, &DOCUMENT_SUFFIXES)?;
        let pool = self.pool()?;
        info!(workers = self.workers(), shards = shards.len(), "filtering corpus");

        let mut summary = RunSummary::default();
        for shard in shards {
            let start = Instant::now();
            info!(shard = %shard.display(), "starting shard");

            let documents = match read_documents(&shard) {
                Ok(documents) => documents,
                Err(e) => {
                    self.skip_shard(&mut summary, &shard, &e);
                    continue;
                }
            };
            if documents.is_empty() {
                info!(shard = %shard.display(), "empty shard");
                summary.processed.push(shard);
                continue;
            }

            let results = {
                let terminology = &*terminology;
                self.run_chunks(&pool, &documents, |chunk| {
                    self.extract_chunk(chunk, &all, classifier.as_ref(), terminology)
                })?
            };
            for result in &results {
                terminology.add_counts(&result.counts)?;
            }

            info!(shard = %shard.display(), "writing extracted data");
            self.write_extracted(&shard, out_dir, options, results)?;

            info!(
                shard = %shard.display(),
                documents = documents.len(),
                elapsed_secs = start.elapsed().as_secs_f64(),
                "done with shard"
            );
            summary.items += documents.len();
            summary.processed.push(shard);
        }
        Ok(summary)
    }

    fn extract_chunk(
        &self,
        documents: &[CorpusDocument],
        all: &PhraseMatcher,
        classifier: Option<&Classifier>,
        terminology: &Terminology,
    ) -> Result<ChunkResult> {
        let mut result = ChunkResult::default();
        let annotated = self.annotate_all(documents.iter().map(|d| d.content.as_str()))?;

        for (source, doc) in documents.iter().zip(&annotated) {
            let matches = all.find_matches(&doc.tokens);
            for m in &matches {
                *result.counts.entry(m.term_id).or_insert(0) += 1;
            }

            match classifier {
                None => {
                    for sentence in &doc.sentences {
                        if !all.is_match(doc.sentence_tokens(sentence)) {
                            result.unmatched.push(doc.sentence_text(sentence).to_string());
                        }
                    }
                }
                Some(classifier) if !matches.is_empty() => {
                    result
                        .buckets
                        .append(classify_document(doc, classifier, terminology)?);
                    result.documents.push(source.clone());
                }
                Some(_) => {}
            }
        }
        Ok(result)
    }

    fn write_extracted(
        &self,
        shard: &Path,
        out_dir: &Path,
        options: ExtractOptions,
        results: Vec<ChunkResult>,
    ) -> Result<()> {
        let stem = shard_stem(shard);

        if options.unmatched_only {
            let path = out_dir
                .join("unmatched")
                .join(format!("seg.unm.extracted.{stem}.txt"));
            let mut sink = SegmentSink::create(&path, false)?;
            for result in &results {
                for text in &result.unmatched {
                    sink.write_text(text)?;
                }
            }
            return sink.finish();
        }

        let ext = if options.inspection { "csv" } else { "txt" };
        let mut docs = DocumentSink::create(
            &out_dir
                .join("doc")
                .join(format!("doc.extracted.{stem}.jsonl.gz")),
        )?;
        let mut neutral = SegmentSink::create(
            &out_dir
                .join("neutral")
                .join(format!("seg.neut.extracted.{stem}.{ext}")),
            options.inspection,
        )?;
        let mut gendered = SegmentSink::create(
            &out_dir
                .join("gendered")
                .join(format!("seg.gen.extracted.{stem}.{ext}")),
            options.inspection,
        )?;
        let mut both = SegmentSink::create(
            &out_dir
                .join("both")
                .join(format!("seg.both.extracted.{stem}.{ext}")),
            options.inspection,
        )?;

        for result in &results {
            for doc in &result.documents {
                docs.write(doc)?;
            }
            for segment in &result.buckets.neutral {
                neutral.write(segment)?;
            }
            for segment in &result.buckets.gendered {
                gendered.write(segment)?;
            }
            for segment in &result.buckets.both {
                both.write(segment)?;
            }
        }

        docs.finish()?;
        neutral.finish()?;
        gendered.finish()?;
        both.finish()
    }

    // =========================================================================
    // Bitext filtering
    // =========================================================================

    /// Keep the segment pairs whose source side matches a term of `which`.
    /// Writes `<outprefix>.filtered.src` and `<outprefix>.filtered.trg`.
    ///
    /// Unlike the other runs, every term is indexed: stop words are not excluded.
    pub fn filter_bitext(
        &self,
        terminology: &Terminology,
        source: &Path,
        target: &Path,
        outprefix: &Path,
        which: FilterTarget,
    ) -> Result<FilterSummary> {
        let matcher = PhraseMatcher::build(
            which.terms(terminology),
            self.config.match_attribute,
            self.annotator,
            &StopWords::none(),
            "filter",
        )?;
        let start = Instant::now();

        let src = read_segments(source)?;
        let trg = read_segments(target)?;
        if src.len() != trg.len() {
            return Err(TermError::Config(format!(
                "{} has {} segments but {} has {}",
                source.display(),
                src.len(),
                target.display(),
                trg.len()
            )));
        }

        let pool = self.pool()?;
        let keep = self.run_chunks(&pool, &src, |chunk| {
            let docs = self.annotate_all(chunk.iter().map(String::as_str))?;
            Ok(docs
                .iter()
                .map(|doc| matcher.is_match(&doc.tokens))
                .collect::<Vec<bool>>())
        })?;

        if let Some(parent) = outprefix.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut src_out = BufWriter::new(File::create(with_suffix(outprefix, ".filtered.src"))?);
        let mut trg_out = BufWriter::new(File::create(with_suffix(outprefix, ".filtered.trg"))?);

        let mut summary = FilterSummary::default();
        for ((src_seg, trg_seg), kept) in src.iter().zip(&trg).zip(keep.into_iter().flatten()) {
            if kept {
                writeln!(src_out, "{src_seg}")?;
                writeln!(trg_out, "{trg_seg}")?;
                summary.kept += 1;
            } else {
                summary.removed += 1;
            }
        }
        src_out.flush()?;
        trg_out.flush()?;

        info!(
            source = %source.display(),
            kept = summary.kept,
            removed = summary.removed,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "filtered bitext"
        );
        Ok(summary)
    }

    // =========================================================================
    // Replacement
    // =========================================================================

    /// Rewrite every file under `input` line by line into
    /// `<out_dir>/replaced.<name>`. Each file is one unit of work.
    pub fn replace_files(
        &self,
        terminology: &Terminology,
        input: &Path,
        out_dir: &Path,
        target: ReplacementTarget,
        inspection: bool,
    ) -> Result<RunSummary> {
        let replacer = Replacer::new(
            terminology,
            self.annotator,
            self.stopwords,
            self.config.match_attribute,
            target,
        )?
        .with_seed(self.config.seed, self.config.reseed);

        let files = discover_shards(input, &[""])?;
        fs::create_dir_all(out_dir)?;
        let pool = self.pool()?;
        info!(workers = self.workers(), files = files.len(), ?target, "starting replacements");

        let outcomes: Vec<Result<usize>> = pool.install(|| {
            files
                .par_iter()
                .map(|file| self.replace_file(file, out_dir, &replacer, terminology, inspection))
                .collect()
        });

        let mut summary = RunSummary::default();
        for (file, outcome) in files.iter().zip(outcomes) {
            match outcome {
                Ok(segments) => {
                    summary.items += segments;
                    summary.processed.push(file.clone());
                }
                Err(e @ TermError::Shard { .. }) => self.skip_shard(&mut summary, file, &e),
                Err(e) => return Err(e),
            }
        }
        Ok(summary)
    }

    fn replace_file(
        &self,
        path: &Path,
        out_dir: &Path,
        replacer: &Replacer,
        terminology: &Terminology,
        inspection: bool,
    ) -> Result<usize> {
        let start = Instant::now();
        let segments = read_segments(path).map_err(|e| TermError::shard(path, e))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let out_path = if inspection {
            out_dir.join(format!("replaced.{name}.csv"))
        } else {
            out_dir.join(format!("replaced.{name}"))
        };
        info!(file = %out_path.display(), "processing file");

        let mut sink = SegmentSink::create(&out_path, inspection)?;
        let mut rng = replacer.rng();
        for segment in &segments {
            self.annotator
                .ensure_capacity(segment.len(), self.config.capacity_headroom);
            let doc = self.annotator.annotate(segment)?;
            let replaced = replacer.replace_document(&doc, terminology, &mut rng)?;
            if inspection {
                let (matched, replacements): (Vec<String>, Vec<String>) =
                    replaced.pairs.into_iter().unzip();
                sink.write_columns(&[matched.join(","), replacements.join(","), replaced.text])?;
            } else {
                sink.write_text(&replaced.text)?;
            }
        }
        sink.finish()?;

        info!(
            file = %out_path.display(),
            segments = segments.len(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "done with file"
        );
        Ok(segments.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::RuleAnnotator;
    use crate::replace::ReseedPolicy;
    use crate::terminology::tests::{HEADER, lehrer_terminology};
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn config(workers: usize) -> EngineConfig {
        EngineConfig {
            workers: Some(workers),
            ..EngineConfig::default()
        }
    }

    fn jsonl(contents: &[&str]) -> String {
        contents
            .iter()
            .map(|c| serde_json::to_string(&CorpusDocument::new(*c)).unwrap() + "\n")
            .collect()
    }

    fn count_of(t: &Terminology, surface: &str) -> u64 {
        t.lookup(surface)[0].count
    }

    #[test]
    fn test_chunk_size() {
        assert_eq!(chunk_size(10, 3), 4);
        assert_eq!(chunk_size(9, 3), 3);
        assert_eq!(chunk_size(2, 8), 1);
        assert_eq!(chunk_size(0, 4), 1);
        assert_eq!(chunk_size(5, 0), 5);
    }

    #[test]
    fn test_count_single_line() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("corpus.txt");
        fs::write(&input, "Der Lehrer kam.\n").unwrap();

        let annotator = RuleAnnotator::default();
        let stopwords = StopWords::german();
        let pipeline = CorpusPipeline::new(&annotator, &stopwords, config(2));
        let mut t = lehrer_terminology();
        let summary = pipeline.count(&mut t, &input).unwrap();

        assert_eq!(summary.items, 1);
        assert_eq!(count_of(&t, "Lehrer"), 1);
        assert_eq!(count_of(&t, "Lehrerin"), 0);
        assert_eq!(count_of(&t, "Lehrkraft"), 0);
    }

    #[test]
    fn test_count_every_occurrence_across_shards() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "Lehrer und Lehrer.\nDie Lehrkraft.\n").unwrap();
        fs::write(dir.path().join("b.txt"), "Eine Lehrerin.\nLehrer!\n").unwrap();
        fs::write(dir.path().join("broken.gz"), "not gzip at all").unwrap();

        let annotator = RuleAnnotator::default();
        let stopwords = StopWords::german();
        let pipeline = CorpusPipeline::new(&annotator, &stopwords, config(3));
        let mut t = lehrer_terminology();
        let summary = pipeline.count(&mut t, dir.path()).unwrap();

        assert_eq!(summary.processed.len(), 2);
        assert_eq!(summary.skipped, vec![dir.path().join("broken.gz")]);
        assert_eq!(count_of(&t, "Lehrer"), 3);
        assert_eq!(count_of(&t, "Lehrerin"), 1);
        assert_eq!(count_of(&t, "Lehrkraft"), 1);

        // counts keep accumulating over runs
        pipeline.count(&mut t, &dir.path().join("b.txt")).unwrap();
        assert_eq!(count_of(&t, "Lehrer"), 4);
    }

    #[test]
    fn test_oversized_segment_raises_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("corpus.txt");
        fs::write(&input, "Der Lehrer kam sehr spät.\n").unwrap();

        let annotator = RuleAnnotator::new(8);
        let stopwords = StopWords::german();
        let pipeline = CorpusPipeline::new(&annotator, &stopwords, config(1));
        let mut t = lehrer_terminology();
        pipeline.count(&mut t, &input).unwrap();

        assert_eq!(count_of(&t, "Lehrer"), 1);
        assert!(annotator.capacity() >= "Der Lehrer kam sehr spät.".len());
    }

    #[test]
    fn test_extract_buckets() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(
            input.path().join("de_part_1.jsonl"),
            jsonl(&[
                "Die Lehrkraft kam. Der Lehrer ging. Lehrer und Lehrkraft lachten. Nichts hier.",
                "Keine Treffer.",
            ]),
        )
        .unwrap();

        let annotator = RuleAnnotator::default();
        let stopwords = StopWords::german();
        let pipeline = CorpusPipeline::new(&annotator, &stopwords, config(2));
        let mut t = lehrer_terminology();
        let summary = pipeline
            .extract(&mut t, input.path(), out.path(), ExtractOptions::default())
            .unwrap();
        assert_eq!(summary.items, 2);

        let read = |p: &str| fs::read_to_string(out.path().join(p)).unwrap();
        assert_eq!(read("neutral/seg.neut.extracted.de_part_1.txt"), "Die Lehrkraft kam.\n");
        assert_eq!(read("gendered/seg.gen.extracted.de_part_1.txt"), "Der Lehrer ging.\n");
        assert_eq!(
            read("both/seg.both.extracted.de_part_1.txt"),
            "Lehrer und Lehrkraft lachten.\n"
        );

        let mut docs = String::new();
        GzDecoder::new(File::open(out.path().join("doc/doc.extracted.de_part_1.jsonl.gz")).unwrap())
            .read_to_string(&mut docs)
            .unwrap();
        assert_eq!(docs.lines().count(), 1);
        assert!(docs.contains("Die Lehrkraft kam."));

        assert_eq!(count_of(&t, "Lehrer"), 2);
        assert_eq!(count_of(&t, "Lehrkraft"), 2);
        assert_eq!(count_of(&t, "Lehrerin"), 0);
    }

    #[test]
    fn test_extract_inspection_tables() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(
            input.path().join("s.jsonl"),
            jsonl(&["Die Lehrkraft kam.\nLehrer und Lehrkraft lachten."]),
        )
        .unwrap();

        let annotator = RuleAnnotator::default();
        let stopwords = StopWords::german();
        let pipeline = CorpusPipeline::new(&annotator, &stopwords, config(1));
        let mut t = lehrer_terminology();
        let options = ExtractOptions {
            inspection: true,
            unmatched_only: false,
        };
        pipeline.extract(&mut t, input.path(), out.path(), options).unwrap();

        let read = |p: &str| fs::read_to_string(out.path().join(p)).unwrap();
        assert_eq!(read("neutral/seg.neut.extracted.s.csv"), "Lehrkraft;Die Lehrkraft kam.\n");
        assert_eq!(
            read("both/seg.both.extracted.s.csv"),
            "Lehrkraft,Lehrer;Lehrer und Lehrkraft lachten.\n"
        );
        assert_eq!(read("gendered/seg.gen.extracted.s.csv"), "");
    }

    #[test]
    fn test_extract_unmatched_only_keeps_order() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let contents: Vec<String> = (0..20).map(|i| format!("Satz {i}. Der Lehrer {i}.")).collect();
        let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
        fs::write(input.path().join("s.jsonl.gz"), {
            let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(jsonl(&refs).as_bytes()).unwrap();
            enc.finish().unwrap()
        })
        .unwrap();

        let annotator = RuleAnnotator::default();
        let stopwords = StopWords::german();
        let pipeline = CorpusPipeline::new(&annotator, &stopwords, config(4));
        let mut t = lehrer_terminology();
        let options = ExtractOptions {
            inspection: false,
            unmatched_only: true,
        };
        pipeline.extract(&mut t, input.path(), out.path(), options).unwrap();

        let written = fs::read_to_string(out.path().join("unmatched/seg.unm.extracted.s.txt")).unwrap();
        let expected: String = (0..20).map(|i| format!("Satz {i}.\n")).collect();
        assert_eq!(written, expected);
        assert!(!out.path().join("doc").exists());
    }

    #[test]
    fn test_buckets_partition_sentences() {
        let annotator = RuleAnnotator::default();
        let stopwords = StopWords::german();
        let t = lehrer_terminology();
        let attr = EngineConfig::default().match_attribute;
        let classifier = Classifier {
            neutral: PhraseMatcher::build(t.neutral_terms(), attr, &annotator, &stopwords, "n").unwrap(),
            gendered: PhraseMatcher::build(t.gendered_terms(), attr, &annotator, &stopwords, "g").unwrap(),
        };
        let all = PhraseMatcher::build(t.terms(), attr, &annotator, &stopwords, "all").unwrap();

        let doc = annotator
            .annotate("Lehrkraft. Lehrerin! Lehrer, Lehrkraft? Nichts. Lehrkräfte kamen.")
            .unwrap();
        let buckets = classify_document(&doc, &classifier, &t).unwrap();

        let mut classified: Vec<&str> = buckets
            .neutral
            .iter()
            .chain(&buckets.gendered)
            .chain(&buckets.both)
            .map(|s| s.text.as_str())
            .collect();
        classified.sort_unstable();
        let before = classified.len();
        classified.dedup();
        assert_eq!(before, classified.len());

        let mut matched: Vec<&str> = doc
            .sentences
            .iter()
            .filter(|s| all.is_match(doc.sentence_tokens(s)))
            .map(|s| doc.sentence_text(s))
            .collect();
        matched.sort_unstable();
        assert_eq!(classified, matched);

        assert_eq!(buckets.both.len(), 1);
        assert_eq!(buckets.both[0].text, "Lehrer, Lehrkraft?");
    }

    #[test]
    fn test_filter_bitext() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("corpus.de");
        let trg = dir.path().join("corpus.en");
        fs::write(&src, "Der Lehrer kam.\nHallo Welt.\nDie Lehrerin ging.\n").unwrap();
        fs::write(&trg, "The tutor came.\nHello world.\nThe tutor left.\n").unwrap();

        let annotator = RuleAnnotator::default();
        let stopwords = StopWords::german();
        let pipeline = CorpusPipeline::new(&annotator, &stopwords, config(2));
        let t = lehrer_terminology();
        let prefix = dir.path().join("out/corpus");
        let summary = pipeline
            .filter_bitext(&t, &src, &trg, &prefix, FilterTarget::Masculine)
            .unwrap();

        assert_eq!(summary, FilterSummary { kept: 1, removed: 2 });
        assert_eq!(
            fs::read_to_string(dir.path().join("out/corpus.filtered.src")).unwrap(),
            "Der Lehrer kam.\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("out/corpus.filtered.trg")).unwrap(),
            "The tutor came.\n"
        );
    }

    #[test]
    fn test_filter_bitext_keeps_stopword_terms() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("corpus.de");
        let trg = dir.path().join("corpus.en");
        fs::write(&src, "Da kam man.\nHallo Welt.\n").unwrap();
        fs::write(&trg, "Then one came.\nHello world.\n").unwrap();

        let table = format!("{HEADER}neut;man;;man;frau;;;mensch;\n");
        let t = Terminology::from_reader(table.as_bytes()).unwrap();
        let annotator = RuleAnnotator::default();
        let stopwords = StopWords::german();
        assert!(stopwords.contains("man"));
        let pipeline = CorpusPipeline::new(&annotator, &stopwords, config(1));

        let summary = pipeline
            .filter_bitext(&t, &src, &trg, &dir.path().join("out"), FilterTarget::Masculine)
            .unwrap();
        assert_eq!(summary, FilterSummary { kept: 1, removed: 1 });
        assert_eq!(
            fs::read_to_string(dir.path().join("out.filtered.src")).unwrap(),
            "Da kam man.\n"
        );
    }

    #[test]
    fn test_extract_skips_corrupt_shard() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(input.path().join("a_bad.jsonl.zst"), "definitely not zstd").unwrap();
        fs::write(
            input.path().join("b_good.jsonl"),
            jsonl(&["Die Lehrkraft kam. Der Lehrer ging."]),
        )
        .unwrap();

        let annotator = RuleAnnotator::default();
        let stopwords = StopWords::german();
        let pipeline = CorpusPipeline::new(&annotator, &stopwords, config(2));
        let mut t = lehrer_terminology();
        let summary = pipeline
            .extract(&mut t, input.path(), out.path(), ExtractOptions::default())
            .unwrap();

        assert_eq!(summary.skipped, vec![input.path().join("a_bad.jsonl.zst")]);
        assert_eq!(summary.processed, vec![input.path().join("b_good.jsonl")]);
        assert_eq!(
            fs::read_to_string(out.path().join("neutral/seg.neut.extracted.b_good.txt")).unwrap(),
            "Die Lehrkraft kam.\n"
        );
        assert_eq!(
            fs::read_to_string(out.path().join("gendered/seg.gen.extracted.b_good.txt")).unwrap(),
            "Der Lehrer ging.\n"
        );
        assert!(!out.path().join("neutral/seg.neut.extracted.a_bad.txt").exists());
        assert_eq!(count_of(&t, "Lehrkraft"), 1);
        assert_eq!(count_of(&t, "Lehrer"), 1);
    }

    #[test]
    fn test_replace_files_per_shard_stream() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let lines = "Eine Lehrkraft.\n".repeat(32);
        fs::write(input.path().join("a.txt"), &lines).unwrap();

        let annotator = RuleAnnotator::default();
        let stopwords = StopWords::german();
        let t = lehrer_terminology();
        let read = |p: PathBuf| fs::read_to_string(p).unwrap();

        let per_shard = EngineConfig {
            reseed: ReseedPolicy::PerShard,
            ..config(1)
        };
        CorpusPipeline::new(&annotator, &stopwords, per_shard)
            .replace_files(&t, input.path(), out.path(), ReplacementTarget::Gendered, false)
            .unwrap();
        let written = read(out.path().join("replaced.a.txt"));
        assert_eq!(written.lines().count(), 32);
        assert!(written.lines().any(|l| l == "Eine Lehrer."));
        assert!(written.lines().any(|l| l == "Eine Lehrerin."));

        CorpusPipeline::new(&annotator, &stopwords, config(1))
            .replace_files(&t, input.path(), out.path(), ReplacementTarget::Gendered, false)
            .unwrap();
        let written = read(out.path().join("replaced.a.txt"));
        let first = written.lines().next().unwrap();
        assert!(written.lines().all(|l| l == first));
    }

    #[test]
    fn test_filter_bitext_length_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a");
        let trg = dir.path().join("b");
        fs::write(&src, "eins\nzwei\n").unwrap();
        fs::write(&trg, "one\n").unwrap();

        let annotator = RuleAnnotator::default();
        let stopwords = StopWords::german();
        let pipeline = CorpusPipeline::new(&annotator, &stopwords, config(1));
        let t = lehrer_terminology();
        let err = pipeline
            .filter_bitext(&t, &src, &trg, &dir.path().join("x"), FilterTarget::All)
            .unwrap_err();
        assert!(matches!(err, TermError::Config(_)));
    }

    #[test]
    fn test_replace_files() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(input.path().join("a.txt"), "Der Lehrer kam.\nNichts  hier.\n").unwrap();
        fs::write(input.path().join("b.txt"), "Die Lehrerin ging.\n").unwrap();

        let annotator = RuleAnnotator::default();
        let stopwords = StopWords::german();
        let pipeline = CorpusPipeline::new(&annotator, &stopwords, config(2));
        let t = lehrer_terminology();
        let summary = pipeline
            .replace_files(&t, input.path(), out.path(), ReplacementTarget::Neutral, false)
            .unwrap();

        assert_eq!(summary.items, 3);
        assert_eq!(
            fs::read_to_string(out.path().join("replaced.a.txt")).unwrap(),
            "Der Lehrkraft kam.\nNichts  hier.\n"
        );
        assert_eq!(
            fs::read_to_string(out.path().join("replaced.b.txt")).unwrap(),
            "Die Lehrkraft ging.\n"
        );
    }

    #[test]
    fn test_replace_files_inspection() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(input.path().join("a.txt"), "Die Lehrkraft kam.\n").unwrap();

        let annotator = RuleAnnotator::default();
        let stopwords = StopWords::german();
        let pipeline = CorpusPipeline::new(&annotator, &stopwords, config(1));
        let t = lehrer_terminology();
        pipeline
            .replace_files(&t, input.path(), out.path(), ReplacementTarget::Feminine, true)
            .unwrap();

        assert_eq!(
            fs::read_to_string(out.path().join("replaced.a.txt.csv")).unwrap(),
            "Lehrkraft;Lehrerin;Die Lehrerin kam.\n"
        );
    }
}
