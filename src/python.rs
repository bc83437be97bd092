use std::path::Path;

use clap::ValueEnum;
use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;

use crate::annotate::MatchAttribute;
use crate::config::EngineConfig;
use crate::error::TermError;
use crate::pipeline::CorpusPipeline;
use crate::replace::{ReplacementTarget, Replacer};
use crate::terminology::Terminology;

fn to_py_err(e: TermError) -> PyErr {
    match e {
        TermError::Io(_) | TermError::Shard { .. } | TermError::Pattern(_) => {
            PyIOError::new_err(e.to_string())
        }
        _ => PyValueError::new_err(e.to_string()),
    }
}

fn parse_arg<T: ValueEnum>(name: &str, value: &str) -> PyResult<T> {
    T::from_str(value, true)
        .map_err(|_| PyValueError::new_err(format!("Invalid {}: {}", name, value)))
}

fn engine_config(match_level: &str, workers: Option<usize>) -> PyResult<EngineConfig> {
    let config = EngineConfig {
        match_attribute: parse_arg::<MatchAttribute>("match level", match_level)?,
        workers,
        ..EngineConfig::default()
    };
    config.validate().map_err(to_py_err)?;
    Ok(config)
}

/// Counted term returned from Rust
#[pyclass]
#[derive(Clone)]
struct TermCount {
    #[pyo3(get)]
    term: String,
    #[pyo3(get)]
    gender: String,
    #[pyo3(get)]
    number: String,
    #[pyo3(get)]
    kind: String,
    #[pyo3(get)]
    count: u64,
    #[pyo3(get)]
    correspondences: Vec<String>,
}

/// Count terminology terms over a text file or a directory of text files
/// Returns: list of TermCount in terminology order
#[pyfunction]
#[pyo3(signature = (terminology_path, input_path, match_level = "lemma", workers = None))]
fn count_terms(
    terminology_path: String,
    input_path: String,
    match_level: &str,
    workers: Option<usize>,
) -> PyResult<Vec<TermCount>> {
    let config = engine_config(match_level, workers)?;
    let mut terminology = Terminology::from_path(&terminology_path).map_err(to_py_err)?;
    let annotator = config.build_annotator().map_err(to_py_err)?;
    let stopwords = config.load_stopwords().map_err(to_py_err)?;

    CorpusPipeline::new(&annotator, &stopwords, config)
        .count(&mut terminology, Path::new(&input_path))
        .map_err(to_py_err)?;

    Ok(terminology
        .terms()
        .iter()
        .map(|term| TermCount {
            term: term.surface.clone(),
            gender: term.gender.as_str().to_string(),
            number: term.number.as_str().to_string(),
            kind: term.kind.clone(),
            count: term.count,
            correspondences: terminology
                .correspondence_surfaces(term)
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
        .collect())
}

/// Replace terms in a batch of texts
/// Returns: list of (replaced_text, [(matched, replacement)])
#[pyfunction]
#[pyo3(signature = (terminology_path, texts, target, match_level = "lemma", seed = crate::replace::DEFAULT_SEED))]
fn replace_texts(
    terminology_path: String,
    texts: Vec<String>,
    target: &str,
    match_level: &str,
    seed: u64,
) -> PyResult<Vec<(String, Vec<(String, String)>)>> {
    let target = parse_arg::<ReplacementTarget>("target", target)?;
    let config = EngineConfig {
        seed,
        ..engine_config(match_level, None)?
    };
    let terminology = Terminology::from_path(&terminology_path).map_err(to_py_err)?;
    let annotator = config.build_annotator().map_err(to_py_err)?;
    let stopwords = config.load_stopwords().map_err(to_py_err)?;

    let replacer = Replacer::new(
        &terminology,
        &annotator,
        &stopwords,
        config.match_attribute,
        target,
    )
    .map_err(to_py_err)?
    .with_seed(config.seed, config.reseed);

    let mut rng = replacer.rng();
    let mut results = Vec::with_capacity(texts.len());
    for text in &texts {
        let replaced = replacer
            .replace_text(text, &annotator, &terminology, &mut rng)
            .map_err(to_py_err)?;
        results.push((replaced.text, replaced.pairs));
    }
    Ok(results)
}

/// Replace terms in every file under a directory, writing replaced.<name> files
/// Returns: (files_processed, files_skipped, segments)
#[pyfunction]
#[pyo3(signature = (terminology_path, input_dir, output_dir, target, inspection = false, workers = None))]
fn replace_files(
    terminology_path: String,
    input_dir: String,
    output_dir: String,
    target: &str,
    inspection: bool,
    workers: Option<usize>,
) -> PyResult<(usize, usize, usize)> {
    let target = parse_arg::<ReplacementTarget>("target", target)?;
    let config = engine_config("lemma", workers)?;
    let terminology = Terminology::from_path(&terminology_path).map_err(to_py_err)?;
    let annotator = config.build_annotator().map_err(to_py_err)?;
    let stopwords = config.load_stopwords().map_err(to_py_err)?;

    let summary = CorpusPipeline::new(&annotator, &stopwords, config)
        .replace_files(
            &terminology,
            Path::new(&input_dir),
            Path::new(&output_dir),
            target,
            inspection,
        )
        .map_err(to_py_err)?;

    Ok((summary.processed.len(), summary.skipped.len(), summary.items))
}

#[pymodule]
fn gender_terms(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(count_terms, m)?)?;
    m.add_function(wrap_pyfunction!(replace_texts, m)?)?;
    m.add_function(wrap_pyfunction!(replace_files, m)?)?;
    m.add_class::<TermCount>()?;
    Ok(())
}
