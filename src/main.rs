use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gender_terms::{
    Annotator, CorpusPipeline, EngineConfig, ExtractOptions, FilterTarget, MatchAttribute,
    ReplacementTarget, ReseedPolicy, RunSummary, StopWords, Terminology,
};

#[derive(Parser, Debug)]
#[command(
    name = "gender-terms",
    about = "Count, extract and replace gendered person nouns in German corpora"
)]
struct Cli {
    /// Path to config file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Number of worker threads
    #[arg(long, global = true)]
    workers: Option<usize>,
    /// Token attribute terms are matched on
    #[arg(long, value_enum, global = true)]
    match_level: Option<MatchAttribute>,
    /// Write the log to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Count term occurrences in plain-text files (one segment per line).
    Count {
        /// Terminology table (`;`-delimited)
        #[arg(long)]
        terminology: PathBuf,
        /// Input file or directory
        #[arg(long)]
        input: PathBuf,
        /// Output counts table
        #[arg(long)]
        output: PathBuf,
    },

    /// Count terms in JSONL document shards and extract matching documents and sentences.
    Extract {
        /// Terminology table (`;`-delimited)
        #[arg(long)]
        terminology: PathBuf,
        /// Input shard or directory of shards (.jsonl, .jsonl.gz, .jsonl.zst)
        #[arg(long)]
        input: PathBuf,
        /// Output counts table
        #[arg(long)]
        output: PathBuf,
        /// Directory for extracted documents and sentences
        #[arg(long)]
        output_dir: PathBuf,
        /// Write tables with the matched terms instead of plain text
        #[arg(long)]
        inspection: bool,
        /// Only collect sentences without any term
        #[arg(long)]
        unmatched_only: bool,
    },

    /// Rewrite every line of every input file towards a target gender.
    Replace {
        /// Terminology table (`;`-delimited)
        #[arg(long)]
        terminology: PathBuf,
        /// Directory of plain-text files
        #[arg(long)]
        input_dir: PathBuf,
        /// Directory for replaced.<name> files
        #[arg(long)]
        output_dir: PathBuf,
        /// Replacement direction
        #[arg(long, value_enum)]
        target: ReplacementTarget,
        /// Random seed for choosing among alternatives
        #[arg(long)]
        seed: Option<u64>,
        /// When the random stream is reset
        #[arg(long, value_enum)]
        reseed: Option<ReseedPolicy>,
        /// Write tables of matched and replacement terms
        #[arg(long)]
        inspection: bool,
    },

    /// Keep only the parallel segments whose source side contains a term.
    Filter {
        /// Terminology table (`;`-delimited)
        #[arg(long)]
        terminology: PathBuf,
        /// Source-side segments
        #[arg(long)]
        source: PathBuf,
        /// Target-side segments
        #[arg(long)]
        target: PathBuf,
        /// Prefix for the .filtered.src / .filtered.trg outputs
        #[arg(long)]
        outprefix: PathBuf,
        /// Term subset a pair must contain
        #[arg(long, value_enum, default_value = "all")]
        terms: FilterTarget,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.workers = Some(workers);
    }
    if let Some(attr) = cli.match_level {
        config.match_attribute = attr;
    }
    config.validate()?;
    info!(?config, "using config");

    let annotator = config
        .build_annotator()
        .context("Failed to load lemma table")?;
    let stopwords = config
        .load_stopwords()
        .context("Failed to load stop words")?;

    let start = Instant::now();
    match cli.command {
        Commands::Count {
            terminology,
            input,
            output,
        } => cmd_count(&annotator, &stopwords, config, &terminology, &input, &output)?,
        Commands::Extract {
            terminology,
            input,
            output,
            output_dir,
            inspection,
            unmatched_only,
        } => {
            let options = ExtractOptions {
                inspection,
                unmatched_only,
            };
            cmd_extract(
                &annotator,
                &stopwords,
                config,
                &terminology,
                &input,
                &output,
                &output_dir,
                options,
            )?
        }
        Commands::Replace {
            terminology,
            input_dir,
            output_dir,
            target,
            seed,
            reseed,
            inspection,
        } => {
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(reseed) = reseed {
                config.reseed = reseed;
            }
            cmd_replace(
                &annotator,
                &stopwords,
                config,
                &terminology,
                &input_dir,
                &output_dir,
                target,
                inspection,
            )?
        }
        Commands::Filter {
            terminology,
            source,
            target,
            outprefix,
            terms,
        } => cmd_filter(
            &annotator,
            &stopwords,
            config,
            &terminology,
            &source,
            &target,
            &outprefix,
            terms,
        )?,
    }

    info!(elapsed_secs = start.elapsed().as_secs_f64(), "finished");
    Ok(())
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

fn load_terminology(path: &Path) -> Result<Terminology> {
    let terminology = Terminology::from_path(path)
        .with_context(|| format!("Failed to load terminology {}", path.display()))?;
    info!(terms = terminology.len(), path = %path.display(), "loaded terminology");
    Ok(terminology)
}

fn report(summary: &RunSummary) {
    for path in &summary.skipped {
        warn!(shard = %path.display(), "shard was skipped");
    }
    info!(
        processed = summary.processed.len(),
        skipped = summary.skipped.len(),
        items = summary.items,
        "run summary"
    );
}

fn cmd_count(
    annotator: &dyn Annotator,
    stopwords: &StopWords,
    config: EngineConfig,
    terminology_path: &Path,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let mut terminology = load_terminology(terminology_path)?;
    let pipeline = CorpusPipeline::new(annotator, stopwords, config);

    let summary = pipeline
        .count(&mut terminology, input)
        .with_context(|| format!("Failed to count terms in {}", input.display()))?;
    report(&summary);

    terminology
        .write_counts(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(path = %output.display(), "wrote counts");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_extract(
    annotator: &dyn Annotator,
    stopwords: &StopWords,
    config: EngineConfig,
    terminology_path: &Path,
    input: &Path,
    output: &Path,
    output_dir: &Path,
    options: ExtractOptions,
) -> Result<()> {
    let mut terminology = load_terminology(terminology_path)?;
    let pipeline = CorpusPipeline::new(annotator, stopwords, config);

    let summary = pipeline
        .extract(&mut terminology, input, output_dir, options)
        .with_context(|| format!("Failed to extract from {}", input.display()))?;
    report(&summary);

    terminology
        .write_counts(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(path = %output.display(), "wrote counts");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_replace(
    annotator: &dyn Annotator,
    stopwords: &StopWords,
    config: EngineConfig,
    terminology_path: &Path,
    input_dir: &Path,
    output_dir: &Path,
    target: ReplacementTarget,
    inspection: bool,
) -> Result<()> {
    let terminology = load_terminology(terminology_path)?;
    let pipeline = CorpusPipeline::new(annotator, stopwords, config);

    let summary = pipeline
        .replace_files(&terminology, input_dir, output_dir, target, inspection)
        .with_context(|| format!("Failed to replace terms in {}", input_dir.display()))?;
    report(&summary);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_filter(
    annotator: &dyn Annotator,
    stopwords: &StopWords,
    config: EngineConfig,
    terminology_path: &Path,
    source: &Path,
    target: &Path,
    outprefix: &Path,
    terms: FilterTarget,
) -> Result<()> {
    let terminology = load_terminology(terminology_path)?;
    let pipeline = CorpusPipeline::new(annotator, stopwords, config);

    let summary = pipeline
        .filter_bitext(&terminology, source, target, outprefix, terms)
        .with_context(|| format!("Failed to filter {}", source.display()))?;
    info!(
        kept = summary.kept,
        removed = summary.removed,
        "removed segment pairs without terms"
    );
    Ok(())
}
