//! Corpus shards: discovery, decoding and documents.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Suffixes of structured document shards.
pub const DOCUMENT_SUFFIXES: [&str; 3] = ["jsonl", "zst", "gz"];

/// A structured corpus document. Fields other than `content` pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub content: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl CorpusDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Map::new(),
        }
    }
}

/// Input shards under `path`.
///
/// A file is returned as-is. A directory is searched recursively for files
/// ending in any of `suffixes` (an empty suffix matches every file).
pub fn discover_shards(path: &Path, suffixes: &[&str]) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let root = glob::Pattern::escape(&path.to_string_lossy());
    let mut shards = Vec::new();
    for suffix in suffixes {
        let pattern = format!("{root}/**/*{suffix}");
        for entry in glob::glob(&pattern)? {
            match entry {
                Ok(p) if p.is_file() => shards.push(p),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "unreadable path during shard discovery"),
            }
        }
    }
    shards.sort();
    shards.dedup();
    Ok(shards)
}

/// Open a shard, decompressing `.zst` and `.gz` transparently.
pub fn open_shard(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let reader: Box<dyn BufRead> = match path.extension().and_then(OsStr::to_str) {
        Some("zst") => Box::new(BufReader::new(zstd::stream::read::Decoder::new(file)?)),
        Some("gz") => Box::new(BufReader::new(MultiGzDecoder::new(file))),
        _ => Box::new(BufReader::new(file)),
    };
    Ok(reader)
}

/// One segment per line, line terminators stripped.
pub fn read_segments(path: &Path) -> Result<Vec<String>> {
    let mut segments = Vec::new();
    for line in open_shard(path)?.lines() {
        segments.push(line?);
    }
    Ok(segments)
}

/// One JSON document per non-empty line.
pub fn read_documents(path: &Path) -> Result<Vec<CorpusDocument>> {
    let mut documents = Vec::new();
    for line in open_shard(path)?.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        documents.push(serde_json::from_str(&line)?);
    }
    Ok(documents)
}

/// File name without compression and `.jsonl` suffixes, used to name outputs.
pub fn shard_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name
        .strip_suffix(".zst")
        .or_else(|| name.strip_suffix(".gz"))
        .unwrap_or(&name);
    name.strip_suffix(".jsonl").unwrap_or(name).to_string()
}
