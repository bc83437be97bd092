//! Output sinks for extracted documents and classified segments.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::corpus::CorpusDocument;
use crate::error::Result;

/// A sentence together with the surfaces of the terms found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub matched: Vec<String>,
    pub text: String,
}

/// Gzip-compressed JSON lines.
pub struct DocumentSink {
    encoder: GzEncoder<BufWriter<File>>,
}

impl DocumentSink {
    pub fn create(path: &Path) -> Result<Self> {
        let file = create_file(path)?;
        Ok(Self {
            encoder: GzEncoder::new(BufWriter::new(file), Compression::default()),
        })
    }

    pub fn write(&mut self, doc: &CorpusDocument) -> Result<()> {
        serde_json::to_writer(&mut self.encoder, doc)?;
        self.encoder.write_all(b"\n")?;
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        let mut inner = self.encoder.finish()?;
        inner.flush()?;
        Ok(())
    }
}

/// Plain text (one segment per line) or, for inspection, a `;`-delimited
/// table with the matched term surfaces in front of each segment.
pub enum SegmentSink {
    Text(BufWriter<File>),
    Table(csv::Writer<File>),
}

impl SegmentSink {
    pub fn create(path: &Path, inspection: bool) -> Result<Self> {
        let file = create_file(path)?;
        if inspection {
            let writer = csv::WriterBuilder::new()
                .delimiter(b';')
                .flexible(true)
                .from_writer(file);
            Ok(SegmentSink::Table(writer))
        } else {
            Ok(SegmentSink::Text(BufWriter::new(file)))
        }
    }

    pub fn write(&mut self, segment: &Segment) -> Result<()> {
        let text = single_line(&segment.text);
        match self {
            SegmentSink::Text(w) => writeln!(w, "{text}")?,
            SegmentSink::Table(w) => w.write_record([segment.matched.join(","), text])?,
        }
        Ok(())
    }

    /// Write a bare segment without match information.
    pub fn write_text(&mut self, text: &str) -> Result<()> {
        let text = single_line(text);
        match self {
            SegmentSink::Text(w) => writeln!(w, "{text}")?,
            SegmentSink::Table(w) => w.write_record([text])?,
        }
        Ok(())
    }

    /// Write a table row of arbitrary columns; text sinks only get the last column.
    pub fn write_columns(&mut self, columns: &[String]) -> Result<()> {
        match self {
            SegmentSink::Text(w) => {
                let last = columns.last().map(String::as_str).unwrap_or("");
                writeln!(w, "{}", single_line(last))?;
            }
            SegmentSink::Table(w) => w.write_record(columns)?,
        }
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        match self {
            SegmentSink::Text(mut w) => w.flush()?,
            SegmentSink::Table(mut w) => w.flush()?,
        }
        Ok(())
    }
}

/// Newlines inside a segment become spaces.
pub fn single_line(text: &str) -> String {
    text.replace('\n', " ")
}

fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}
