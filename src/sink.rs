use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::utils::Result;

/// Default output file, relative to the working directory
pub const DEFAULT_OUTPUT: &str = "sentences.txt";

/// Destination for a finished sentence set
pub trait SentenceSink: fmt::Debug {
    /// Write every sentence, sorted, one per line
    fn write_sentences(&mut self, sentences: &BTreeSet<String>) -> Result<()>;

    /// Get the name of this sink
    fn name(&self) -> &str;
}

/// Writes sorted sentences to any `io::Write`
#[derive(Debug)]
pub struct WriterSink<W: Write + fmt::Debug> {
    writer: W,
    name: String,
}

impl<W: Write + fmt::Debug> WriterSink<W> {
    pub fn new(writer: W, name: &str) -> Self {
        WriterSink {
            writer,
            name: name.to_string(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + fmt::Debug> SentenceSink for WriterSink<W> {
    fn write_sentences(&mut self, sentences: &BTreeSet<String>) -> Result<()> {
        // BTreeSet iterates in lexicographic order already.
        for sentence in sentences {
            writeln!(self.writer, "{}", sentence)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Writes sorted sentences to a file, replacing its contents
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileSink {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileSink {
    fn default() -> Self {
        FileSink::new(DEFAULT_OUTPUT)
    }
}

impl SentenceSink for FileSink {
    fn write_sentences(&mut self, sentences: &BTreeSet<String>) -> Result<()> {
        debug!(path = %self.path.display(), count = sentences.len(), "writing sentences");
        let file = File::create(&self.path)?;
        WriterSink::new(BufWriter::new(file), "file").write_sentences(sentences)
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Collects sentences in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub sentences: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }
}

impl SentenceSink for MemorySink {
    fn write_sentences(&mut self, sentences: &BTreeSet<String>) -> Result<()> {
        self.sentences = sentences.iter().cloned().collect();
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Create a sink writing to standard output
pub fn stdout_sink() -> WriterSink<io::Stdout> {
    WriterSink::new(io::stdout(), "stdout")
}
