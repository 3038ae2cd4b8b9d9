//! JSON and JSON Lines record files.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::RecordError;
use crate::models::CostRecord;

/// Layout of the input file, detected from its first non-blank byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLayout {
    /// A single JSON array of record objects.
    JsonArray,
    /// One JSON object per line.
    JsonLines,
}

impl std::fmt::Display for InputLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputLayout::JsonArray => write!(f, "json"),
            InputLayout::JsonLines => write!(f, "jsonl"),
        }
    }
}

/// Cost records stored in a file on disk.
///
/// The source is restartable: every call to [`RecordSource::records`] reopens
/// the file and yields the same sequence from the start.
#[derive(Debug, Clone)]
pub struct RecordSource {
    path: PathBuf,
    layout: InputLayout,
}

impl RecordSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let path = path.as_ref().to_path_buf();
        let layout = detect_layout(&path)?;
        debug!(path = %path.display(), ?layout, "opened record source");
        Ok(Self { path, layout })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> InputLayout {
        self.layout
    }

    /// Start a fresh pass over the records.
    ///
    /// Both layouts are streamed: JSON Lines line by line, a JSON array one
    /// element at a time. Records are validated as the iterator advances.
    pub fn records(&self) -> Result<Records, RecordError> {
        let file = open(&self.path)?;
        let path = self.path.display().to_string();
        let inner = match self.layout {
            InputLayout::JsonArray => RecordsInner::Array(ArrayElements::new(file, path.clone())?),
            InputLayout::JsonLines => RecordsInner::Lines(BufReader::new(file).lines()),
        };

        Ok(Records {
            path,
            inner,
            next_index: 0,
            done: false,
        })
    }
}

/// Reads the elements of a top-level JSON array one at a time.
struct ArrayElements {
    reader: BufReader<File>,
    path: String,
    started: bool,
    finished: bool,
}

impl ArrayElements {
    fn new(file: File, path: String) -> Result<Self, RecordError> {
        let mut elements = Self {
            reader: BufReader::new(file),
            path,
            started: false,
            finished: false,
        };

        let path = &elements.path;
        let has_bom = elements
            .reader
            .fill_buf()
            .map_err(|source| io_error(path, source))?
            .starts_with(UTF8_BOM);
        if has_bom {
            elements.reader.consume(UTF8_BOM.len());
        }

        match elements.peek_token()? {
            Some(b'[') => elements.reader.consume(1),
            _ => return Err(elements.malformed("expected `[` at the start of the input")),
        }
        Ok(elements)
    }

    /// Next element, or `None` once the closing bracket has been read.
    fn next_element(&mut self, index: usize) -> Result<Option<Value>, RecordError> {
        if self.finished {
            return Ok(None);
        }

        let mut token = self.peek_token()?;
        if self.started {
            match token {
                Some(b',') => {
                    self.reader.consume(1);
                    token = self.peek_token()?;
                }
                Some(b']') => return self.close(),
                Some(other) => {
                    return Err(self.malformed(&format!(
                        "expected `,` or `]` after record {}, found {:?}",
                        index.saturating_sub(1),
                        other as char
                    )));
                }
                None => return Err(self.malformed("input ends inside the array")),
            }
        } else if token == Some(b']') {
            return self.close();
        }

        if token.is_none() {
            return Err(self.malformed("input ends inside the array"));
        }
        self.started = true;

        // Objects end on their closing brace, so the parser never reads past
        // the element into the separator.
        let mut de = serde_json::Deserializer::from_reader(&mut self.reader);
        Value::deserialize(&mut de)
            .map(Some)
            .map_err(|e| RecordError::InvalidRecord {
                index,
                message: format!("invalid JSON: {e}"),
            })
    }

    fn close(&mut self) -> Result<Option<Value>, RecordError> {
        self.reader.consume(1);
        self.finished = true;
        match self.peek_token()? {
            None => Ok(None),
            Some(_) => Err(self.malformed("unexpected content after the closing `]`")),
        }
    }

    /// First non-whitespace byte, left unconsumed.
    fn peek_token(&mut self) -> Result<Option<u8>, RecordError> {
        loop {
            let path = &self.path;
            let first = self
                .reader
                .fill_buf()
                .map_err(|source| io_error(path, source))?
                .first()
                .copied();
            match first {
                None => return Ok(None),
                Some(b) if b.is_ascii_whitespace() => self.reader.consume(1),
                Some(b) => return Ok(Some(b)),
            }
        }
    }

    fn malformed(&self, message: &str) -> RecordError {
        RecordError::Malformed(format!("{}: {message}", self.path))
    }
}

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

fn io_error(path: &str, source: std::io::Error) -> RecordError {
    RecordError::Io {
        path: path.to_string(),
        source,
    }
}

enum RecordsInner {
    Array(ArrayElements),
    Lines(Lines<BufReader<File>>),
}

/// Lazy sequence of validated records; stops after the first error.
pub struct Records {
    path: String,
    inner: RecordsInner,
    next_index: usize,
    done: bool,
}

impl Records {
    fn next_value(&mut self) -> Option<Result<Value, RecordError>> {
        match &mut self.inner {
            RecordsInner::Array(elements) => elements.next_element(self.next_index).transpose(),
            RecordsInner::Lines(lines) => loop {
                let line = match lines.next()? {
                    Ok(line) => line,
                    Err(source) => {
                        return Some(Err(RecordError::Io {
                            path: self.path.clone(),
                            source,
                        }));
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let index = self.next_index;
                return Some(serde_json::from_str(&line).map_err(|e| {
                    RecordError::InvalidRecord {
                        index,
                        message: format!("invalid JSON: {e}"),
                    }
                }));
            },
        }
    }
}

impl Iterator for Records {
    type Item = Result<CostRecord, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let index = self.next_index;
        let item = match self.next_value() {
            None => {
                self.done = true;
                return None;
            }
            Some(value) => value.and_then(|v| CostRecord::from_json(index, v)),
        };

        self.next_index += 1;
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}

fn open(path: &Path) -> Result<File, RecordError> {
    File::open(path).map_err(|source| RecordError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn detect_layout(path: &Path) -> Result<InputLayout, RecordError> {
    let mut reader = BufReader::new(open(path)?);
    let mut buf = [0u8; 1];
    loop {
        let read = reader.read(&mut buf).map_err(|source| RecordError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if read == 0 {
            return Err(RecordError::Malformed(format!(
                "{} is empty",
                path.display()
            )));
        }
        match buf[0] {
            b if b.is_ascii_whitespace() => continue,
            // UTF-8 byte order mark
            0xEF | 0xBB | 0xBF => continue,
            b'[' => return Ok(InputLayout::JsonArray),
            b'{' => return Ok(InputLayout::JsonLines),
            other => {
                return Err(RecordError::Malformed(format!(
                    "{} is neither a JSON array nor JSON Lines (starts with {:?})",
                    path.display(),
                    other as char
                )));
            }
        }
    }
}
