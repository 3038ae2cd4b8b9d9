use std::io;

use serde::Serialize;
use serde_json::{Map, Value};

/// Unit persisted to the vector store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

impl Point {
    pub fn new(id: String, vector: Vec<f32>, payload: Map<String, Value>) -> Self {
        Self {
            id,
            vector,
            payload,
        }
    }

    /// Size of the point serialized as JSON, the larger of the two wire forms.
    pub fn estimated_size(&self) -> Result<usize, serde_json::Error> {
        let mut counter = ByteCounter(0);
        serde_json::to_writer(&mut counter, self)?;
        Ok(counter.0)
    }
}

/// Ordered group of points written in one upsert call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    /// Position of the batch within the run, starting at zero.
    pub index: usize,
    pub points: Vec<Point>,
    pub estimated_bytes: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.points.iter().map(|p| p.id.as_str())
    }
}

struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
