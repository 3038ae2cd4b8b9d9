//! Grouping of points into size-bounded upsert batches.

use crate::error::BatchError;
use crate::models::{Batch, IngestConfig, Point};

/// Bytes reserved per request for the envelope around the point list.
pub const BATCH_ENVELOPE_BYTES: usize = 256;

/// Accumulates points and cuts a batch when either limit would be exceeded.
///
/// A batch never holds more than `max_points` points, and its estimated JSON
/// size plus [`BATCH_ENVELOPE_BYTES`] never exceeds `max_bytes`. Points keep
/// their arrival order.
#[derive(Debug)]
pub struct BatchAssembler {
    max_points: usize,
    max_bytes: usize,
    pending: Vec<Point>,
    pending_bytes: usize,
    next_index: usize,
}

impl BatchAssembler {
    pub fn new(max_points: usize, max_bytes: usize) -> Self {
        Self {
            max_points: max_points.max(1),
            max_bytes,
            pending: Vec::new(),
            pending_bytes: 0,
            next_index: 0,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.batch_size, config.max_batch_bytes)
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Budget left for points once the envelope is accounted for.
    fn point_budget(&self) -> usize {
        self.max_bytes.saturating_sub(BATCH_ENVELOPE_BYTES)
    }

    /// Add a point, returning a batch as soon as one is complete.
    ///
    /// A batch is cut before the point when the point would push it past the
    /// byte ceiling, and after the point when it reaches `max_points`. At most
    /// one batch is returned per call.
    pub fn push(&mut self, point: Point) -> Result<Option<Batch>, BatchError> {
        // One separator byte per point.
        let size = point.estimated_size()? + 1;
        let budget = self.point_budget();
        if size > budget {
            return Err(BatchError::PointTooLarge {
                id: point.id,
                size,
                limit: budget,
            });
        }

        let completed = if self.pending_bytes + size > budget {
            self.take_pending()
        } else {
            None
        };

        self.pending_bytes += size;
        self.pending.push(point);

        if completed.is_none() && self.pending.len() >= self.max_points {
            return Ok(self.take_pending());
        }
        Ok(completed)
    }

    /// Emit whatever is still pending.
    pub fn finish(&mut self) -> Option<Batch> {
        self.take_pending()
    }

    fn take_pending(&mut self) -> Option<Batch> {
        if self.pending.is_empty() {
            return None;
        }
        let batch = Batch {
            index: self.next_index,
            points: std::mem::take(&mut self.pending),
            estimated_bytes: self.pending_bytes + BATCH_ENVELOPE_BYTES,
        };
        self.pending_bytes = 0;
        self.next_index += 1;
        Some(batch)
    }

    /// Turn a lazy sequence of points into a lazy sequence of batches.
    pub fn batches<I>(self, points: I) -> Batches<I::IntoIter>
    where
        I: IntoIterator<Item = Point>,
    {
        Batches {
            points: points.into_iter(),
            assembler: self,
            done: false,
        }
    }
}

/// Iterator adapter returned by [`BatchAssembler::batches`].
pub struct Batches<I> {
    points: I,
    assembler: BatchAssembler,
    done: bool,
}

impl<I: Iterator<Item = Point>> Iterator for Batches<I> {
    type Item = Result<Batch, BatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for point in self.points.by_ref() {
            match self.assembler.push(point) {
                Ok(Some(batch)) => return Some(Ok(batch)),
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.done = true;
        self.assembler.finish().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn point(n: usize, dim: usize) -> Point {
        let mut payload = Map::new();
        payload.insert("code".to_string(), json!(format!("C{n:05}")));
        Point::new(format!("id-{n}"), vec![0.125; dim], payload)
    }

    #[test]
    fn test_count_limit_splits_1200_into_500_500_200() {
        let assembler = BatchAssembler::new(500, 24 * 1024 * 1024);
        let batches: Vec<Batch> = assembler
            .batches((0..1200).map(|n| point(n, 8)))
            .map(Result::unwrap)
            .collect();

        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![500, 500, 200]);
        let indexes: Vec<usize> = batches.iter().map(|b| b.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn test_size_limit_cuts_before_count_limit() {
        let one = point(0, 64).estimated_size().unwrap() + 1;
        let max_bytes = BATCH_ENVELOPE_BYTES + one * 3;
        let assembler = BatchAssembler::new(500, max_bytes);

        let batches: Vec<Batch> = assembler
            .batches((0..10).map(|n| point(n, 64)))
            .map(Result::unwrap)
            .collect();

        assert_eq!(batches.len(), 4);
        for batch in &batches {
            assert!(batch.len() <= 3);
            assert!(batch.estimated_bytes <= max_bytes);
        }
    }

    #[test]
    fn test_invariants_hold_for_mixed_sizes() {
        let max_points = 7;
        let max_bytes = 16 * 1024;
        let assembler = BatchAssembler::new(max_points, max_bytes);
        let points: Vec<Point> = (0..100).map(|n| point(n, 10 + (n * 37) % 300)).collect();

        let batches: Vec<Batch> = assembler
            .batches(points.clone())
            .map(Result::unwrap)
            .collect();

        let mut seen = Vec::new();
        for batch in &batches {
            assert!(batch.len() <= max_points);
            assert!(batch.estimated_bytes <= max_bytes);
            let actual: usize = batch
                .points
                .iter()
                .map(|p| p.estimated_size().unwrap() + 1)
                .sum();
            assert_eq!(batch.estimated_bytes, actual + BATCH_ENVELOPE_BYTES);
            seen.extend(batch.ids().map(str::to_string));
        }

        let expected: Vec<String> = points.iter().map(|p| p.id.clone()).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_full_batch_emitted_on_last_point() {
        let mut assembler = BatchAssembler::new(3, 24 * 1024 * 1024);
        assert!(assembler.push(point(0, 4)).unwrap().is_none());
        assert!(assembler.push(point(1, 4)).unwrap().is_none());

        let batch = assembler.push(point(2, 4)).unwrap().unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(assembler.pending_len(), 0);
        assert!(assembler.finish().is_none());
    }

    #[test]
    fn test_single_point_batches() {
        let assembler = BatchAssembler::new(1, 4096);
        let sizes: Vec<usize> = assembler
            .batches((0..3).map(|n| point(n, 4)))
            .map(|b| b.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![1, 1, 1]);
    }

    #[test]
    fn test_oversized_point_rejected() {
        let mut assembler = BatchAssembler::new(500, BATCH_ENVELOPE_BYTES + 100);
        let err = assembler.push(point(1, 1536)).unwrap_err();
        assert!(matches!(err, BatchError::PointTooLarge { ref id, .. } if id == "id-1"));
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn test_oversized_point_stops_iteration() {
        let assembler = BatchAssembler::new(500, 4096);
        let points = vec![point(0, 4), point(1, 1536), point(2, 4)];
        let results: Vec<_> = assembler.batches(points).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_empty_input_yields_no_batches() {
        let mut assembler = BatchAssembler::new(500, 4096);
        assert!(assembler.finish().is_none());
        let assembler = BatchAssembler::new(500, 4096);
        assert_eq!(assembler.batches(Vec::new()).count(), 0);
    }
}
