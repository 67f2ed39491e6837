//! Run-length grouping of literal sequences.
//!
//! The serializer compresses repeated consecutive values in rendered arrays
//! into a `[value] * count` shorthand, and integration-weight normalization
//! compresses flat per-sample lists into `(value, length)` entries. Both are
//! built on the chunking here. The grouping is reversible: expanding every
//! chunk in order reproduces the original sequence exactly.

/// A maximal group of consecutive values that renders as one segment.
///
/// A chunk is either *uniform* (a run of ≥2 equal values, rendered with the
/// multiplication shorthand) or *mixed* (values rendered plainly). Once a
/// chunk has accepted a repeat of its last value it becomes uniform and
/// rejects anything different.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<T> {
    data: Vec<T>,
    accepts_different: bool,
}

impl<T: PartialEq + Clone> Chunk<T> {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            accepts_different: true,
        }
    }

    fn add(&mut self, element: T) {
        debug_assert!(
            self.accepts_different || self.data.last() == Some(&element),
            "tried to add a different value to a uniform chunk"
        );
        if self.data.last() == Some(&element) {
            self.accepts_different = false;
        }
        self.data.push(element);
    }

    /// True when this chunk is a uniform run rendered with the shorthand.
    pub fn is_uniform(&self) -> bool {
        !self.accepts_different
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The values in this chunk, in order.
    pub fn values(&self) -> &[T] {
        &self.data
    }

    /// First value; meaningful for uniform chunks.
    pub fn first(&self) -> &T {
        &self.data[0]
    }
}

/// Split a sequence into chunks such that every run of ≥2 equal consecutive
/// values lands in its own uniform chunk and everything else stays mixed.
pub fn split_into_chunks<T: PartialEq + Clone>(items: &[T]) -> Vec<Chunk<T>> {
    let mut chunks = vec![Chunk::new()];
    for (idx, item) in items.iter().enumerate() {
        let starts_new_value = idx >= 1 && *item != items[idx - 1];
        if starts_new_value {
            let equals_next = idx + 1 < items.len() && *item == items[idx + 1];
            let current = chunks.last().expect("chunk list is never empty");
            if equals_next || current.is_uniform() {
                chunks.push(Chunk::new());
            }
        }
        chunks
            .last_mut()
            .expect("chunk list is never empty")
            .add(item.clone());
    }
    chunks
}

/// Expand chunks back into the flat sequence they were split from.
pub fn expand_chunks<T: Clone + PartialEq>(chunks: &[Chunk<T>]) -> Vec<T> {
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend_from_slice(chunk.values());
    }
    out
}

/// Plain run-length encoding: maximal runs of equal consecutive values with
/// their lengths. Used for integration-weight sample compression.
pub fn run_lengths<T: PartialEq + Clone>(items: &[T]) -> Vec<(T, usize)> {
    let mut runs: Vec<(T, usize)> = Vec::new();
    for item in items {
        match runs.last_mut() {
            Some((value, count)) if value == item => *count += 1,
            _ => runs.push((item.clone(), 1)),
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_empty_sequence_single_empty_chunk() {
        let chunks = split_into_chunks::<i64>(&[]);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
    }

    #[test]
    fn test_all_distinct_stays_mixed() {
        let chunks = split_into_chunks(&[1, 2, 3]);
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].is_uniform());
        assert_eq!(chunks[0].values(), &[1, 2, 3]);
    }

    #[test]
    fn test_run_becomes_uniform_chunk() {
        let chunks = split_into_chunks(&[5, 5, 5]);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_uniform());
        assert_eq!(chunks[0].len(), 3);
        assert_eq!(*chunks[0].first(), 5);
    }

    #[test]
    fn test_mixed_then_run() {
        let chunks = split_into_chunks(&[1, 2, 5, 5, 5, 2]);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].values(), &[1, 2]);
        assert!(chunks[1].is_uniform());
        assert_eq!(chunks[1].len(), 3);
        assert_eq!(chunks[2].values(), &[2]);
    }

    #[test]
    fn test_run_lengths() {
        assert_eq!(
            run_lengths(&[1.0, 1.0, 0.5, 0.5, 0.5, 1.0]),
            vec![(1.0, 2), (0.5, 3), (1.0, 1)]
        );
        assert_eq!(run_lengths::<f64>(&[]), vec![]);
    }

    proptest! {
        #[test]
        fn prop_chunks_expand_to_original(items in proptest::collection::vec(0i64..4, 0..64)) {
            let chunks = split_into_chunks(&items);
            prop_assert_eq!(expand_chunks(&chunks), items);
        }

        #[test]
        fn prop_uniform_chunks_have_min_run(items in proptest::collection::vec(0i64..3, 0..64)) {
            for chunk in split_into_chunks(&items) {
                if chunk.is_uniform() {
                    prop_assert!(chunk.len() >= 2);
                    let first = chunk.first();
                    prop_assert!(chunk.values().iter().all(|v| v == first));
                }
            }
        }

        #[test]
        fn prop_run_lengths_expand_to_original(items in proptest::collection::vec(0u8..3, 0..64)) {
            let runs = run_lengths(&items);
            let expanded: Vec<u8> = runs
                .iter()
                .flat_map(|(value, count)| std::iter::repeat_n(*value, *count))
                .collect();
            prop_assert_eq!(expanded, items);
        }
    }
}
