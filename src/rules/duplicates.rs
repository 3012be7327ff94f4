//! Cross-row uniqueness checks.
//!
//! The row pass only feeds a Bloom filter. Values the filter claims to have
//! seen are remembered as candidates, and only those are tracked exactly in a
//! second pass. A value that really repeats always hits the filter on its
//! second occurrence, so nothing is missed; false positives merely cost a
//! candidate entry that the exact pass discards.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use crate::parser::BookingRow;

/// Fixed-size Bloom filter over strings.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: usize,
    num_hashes: u32,
}

impl BloomFilter {
    /// Size for `expected_items` entries at the given false-positive rate.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(1e-9, 0.5);
        let ln2 = std::f64::consts::LN_2;
        let num_bits = ((-n * p.ln()) / (ln2 * ln2)).ceil().max(64.0) as usize;
        let num_hashes = ((num_bits as f64 / n) * ln2).round().clamp(1.0, 16.0) as u32;
        Self {
            bits: vec![0; num_bits.div_ceil(64)],
            num_bits,
            num_hashes,
        }
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    fn hashes(value: &str) -> (u64, u64) {
        let mut a = DefaultHasher::new();
        0u8.hash(&mut a);
        value.hash(&mut a);
        let mut b = DefaultHasher::new();
        1u8.hash(&mut b);
        value.hash(&mut b);
        (a.finish(), b.finish() | 1)
    }

    fn positions(&self, value: &str) -> impl Iterator<Item = usize> + '_ {
        let (h1, h2) = Self::hashes(value);
        (0..self.num_hashes as u64)
            .map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits as u64) as usize)
    }

    pub fn contains(&self, value: &str) -> bool {
        self.positions(value)
            .all(|bit| self.bits[bit / 64] & (1 << (bit % 64)) != 0)
    }

    /// Insert `value`. Returns whether it was possibly present already.
    pub fn insert(&mut self, value: &str) -> bool {
        let bits: Vec<usize> = self.positions(value).collect();
        let mut present = true;
        for bit in bits {
            let word = &mut self.bits[bit / 64];
            let mask = 1 << (bit % 64);
            present &= *word & mask != 0;
            *word |= mask;
        }
        present
    }
}

/// One repeated value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duplicate {
    /// Index of the watch the value belongs to.
    pub watch: usize,
    pub field: String,
    pub value: String,
    pub row_no: usize,
    pub line: usize,
    pub first_row: usize,
    pub first_line: usize,
}

#[derive(Debug)]
struct Watch {
    field: String,
    filter: BloomFilter,
    candidates: HashSet<String>,
}

/// Tracks uniqueness of one or more fields over a row stream.
#[derive(Debug, Default)]
pub struct DuplicateDetector {
    watches: Vec<Watch>,
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch `field`; returns the watch index.
    pub fn watch(&mut self, field: &str, expected_rows: usize, false_positive_rate: f64) -> usize {
        self.watches.push(Watch {
            field: field.to_string(),
            filter: BloomFilter::new(expected_rows, false_positive_rate),
            candidates: HashSet::new(),
        });
        self.watches.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// First pass: feed one row. Empty values are never duplicates.
    pub fn observe(&mut self, row: &BookingRow) {
        for watch in &mut self.watches {
            let Some(value) = row.raw(&watch.field).filter(|v| !v.is_empty()) else {
                continue;
            };
            if watch.filter.insert(value) {
                watch.candidates.insert(value.to_string());
            }
        }
    }

    /// Probable repeats seen so far, over all watches.
    pub fn candidate_count(&self) -> usize {
        self.watches.iter().map(|w| w.candidates.len()).sum()
    }

    /// Whether a second pass is needed at all.
    pub fn needs_exact_pass(&self) -> bool {
        self.candidate_count() > 0
    }

    /// Second pass over a fresh row stream: report every later occurrence of
    /// a candidate value against its first row.
    pub fn resolve<I>(&self, rows: I) -> Vec<Duplicate>
    where
        I: IntoIterator<Item = BookingRow>,
    {
        let mut first_seen: Vec<HashMap<&str, (usize, usize)>> =
            vec![HashMap::new(); self.watches.len()];
        let mut duplicates = Vec::new();

        for row in rows {
            for (index, watch) in self.watches.iter().enumerate() {
                let Some(value) = row.raw(&watch.field) else {
                    continue;
                };
                let Some(candidate) = watch.candidates.get(value) else {
                    continue;
                };
                match first_seen[index].get(candidate.as_str()) {
                    Some(&(first_row, first_line)) => duplicates.push(Duplicate {
                        watch: index,
                        field: watch.field.clone(),
                        value: candidate.clone(),
                        row_no: row.row_no,
                        line: row.line_span.0,
                        first_row,
                        first_line,
                    }),
                    None => {
                        first_seen[index].insert(candidate.as_str(), (row.row_no, row.line_span.0));
                    }
                }
            }
        }
        duplicates
    }
}
