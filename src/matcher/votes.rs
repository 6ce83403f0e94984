//! Per-image-point vote tallies.

use std::collections::HashMap;

/// Hits received by one image point, keyed by reference index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteTally {
    hits: HashMap<usize, u32>,
}

impl VoteTally {
    pub fn record(&mut self, reference: usize) {
        *self.hits.entry(reference).or_insert(0) += 1;
    }

    pub fn hits(&self, reference: usize) -> u32 {
        self.hits.get(&reference).copied().unwrap_or(0)
    }

    /// Number of distinct candidates.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn total(&self) -> u32 {
        self.hits.values().sum()
    }

    /// `(reference, hits)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.hits.iter().map(|(&r, &n)| (r, n))
    }
}

/// One tally per curated image point, sized when a match attempt starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteTable {
    tallies: Vec<VoteTally>,
}

impl VoteTable {
    pub fn new(num_image_points: usize) -> Self {
        Self {
            tallies: vec![VoteTally::default(); num_image_points],
        }
    }

    /// Image point `image` gains a hit for reference point `reference`.
    #[inline]
    pub fn record(&mut self, image: usize, reference: usize) {
        self.tallies[image].record(reference);
    }

    pub fn tally(&self, image: usize) -> &VoteTally {
        &self.tallies[image]
    }

    pub fn tallies(&self) -> &[VoteTally] {
        &self.tallies
    }

    pub fn len(&self) -> usize {
        self.tallies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }

    pub fn total_votes(&self) -> u32 {
        self.tallies.iter().map(VoteTally::total).sum()
    }
}
