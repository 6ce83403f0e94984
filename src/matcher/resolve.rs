//! Plurality resolution of vote tallies.

use super::votes::{VoteTable, VoteTally};

/// Winning reference candidate for one image point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub image_index: usize,
    pub reference_index: usize,
    /// Hits of the winner.
    pub votes: u32,
    /// Hits of the best other candidate, or 1 when there is none.
    pub runner_up: u32,
    /// `votes / runner_up`.
    pub ratio: f64,
}

impl Resolution {
    /// Strictly above `min_ratio`.
    pub fn is_confident(&self, min_ratio: f64) -> bool {
        self.ratio > min_ratio
    }
}

/// Pick the candidate with the most hits. Equal counts go to the lowest
/// reference index, so the outcome never depends on map iteration order.
pub fn resolve_tally(image_index: usize, tally: &VoteTally) -> Option<Resolution> {
    let (reference_index, votes) = tally.iter().fold(None, |best, (r, n)| match best {
        Some((br, bn)) if bn > n || (bn == n && br < r) => Some((br, bn)),
        _ => Some((r, n)),
    })?;

    let runner_up = tally
        .iter()
        .filter(|&(r, _)| r != reference_index)
        .map(|(_, n)| n)
        .max()
        .unwrap_or(1);

    Some(Resolution {
        image_index,
        reference_index,
        votes,
        runner_up,
        ratio: votes as f64 / runner_up as f64,
    })
}

/// Resolve every image point that received votes, in image-index order.
pub fn resolve_all(table: &VoteTable) -> Vec<Resolution> {
    table
        .tallies()
        .iter()
        .enumerate()
        .filter_map(|(i, tally)| resolve_tally(i, tally))
        .collect()
}
