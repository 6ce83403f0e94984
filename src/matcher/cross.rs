//! Image-wedge against reference-wedge comparison.

use super::votes::VoteTable;
use super::wedge::Wedge;
use super::ScaleBounds;

/// Member agreement thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchTolerances {
    /// Largest accepted angle-offset difference, degrees.
    pub angle_deg: f64,
    /// Largest accepted normalized-distance difference.
    pub distance: f64,
}

/// Compare one wedge pair and record votes. Returns the number of member matches.
///
/// The pair is skipped unless `reference.length / image.length` is within the
/// scale bounds (radians per pixel). When any member matches, the anchors vote
/// for each other as well: center for center, orientation for orientation.
pub fn match_wedge_pair(
    image: &Wedge,
    reference: &Wedge,
    scale: &ScaleBounds,
    tol: &MatchTolerances,
    votes: &mut VoteTable,
) -> usize {
    if !scale.contains_rad(reference.length / image.length) {
        return 0;
    }

    let mut matched = 0;
    for im in &image.members {
        for rm in &reference.members {
            if (im.angle_offset_deg - rm.angle_offset_deg).abs() > tol.angle_deg {
                continue;
            }
            if (im.normalized_distance - rm.normalized_distance).abs() > tol.distance {
                continue;
            }
            matched += 1;
            votes.record(im.id, rm.id);
        }
    }

    if matched > 0 {
        votes.record(image.center, reference.center);
        votes.record(image.orientation, reference.orientation);
    }
    matched
}

/// Compare every image wedge against every reference wedge.
/// Returns the number of wedge pairs with at least one member match.
pub fn cross_match(
    image_wedges: &[Wedge],
    reference_wedges: &[Wedge],
    scale: &ScaleBounds,
    tol: &MatchTolerances,
    votes: &mut VoteTable,
) -> usize {
    let mut pairs = 0;
    for iw in image_wedges {
        for rw in reference_wedges {
            if match_wedge_pair(iw, rw, scale, tol, votes) > 0 {
                pairs += 1;
            }
        }
    }
    pairs
}
