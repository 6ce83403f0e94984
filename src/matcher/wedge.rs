//! Wedge shape descriptors.
//!
//! A wedge is anchored on an ordered pair of sample points: the *center* and the
//! *orientation*. Every other point that lies far enough from the center and
//! inside the angular aperture around the center→orientation direction becomes a
//! member, described by its angle offset from that direction and its distance
//! divided by the center→orientation length. Both quantities survive any
//! rotation, translation and uniform scaling of the plane.

use crate::projection::{bearing_from, distance_between};

use super::sample::PlanePoint;

/// One point captured by a wedge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WedgeMember {
    /// Index into the curated sample.
    pub id: usize,
    /// Bearing relative to the orientation direction, degrees. Not wrapped.
    pub angle_offset_deg: f64,
    /// Distance from the center divided by the wedge length.
    pub normalized_distance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Wedge {
    pub center: usize,
    pub orientation: usize,
    /// Bearing of the orientation point from the center, degrees.
    pub angle_deg: f64,
    /// Center→orientation distance, in the plane's own units.
    pub length: f64,
    pub members: Vec<WedgeMember>,
}

/// Construction filters for one plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WedgeParams {
    /// Full opening angle, degrees.
    pub aperture_deg: f64,
    /// Minimum center distance for the orientation point and for members.
    pub min_separation: f64,
    /// Members required for the wedge to be kept.
    pub min_members: usize,
}

/// Build the wedge anchored on `(center, orientation)`, if it is viable.
pub fn build_wedge<P: PlanePoint>(
    points: &[P],
    center: usize,
    orientation: usize,
    params: &WedgeParams,
) -> Option<Wedge> {
    let c = points[center].position();
    let o = points[orientation].position();

    let length = distance_between(&c, &o);
    if length < params.min_separation {
        return None;
    }
    let angle_deg = bearing_from(&c, &o);
    let half_aperture = params.aperture_deg * 0.5;
    let min_sep2 = params.min_separation * params.min_separation;
    let recip = 1.0 / length;

    let members: Vec<WedgeMember> = points
        .iter()
        .enumerate()
        .filter(|&(id, _)| id != center && id != orientation)
        .filter_map(|(id, p)| {
            let pos = p.position();
            let d = pos - c;
            let d2 = d.norm_squared();
            if d2 < min_sep2 {
                return None;
            }
            let angle_offset_deg = bearing_from(&c, &pos) - angle_deg;
            if angle_offset_deg.abs() > half_aperture {
                return None;
            }
            Some(WedgeMember {
                id,
                angle_offset_deg,
                normalized_distance: d2.sqrt() * recip,
            })
        })
        .collect();

    if members.len() < params.min_members {
        return None;
    }

    Some(Wedge {
        center,
        orientation,
        angle_deg,
        length,
        members,
    })
}

/// Build every viable wedge over the pairs `center < orientation`, in pair order.
pub fn build_wedges<P: PlanePoint>(points: &[P], params: &WedgeParams) -> Vec<Wedge> {
    let n = points.len();
    let mut wedges = Vec::new();
    for center in 0..n {
        for orientation in (center + 1)..n {
            if let Some(w) = build_wedge(points, center, orientation, params) {
                wedges.push(w);
            }
        }
    }
    wedges
}
