//! Define a centroid (center of mass) representing
//! a star detection in an unresolved image.
//!
//! Centroids are the output of an external star extraction step. They reach this
//! crate as a flat text table, one detection per line, and feed the image side of
//! the matching session.
//!

use std::path::Path;

use anyhow::Context;

/// Fluxes at or below this value are treated as unmeasurable.
pub const MIN_VALID_FLUX: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    /// Centroid position in pixels along columns (image x-axis).
    pub x: f64,
    /// Centroid position in pixels along rows (image y-axis).
    pub y: f64,
    /// Integrated flux in detector counts (brighter = higher).
    pub flux: f64,
}

impl Centroid {
    pub fn new(x: f64, y: f64, flux: f64) -> Self {
        Self { x, y, flux }
    }

    /// Integer brightness proxy, `round((20 - 2.5 log10(flux)) * 1000)`.
    ///
    /// This is an instrumental magnitude in milli-mag, so smaller means brighter.
    /// Returns `None` when the flux is not a finite value above [`MIN_VALID_FLUX`].
    pub fn brightness(&self) -> Option<i32> {
        if !(self.flux > MIN_VALID_FLUX && self.flux.is_finite()) {
            return None;
        }
        Some(((20.0 - 2.5 * self.flux.log10()) * 1000.0).round() as i32)
    }
}

/// Parse a single `x y flux [...]` record. Extra columns are ignored, and
/// records with a NaN or infinite value are rejected.
fn parse_centroid_line(line: &str) -> Option<Centroid> {
    let mut fields = line.split_whitespace();
    let x: f64 = fields.next()?.parse().ok()?;
    let y: f64 = fields.next()?.parse().ok()?;
    let flux: f64 = fields.next()?.parse().ok()?;
    if !(x.is_finite() && y.is_finite() && flux.is_finite()) {
        return None;
    }
    Some(Centroid { x, y, flux })
}

/// Parse a detection table held in memory.
///
/// Lines starting with `#`, blank lines, and lines whose first three fields
/// are not finite numbers are skipped.
pub fn parse_centroids(data: &str) -> Vec<Centroid> {
    data.lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(parse_centroid_line)
        .collect()
}

/// Load a detection table from a text file.
pub fn load_centroids_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Centroid>> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading detection file {}", path.display()))?;
    Ok(parse_centroids(&data))
}
