//! Curated point samples for the two sides of a match.
//!
//! Each side is collected one point at a time, then curated: a stable sort by
//! brightness (brightest first) followed by truncation to the configured cap.
//! Curation is idempotent, and points that compare equal keep their import order.

use crate::projection::ReferenceDirection;
use crate::{Centroid, Star, Vector2};

/// Anything with a position on a 2-D plane.
///
/// Image points live in pixels, reference points in tangent-plane radians; the
/// wedge builder only needs the position.
pub trait PlanePoint {
    fn position(&self) -> Vector2;
}

/// One image detection admitted to the sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePoint {
    pub x: f64,
    pub y: f64,
    /// Instrumental milli-magnitude, smaller is brighter.
    pub brightness: i32,
}

impl ImagePoint {
    /// Returns `None` for non-finite positions and for detections whose flux
    /// has no valid brightness.
    pub fn from_centroid(c: &Centroid) -> Option<Self> {
        if !(c.x.is_finite() && c.y.is_finite()) {
            return None;
        }
        Some(Self {
            x: c.x,
            y: c.y,
            brightness: c.brightness()?,
        })
    }
}

impl PlanePoint for ImagePoint {
    #[inline]
    fn position(&self) -> Vector2 {
        Vector2::new(self.x, self.y)
    }
}

/// One reference star admitted to the sample, already projected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePoint {
    pub catalog_id: u64,
    pub ra_rad: f64,
    pub dec_rad: f64,
    /// Catalog magnitude in milli-mag, smaller is brighter.
    pub magnitude: i32,
    /// Tangent-plane position `(ξ, η)`, radians.
    pub position: Vector2,
}

impl PlanePoint for ReferencePoint {
    #[inline]
    fn position(&self) -> Vector2 {
        self.position
    }
}

/// Image-side sample, tied to the frame size it was detected in.
#[derive(Debug, Clone)]
pub struct ImageSample {
    width: u32,
    height: u32,
    max_points: usize,
    points: Vec<ImagePoint>,
    num_imported: usize,
}

impl ImageSample {
    pub fn new(width: u32, height: u32, max_points: usize) -> Self {
        Self {
            width,
            height,
            max_points,
            points: Vec::new(),
            num_imported: 0,
        }
    }

    /// Build and curate a sample from a slice of detections.
    pub fn from_centroids(
        width: u32,
        height: u32,
        max_points: usize,
        centroids: &[Centroid],
    ) -> Self {
        let mut sample = Self::new(width, height, max_points);
        for c in centroids {
            sample.push(c);
        }
        sample.curate();
        sample
    }

    /// Add one detection. Returns `false` if it was rejected for a non-finite
    /// position or an invalid flux.
    pub fn push(&mut self, centroid: &Centroid) -> bool {
        self.num_imported += 1;
        match ImagePoint::from_centroid(centroid) {
            Some(p) => {
                self.points.push(p);
                true
            }
            None => false,
        }
    }

    /// Sort brightest first and drop everything past the cap.
    pub fn curate(&mut self) {
        self.points.sort_by_key(|p| p.brightness);
        self.points.truncate(self.max_points);
    }

    pub fn curated(&self) -> &[ImagePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Detections offered so far, including rejected ones.
    pub fn num_imported(&self) -> usize {
        self.num_imported
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Reference-side sample, projected about a fixed tangent direction.
#[derive(Debug, Clone)]
pub struct ReferenceSample {
    direction: ReferenceDirection,
    max_points: usize,
    points: Vec<ReferencePoint>,
    num_imported: usize,
}

impl ReferenceSample {
    pub fn new(direction: ReferenceDirection, max_points: usize) -> Self {
        Self {
            direction,
            max_points,
            points: Vec::new(),
            num_imported: 0,
        }
    }

    /// Build and curate a sample from catalog stars.
    pub fn from_stars(direction: ReferenceDirection, max_points: usize, stars: &[Star]) -> Self {
        let mut sample = Self::new(direction, max_points);
        for s in stars {
            sample.push_star(s);
        }
        sample.curate();
        sample
    }

    /// Add a catalog star. Returns `false` if it could not be projected.
    pub fn push_star(&mut self, star: &Star) -> bool {
        self.push_with_id(star.id, star.ra_rad, star.dec_rad, star.mag)
    }

    /// Add an anonymous star; its catalog id is its import position.
    pub fn push(&mut self, ra_rad: f64, dec_rad: f64, mag: f32) -> bool {
        let id = self.num_imported as u64;
        self.push_with_id(id, ra_rad, dec_rad, mag)
    }

    fn push_with_id(&mut self, catalog_id: u64, ra_rad: f64, dec_rad: f64, mag: f32) -> bool {
        self.num_imported += 1;
        let Some(position) = self.direction.project(ra_rad, dec_rad) else {
            return false;
        };
        self.points.push(ReferencePoint {
            catalog_id,
            ra_rad,
            dec_rad,
            magnitude: (mag as f64 * 1000.0).round() as i32,
            position,
        });
        true
    }

    /// Sort brightest first and drop everything past the cap.
    pub fn curate(&mut self) {
        self.points.sort_by_key(|p| p.magnitude);
        self.points.truncate(self.max_points);
    }

    pub fn curated(&self) -> &[ReferencePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Stars offered so far, including unprojectable ones.
    pub fn num_imported(&self) -> usize {
        self.num_imported
    }

    pub fn direction(&self) -> ReferenceDirection {
        self.direction
    }
}
