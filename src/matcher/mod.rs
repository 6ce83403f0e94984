//! Wedge-shape correspondence matcher.
//!
//! This module finds which image detection corresponds to which catalog star when
//! the only reliable information is local geometry: the image-to-sky scale is known
//! to within a range, rotation is unknown, and the field center is approximate.
//!
//! 1. **Curation**: both point sets are ranked by brightness and truncated
//!    ([`sample`]).
//! 2. **Wedges**: for every pair of points (center, orientation) in one set, the
//!    points inside an angular aperture around the center→orientation direction
//!    are recorded by angle offset and by distance normalized to the pair length
//!    ([`wedge`]). These descriptors do not depend on rotation or scale.
//! 3. **Cross-match**: every image wedge is compared with every reference wedge
//!    whose implied scale is inside the bounds; members that agree in angle offset
//!    and normalized distance vote for each other ([`cross`], [`votes`]).
//! 4. **Resolution**: each image point takes the reference point with the most
//!    votes, provided it clearly beats the runner-up ([`resolve`]).
//! 5. **Acceptance**: the match succeeds when enough image points resolve
//!    confidently ([`match_samples`]).
//!
//! [`session::MatchSession`] wraps the pipeline in the begin/import/complete call
//! sequence used by callers that stream points in.

pub mod cross;
pub mod resolve;
pub mod sample;
pub mod session;
pub mod votes;
pub mod wedge;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::Vector2;

use self::cross::{cross_match, MatchTolerances};
use self::resolve::resolve_all;
use self::sample::{ImageSample, ReferenceSample};
use self::votes::VoteTable;
use self::wedge::{build_wedges, WedgeParams};

/// Radians per arcsecond.
pub const ARCSEC_TO_RAD: f64 = std::f64::consts::PI / (180.0 * 3600.0);

/// Smallest accepted pixel scale, arcsec/pixel.
pub const MIN_SCALE_ARCSEC: f64 = 0.1;
/// Largest accepted pixel scale, arcsec/pixel.
pub const MAX_SCALE_ARCSEC: f64 = 324.0;
/// Smallest accepted sample cap.
pub const MIN_SAMPLE_MAX: usize = 10;

// ── Errors ──────────────────────────────────────────────────────────────────

/// Misuse of the matcher API. Match outcomes are never errors; see [`MatchStatus`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error("{operation} called out of sequence: {reason}")]
    OutOfSequence {
        operation: &'static str,
        reason: &'static str,
    },
    #[error("invalid scale bounds [{low}, {high}] arcsec/pixel")]
    InvalidScale { low: f64, high: f64 },
    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },
}

// ── Scale bounds ────────────────────────────────────────────────────────────

/// Accepted range of the pixel scale (sky angle per image pixel).
///
/// Stored in arcsec/pixel and clamped to
/// [`MIN_SCALE_ARCSEC`]..=[`MAX_SCALE_ARCSEC`]. Wedge lengths on the reference
/// side are tangent-plane radians, so the matcher compares against
/// [`ScaleBounds::low_rad`] / [`ScaleBounds::high_rad`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleBounds {
    low_arcsec: f64,
    high_arcsec: f64,
}

impl ScaleBounds {
    /// Validate and clamp a scale guess. Requires `0 < low <= high`, both finite.
    pub fn new(low_arcsec: f64, high_arcsec: f64) -> Result<Self, MatchError> {
        let valid = low_arcsec.is_finite()
            && high_arcsec.is_finite()
            && low_arcsec > 0.0
            && low_arcsec <= high_arcsec;
        if !valid {
            return Err(MatchError::InvalidScale {
                low: low_arcsec,
                high: high_arcsec,
            });
        }
        Ok(Self {
            low_arcsec: low_arcsec.clamp(MIN_SCALE_ARCSEC, MAX_SCALE_ARCSEC),
            high_arcsec: high_arcsec.clamp(MIN_SCALE_ARCSEC, MAX_SCALE_ARCSEC),
        })
    }

    /// Cap `high / low` at `max_ratio`, lowering the upper bound.
    pub fn narrowed(self, max_ratio: f64) -> Self {
        Self {
            low_arcsec: self.low_arcsec,
            high_arcsec: self.high_arcsec.min(self.low_arcsec * max_ratio.max(1.0)),
        }
    }

    pub fn low_arcsec(&self) -> f64 {
        self.low_arcsec
    }

    pub fn high_arcsec(&self) -> f64 {
        self.high_arcsec
    }

    /// Lower bound in radians per pixel.
    pub fn low_rad(&self) -> f64 {
        self.low_arcsec * ARCSEC_TO_RAD
    }

    /// Upper bound in radians per pixel.
    pub fn high_rad(&self) -> f64 {
        self.high_arcsec * ARCSEC_TO_RAD
    }

    /// Whether a reference/image length ratio (radians per pixel) is acceptable.
    #[inline]
    pub fn contains_rad(&self, scale_rad: f64) -> bool {
        scale_rad >= self.low_rad() && scale_rad <= self.high_rad()
    }
}

// ── Configuration ───────────────────────────────────────────────────────────

/// Tunables of the matching engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Brightest image detections kept for matching. Default 40.
    pub image_sample_max: usize,
    /// Brightest reference stars kept for matching. Default 120.
    pub reference_sample_max: usize,
    /// Full opening angle of a wedge, degrees. Default 60.
    pub aperture_deg: f64,
    /// Image-side minimum separation as a fraction of the image diagonal. Default 0.126.
    pub min_separation_fraction: f64,
    /// Floor of the image-side minimum separation, pixels. Default 50.
    pub min_separation_floor_px: f64,
    /// Members a wedge needs (center and orientation excluded). Default 2.
    pub min_wedge_members: usize,
    /// Wedges each side needs before cross-matching is attempted. Default 10.
    pub min_wedge_count: usize,
    /// Largest accepted difference of member angle offsets, degrees. Default 0.1.
    pub angle_tolerance_deg: f64,
    /// Largest accepted difference of normalized member distances. Default 0.002.
    pub distance_tolerance: f64,
    /// A point resolves confidently when top/runner-up votes exceed this. Default 3.0.
    pub confidence_ratio: f64,
    /// The match succeeds when confident points exceed this fraction of the
    /// curated image sample. Default 0.5.
    pub good_match_fraction: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            image_sample_max: 40,
            reference_sample_max: 120,
            aperture_deg: 60.0,
            min_separation_fraction: 0.126,
            min_separation_floor_px: 50.0,
            min_wedge_members: 2,
            min_wedge_count: 10,
            angle_tolerance_deg: 0.1,
            distance_tolerance: 0.002,
            confidence_ratio: 3.0,
            good_match_fraction: 0.5,
        }
    }
}

impl MatchConfig {
    /// Reset every out-of-range setting to its default, with a warning.
    ///
    /// Sample caps must be at least 10, wedges need at least one member, the
    /// aperture lies in (20°, 340°) and the separation fraction in [0.01, 0.2].
    /// Tolerances, ratios and the separation floor must be finite and positive,
    /// and the good-match fraction must lie in [0, 1).
    pub fn validated(mut self) -> Self {
        let d = Self::default();
        let positive = |v: f64| v.is_finite() && v > 0.0;

        let ok = self.image_sample_max >= MIN_SAMPLE_MAX;
        reset_unless(ok, "image_sample_max", &mut self.image_sample_max, d.image_sample_max);
        let ok = self.reference_sample_max >= MIN_SAMPLE_MAX;
        reset_unless(
            ok,
            "reference_sample_max",
            &mut self.reference_sample_max,
            d.reference_sample_max,
        );
        let ok = self.aperture_deg > 20.0 && self.aperture_deg < 340.0;
        reset_unless(ok, "aperture_deg", &mut self.aperture_deg, d.aperture_deg);
        let ok = (0.01..=0.2).contains(&self.min_separation_fraction);
        reset_unless(
            ok,
            "min_separation_fraction",
            &mut self.min_separation_fraction,
            d.min_separation_fraction,
        );
        let ok = positive(self.min_separation_floor_px);
        reset_unless(
            ok,
            "min_separation_floor_px",
            &mut self.min_separation_floor_px,
            d.min_separation_floor_px,
        );
        let ok = self.min_wedge_members >= 1;
        reset_unless(ok, "min_wedge_members", &mut self.min_wedge_members, d.min_wedge_members);
        let ok = self.min_wedge_count >= 1;
        reset_unless(ok, "min_wedge_count", &mut self.min_wedge_count, d.min_wedge_count);
        let ok = positive(self.angle_tolerance_deg);
        reset_unless(
            ok,
            "angle_tolerance_deg",
            &mut self.angle_tolerance_deg,
            d.angle_tolerance_deg,
        );
        let ok = positive(self.distance_tolerance);
        reset_unless(ok, "distance_tolerance", &mut self.distance_tolerance, d.distance_tolerance);
        let ok = positive(self.confidence_ratio);
        reset_unless(ok, "confidence_ratio", &mut self.confidence_ratio, d.confidence_ratio);
        let ok = (0.0..1.0).contains(&self.good_match_fraction);
        reset_unless(
            ok,
            "good_match_fraction",
            &mut self.good_match_fraction,
            d.good_match_fraction,
        );
        self
    }

    /// Image-side minimum center distance for an image of the given size, pixels.
    pub fn image_min_separation(&self, width: u32, height: u32) -> f64 {
        let diagonal = (width as f64).hypot(height as f64);
        (diagonal * self.min_separation_fraction).max(self.min_separation_floor_px)
    }

    fn tolerances(&self) -> MatchTolerances {
        MatchTolerances {
            angle_deg: self.angle_tolerance_deg,
            distance: self.distance_tolerance,
        }
    }
}

fn reset_unless<T: Copy + std::fmt::Debug>(ok: bool, name: &str, value: &mut T, default: T) {
    if !ok {
        warn!("matcher.{} = {:?} is out of range, using {:?}", name, value, default);
        *value = default;
    }
}

// ── Results ─────────────────────────────────────────────────────────────────

/// Outcome of a match attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    /// Enough image points resolved confidently.
    Matched,
    /// A curated sample is too small to form a single wedge.
    TooFew,
    /// One side produced fewer wedges than `min_wedge_count`.
    TooFewWedges,
    /// Cross-matching ran but too few points cleared the confidence ratio.
    LowConfidence,
}

/// One resolved image-point to reference-point correspondence.
#[derive(Debug, Clone, PartialEq)]
pub struct Correspondence {
    /// Index into the curated image sample.
    pub image_index: usize,
    /// Image position, pixels.
    pub image_position: Vector2,
    /// Index into the curated reference sample.
    pub reference_index: usize,
    /// Catalog identifier of the reference star.
    pub catalog_id: u64,
    /// Tangent-plane position of the reference star, radians.
    pub reference_position: Vector2,
    /// Right ascension of the reference star, radians.
    pub ra_rad: f64,
    /// Declination of the reference star, radians.
    pub dec_rad: f64,
    /// Votes received by the winning reference point.
    pub votes: u32,
    /// Winner votes over runner-up votes.
    pub confidence_ratio: f64,
}

/// Result of [`match_samples`].
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub status: MatchStatus,
    /// Confidently resolved correspondences; only populated on `Matched`.
    pub correspondences: Vec<Correspondence>,
    pub num_image_points: usize,
    pub num_reference_points: usize,
    pub num_image_wedges: usize,
    pub num_reference_wedges: usize,
    /// Wedge pairs that produced at least one member match.
    pub num_matched_wedge_pairs: usize,
    /// Image points that cleared the confidence ratio.
    pub num_confident: usize,
    /// Wall-clock time spent matching, in milliseconds.
    pub match_time_ms: f32,
}

impl MatchResult {
    /// The boolean success flag of the session API.
    pub fn is_success(&self) -> bool {
        self.status == MatchStatus::Matched
    }

    fn failure(status: MatchStatus, t0: Instant) -> Self {
        Self {
            status,
            correspondences: Vec::new(),
            num_image_points: 0,
            num_reference_points: 0,
            num_image_wedges: 0,
            num_reference_wedges: 0,
            num_matched_wedge_pairs: 0,
            num_confident: 0,
            match_time_ms: elapsed_ms(t0),
        }
    }
}

// ── Orchestration ───────────────────────────────────────────────────────────

/// Run one complete matching pass over two curated samples.
///
/// Both samples must already be curated (see [`ImageSample::curate`] and
/// [`ReferenceSample::curate`]). The reference-side minimum separation is the
/// image-side one converted with the lower scale bound, so every true image wedge
/// has its reference counterpart.
pub fn match_samples(
    image: &ImageSample,
    reference: &ReferenceSample,
    scale: &ScaleBounds,
    config: &MatchConfig,
) -> MatchResult {
    let t0 = Instant::now();
    let image_points = image.curated();
    let reference_points = reference.curated();

    let min_points = config.min_wedge_members + 2;
    if image_points.len() < min_points || reference_points.len() < min_points {
        debug!(
            "Too few points: {} image, {} reference",
            image_points.len(),
            reference_points.len()
        );
        let mut result = MatchResult::failure(MatchStatus::TooFew, t0);
        result.num_image_points = image_points.len();
        result.num_reference_points = reference_points.len();
        return result;
    }

    let image_min_sep = config.image_min_separation(image.width(), image.height());
    let reference_min_sep = scale.low_rad() * image_min_sep;

    let image_wedges = build_wedges(
        image_points,
        &WedgeParams {
            aperture_deg: config.aperture_deg,
            min_separation: image_min_sep,
            min_members: config.min_wedge_members,
        },
    );
    let reference_wedges = build_wedges(
        reference_points,
        &WedgeParams {
            aperture_deg: config.aperture_deg,
            min_separation: reference_min_sep,
            min_members: config.min_wedge_members,
        },
    );
    debug!(
        "Wedges: {} image (min sep {:.1} px), {} reference (min sep {:.1}\")",
        image_wedges.len(),
        image_min_sep,
        reference_wedges.len(),
        reference_min_sep / ARCSEC_TO_RAD
    );

    let mut result = MatchResult::failure(MatchStatus::TooFewWedges, t0);
    result.num_image_points = image_points.len();
    result.num_reference_points = reference_points.len();
    result.num_image_wedges = image_wedges.len();
    result.num_reference_wedges = reference_wedges.len();

    if image_wedges.len() < config.min_wedge_count
        || reference_wedges.len() < config.min_wedge_count
    {
        result.match_time_ms = elapsed_ms(t0);
        return result;
    }

    let mut votes = VoteTable::new(image_points.len());
    let matched_pairs = cross_match(
        &image_wedges,
        &reference_wedges,
        scale,
        &config.tolerances(),
        &mut votes,
    );
    result.num_matched_wedge_pairs = matched_pairs;

    let confident: Vec<_> = resolve_all(&votes)
        .into_iter()
        .filter(|r| r.is_confident(config.confidence_ratio))
        .collect();
    result.num_confident = confident.len();

    let required = config.good_match_fraction * image_points.len() as f64;
    debug!(
        "{} matched wedge pairs, {} votes, {} confident of {} (need > {:.1})",
        matched_pairs,
        votes.total_votes(),
        confident.len(),
        image_points.len(),
        required
    );

    if confident.len() as f64 > required {
        result.status = MatchStatus::Matched;
        result.correspondences = confident
            .iter()
            .map(|r| {
                let img = &image_points[r.image_index];
                let star = &reference_points[r.reference_index];
                Correspondence {
                    image_index: r.image_index,
                    image_position: Vector2::new(img.x, img.y),
                    reference_index: r.reference_index,
                    catalog_id: star.catalog_id,
                    reference_position: star.position,
                    ra_rad: star.ra_rad,
                    dec_rad: star.dec_rad,
                    votes: r.votes,
                    confidence_ratio: r.ratio,
                }
            })
            .collect();
    } else {
        result.status = MatchStatus::LowConfidence;
    }

    result.match_time_ms = elapsed_ms(t0);
    result
}

fn elapsed_ms(t0: Instant) -> f32 {
    t0.elapsed().as_secs_f32() * 1000.0
}
