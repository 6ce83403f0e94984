//! Field solving around a known pointing, and blind sky search when the
//! pointing is unknown.
//!
//! The image sample is curated once; each candidate field center then only
//! re-imports the reference side. The blind search walks declination rows from a
//! starting declination southward (wrapping past the south pole to the north),
//! covering each row with RA steps widened by `1 / cos(dec)`.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::matcher::session::MatchSession;
use crate::matcher::{MatchConfig, MatchError, MatchResult, ScaleBounds};
use crate::starcatalog::ReferenceCatalog;
use crate::Centroid;

/// Fewer catalog stars than this around a field center make it unusable.
pub const MIN_REFERENCE_STARS: usize = 5;
/// Fewer valid detections than this make the image unusable.
pub const MIN_DETECTIONS: usize = 5;

/// Diagonal field width relative to the long side.
const FIELD_DIAGONAL_FACTOR: f64 = 1.414;
/// Rows closer to a pole than this fraction of the diagonal field take one field.
const POLE_CAP_FRACTION: f64 = 0.2;

/// Blind-search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkySearchConfig {
    /// Declination of the first row, degrees. Default -12.
    pub start_dec_deg: f64,
    /// Give up after this many milliseconds. `None` searches the whole sky.
    pub timeout_ms: Option<u64>,
    /// Upper bound of `scale_high / scale_low`. Default 1.414.
    pub max_scale_ratio: f64,
}

impl Default for SkySearchConfig {
    fn default() -> Self {
        Self {
            start_dec_deg: -12.0,
            timeout_ms: None,
            max_scale_ratio: 1.414,
        }
    }
}

/// Size of the image on the sky.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldGeometry {
    pub width: u32,
    pub height: u32,
    pub scale: ScaleBounds,
}

impl FieldGeometry {
    /// Diagonal field width at the upper scale bound, degrees.
    pub fn diagonal_fov_deg(&self) -> f64 {
        self.width.max(self.height) as f64 * self.scale.high_arcsec() * FIELD_DIAGONAL_FACTOR
            / 3600.0
    }

    /// Cone radius for catalog queries, degrees.
    pub fn catalog_radius_deg(&self) -> f64 {
        self.diagonal_fov_deg() * 0.5
    }

    /// Spacing between blind-search field centers, degrees.
    pub fn tiling_step_deg(&self) -> f64 {
        self.width.min(self.height) as f64 * self.scale.low_arcsec() * 0.5 / 3600.0
    }
}

// ── Sky tiling ──────────────────────────────────────────────────────────────

/// Candidate field centers `(ra_deg, dec_deg)` covering the sphere.
#[derive(Debug, Clone)]
pub struct SkyTiling {
    step_deg: f64,
    pole_cap_deg: f64,
    num_rows: usize,
    row: usize,
    dec_deg: f64,
    ra_deg: f64,
    ra_step_deg: f64,
}

impl SkyTiling {
    pub fn new(step_deg: f64, pole_cap_deg: f64, start_dec_deg: f64) -> Self {
        let num_rows = if step_deg.is_finite() && step_deg > 0.0 {
            (180.001 / step_deg) as usize
        } else {
            0
        };
        let mut tiling = Self {
            step_deg,
            pole_cap_deg,
            num_rows,
            row: 0,
            dec_deg: start_dec_deg,
            ra_deg: 0.0,
            ra_step_deg: 360.1,
        };
        tiling.start_row();
        tiling
    }

    pub fn for_field(geometry: &FieldGeometry, start_dec_deg: f64) -> Self {
        Self::new(
            geometry.tiling_step_deg(),
            geometry.diagonal_fov_deg() * POLE_CAP_FRACTION,
            start_dec_deg,
        )
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn start_row(&mut self) {
        if self.dec_deg < -90.0 {
            self.dec_deg += 180.0;
        }
        self.ra_deg = 0.0;
        self.ra_step_deg = if 90.0 - self.dec_deg.abs() < self.pole_cap_deg {
            360.1
        } else {
            self.step_deg / self.dec_deg.to_radians().cos()
        };
    }
}

impl Iterator for SkyTiling {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        while self.row < self.num_rows {
            if self.ra_deg < 360.0 {
                let center = (self.ra_deg, self.dec_deg);
                self.ra_deg += self.ra_step_deg;
                return Some(center);
            }
            self.row += 1;
            self.dec_deg -= self.step_deg;
            self.start_row();
        }
        None
    }
}

// ── Search ──────────────────────────────────────────────────────────────────

/// Outcome of a field solve or blind search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    /// A field matched.
    Matched,
    /// Every candidate field was tried without success.
    NoMatch,
    /// The time budget ran out first.
    Timeout,
    /// Too few valid detections to try any field.
    TooFewDetections,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub status: SearchStatus,
    /// Field center that matched, degrees.
    pub center_deg: Option<(f64, f64)>,
    /// Result of the successful match.
    pub match_result: Option<MatchResult>,
    /// Field centers whose reference set was matched against.
    pub fields_tried: usize,
    /// Wall-clock time, in milliseconds.
    pub search_time_ms: f32,
}

impl SearchResult {
    pub fn is_success(&self) -> bool {
        self.status == SearchStatus::Matched
    }

    fn unmatched(status: SearchStatus, fields_tried: usize, t0: Instant) -> Self {
        Self {
            status,
            center_deg: None,
            match_result: None,
            fields_tried,
            search_time_ms: t0.elapsed().as_secs_f32() * 1000.0,
        }
    }
}

/// One image matched against catalog fields.
pub struct FieldSearch<'a, C: ReferenceCatalog + ?Sized> {
    catalog: &'a C,
    session: MatchSession,
    geometry: FieldGeometry,
    config: SkySearchConfig,
}

impl<'a, C: ReferenceCatalog + ?Sized> FieldSearch<'a, C> {
    /// Curate the image sample once. The scale bounds are narrowed to
    /// `config.max_scale_ratio`.
    pub fn new(
        catalog: &'a C,
        centroids: &[Centroid],
        width: u32,
        height: u32,
        scale: ScaleBounds,
        matcher: MatchConfig,
        config: SkySearchConfig,
    ) -> Result<Self, MatchError> {
        let scale = scale.narrowed(config.max_scale_ratio);
        let mut session = MatchSession::new(matcher);
        session.set_scale_bounds(scale);
        session.begin_image_import(width, height)?;
        for c in centroids {
            session.import_image_point(c.x, c.y, c.flux)?;
        }
        session.complete_image_import()?;
        Ok(Self {
            catalog,
            session,
            geometry: FieldGeometry {
                width,
                height,
                scale,
            },
            config,
        })
    }

    pub fn geometry(&self) -> &FieldGeometry {
        &self.geometry
    }

    /// Curated image points.
    pub fn num_detections(&self) -> usize {
        self.session.image_sample().map_or(0, |s| s.len())
    }

    /// Match against the catalog around `(ra, dec)` in degrees.
    /// Returns `None` when the catalog has fewer than [`MIN_REFERENCE_STARS`] there.
    pub fn try_field(
        &mut self,
        ra_deg: f64,
        dec_deg: f64,
    ) -> Result<Option<MatchResult>, MatchError> {
        let (ra, dec) = (ra_deg.to_radians(), dec_deg.to_radians());
        let stars = self
            .catalog
            .find_stars(ra, dec, self.geometry.catalog_radius_deg().to_radians());
        if stars.len() < MIN_REFERENCE_STARS {
            debug!(
                "Field ({:.4}, {:.4}): only {} reference stars",
                ra_deg,
                dec_deg,
                stars.len()
            );
            return Ok(None);
        }

        self.session.begin_reference_import(ra, dec);
        for star in &stars {
            self.session.import_reference_star(star)?;
        }
        self.session.complete_reference_import()?;
        self.session.attempt_match().map(Some)
    }

    /// Match a single field at a known pointing.
    pub fn solve_at(&mut self, ra_deg: f64, dec_deg: f64) -> Result<SearchResult, MatchError> {
        let t0 = Instant::now();
        if self.num_detections() < MIN_DETECTIONS {
            return Ok(SearchResult::unmatched(SearchStatus::TooFewDetections, 0, t0));
        }
        info!("Solving field at RA {:.4}, Dec {:.4}", ra_deg, dec_deg);
        match self.try_field(ra_deg, dec_deg)? {
            Some(result) if result.is_success() => {
                Ok(self.matched(ra_deg, dec_deg, result, 1, t0))
            }
            Some(result) => {
                debug!("Field match failed: {:?}", result.status);
                Ok(SearchResult::unmatched(SearchStatus::NoMatch, 1, t0))
            }
            None => {
                info!("Reference stars are too few around the pointing");
                Ok(SearchResult::unmatched(SearchStatus::NoMatch, 0, t0))
            }
        }
    }

    /// Tile the sky until a field matches.
    pub fn blind_search(&mut self) -> Result<SearchResult, MatchError> {
        let t0 = Instant::now();
        if self.num_detections() < MIN_DETECTIONS {
            return Ok(SearchResult::unmatched(SearchStatus::TooFewDetections, 0, t0));
        }

        let tiling = SkyTiling::for_field(&self.geometry, self.config.start_dec_deg);
        info!(
            "Blind search: {} rows, step {:.4} deg, catalog radius {:.4} deg",
            tiling.num_rows(),
            self.geometry.tiling_step_deg(),
            self.geometry.catalog_radius_deg()
        );

        let mut fields_tried = 0;
        let mut last_dec = f64::NAN;
        for (ra_deg, dec_deg) in tiling {
            if let Some(limit) = self.config.timeout_ms {
                if t0.elapsed().as_millis() as u64 >= limit {
                    info!("Blind search timed out after {} fields", fields_tried);
                    return Ok(SearchResult::unmatched(SearchStatus::Timeout, fields_tried, t0));
                }
            }
            if dec_deg != last_dec {
                info!("Searching Dec {:.4}", dec_deg);
                last_dec = dec_deg;
            }
            let Some(result) = self.try_field(ra_deg, dec_deg)? else {
                continue;
            };
            fields_tried += 1;
            if result.is_success() {
                return Ok(self.matched(ra_deg, dec_deg, result, fields_tried, t0));
            }
        }

        info!("Blind search exhausted after {} fields", fields_tried);
        Ok(SearchResult::unmatched(SearchStatus::NoMatch, fields_tried, t0))
    }

    fn matched(
        &self,
        ra_deg: f64,
        dec_deg: f64,
        result: MatchResult,
        fields_tried: usize,
        t0: Instant,
    ) -> SearchResult {
        info!(
            "Matched field at RA {:.4}, Dec {:.4}: {} correspondences",
            ra_deg,
            dec_deg,
            result.correspondences.len()
        );
        SearchResult {
            status: SearchStatus::Matched,
            center_deg: Some((ra_deg, dec_deg)),
            match_result: Some(result),
            fields_tried,
            search_time_ms: t0.elapsed().as_secs_f32() * 1000.0,
        }
    }
}

/// Match an image against the catalog around a known pointing (degrees).
#[allow(clippy::too_many_arguments)]
pub fn solve_field<C: ReferenceCatalog + ?Sized>(
    catalog: &C,
    centroids: &[Centroid],
    width: u32,
    height: u32,
    scale: ScaleBounds,
    ra_deg: f64,
    dec_deg: f64,
    matcher: &MatchConfig,
) -> Result<SearchResult, MatchError> {
    FieldSearch::new(
        catalog,
        centroids,
        width,
        height,
        scale,
        matcher.clone(),
        SkySearchConfig::default(),
    )?
    .solve_at(ra_deg, dec_deg)
}

/// Match an image against the whole sky.
pub fn blind_search<C: ReferenceCatalog + ?Sized>(
    catalog: &C,
    centroids: &[Centroid],
    width: u32,
    height: u32,
    scale: ScaleBounds,
    matcher: &MatchConfig,
    config: &SkySearchConfig,
) -> Result<SearchResult, MatchError> {
    FieldSearch::new(
        catalog,
        centroids,
        width,
        height,
        scale,
        matcher.clone(),
        config.clone(),
    )?
    .blind_search()
}
