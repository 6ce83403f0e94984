//! Call-sequenced matching session.
//!
//! ```text
//! set_scale_guess
//! begin_image_import     -> import_image_point*     -> complete_image_import
//! begin_reference_import -> import_reference_point* -> complete_reference_import
//! attempt_match
//! ```
//!
//! The two sides are independent. A `begin_*` call may be repeated at any time and
//! discards everything previously collected for that side, which is how a search
//! reuses one image sample against many reference fields. Calls made out of order
//! return [`MatchError::OutOfSequence`] and leave the session unchanged.

use tracing::debug;

use crate::projection::ReferenceDirection;
use crate::{Centroid, Star};

use super::sample::{ImageSample, ReferenceSample};
use super::{match_samples, MatchConfig, MatchError, MatchResult, ScaleBounds};

/// Import progress of one side.
#[derive(Debug, Clone, PartialEq)]
enum Phase<S> {
    Empty,
    Importing(S),
    Complete(S),
}

impl<S> Phase<S> {
    fn completed(&self) -> Option<&S> {
        match self {
            Phase::Complete(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchSession {
    config: MatchConfig,
    scale: Option<ScaleBounds>,
    image: Phase<ImageSample>,
    reference: Phase<ReferenceSample>,
}

impl MatchSession {
    /// Out-of-range settings in `config` are reset to their defaults.
    pub fn new(config: MatchConfig) -> Self {
        Self {
            config: config.validated(),
            scale: None,
            image: Phase::Empty,
            reference: Phase::Empty,
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn scale(&self) -> Option<ScaleBounds> {
        self.scale
    }

    /// Set the accepted pixel scale range in arcsec/pixel.
    pub fn set_scale_guess(&mut self, low_arcsec: f64, high_arcsec: f64) -> Result<(), MatchError> {
        self.scale = Some(ScaleBounds::new(low_arcsec, high_arcsec)?);
        Ok(())
    }

    pub fn set_scale_bounds(&mut self, scale: ScaleBounds) {
        self.scale = Some(scale);
    }

    // ── Image side ──────────────────────────────────────────────────────────

    pub fn begin_image_import(&mut self, width: u32, height: u32) -> Result<(), MatchError> {
        if width == 0 || height == 0 {
            return Err(MatchError::InvalidImageSize { width, height });
        }
        self.image = Phase::Importing(ImageSample::new(
            width,
            height,
            self.config.image_sample_max,
        ));
        Ok(())
    }

    /// Offer one detection. Returns whether it was admitted (flux above 1).
    pub fn import_image_point(&mut self, x: f64, y: f64, flux: f64) -> Result<bool, MatchError> {
        match &mut self.image {
            Phase::Importing(sample) => Ok(sample.push(&Centroid::new(x, y, flux))),
            _ => Err(MatchError::OutOfSequence {
                operation: "import_image_point",
                reason: "no image import in progress",
            }),
        }
    }

    /// Curate the image sample. Returns its size. Repeating the call is a no-op.
    pub fn complete_image_import(&mut self) -> Result<usize, MatchError> {
        let sample = match std::mem::replace(&mut self.image, Phase::Empty) {
            Phase::Importing(mut s) => {
                s.curate();
                debug!(
                    "Image sample: {} of {} detections kept",
                    s.len(),
                    s.num_imported()
                );
                s
            }
            Phase::Complete(s) => s,
            Phase::Empty => {
                return Err(MatchError::OutOfSequence {
                    operation: "complete_image_import",
                    reason: "begin_image_import was not called",
                })
            }
        };
        let n = sample.len();
        self.image = Phase::Complete(sample);
        Ok(n)
    }

    pub fn image_sample(&self) -> Option<&ImageSample> {
        self.image.completed()
    }

    // ── Reference side ──────────────────────────────────────────────────────

    /// Start a reference import projected about `(ra, dec)` in radians.
    pub fn begin_reference_import(&mut self, ra_rad: f64, dec_rad: f64) {
        self.reference = Phase::Importing(ReferenceSample::new(
            ReferenceDirection::new(ra_rad, dec_rad),
            self.config.reference_sample_max,
        ));
    }

    /// Offer one reference star. Returns `false` if it could not be projected.
    pub fn import_reference_point(
        &mut self,
        ra_rad: f64,
        dec_rad: f64,
        mag: f32,
    ) -> Result<bool, MatchError> {
        let sample = self.reference_importing("import_reference_point")?;
        let kept = sample.push(ra_rad, dec_rad, mag);
        if !kept {
            debug!("Dropping reference point at ({ra_rad:.6}, {dec_rad:.6}): not projectable");
        }
        Ok(kept)
    }

    /// Like [`Self::import_reference_point`], keeping the catalog id.
    pub fn import_reference_star(&mut self, star: &Star) -> Result<bool, MatchError> {
        let sample = self.reference_importing("import_reference_star")?;
        let kept = sample.push_star(star);
        if !kept {
            debug!("Dropping reference star {}: not projectable", star.id);
        }
        Ok(kept)
    }

    fn reference_importing(
        &mut self,
        operation: &'static str,
    ) -> Result<&mut ReferenceSample, MatchError> {
        match &mut self.reference {
            Phase::Importing(sample) => Ok(sample),
            _ => Err(MatchError::OutOfSequence {
                operation,
                reason: "no reference import in progress",
            }),
        }
    }

    /// Curate the reference sample. Returns its size. Repeating the call is a no-op.
    pub fn complete_reference_import(&mut self) -> Result<usize, MatchError> {
        let sample = match std::mem::replace(&mut self.reference, Phase::Empty) {
            Phase::Importing(mut s) => {
                s.curate();
                debug!(
                    "Reference sample: {} of {} stars kept",
                    s.len(),
                    s.num_imported()
                );
                s
            }
            Phase::Complete(s) => s,
            Phase::Empty => {
                return Err(MatchError::OutOfSequence {
                    operation: "complete_reference_import",
                    reason: "begin_reference_import was not called",
                })
            }
        };
        let n = sample.len();
        self.reference = Phase::Complete(sample);
        Ok(n)
    }

    pub fn reference_sample(&self) -> Option<&ReferenceSample> {
        self.reference.completed()
    }

    // ── Matching ────────────────────────────────────────────────────────────

    /// Run the matcher on the two completed samples.
    ///
    /// Every attempt starts from empty vote tallies, so repeating it gives the
    /// same result.
    pub fn attempt_match(&self) -> Result<MatchResult, MatchError> {
        let scale = self.scale.ok_or(MatchError::OutOfSequence {
            operation: "attempt_match",
            reason: "scale guess not set",
        })?;
        let image = self.image.completed().ok_or(MatchError::OutOfSequence {
            operation: "attempt_match",
            reason: "image import not complete",
        })?;
        let reference = self.reference.completed().ok_or(MatchError::OutOfSequence {
            operation: "attempt_match",
            reason: "reference import not complete",
        })?;
        Ok(match_samples(image, reference, &scale, &self.config))
    }
}
