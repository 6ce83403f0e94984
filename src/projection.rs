//! Gnomonic (TAN) projection and small planar helpers.
//!
//! Reference stars are projected onto the plane tangent to the celestial sphere
//! at the session's reference direction so that they live in a 2-D space
//! comparable to image pixels, up to scale, rotation and translation.
//!
//! Tangent-plane coordinates `(ξ, η)` are in radians, with ξ along increasing
//! right ascension and η toward the north pole.

use crate::Vector2;

/// Denominators below this are treated as on or behind the tangent plane.
const DEGENERATE_FRACT: f64 = 1e-12;

/// Tangent point of a matching session, in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceDirection {
    pub ra_rad: f64,
    pub dec_rad: f64,
}

impl ReferenceDirection {
    pub fn new(ra_rad: f64, dec_rad: f64) -> Self {
        Self { ra_rad, dec_rad }
    }

    pub fn from_degrees(ra_deg: f64, dec_deg: f64) -> Self {
        Self::new(ra_deg.to_radians(), dec_deg.to_radians())
    }

    /// Project `(ra, dec)` onto the tangent plane at this direction.
    pub fn project(&self, ra_rad: f64, dec_rad: f64) -> Option<Vector2> {
        gnomonic_project(self.ra_rad, self.dec_rad, ra_rad, dec_rad)
    }

    /// Map tangent-plane coordinates back to `(ra, dec)`.
    pub fn deproject(&self, xi: f64, eta: f64) -> (f64, f64) {
        inverse_gnomonic_project(xi, eta, self.ra_rad, self.dec_rad)
    }
}

/// Forward gnomonic projection of `(ra, dec)` at tangent point `(ref_ra, ref_dec)`.
///
/// ```text
/// fract = sin(δ0)·sin(δ) + cos(δ0)·cos(δ)·cos(α − α0)
/// ξ = cos(δ)·sin(α − α0) / fract
/// η = (cos(δ0)·sin(δ) − sin(δ0)·cos(δ)·cos(α − α0)) / fract
/// ```
///
/// Returns `None` when the target is 90° or more from the tangent point.
#[inline]
pub fn gnomonic_project(ref_ra: f64, ref_dec: f64, ra: f64, dec: f64) -> Option<Vector2> {
    let da = ra - ref_ra;
    let (sin_dec, cos_dec) = dec.sin_cos();
    let (sin_dec0, cos_dec0) = ref_dec.sin_cos();
    let (sin_da, cos_da) = da.sin_cos();

    let fract = sin_dec0 * sin_dec + cos_dec0 * cos_dec * cos_da;
    if !(fract > DEGENERATE_FRACT) {
        return None;
    }

    let xi = cos_dec * sin_da / fract;
    let eta = (cos_dec0 * sin_dec - sin_dec0 * cos_dec * cos_da) / fract;
    Some(Vector2::new(xi, eta))
}

/// Inverse gnomonic projection back to `(ra, dec)` in radians.
///
/// RA is wrapped to `[0, 2π)`.
#[inline]
pub fn inverse_gnomonic_project(xi: f64, eta: f64, ref_ra: f64, ref_dec: f64) -> (f64, f64) {
    let (sin_dec0, cos_dec0) = ref_dec.sin_cos();
    let rho_sq = xi * xi + eta * eta;

    if rho_sq < 1e-30 {
        return (ref_ra.rem_euclid(std::f64::consts::TAU), ref_dec);
    }

    let rho = rho_sq.sqrt();
    let c = rho.atan();
    let (sin_c, cos_c) = c.sin_cos();

    let dec = (cos_c * sin_dec0 + eta * sin_c * cos_dec0 / rho).asin();
    let ra = ref_ra + (xi * sin_c).atan2(rho * cos_dec0 * cos_c - eta * sin_dec0 * sin_c);
    (ra.rem_euclid(std::f64::consts::TAU), dec)
}

/// Euclidean distance between two plane points.
#[inline]
pub fn distance_between(from: &Vector2, to: &Vector2) -> f64 {
    (to - from).norm()
}

/// Direction of `to` as seen from `from`, in degrees counter-clockwise from +x,
/// in `[-180, 180]`.
#[inline]
pub fn bearing_from(from: &Vector2, to: &Vector2) -> f64 {
    let d = to - from;
    d.y.atan2(d.x).to_degrees()
}
