use rkyv::{Archive, Deserialize, Serialize};

/// A "Generic" reference star used for matching.
/// The star RA & Dec assume proper motion has already been applied to the observation epoch.
/// The magnitude is a generic "brightness" value used for ranking; its exact band is
/// catalog-dependent.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Star {
    pub id: u64,
    pub ra_rad: f64,
    pub dec_rad: f64,
    pub mag: f32,
}

impl Star {
    /// Unit vector pointing to the star's position on the celestial sphere.
    pub fn uvec(&self) -> nalgebra::Vector3<f64> {
        let (rasin, racos) = self.ra_rad.sin_cos();
        let (decsin, deccos) = self.dec_rad.sin_cos();
        nalgebra::Vector3::new(deccos * racos, deccos * rasin, decsin)
    }
}

/// Convert a Hipparcos star to a generic Star, optionally propagating proper motion.
///
/// `epoch_year`: Target year for proper motion propagation (e.g. 2025.0).
/// If None, the catalog position at the Hipparcos reference epoch (J1991.25) is used.
///
/// Proper motion near the celestial poles (|dec| > ~87°) is ignored because
/// the cos(dec) divisor becomes numerically unstable.
pub fn star_from_hipparcos(
    star: &crate::catalogs::hipparcos::HipparcosStar,
    epoch_year: Option<f64>,
) -> Star {
    const HIPPARCOS_EPOCH_YEAR: f64 = 1991.25;
    // milliarcseconds/year -> radians/year
    const MAS_PER_YR_TO_RAD_PER_YR: f64 =
        2.0 * std::f64::consts::PI / (3600.0 * 1000.0 * 360.0);

    let (ra, dec) = if let Some(target_year) = epoch_year {
        let dt_years = target_year - HIPPARCOS_EPOCH_YEAR;
        let cos_dec = star.dec_rad.cos();

        let (mu_ra, mu_dec) = if cos_dec.abs() > 0.05 {
            // pm_ra from Hipparcos is mu_alpha*cos(delta)
            let mu_alpha_cos_delta = star.pm_ra * MAS_PER_YR_TO_RAD_PER_YR;
            let mu_delta = star.pm_dec * MAS_PER_YR_TO_RAD_PER_YR;
            (mu_alpha_cos_delta / cos_dec, mu_delta)
        } else {
            (0.0, 0.0)
        };

        (
            star.ra_rad + mu_ra * dt_years,
            star.dec_rad + mu_dec * dt_years,
        )
    } else {
        (star.ra_rad, star.dec_rad)
    };

    Star {
        id: star.hip as u64,
        ra_rad: ra,
        dec_rad: dec,
        mag: star.hp_to_v(),
    }
}
