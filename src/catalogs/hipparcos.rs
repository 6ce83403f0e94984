//! Reader for the Hipparcos new reduction (I/311, `hip2.dat`).
//!
//! Only the columns the matcher needs are kept: position, proper motion,
//! and the Hp magnitude plus B−V colour for the V-band conversion.
//! The catalog can be downloaded from
//! <http://cdsarc.u-strasbg.fr/ftp/I/311/hip2.dat.gz>.

/// A star from the Hipparcos catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct HipparcosStar {
    pub hip: u32,
    pub ra_rad: f64,
    pub dec_rad: f64,
    /// Proper motion in RA (mu_alpha * cos(delta)), mas/yr.
    pub pm_ra: f64,
    /// Proper motion in Dec, mas/yr.
    pub pm_dec: f64,
    pub hpmag: f32,
    pub b_v: f32,
}

impl HipparcosStar {
    /// Convert Hipparcos Hp magnitude and Johnson B−V colour
    /// to Johnson V using the standard 4th-order polynomial.
    ///
    /// Reference: ESA SP-1200, Volume 1, Table 1.3.5.
    /// Valid for roughly -0.2 < (B−V) < 1.8.
    pub fn hp_to_v(&self) -> f32 {
        let b = self.b_v;
        let delta = 0.304 * b - 0.202 * b * b + 0.107 * b * b * b - 0.045 * b * b * b * b;
        self.hpmag - delta
    }
}

/// Parse a single fixed-width Hipparcos record.
fn parse_hipparcos_star(record: &str) -> Option<HipparcosStar> {
    if record.len() < 171 {
        return None;
    }

    Some(HipparcosStar {
        hip: record.get(0..6)?.trim().parse().ok()?,
        ra_rad: record.get(15..28)?.trim().parse().ok()?,
        dec_rad: record.get(29..42)?.trim().parse().ok()?,
        pm_ra: record.get(51..59)?.trim().parse().ok()?,
        pm_dec: record.get(60..68)?.trim().parse().ok()?,
        hpmag: record.get(129..136)?.trim().parse().ok()?,
        b_v: record.get(152..158)?.trim().parse().ok()?,
    })
}

/// Load the Hipparcos catalog from an in-memory string.
pub fn load_hipparcos_catalog(data: &str) -> Vec<HipparcosStar> {
    data.lines().filter_map(parse_hipparcos_star).collect()
}

pub fn load_hipparcos_catalog_from_file<P: AsRef<std::path::Path>>(
    path: P,
) -> anyhow::Result<Vec<HipparcosStar>> {
    let data = std::fs::read_to_string(path)?;
    Ok(load_hipparcos_catalog(&data))
}
