//! Spatial star catalog optimized for fast cone (angular-radius) searches.
//!
//! `StarCatalog` stores stars in an equal-area spherical binning:
//! latitude is partitioned into `3 * nside` bins in `z = sin(dec)`, and
//! longitude into `4 * nside` bins in right ascension, for a total of
//! `12 * nside^2` cells. Each cell maps to a compact slice of star indices.
//!
//! Query flow:
//! 1. Compute candidate cells intersecting the cone around a pointing direction.
//! 2. Scan only stars in those cells.
//! 3. Apply exact angular filtering using a dot-product threshold.
//!
//! The matcher only needs the cone search, exposed through [`ReferenceCatalog`].

use std::f64::consts::{PI, TAU};
use std::path::Path;

use anyhow::Context;
use nalgebra::Vector3;
use rkyv::{Archive, Deserialize, Serialize};
use tracing::info;

use crate::catalogs::gaia::read_gaia_csv;
use crate::catalogs::hipparcos::load_hipparcos_catalog_from_file;
use crate::star::star_from_hipparcos;
use crate::Star;

/// Source of reference stars around a sky position.
///
/// Implementors return every star within `radius_rad` of `(ra_rad, dec_rad)`,
/// in any order. The matcher ranks them by magnitude itself.
pub trait ReferenceCatalog {
    fn find_stars(&self, ra_rad: f64, dec_rad: f64, radius_rad: f64) -> Vec<Star>;
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub struct StarCatalog {
    pub nside: u32,
    pub n_lat: u32,
    pub n_lon: u32,
    pub stars: Vec<Star>,
    pub cell_offsets: Vec<u32>,
    pub star_indices: Vec<u32>,
}

impl StarCatalog {
    /// Build a catalog and spatial index from owned stars.
    ///
    /// `nside` controls resolution and must be greater than zero.
    /// The number of sky cells is `12 * nside^2`.
    pub fn new(nside: u32, stars: Vec<Star>) -> Self {
        assert!(nside > 0, "nside must be > 0");
        let n_lat = 3 * nside;
        let n_lon = 4 * nside;
        let n_cells = (n_lat * n_lon) as usize;

        let mut bins: Vec<Vec<u32>> = vec![Vec::new(); n_cells];
        for (star_idx, star) in stars.iter().enumerate() {
            let cell = Self::cell_for_radec(n_lat, n_lon, star.ra_rad, star.dec_rad);
            bins[cell as usize].push(star_idx as u32);
        }

        let mut cell_offsets = Vec::with_capacity(n_cells + 1);
        let mut star_indices = Vec::with_capacity(stars.len());
        cell_offsets.push(0);
        for cell_bin in bins {
            star_indices.extend(cell_bin);
            cell_offsets.push(star_indices.len() as u32);
        }

        Self {
            nside,
            n_lat,
            n_lon,
            stars,
            cell_offsets,
            star_indices,
        }
    }

    /// Build from the Hipparcos `hip2.dat` file.
    ///
    /// Positions are propagated to `epoch_year` when given; stars fainter than
    /// `max_magnitude` are dropped.
    pub fn from_hipparcos_file<P: AsRef<Path>>(
        path: P,
        nside: u32,
        epoch_year: Option<f64>,
        max_magnitude: Option<f32>,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        info!("Loading Hipparcos catalog from {}", path.display());
        let hip_stars = load_hipparcos_catalog_from_file(path)
            .with_context(|| format!("reading Hipparcos catalog {}", path.display()))?;
        let stars: Vec<Star> = hip_stars
            .iter()
            .map(|h| star_from_hipparcos(h, epoch_year))
            .filter(|s| max_magnitude.map_or(true, |m| s.mag <= m))
            .collect();
        info!("Kept {} of {} Hipparcos stars", stars.len(), hip_stars.len());
        Ok(Self::new(nside, stars))
    }

    /// Build from a Gaia-style CSV extract (`source_id, ra_deg, dec_deg, mag, ...`).
    pub fn from_gaia_csv<P: AsRef<Path>>(
        path: P,
        nside: u32,
        max_magnitude: Option<f32>,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        info!("Loading CSV catalog from {}", path.display());
        let stars: Vec<Star> = read_gaia_csv(path)
            .with_context(|| format!("reading CSV catalog {}", path.display()))?
            .iter()
            .map(|g| g.to_star())
            .filter(|s| max_magnitude.map_or(true, |m| s.mag <= m))
            .collect();
        info!("Loaded {} CSV catalog stars", stars.len());
        Ok(Self::new(nside, stars))
    }

    /// Return the total number of stars in the catalog.
    pub fn len(&self) -> usize {
        self.stars.len()
    }

    /// Return `true` when the catalog contains no stars.
    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    /// Return all catalog stars as an immutable slice.
    pub fn stars(&self) -> &[Star] {
        &self.stars
    }

    /// Query stars within an angular radius of a pointing direction.
    ///
    /// Input coordinates are in radians. Returns indices into the internal star storage.
    pub fn query_indices(&self, ra_rad: f64, dec_rad: f64, radius_rad: f64) -> Vec<usize> {
        let dir = radec_to_uvec(ra_rad, dec_rad);
        self.query_indices_from_uvec(dir, radius_rad)
    }

    /// Query stars within an angular radius of a pointing direction.
    pub fn query_stars(&self, ra_rad: f64, dec_rad: f64, radius_rad: f64) -> Vec<&Star> {
        self.query_indices(ra_rad, dec_rad, radius_rad)
            .into_iter()
            .map(|idx| &self.stars[idx])
            .collect()
    }

    /// Query stars around a (possibly non-unit) direction vector.
    ///
    /// `dir` is normalized internally; `radius_rad` is clamped to `[0, π]`.
    pub fn query_indices_from_uvec(&self, dir: Vector3<f64>, radius_rad: f64) -> Vec<usize> {
        if self.is_empty() {
            return Vec::new();
        }
        let radius = radius_rad.clamp(0.0, PI);
        let dir = normalize_or_fallback(dir);
        let cos_radius = radius.cos();

        let lon_step = TAU / self.n_lon as f64;

        let dec_center = dir.z.clamp(-1.0, 1.0).asin();
        let dec_min = (dec_center - radius).max(-PI / 2.0);
        let dec_max = (dec_center + radius).min(PI / 2.0);
        let covers_pole =
            dec_center + radius >= PI / 2.0 || dec_center - radius <= -PI / 2.0;

        // Widest RA extent of a cone that does not contain a pole
        let lon_half_span = if covers_pole {
            PI
        } else {
            (radius.sin() / dec_center.cos()).clamp(-1.0, 1.0).asin() + lon_step
        };

        let mut phi = dir.y.atan2(dir.x);
        if phi < 0.0 {
            phi += TAU;
        }
        let lon_min = phi - lon_half_span;
        let lon_max = phi + lon_half_span;

        let mut out = Vec::new();
        for lat_bin in Self::z_bin_range(self.n_lat, dec_min.sin(), dec_max.sin()) {
            if lon_max - lon_min >= TAU {
                for lon_bin in 0..self.n_lon {
                    self.collect_cell_matches(lat_bin, lon_bin, dir, cos_radius, &mut out);
                }
                continue;
            }

            self.for_each_wrapped_lon_bin(lon_min, lon_max, |lon_bin| {
                self.collect_cell_matches(lat_bin, lon_bin, dir, cos_radius, &mut out);
            });
        }

        out.sort_unstable();
        out.dedup();
        out
    }

    fn collect_cell_matches(
        &self,
        lat_bin: u32,
        lon_bin: u32,
        dir: Vector3<f64>,
        cos_radius: f64,
        out: &mut Vec<usize>,
    ) {
        let cell = (lat_bin * self.n_lon + lon_bin) as usize;
        let start = self.cell_offsets[cell] as usize;
        let end = self.cell_offsets[cell + 1] as usize;

        for flat_idx in start..end {
            let star_idx = self.star_indices[flat_idx] as usize;
            let star_dir = self.stars[star_idx].uvec();
            if dir.dot(&star_dir) >= cos_radius {
                out.push(star_idx);
            }
        }
    }

    fn for_each_wrapped_lon_bin<F>(&self, lon_min: f64, lon_max: f64, mut f: F)
    where
        F: FnMut(u32),
    {
        let start_bin = Self::phi_to_lon_bin(self.n_lon, wrap_angle(lon_min));
        let end_bin = Self::phi_to_lon_bin(self.n_lon, wrap_angle(lon_max));

        if start_bin <= end_bin {
            for lon_bin in start_bin..=end_bin {
                f(lon_bin);
            }
            return;
        }

        for lon_bin in start_bin..self.n_lon {
            f(lon_bin);
        }
        for lon_bin in 0..=end_bin {
            f(lon_bin);
        }
    }

    fn z_bin_range(n_lat: u32, z_min: f64, z_max: f64) -> std::ops::RangeInclusive<u32> {
        Self::z_to_lat_bin(n_lat, z_min)..=Self::z_to_lat_bin(n_lat, z_max)
    }

    fn cell_for_radec(n_lat: u32, n_lon: u32, ra_rad: f64, dec_rad: f64) -> u32 {
        let mut phi = wrap_angle(ra_rad);
        if phi >= TAU {
            phi = 0.0;
        }
        let z = dec_rad.sin().clamp(-1.0, 1.0);
        Self::z_to_lat_bin(n_lat, z) * n_lon + Self::phi_to_lon_bin(n_lon, phi)
    }

    fn z_to_lat_bin(n_lat: u32, z: f64) -> u32 {
        let u = ((z.clamp(-1.0, 1.0) + 1.0) * 0.5).clamp(0.0, 1.0);
        ((u * n_lat as f64).floor() as u32).min(n_lat - 1)
    }

    fn phi_to_lon_bin(n_lon: u32, phi: f64) -> u32 {
        let u = (phi / TAU).clamp(0.0, 1.0 - f64::EPSILON);
        ((u * n_lon as f64).floor() as u32).min(n_lon - 1)
    }
}

impl ReferenceCatalog for StarCatalog {
    fn find_stars(&self, ra_rad: f64, dec_rad: f64, radius_rad: f64) -> Vec<Star> {
        self.query_stars(ra_rad, dec_rad, radius_rad)
            .into_iter()
            .cloned()
            .collect()
    }
}

// ── Serialization ───────────────────────────────────────────────────────────

impl StarCatalog {
    /// Serialize the catalog and its index to bytes using rkyv.
    pub fn to_rkyv_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| anyhow::anyhow!("rkyv serialization failed: {}", e))?;
        Ok(bytes.to_vec())
    }

    /// Save the catalog to a cache file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let bytes = self.to_rkyv_bytes()?;
        std::fs::write(path, &bytes)
            .with_context(|| format!("writing catalog cache {}", path.display()))?;
        info!("Saved catalog to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Load a catalog previously written by [`StarCatalog::save_to_file`].
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading catalog cache {}", path.display()))?;
        let catalog = rkyv::from_bytes::<Self, rkyv::rancor::Error>(&bytes)
            .map_err(|e| anyhow::anyhow!("rkyv deserialization failed: {}", e))?;
        info!("Loaded catalog: {} stars", catalog.len());
        Ok(catalog)
    }
}

fn wrap_angle(theta_rad: f64) -> f64 {
    theta_rad.rem_euclid(TAU)
}

fn radec_to_uvec(ra_rad: f64, dec_rad: f64) -> Vector3<f64> {
    let (sin_ra, cos_ra) = ra_rad.sin_cos();
    let (sin_dec, cos_dec) = dec_rad.sin_cos();
    Vector3::new(cos_dec * cos_ra, cos_dec * sin_ra, sin_dec)
}

fn normalize_or_fallback(v: Vector3<f64>) -> Vector3<f64> {
    let n = v.norm();
    if n > 0.0 {
        v / n
    } else {
        Vector3::new(1.0, 0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deg2rad(d: f64) -> f64 {
        d.to_radians()
    }

    fn star(id: u64, ra_deg: f64, dec_deg: f64, mag: f32) -> Star {
        Star {
            id,
            ra_rad: deg2rad(ra_deg),
            dec_rad: deg2rad(dec_deg),
            mag,
        }
    }

    #[test]
    fn cone_query_finds_nearby_stars() {
        let stars = vec![
            star(1, 0.0, 0.0, 2.0),
            star(2, 2.0, 1.0, 2.5),
            star(3, 40.0, -10.0, 5.0),
        ];

        let index = StarCatalog::new(8, stars);
        let hits = index.query_stars(deg2rad(0.5), deg2rad(0.25), deg2rad(3.0));
        let mut ids: Vec<u64> = hits.iter().map(|s| s.id).collect();
        ids.sort_unstable();

        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn cone_query_handles_ra_wraparound() {
        let stars = vec![
            star(10, 359.0, 0.0, 3.0),
            star(11, 1.0, 0.0, 3.0),
            star(12, 180.0, 0.0, 3.0),
        ];

        let index = StarCatalog::new(8, stars);
        let mut ids: Vec<u64> = index
            .find_stars(deg2rad(0.0), deg2rad(0.0), deg2rad(3.0))
            .iter()
            .map(|s| s.id)
            .collect();
        ids.sort_unstable();

        assert_eq!(ids, vec![10, 11]);
    }

    #[test]
    fn cone_query_matches_brute_force() {
        // Deterministic pseudo-random sky
        let mut stars = Vec::new();
        let mut seed: u64 = 12345;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 11) as f64 / (1u64 << 53) as f64
        };
        for id in 0..3000 {
            let ra = next() * 360.0;
            let dec = (2.0 * next() - 1.0).asin().to_degrees();
            stars.push(star(id, ra, dec, 6.0));
        }
        let catalog = StarCatalog::new(8, stars);

        for &(ra, dec, r) in &[(120.0, 30.0, 5.0), (10.0, 88.0, 4.0), (300.0, -60.0, 12.0)] {
            let query_dir = radec_to_uvec(deg2rad(ra), deg2rad(dec));
            let expected: Vec<u64> = catalog
                .stars
                .iter()
                .filter(|s| query_dir.dot(&s.uvec()) >= deg2rad(r).cos())
                .map(|s| s.id)
                .collect();
            let mut got: Vec<u64> = catalog
                .query_stars(deg2rad(ra), deg2rad(dec), deg2rad(r))
                .iter()
                .map(|s| s.id)
                .collect();
            got.sort_unstable();
            assert_eq!(got, expected, "cone at ({ra}, {dec}) r={r}");
        }
    }

    #[test]
    fn empty_catalog_returns_nothing() {
        let catalog = StarCatalog::new(4, Vec::new());
        assert!(catalog.is_empty());
        assert!(catalog.find_stars(0.0, 0.0, 1.0).is_empty());
    }

    #[test]
    fn rkyv_cache_round_trip() {
        let catalog = StarCatalog::new(
            4,
            vec![star(5, 10.0, 10.0, 4.0), star(6, 10.5, 10.2, 4.5)],
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.rkyv");
        catalog.save_to_file(&path).unwrap();
        let loaded = StarCatalog::load_from_file(&path).unwrap();
        assert_eq!(loaded.stars, catalog.stars);
        assert_eq!(loaded.cell_offsets, catalog.cell_offsets);
        assert_eq!(
            loaded.query_indices(deg2rad(10.2), deg2rad(10.1), deg2rad(1.0)),
            vec![0, 1]
        );
    }

    #[test]
    fn build_from_hipparcos_file() {
        use crate::catalogs::hipparcos::tests::record;
        let data = format!(
            "{}\n{}\n{}\n",
            record(1, 0.10, 0.20, 3.0),
            record(2, 0.11, 0.21, 9.0),
            record(3, 3.00, -0.50, 4.0)
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hip2.dat");
        std::fs::write(&path, data).unwrap();

        let all = StarCatalog::from_hipparcos_file(&path, 4, None, None).unwrap();
        assert_eq!(all.len(), 3);
        let bright = StarCatalog::from_hipparcos_file(&path, 4, Some(2025.0), Some(6.0)).unwrap();
        let ids: Vec<u64> = bright.stars().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn build_from_gaia_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stars.csv");
        std::fs::write(&path, "id,ra,dec,g\n1,10.0,5.0,8.0\n2,10.1,5.1,13.0\n").unwrap();
        let catalog = StarCatalog::from_gaia_csv(&path, 4, Some(12.0)).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.stars()[0].id, 1);
    }
}
