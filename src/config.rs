//! Persisted run configuration.
//!
//! Stored as JSON. Every field has a default, so a partial file is valid and an
//! empty object `{}` yields [`FovMatchConfig::default`].

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::matcher::{MatchConfig, MatchError, ScaleBounds};
use crate::search::SkySearchConfig;

/// Expected handedness of the image relative to the sky.
///
/// Serialized as `-1`, `0` or `1`. The matcher does not use it; it is carried for
/// a later solution-fitting stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Parity {
    /// Same rotation sense as the sky.
    Same,
    #[default]
    Unknown,
    /// Mirrored relative to the sky.
    Mirrored,
}

impl TryFrom<i8> for Parity {
    type Error = String;

    fn try_from(v: i8) -> Result<Self, Self::Error> {
        match v {
            -1 => Ok(Parity::Same),
            0 => Ok(Parity::Unknown),
            1 => Ok(Parity::Mirrored),
            other => Err(format!("parity must be -1, 0 or 1, got {other}")),
        }
    }
}

impl From<Parity> for i8 {
    fn from(p: Parity) -> i8 {
        match p {
            Parity::Same => -1,
            Parity::Unknown => 0,
            Parity::Mirrored => 1,
        }
    }
}

/// Where results go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Print the correspondence table on success.
    pub print_correspondences: bool,
    /// Also write the table to this file.
    pub output_path: Option<PathBuf>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            print_correspondences: true,
            output_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FovMatchConfig {
    pub parity: Parity,
    /// Lower pixel scale guess, arcsec/pixel.
    pub scale_low_arcsec: f64,
    /// Upper pixel scale guess, arcsec/pixel.
    pub scale_high_arcsec: f64,
    /// Star catalog: an rkyv cache, a Hipparcos `hip2.dat`, or a CSV extract.
    pub catalog_path: Option<PathBuf>,
    pub output: OutputOptions,
    pub matcher: MatchConfig,
    pub search: SkySearchConfig,
}

impl Default for FovMatchConfig {
    fn default() -> Self {
        Self {
            parity: Parity::Unknown,
            scale_low_arcsec: 11.0,
            scale_high_arcsec: 12.0,
            catalog_path: None,
            output: OutputOptions::default(),
            matcher: MatchConfig::default(),
            search: SkySearchConfig::default(),
        }
    }
}

impl FovMatchConfig {
    /// Parse a configuration. Out-of-range matcher settings fall back to their
    /// defaults (see [`MatchConfig::validated`]).
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let mut config: Self = serde_json::from_str(json).context("parsing configuration")?;
        config.matcher = config.matcher.validated();
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("in {}", path.display()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing configuration {}", path.display()))
    }

    /// Load `path`, or write the defaults there if it is missing or unreadable.
    pub fn load_or_init<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(e) => {
                warn!("{:#}; writing defaults", e);
                let config = Self::default();
                config.save(path)?;
                Ok(config)
            }
        }
    }

    pub fn scale_bounds(&self) -> Result<ScaleBounds, MatchError> {
        ScaleBounds::new(self.scale_low_arcsec, self.scale_high_arcsec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let c = FovMatchConfig::from_json("{}").unwrap();
        assert_eq!(c, FovMatchConfig::default());
    }

    #[test]
    fn partial_overrides() {
        let c = FovMatchConfig::from_json(
            r#"{"parity": -1, "scale_low_arcsec": 2.5, "matcher": {"image_sample_max": 25}}"#,
        )
        .unwrap();
        assert_eq!(c.parity, Parity::Same);
        assert_eq!(c.scale_low_arcsec, 2.5);
        assert_eq!(c.scale_high_arcsec, 12.0);
        assert_eq!(c.matcher.image_sample_max, 25);
        assert_eq!(c.matcher.reference_sample_max, 120);
    }

    #[test]
    fn out_of_range_matcher_settings_use_defaults() {
        let c = FovMatchConfig::from_json(
            r#"{"matcher": {"aperture_deg": -60.0, "image_sample_max": 0,
                "distance_tolerance": -1.0, "min_separation_fraction": 5.0,
                "angle_tolerance_deg": 0.05}}"#,
        )
        .unwrap();
        let d = MatchConfig::default();
        assert_eq!(c.matcher.aperture_deg, d.aperture_deg);
        assert_eq!(c.matcher.image_sample_max, d.image_sample_max);
        assert_eq!(c.matcher.distance_tolerance, d.distance_tolerance);
        assert_eq!(c.matcher.min_separation_fraction, d.min_separation_fraction);
        // valid settings are kept
        assert_eq!(c.matcher.angle_tolerance_deg, 0.05);
    }

    #[test]
    fn parity_is_an_integer() {
        assert!(FovMatchConfig::from_json(r#"{"parity": 2}"#).is_err());
        let c = FovMatchConfig {
            parity: Parity::Mirrored,
            ..Default::default()
        };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["parity"], 1);
    }

    #[test]
    fn load_or_init_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fovmatch.json");

        let c = FovMatchConfig::load_or_init(&path).unwrap();
        assert_eq!(c, FovMatchConfig::default());
        assert!(path.exists());

        std::fs::write(&path, r#"{"scale_high_arcsec": 13.0}"#).unwrap();
        let c = FovMatchConfig::load_or_init(&path).unwrap();
        assert_eq!(c.scale_high_arcsec, 13.0);

        std::fs::write(&path, "not json").unwrap();
        let c = FovMatchConfig::load_or_init(&path).unwrap();
        assert_eq!(c, FovMatchConfig::default());
        assert_eq!(FovMatchConfig::load(&path).unwrap(), c);
    }

    #[test]
    fn scale_bounds_are_validated() {
        let c = FovMatchConfig {
            scale_low_arcsec: 5.0,
            scale_high_arcsec: 4.0,
            ..Default::default()
        };
        assert!(c.scale_bounds().is_err());
        assert_eq!(FovMatchConfig::default().scale_bounds().unwrap().low_arcsec(), 11.0);
    }
}
