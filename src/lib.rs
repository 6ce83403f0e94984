//! # fovmatch
//!
//! Blind **star-field to catalog correspondence** by wedge-shape voting.
//!
//! Given star detections from an image and a rough idea of the pixel scale,
//! `fovmatch` finds which detection is which catalog star. Rotation does not need
//! to be known, and the field center only needs to be close enough for the catalog
//! query to cover the image; with no pointing at all, the sky is tiled and each
//! field is tried in turn.
//!
//! ## Features
//!
//! - **Rotation-free matching**: local "wedge" descriptors are built from angle
//!   offsets and normalized distances, which do not change under rotation or scale
//! - **Scale-bounded**: a wedge pair is only compared when its implied pixel scale
//!   lies inside the caller's bounds
//! - **Voting**: every agreeing descriptor member votes, and a detection is only
//!   resolved when its winner clearly beats the runner-up
//! - **Blind search**: a sky tiling for images with unknown pointing
//! - **Catalogs**: Hipparcos or Gaia-style CSV, cached with [rkyv](https://docs.rs/rkyv)
//!
//! ## Example
//!
//! ```no_run
//! use fovmatch::{load_centroids_from_file, solve_field, MatchConfig, ScaleBounds, StarCatalog};
//!
//! let catalog =
//!     StarCatalog::from_hipparcos_file("data/hip2.dat", 16, Some(2025.0), Some(10.0)).unwrap();
//! let centroids = load_centroids_from_file("field.cat").unwrap();
//! let scale = ScaleBounds::new(11.0, 12.0).unwrap();
//!
//! let result = solve_field(
//!     &catalog, &centroids, 4096, 4096, scale, 230.0, -13.0, &MatchConfig::default(),
//! )
//! .unwrap();
//! if let Some(m) = result.match_result.filter(|m| m.is_success()) {
//!     for c in &m.correspondences {
//!         println!("detection {} -> star {} ({} votes)", c.image_index, c.catalog_id, c.votes);
//!     }
//! }
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Curation**: keep the brightest detections and catalog stars
//! 2. **Projection**: catalog stars are projected gnomonically about the field center
//! 3. **Wedges**: every point pair defines a wedge listing the points inside a 60°
//!    aperture by angle offset and relative distance
//! 4. **Cross-match**: image and reference wedges of compatible scale vote for the
//!    point identities whose descriptors agree
//! 5. **Resolution**: a detection takes its plurality winner if the vote ratio
//!    over the runner-up exceeds 3, and the match succeeds when more than half
//!    of the detections resolve
//!

/// Raw star catalogs; currently Hipparcos & Gaia CSV extracts
pub mod catalogs;
mod centroid;
pub mod config;
pub mod matcher;
pub mod projection;
pub mod search;
pub mod star;
pub mod starcatalog;

pub use centroid::*;
pub use config::{FovMatchConfig, OutputOptions, Parity};
pub use matcher::session::MatchSession;
pub use matcher::{
    match_samples, Correspondence, MatchConfig, MatchError, MatchResult, MatchStatus,
    ScaleBounds,
};
pub use projection::ReferenceDirection;
pub use search::{
    blind_search, solve_field, FieldSearch, SearchResult, SearchStatus, SkySearchConfig,
    SkyTiling,
};
pub use star::*;
pub use starcatalog::*;

// Plane coordinates: pixels on the image side, tangent-plane radians on the
// reference side. Both need 64-bit floats for arcsecond-level work.
pub type Vector2 = nalgebra::Vector2<f64>;
