//! Integration tests: build synthetic star fields with a known image-to-sky
//! mapping and verify the matcher recovers every correspondence, through the
//! session API, a catalog field solve, and a blind search.

use fovmatch::matcher::ARCSEC_TO_RAD;
use fovmatch::search::SearchStatus;
use fovmatch::{
    blind_search, solve_field, Centroid, MatchConfig, MatchResult, MatchSession, MatchStatus,
    ReferenceDirection, ScaleBounds, SkySearchConfig, Star, StarCatalog,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
}

/// Corners of a 100 px square plus six interior points.
const SQUARE: [(f64, f64); 10] = [
    (0.0, 0.0),
    (100.0, 0.0),
    (100.0, 100.0),
    (0.0, 100.0),
    (22.0, 61.0),
    (71.0, 18.0),
    (38.0, 83.0),
    (87.0, 47.0),
    (13.0, 29.0),
    (58.0, 92.0),
];

/// Flux that ranks detection `i` as the i-th brightest.
fn flux_for_rank(i: usize) -> f64 {
    1.0e5 * 0.95_f64.powi(i as i32)
}

/// Magnitude that ranks star `i` as the i-th brightest.
fn mag_for_rank(i: usize) -> f32 {
    6.0 + 0.02 * i as f32
}

/// Run the square scenario through the session API, with the reference plane an
/// unrotated copy of the image scaled by `scale_arcsec`.
fn square_match(scale_arcsec: f64) -> MatchResult {
    let center = ReferenceDirection::from_degrees(120.0, 30.0);
    let mut session = MatchSession::new(MatchConfig::default());
    session.set_scale_guess(10.0, 12.0).unwrap();

    session.begin_image_import(200, 200).unwrap();
    for (i, &(x, y)) in SQUARE.iter().enumerate() {
        assert!(session.import_image_point(x, y, flux_for_rank(i)).unwrap());
    }
    assert_eq!(session.complete_image_import().unwrap(), SQUARE.len());

    session.begin_reference_import(center.ra_rad, center.dec_rad);
    for (i, &(x, y)) in SQUARE.iter().enumerate() {
        let (ra, dec) = center.deproject(
            x * scale_arcsec * ARCSEC_TO_RAD,
            y * scale_arcsec * ARCSEC_TO_RAD,
        );
        assert!(session.import_reference_point(ra, dec, mag_for_rank(i)).unwrap());
    }
    assert_eq!(session.complete_reference_import().unwrap(), SQUARE.len());

    session.attempt_match().unwrap()
}

#[test]
fn test_square_resolves_every_point() {
    init_tracing();
    let result = square_match(11.0);

    assert_eq!(result.status, MatchStatus::Matched);
    assert!(result.num_image_wedges >= 10);
    assert!(result.num_reference_wedges >= 10);
    assert_eq!(result.correspondences.len(), SQUARE.len());
    for c in &result.correspondences {
        assert_eq!(c.image_index, c.reference_index, "wrong match for {}", c.image_index);
        assert!(c.confidence_ratio > 3.0);
        let (x, y) = SQUARE[c.image_index];
        assert_eq!((c.image_position.x, c.image_position.y), (x, y));
        let expected = (x * 11.0 * ARCSEC_TO_RAD, y * 11.0 * ARCSEC_TO_RAD);
        assert!((c.reference_position.x - expected.0).abs() < 1e-12);
        assert!((c.reference_position.y - expected.1).abs() < 1e-12);
    }
}

#[test]
fn test_square_out_of_scale_bounds_fails() {
    init_tracing();
    let result = square_match(240.0);

    assert!(!result.is_success());
    assert_eq!(result.num_matched_wedge_pairs, 0);
    assert_eq!(result.num_confident, 0);
    assert!(result.correspondences.is_empty());
}

#[test]
fn test_match_is_deterministic() {
    let a = square_match(11.5);
    let b = square_match(11.5);
    assert_eq!(a.status, b.status);
    assert_eq!(a.num_image_wedges, b.num_image_wedges);
    assert_eq!(a.num_reference_wedges, b.num_reference_wedges);
    assert_eq!(a.num_matched_wedge_pairs, b.num_matched_wedge_pairs);
    assert_eq!(a.correspondences, b.correspondences);
}

/// A field of `num_stars` detections and their catalog counterparts, plus
/// fainter catalog-only stars around it.
struct SyntheticField {
    center: ReferenceDirection,
    centroids: Vec<Centroid>,
    stars: Vec<Star>,
}

/// Image pixel `(x, y)` maps to tangent-plane offset `R(rotation) * (p - image center) * scale`
/// about `center`. Detection `i` is the counterpart of catalog star `i`.
#[allow(clippy::too_many_arguments)]
fn synthetic_field(
    rng: &mut StdRng,
    center: ReferenceDirection,
    size: f64,
    num_stars: usize,
    num_faint: usize,
    scale_arcsec: f64,
    rotation_deg: f64,
    noise_px: f64,
) -> SyntheticField {
    let noise = Normal::new(0.0, noise_px).unwrap();
    let (sin_r, cos_r) = rotation_deg.to_radians().sin_cos();
    let k = scale_arcsec * ARCSEC_TO_RAD;
    let half = size / 2.0;

    let mut centroids = Vec::with_capacity(num_stars);
    let mut stars = Vec::with_capacity(num_stars + num_faint);
    for i in 0..num_stars {
        let x: f64 = rng.random_range(0.0..size);
        let y: f64 = rng.random_range(0.0..size);
        let (u, v) = (x - half, y - half);
        let xi = (u * cos_r - v * sin_r) * k;
        let eta = (u * sin_r + v * cos_r) * k;
        let (ra_rad, dec_rad) = center.deproject(xi, eta);
        stars.push(Star {
            id: i as u64,
            ra_rad,
            dec_rad,
            mag: mag_for_rank(i),
        });
        centroids.push(Centroid::new(
            x + noise.sample(rng),
            y + noise.sample(rng),
            flux_for_rank(i),
        ));
    }

    let extent = half * 1.3 * k;
    for j in 0..num_faint {
        let xi = rng.random_range(-extent..extent);
        let eta = rng.random_range(-extent..extent);
        let (ra_rad, dec_rad) = center.deproject(xi, eta);
        stars.push(Star {
            id: 10_000 + j as u64,
            ra_rad,
            dec_rad,
            mag: rng.random_range(9.0..12.0),
        });
    }

    SyntheticField {
        center,
        centroids,
        stars,
    }
}

fn assert_all_correct(result: &MatchResult, image_sample_size: usize) {
    assert_eq!(result.status, MatchStatus::Matched);
    assert!(result.correspondences.len() * 2 > image_sample_size);
    for c in &result.correspondences {
        assert_eq!(
            c.catalog_id, c.image_index as u64,
            "detection {} matched to star {}",
            c.image_index, c.catalog_id
        );
        assert!(c.confidence_ratio > 3.0);
    }
}

#[test]
fn test_realistic_field_through_session() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(7);
    let field = synthetic_field(
        &mut rng,
        ReferenceDirection::from_degrees(230.0, -13.0),
        4096.0,
        60,
        200,
        11.5,
        0.0,
        0.1,
    );

    let mut session = MatchSession::new(MatchConfig::default());
    session.set_scale_guess(11.0, 12.0).unwrap();
    session.begin_image_import(4096, 4096).unwrap();
    for c in &field.centroids {
        session.import_image_point(c.x, c.y, c.flux).unwrap();
    }
    assert_eq!(session.complete_image_import().unwrap(), 40);

    session.begin_reference_import(field.center.ra_rad, field.center.dec_rad);
    for s in &field.stars {
        session.import_reference_star(s).unwrap();
    }
    assert_eq!(session.complete_reference_import().unwrap(), 120);

    let result = session.attempt_match().unwrap();
    println!(
        "{} image wedges, {} reference wedges, {} matched pairs, {} correspondences in {:.1} ms",
        result.num_image_wedges,
        result.num_reference_wedges,
        result.num_matched_wedge_pairs,
        result.correspondences.len(),
        result.match_time_ms
    );
    assert_all_correct(&result, 40);
}

#[test]
fn test_rotated_field_solve() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(42);
    let field = synthetic_field(
        &mut rng,
        ReferenceDirection::from_degrees(83.0, -1.0),
        1024.0,
        60,
        200,
        11.5,
        25.0,
        0.1,
    );
    let catalog = StarCatalog::new(16, field.stars.clone());

    let result = solve_field(
        &catalog,
        &field.centroids,
        1024,
        1024,
        ScaleBounds::new(11.0, 12.0).unwrap(),
        83.0,
        -1.0,
        &MatchConfig::default(),
    )
    .unwrap();

    assert_eq!(result.status, SearchStatus::Matched);
    assert_eq!(result.fields_tried, 1);
    assert_all_correct(result.match_result.as_ref().unwrap(), 40);
}

#[test]
fn test_blind_search_finds_field() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(3);
    // RA 0 and the starting declination put the field on the first tile
    let field = synthetic_field(
        &mut rng,
        ReferenceDirection::from_degrees(0.0, 20.0),
        1024.0,
        60,
        200,
        11.5,
        0.0,
        0.0,
    );
    let catalog = StarCatalog::new(16, field.stars.clone());
    let config = SkySearchConfig {
        start_dec_deg: 20.0,
        ..Default::default()
    };

    let result = blind_search(
        &catalog,
        &field.centroids,
        1024,
        1024,
        ScaleBounds::new(11.0, 12.0).unwrap(),
        &MatchConfig::default(),
        &config,
    )
    .unwrap();

    assert!(result.is_success());
    assert_eq!(result.center_deg, Some((0.0, 20.0)));
    assert_eq!(result.fields_tried, 1);
    assert_all_correct(result.match_result.as_ref().unwrap(), 40);
}

#[test]
fn test_unrelated_fields_do_not_match() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(11);
    let center = ReferenceDirection::from_degrees(150.0, 45.0);
    let k = 11.5 * ARCSEC_TO_RAD;

    let mut session = MatchSession::new(MatchConfig::default());
    session.set_scale_guess(11.0, 12.0).unwrap();
    session.begin_image_import(4096, 4096).unwrap();
    for i in 0..40 {
        let x = rng.random_range(0.0..4096.0);
        let y = rng.random_range(0.0..4096.0);
        session.import_image_point(x, y, flux_for_rank(i)).unwrap();
    }
    session.complete_image_import().unwrap();

    session.begin_reference_import(center.ra_rad, center.dec_rad);
    for i in 0..120 {
        let xi = rng.random_range(-2048.0..2048.0) * k;
        let eta = rng.random_range(-2048.0..2048.0) * k;
        let (ra, dec) = center.deproject(xi, eta);
        session.import_reference_point(ra, dec, mag_for_rank(i)).unwrap();
    }
    session.complete_reference_import().unwrap();

    let result = session.attempt_match().unwrap();
    assert!(!result.is_success());
    assert!(result.correspondences.is_empty());
}

#[test]
fn test_catalog_cache_round_trip_still_solves() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(5);
    let field = synthetic_field(
        &mut rng,
        ReferenceDirection::from_degrees(300.0, 60.0),
        1024.0,
        60,
        100,
        11.5,
        -40.0,
        0.0,
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.rkyv");
    StarCatalog::new(8, field.stars.clone()).save_to_file(&path).unwrap();
    let catalog = StarCatalog::load_from_file(&path).unwrap();
    assert_eq!(catalog.len(), 160);

    let result = solve_field(
        &catalog,
        &field.centroids,
        1024,
        1024,
        ScaleBounds::new(11.0, 12.0).unwrap(),
        300.0,
        60.0,
        &MatchConfig::default(),
    )
    .unwrap();
    assert_all_correct(result.match_result.as_ref().unwrap(), 40);
}
