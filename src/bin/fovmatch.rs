use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fovmatch::search::MIN_DETECTIONS;
use fovmatch::{
    load_centroids_from_file, Correspondence, FieldSearch, FovMatchConfig, SearchResult,
    StarCatalog,
};

#[derive(Parser)]
#[command(name = "fovmatch")]
#[command(about = "Match image star detections to a reference catalog")]
struct Args {
    /// Detection table: one `x y flux` per line, `#` starts a comment
    detections: PathBuf,

    /// JSON configuration file; created with defaults if missing
    #[arg(long)]
    config: Option<PathBuf>,

    /// Star catalog (.rkyv cache, .csv extract, or Hipparcos hip2.dat)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Image width in pixels
    #[arg(long, default_value = "4096")]
    width: u32,

    /// Image height in pixels
    #[arg(long, default_value = "4096")]
    height: u32,

    /// Approximate field center RA in degrees; omit for a blind search
    #[arg(long, requires = "dec", allow_hyphen_values = true, value_parser = parse_ra)]
    ra: Option<f64>,

    /// Approximate field center Dec in degrees; omit for a blind search
    #[arg(long, requires = "ra", allow_hyphen_values = true, value_parser = parse_dec)]
    dec: Option<f64>,

    /// Lower pixel scale bound, arcsec/pixel [default: from config, 11]
    #[arg(long)]
    scale_low: Option<f64>,

    /// Upper pixel scale bound, arcsec/pixel [default: from config, 12]
    #[arg(long)]
    scale_high: Option<f64>,

    /// Proper-motion epoch (year) for Hipparcos catalogs
    #[arg(long)]
    epoch: Option<f64>,

    /// Write a catalog cache (.rkyv) after loading
    #[arg(long)]
    save_cache: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

const CATALOG_NSIDE: u32 = 16;

fn parse_degrees(s: &str) -> Result<f64, String> {
    s.parse::<f64>().map_err(|e| format!("{s:?} is not a number: {e}"))
}

/// Right ascension in `[0, 360)` degrees.
fn parse_ra(s: &str) -> Result<f64, String> {
    let ra = parse_degrees(s)?;
    if (0.0..360.0).contains(&ra) {
        Ok(ra)
    } else {
        Err(format!("RA must be in [0, 360) degrees, got {ra}"))
    }
}

/// Declination strictly inside `(-90, 90)` degrees.
fn parse_dec(s: &str) -> Result<f64, String> {
    let dec = parse_degrees(s)?;
    if dec > -90.0 && dec < 90.0 {
        Ok(dec)
    } else {
        Err(format!("Dec must be in (-90, 90) degrees, got {dec}"))
    }
}

fn load_catalog(path: &Path, epoch: Option<f64>) -> Result<StarCatalog> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("rkyv") => StarCatalog::load_from_file(path),
        Some("csv") => StarCatalog::from_gaia_csv(path, CATALOG_NSIDE, None),
        _ => StarCatalog::from_hipparcos_file(path, CATALOG_NSIDE, epoch, None),
    }
}

fn format_correspondences(correspondences: &[Correspondence]) -> String {
    correspondences
        .iter()
        .map(|c| {
            format!(
                "{:4} {:6.1} {:6.1} | {:4} {:8.4} {:8.4} | {:4} {:5.1}\n",
                c.image_index,
                c.image_position.x,
                c.image_position.y,
                c.reference_index,
                c.ra_rad.to_degrees(),
                c.dec_rad.to_degrees(),
                c.votes,
                c.confidence_ratio
            )
        })
        .collect()
}

fn report(result: &SearchResult, config: &FovMatchConfig) -> Result<()> {
    let Some(m) = result.match_result.as_ref() else {
        return Ok(());
    };
    if let Some((ra, dec)) = result.center_deg {
        println!("match succeeded at RA {ra:.4}, Dec {dec:.4}");
    }
    println!(
        "{} correspondences, {} image / {} reference wedges, {:.1} ms",
        m.correspondences.len(),
        m.num_image_wedges,
        m.num_reference_wedges,
        result.search_time_ms
    );

    let table = format_correspondences(&m.correspondences);
    if config.output.print_correspondences {
        print!("{table}");
    }
    if let Some(path) = &config.output.output_path {
        std::fs::write(path, &table)
            .with_context(|| format!("writing correspondences to {}", path.display()))?;
        info!("Wrote correspondences to {}", path.display());
    }
    Ok(())
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let mut config = match &args.config {
        Some(path) => FovMatchConfig::load_or_init(path)?,
        None => FovMatchConfig::default(),
    };
    if let Some(low) = args.scale_low {
        config.scale_low_arcsec = low;
    }
    if let Some(high) = args.scale_high {
        config.scale_high_arcsec = high;
    }
    let scale = config.scale_bounds()?;

    let centroids = load_centroids_from_file(&args.detections)?;
    let valid = centroids.iter().filter(|c| c.brightness().is_some()).count();
    if valid < MIN_DETECTIONS {
        bail!(
            "{} has {} valid detections, need at least {}",
            args.detections.display(),
            valid,
            MIN_DETECTIONS
        );
    }

    let Some(catalog_path) = args.catalog.as_ref().or(config.catalog_path.as_ref()) else {
        bail!("no catalog given: use --catalog or set catalog_path in the config");
    };
    let catalog = load_catalog(catalog_path, args.epoch)?;
    if let Some(cache) = &args.save_cache {
        catalog.save_to_file(cache)?;
    }

    let mut search = FieldSearch::new(
        &catalog,
        &centroids,
        args.width,
        args.height,
        scale,
        config.matcher.clone(),
        config.search.clone(),
    )?;
    info!(
        "{} detections, scale [{:.3}, {:.3}] arcsec/pixel",
        search.num_detections(),
        search.geometry().scale.low_arcsec(),
        search.geometry().scale.high_arcsec()
    );

    let result = match (args.ra, args.dec) {
        (Some(ra), Some(dec)) => search.solve_at(ra, dec)?,
        _ => search.blind_search()?,
    };

    if result.is_success() {
        report(&result, &config)?;
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "match failed ({:?}, {} fields tried)",
            result.status, result.fields_tried
        );
        Ok(ExitCode::FAILURE)
    }
}
