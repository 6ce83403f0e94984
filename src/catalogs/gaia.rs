use std::io::Read;
use std::path::Path;

use crate::Star;

/// One row of a Gaia-style CSV extract: `source_id, ra_deg, dec_deg, mag, ...`.
/// Further columns (colours, parallax, proper motion) are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct GaiaStar {
    pub source_id: u64,
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub phot_g_mean_mag: f32,
}

impl GaiaStar {
    pub fn to_star(&self) -> Star {
        Star {
            id: self.source_id,
            ra_rad: self.ra_deg.to_radians(),
            dec_rad: self.dec_deg.to_radians(),
            mag: self.phot_g_mean_mag,
        }
    }
}

fn parse_field<T: std::str::FromStr>(record: &csv::StringRecord, idx: usize) -> Option<T> {
    record.get(idx)?.trim().parse().ok()
}

/// Read a Gaia CSV extract (with a header row). Rows with missing or
/// unparsable position/magnitude are skipped.
pub fn read_gaia_csv_from_reader<R: Read>(reader: R) -> anyhow::Result<Vec<GaiaStar>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let mut stars = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let parsed = (|| {
            Some(GaiaStar {
                source_id: parse_field(&record, 0)?,
                ra_deg: parse_field(&record, 1)?,
                dec_deg: parse_field(&record, 2)?,
                phot_g_mean_mag: parse_field(&record, 3)?,
            })
        })();
        if let Some(star) = parsed {
            stars.push(star);
        }
    }
    Ok(stars)
}

pub fn read_gaia_csv<P: AsRef<Path>>(file: P) -> anyhow::Result<Vec<GaiaStar>> {
    let f = std::fs::File::open(file)?;
    read_gaia_csv_from_reader(f)
}
