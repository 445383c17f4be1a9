//! Optional extended operations.
//!
//! Extras that are not part of the stable archive API live behind the
//! [`ExperimentalOps`] trait. A client selects an implementation at
//! construction time ([`crate::Client::connect_with`]) instead of
//! having methods grafted onto it afterwards.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde_json::Value;

use crate::error::Result;
use crate::types::HduHeader;

// Sky corners the archive records in every image HDU header: the
// center plus the four corners of the HDU footprint.
const CORNER_RA_KEYS: [&str; 5] = ["CENRA1", "COR1RA1", "COR2RA1", "COR3RA1", "COR4RA1"];
const CORNER_DEC_KEYS: [&str; 5] = ["CENDEC1", "COR1DEC1", "COR2DEC1", "COR3DEC1", "COR4DEC1"];

/// Sky-coordinate bounding box of one HDU, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HduBounds {
    pub ra_min: f64,
    pub ra_max: f64,
    pub dec_min: f64,
    pub dec_max: f64,
}

/// Extended operations a client may carry.
pub trait ExperimentalOps: Send {
    /// Bounding box of one HDU derived from its header keywords, if
    /// the footprint keywords are present.
    fn hdu_bounds(&self, header: &HduHeader) -> Option<HduBounds>;

    /// Cheap sanity check of a downloaded image file. `Ok(false)`
    /// means the file exists but does not look like a FITS file; full
    /// verification is left to FITS tooling.
    fn fits_check(&self, path: &Path) -> Result<bool>;
}

/// Default implementation backed by the corner keywords.
#[derive(Debug, Default)]
pub struct CornerBounds;

impl ExperimentalOps for CornerBounds {
    fn hdu_bounds(&self, header: &HduHeader) -> Option<HduBounds> {
        let ras = keyword_values(header, &CORNER_RA_KEYS);
        let decs = keyword_values(header, &CORNER_DEC_KEYS);
        if ras.is_empty() || decs.is_empty() {
            return None;
        }
        let (ra_min, ra_max) = min_max(&ras);
        let (dec_min, dec_max) = min_max(&decs);
        Some(HduBounds {
            ra_min,
            ra_max,
            dec_min,
            dec_max,
        })
    }

    fn fits_check(&self, path: &Path) -> Result<bool> {
        let mut magic = [0u8; 6];
        File::open(path)?.read_exact(&mut magic)?;
        Ok(&magic == b"SIMPLE")
    }
}

// Header card values arrive as JSON numbers or as FITS-style strings;
// accept both.
fn keyword_values(header: &HduHeader, keys: &[&str]) -> Vec<f64> {
    keys.iter()
        .filter_map(|key| header.get(*key))
        .filter_map(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .collect()
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(lo, hi), v| (lo.min(*v), hi.max(*v)),
    )
}
