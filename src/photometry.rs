//! Aperture photometry tables

use std::{fmt, path::Path};

use rayon::prelude::*;
use serde::Serialize;

use crate::{
    aperture::Aperture,
    geometry::OverlapMethod,
    image::{Image, ImageError, Mask},
};

#[derive(thiserror::Error, Debug)]
pub enum PhotometryError {
    #[error("invalid photometry input")]
    Image(#[from] ImageError),
    #[error("failed to write the photometry table")]
    Csv(#[from] csv::Error),
}
type Result<T> = std::result::Result<T, PhotometryError>;

/// Optional inputs of [`aperture_photometry`]
#[derive(Debug, Default, Clone)]
pub struct PhotometryOptions<'a> {
    error: Option<&'a Image>,
    mask: Option<&'a Mask>,
    method: OverlapMethod,
}
impl<'a> PhotometryOptions<'a> {
    /// 1-sigma errors of the image pixels
    pub fn error(self, error: &'a Image) -> Self {
        Self {
            error: Some(error),
            ..self
        }
    }
    pub fn mask(self, mask: &'a Mask) -> Self {
        Self {
            mask: Some(mask),
            ..self
        }
    }
    pub fn method(self, method: OverlapMethod) -> Self {
        Self { method, ..self }
    }
}

/// One row of the photometry table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotometryRow {
    pub id: usize,
    pub xcenter: f64,
    pub ycenter: f64,
    pub aperture_sum: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aperture_sum_err: Option<f64>,
    /// Unmasked area of the aperture overlapping the image
    pub aperture_area: f64,
}

/// Aperture photometry results, one row per aperture
#[derive(Debug, Default, Clone)]
pub struct PhotometryTable {
    rows: Vec<PhotometryRow>,
}
impl PhotometryTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
    pub fn rows(&self) -> &[PhotometryRow] {
        &self.rows
    }
    pub fn aperture_sum(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.aperture_sum).collect()
    }
    pub fn aperture_sum_err(&self) -> Option<Vec<f64>> {
        self.rows.iter().map(|r| r.aperture_sum_err).collect()
    }
    pub fn aperture_area(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.aperture_area).collect()
    }
    /// Writes the table to a CSV file
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)?;
        for row in &self.rows {
            wtr.serialize(row)?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}
impl fmt::Display for PhotometryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>4} {:>10} {:>10} {:>14} {:>14} {:>12}",
            "ID", "XCENTER", "YCENTER", "SUM", "SUM ERR", "AREA"
        )?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>4} {:>10.3} {:>10.3} {:>14.6e} {:>14} {:>12.3}",
                row.id,
                row.xcenter,
                row.ycenter,
                row.aperture_sum,
                row.aperture_sum_err
                    .map(|e| format!("{:.6e}", e))
                    .unwrap_or_else(|| "-".to_string()),
                row.aperture_area
            )?;
        }
        Ok(())
    }
}

/// Combines the user mask with the mask of the non-finite image pixels
///
/// Returns `None` when no pixel is masked.
pub fn effective_mask(image: &Image, mask: Option<&Mask>) -> Option<Mask> {
    let non_finite = image.non_finite_mask();
    let n_bad = non_finite.count();
    if n_bad > 0 {
        log::warn!(
            "{} non-finite image pixel(s) are automatically masked",
            n_bad
        );
    }
    match (mask, n_bad) {
        (Some(mask), 0) => Some(mask.clone()),
        (Some(mask), _) => Some(mask.or(&non_finite)),
        (None, 0) => None,
        (None, _) => Some(non_finite),
    }
}

/// Performs aperture photometry of `image` for each aperture
pub fn aperture_photometry<A: Aperture>(
    image: &Image,
    apertures: &[A],
    options: PhotometryOptions,
) -> Result<PhotometryTable> {
    if let Some(error) = options.error {
        image.check_shape("error", error.shape())?;
    }
    if let Some(mask) = options.mask {
        image.check_shape("mask", mask.shape())?;
    }
    let mask = effective_mask(image, options.mask);
    let rows = apertures
        .par_iter()
        .enumerate()
        .map(|(k, aperture)| {
            let result =
                aperture.do_photometry(image, options.error, mask.as_ref(), options.method);
            let (xcenter, ycenter) = aperture.center();
            PhotometryRow {
                id: k + 1,
                xcenter,
                ycenter,
                aperture_sum: result.sum,
                aperture_sum_err: result.sum_err,
                aperture_area: result.area,
            }
        })
        .collect();
    Ok(PhotometryTable { rows })
}
