//! Local peak detection
//!
//! A pixel is a peak if it is the maximum of its footprint, i.e. the box
//! or boolean footprint centred on it, and if it is strictly above the
//! detection threshold. Pixels outside the image count as 0 in the
//! footprint maximum and non-finite pixels are never peaks nor footprint
//! maxima.
//!
//! The border exclusion is set with [`BorderWidth`]: a single width for all
//! the image sides or a pair of `(ny, nx)` widths for the top/bottom and
//! left/right sides.
//!
//! ```
//! use aperture_profiles::{Image, PeakFinder};
//!
//! let image = Image::from_fn(32, 32, |y, x| if (y, x) == (10, 20) { 5. } else { 0. });
//! let peaks = PeakFinder::new(1.).border_width((2, 4)).find(&image).unwrap();
//! assert_eq!(peaks.len(), 1);
//! assert_eq!((peaks.rows()[0].x_peak, peaks.rows()[0].y_peak), (20, 10));
//! ```

use std::{fmt, path::Path, str::FromStr};

use itertools::iproduct;
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::Serialize;

use crate::image::{Image, ImageError, Mask};

#[derive(thiserror::Error, Debug)]
pub enum PeakError {
    #[error("invalid peak finder input")]
    Image(#[from] ImageError),
    #[error("the footprint has no selected pixel")]
    EmptyFootprint,
    #[error("box size must be positive")]
    BoxSize,
    #[error("border width {border:?} leaves no pixel in the {shape:?} image")]
    Border {
        border: (usize, usize),
        shape: (usize, usize),
    },
    #[error("failed to parse border width {0:?}")]
    ParseBorder(String),
    #[error("failed to write the peak table")]
    Csv(#[from] csv::Error),
}
type Result<T> = std::result::Result<T, PeakError>;

/// Detection threshold
#[derive(Debug, Clone, Copy)]
pub enum Threshold<'a> {
    Value(f64),
    /// Per-pixel threshold with the image shape
    Map(&'a Image),
}
impl From<f64> for Threshold<'_> {
    fn from(value: f64) -> Self {
        Threshold::Value(value)
    }
}
impl<'a> From<&'a Image> for Threshold<'a> {
    fn from(map: &'a Image) -> Self {
        Threshold::Map(map)
    }
}
impl Threshold<'_> {
    fn at(&self, y: usize, x: usize) -> f64 {
        match self {
            Threshold::Value(value) => *value,
            Threshold::Map(map) => map[(y, x)],
        }
    }
}

/// Width of the image border where peaks are discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderWidth {
    /// Same width on all sides
    Uniform(usize),
    /// Widths along the y and x axes
    Axes { ny: usize, nx: usize },
}
impl Default for BorderWidth {
    fn default() -> Self {
        BorderWidth::Uniform(0)
    }
}
impl From<usize> for BorderWidth {
    fn from(width: usize) -> Self {
        BorderWidth::Uniform(width)
    }
}
impl From<(usize, usize)> for BorderWidth {
    fn from((ny, nx): (usize, usize)) -> Self {
        BorderWidth::Axes { ny, nx }
    }
}
impl BorderWidth {
    /// The `(ny, nx)` border widths
    pub fn widths(&self) -> (usize, usize) {
        match *self {
            BorderWidth::Uniform(width) => (width, width),
            BorderWidth::Axes { ny, nx } => (ny, nx),
        }
    }
}
impl FromStr for BorderWidth {
    type Err = PeakError;

    /// Parses `n` or `ny,nx`
    fn from_str(s: &str) -> Result<Self> {
        let parse = |v: &str| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| PeakError::ParseBorder(s.to_string()))
        };
        match s.split_once(',') {
            Some((ny, nx)) => Ok(BorderWidth::Axes {
                ny: parse(ny)?,
                nx: parse(nx)?,
            }),
            None => parse(s).map(BorderWidth::Uniform),
        }
    }
}

/// One detected peak
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakRow {
    pub id: usize,
    pub x_peak: usize,
    pub y_peak: usize,
    pub peak_value: f64,
}

/// Detected peaks sorted by decreasing value
#[derive(Debug, Default, Clone)]
pub struct PeakTable {
    rows: Vec<PeakRow>,
}
impl PeakTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
    pub fn rows(&self) -> &[PeakRow] {
        &self.rows
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
impl fmt::Display for PeakTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>4} {:>6} {:>6} {:>14}", "ID", "X_PEAK", "Y_PEAK", "PEAK_VALUE")?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>4} {:>6} {:>6} {:>14.6e}",
                row.id, row.x_peak, row.y_peak, row.peak_value
            )?;
        }
        Ok(())
    }
}

/// Peak finder builder
#[derive(Debug, Clone)]
pub struct PeakFinder<'a> {
    threshold: Threshold<'a>,
    box_size: usize,
    footprint: Option<DMatrix<bool>>,
    mask: Option<&'a Mask>,
    border_width: BorderWidth,
    npeaks: Option<usize>,
}
impl<'a> PeakFinder<'a> {
    pub fn new<T: Into<Threshold<'a>>>(threshold: T) -> Self {
        Self {
            threshold: threshold.into(),
            box_size: 3,
            footprint: None,
            mask: None,
            border_width: BorderWidth::default(),
            npeaks: None,
        }
    }
    /// Size of the square footprint, ignored if a footprint is given
    pub fn box_size(self, box_size: usize) -> Self {
        Self { box_size, ..self }
    }
    pub fn footprint(self, footprint: DMatrix<bool>) -> Self {
        Self {
            footprint: Some(footprint),
            ..self
        }
    }
    /// Masked pixels are never peaks
    pub fn mask(self, mask: &'a Mask) -> Self {
        Self {
            mask: Some(mask),
            ..self
        }
    }
    pub fn border_width<B: Into<BorderWidth>>(self, border_width: B) -> Self {
        Self {
            border_width: border_width.into(),
            ..self
        }
    }
    /// Keeps only the `npeaks` brightest peaks
    pub fn npeaks(self, npeaks: usize) -> Self {
        Self {
            npeaks: Some(npeaks),
            ..self
        }
    }

    fn footprint_offsets(&self) -> Result<Vec<(isize, isize)>> {
        let footprint = match &self.footprint {
            Some(footprint) => footprint.clone(),
            None if self.box_size == 0 => return Err(PeakError::BoxSize),
            None => DMatrix::from_element(self.box_size, self.box_size, true),
        };
        let (fy, fx) = footprint.shape();
        let (cy, cx) = ((fy / 2) as isize, (fx / 2) as isize);
        let offsets: Vec<_> = iproduct!(0..fy, 0..fx)
            .filter(|&(j, i)| footprint[(j, i)])
            .map(|(j, i)| (j as isize - cy, i as isize - cx))
            .collect();
        if offsets.is_empty() {
            Err(PeakError::EmptyFootprint)
        } else {
            Ok(offsets)
        }
    }

    /// Finds the peaks of `image`
    pub fn find(&self, image: &Image) -> Result<PeakTable> {
        if let Threshold::Map(map) = self.threshold {
            image.check_shape("threshold", map.shape())?;
        }
        if let Some(mask) = self.mask {
            image.check_shape("mask", mask.shape())?;
        }
        let (ny, nx) = image.shape();
        let (by, bx) = self.border_width.widths();
        if 2 * by >= ny || 2 * bx >= nx {
            return Err(PeakError::Border {
                border: (by, bx),
                shape: (ny, nx),
            });
        }
        let offsets = self.footprint_offsets()?;

        let value_at = |y: isize, x: isize| -> f64 {
            if y < 0 || x < 0 || y >= ny as isize || x >= nx as isize {
                0.
            } else {
                image[(y as usize, x as usize)]
            }
        };
        let mut peaks: Vec<(usize, usize, f64)> = (by..ny - by)
            .into_par_iter()
            .flat_map_iter(|y| {
                let offsets = &offsets;
                let value_at = &value_at;
                (bx..nx - bx).filter_map(move |x| {
                    let value = image[(y, x)];
                    // a NaN threshold rejects the pixel
                    if !value.is_finite()
                        || !(value > self.threshold.at(y, x))
                        || self.mask.map_or(false, |mask| mask[(y, x)])
                    {
                        return None;
                    }
                    let local_max = offsets
                        .iter()
                        .map(|&(dy, dx)| value_at(y as isize + dy, x as isize + dx))
                        .filter(|v| v.is_finite())
                        .fold(f64::NEG_INFINITY, f64::max);
                    (value == local_max).then_some((y, x, value))
                })
            })
            .collect();

        if peaks.is_empty() {
            log::warn!("No local peaks were found");
            return Ok(PeakTable::default());
        }
        peaks.sort_by(|a, b| b.2.total_cmp(&a.2));
        if let Some(npeaks) = self.npeaks {
            peaks.truncate(npeaks);
        }
        log::info!("found {} peaks", peaks.len());
        Ok(PeakTable {
            rows: peaks
                .into_iter()
                .enumerate()
                .map(|(k, (y_peak, x_peak, peak_value))| PeakRow {
                    id: k + 1,
                    x_peak,
                    y_peak,
                    peak_value,
                })
                .collect(),
        })
    }
}

/// Finds the local peaks of `image` above `threshold` with a 3x3 box footprint
pub fn find_peaks<'a, T: Into<Threshold<'a>>>(image: &Image, threshold: T) -> Result<PeakTable> {
    PeakFinder::new(threshold).find(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stars() -> Image {
        let sources = [(5., 6., 10.), (20., 15., 7.), (29., 3., 4.), (1., 18., 9.)];
        Image::from_fn(24, 32, |y, x| {
            sources
                .iter()
                .map(|&(xc, yc, a)| {
                    let r2: f64 = (x as f64 - xc).powi(2) + (y as f64 - yc).powi(2);
                    a * (-0.5 * r2 / 1.5).exp()
                })
                .sum()
        })
    }

    #[test]
    fn finds_all_sources_sorted() {
        let table = find_peaks(&stars(), 1.).unwrap();
        assert_eq!(table.len(), 4);
        let xy: Vec<_> = table.rows().iter().map(|r| (r.x_peak, r.y_peak)).collect();
        assert_eq!(xy, vec![(5, 6), (1, 18), (20, 15), (29, 3)]);
        assert!(table.rows().windows(2).all(|w| w[0].peak_value >= w[1].peak_value));
        assert_eq!(table.rows()[0].id, 1);
    }

    #[test]
    fn threshold_is_strict() {
        let table = find_peaks(&stars(), 7.).unwrap();
        assert_eq!(table.len(), 2);
        let map = Image::from_fn(24, 32, |_, x| if x < 10 { 100. } else { 0.5 });
        let table = find_peaks(&stars(), &map).unwrap();
        let xy: Vec<_> = table.rows().iter().map(|r| (r.x_peak, r.y_peak)).collect();
        assert_eq!(xy, vec![(20, 15), (29, 3)]);
    }

    #[test]
    fn npeaks_keeps_the_brightest() {
        let table = PeakFinder::new(0.5).npeaks(2).find(&stars()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!((table.rows()[1].x_peak, table.rows()[1].y_peak), (1, 18));
    }

    #[test]
    fn scalar_border_width() {
        let table = PeakFinder::new(0.5).border_width(4).find(&stars()).unwrap();
        let xy: Vec<_> = table.rows().iter().map(|r| (r.x_peak, r.y_peak)).collect();
        assert_eq!(xy, vec![(5, 6), (20, 15)]);
    }

    #[test]
    fn two_border_widths() {
        // y border only: drops the source at y = 3
        let table = PeakFinder::new(0.5).border_width((4, 0)).find(&stars()).unwrap();
        let xy: Vec<_> = table.rows().iter().map(|r| (r.x_peak, r.y_peak)).collect();
        assert_eq!(xy, vec![(5, 6), (1, 18), (20, 15)]);
        // x border only: drops the source at x = 1
        let table = PeakFinder::new(0.5).border_width((0, 2)).find(&stars()).unwrap();
        let xy: Vec<_> = table.rows().iter().map(|r| (r.x_peak, r.y_peak)).collect();
        assert_eq!(xy, vec![(5, 6), (20, 15), (29, 3)]);
    }

    #[test]
    fn border_too_wide() {
        let err = PeakFinder::new(0.).border_width((12, 0)).find(&stars());
        assert!(matches!(err, Err(PeakError::Border { .. })));
    }

    #[test]
    fn parse_border_width() {
        assert_eq!("3".parse::<BorderWidth>().unwrap(), BorderWidth::Uniform(3));
        assert_eq!(
            "2, 5".parse::<BorderWidth>().unwrap(),
            BorderWidth::Axes { ny: 2, nx: 5 }
        );
        assert!("2,x".parse::<BorderWidth>().is_err());
        assert_eq!(BorderWidth::from(3).widths(), (3, 3));
    }

    #[test]
    fn masked_peaks_are_dropped() {
        let mask = Mask::from_fn(24, 32, |y, x| (y, x) == (6, 5));
        let table = PeakFinder::new(0.5).mask(&mask).find(&stars()).unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.rows().iter().all(|r| (r.x_peak, r.y_peak) != (5, 6)));
    }

    #[test]
    fn footprint_and_plateaus() {
        // two equal pixels: both are footprint maxima
        let image = Image::from_fn(9, 9, |y, x| if y == 4 && (x == 3 || x == 5) { 2. } else { 0. });
        assert_eq!(find_peaks(&image, 0.).unwrap().len(), 2);
        let table = PeakFinder::new(0.).box_size(5).find(&image).unwrap();
        assert_eq!(table.len(), 2);
        let empty = DMatrix::from_element(3, 3, false);
        assert!(matches!(
            PeakFinder::new(0.).footprint(empty).find(&image),
            Err(PeakError::EmptyFootprint)
        ));
    }

    #[test]
    fn negative_image_edges() {
        // outside pixels count as zero: a negative edge maximum isn't a peak
        let image = Image::from_fn(3, 3, |y, x| if (y, x) == (0, 0) { -1. } else { -2. });
        assert!(find_peaks(&image, -10.).unwrap().is_empty());
    }

    #[test]
    fn nan_pixels_are_skipped() {
        let mut image = stars();
        image_set(&mut image, 6, 6, f64::NAN);
        let table = find_peaks(&image, 1.).unwrap();
        assert_eq!(table.len(), 4);
        assert!(table.rows().iter().all(|r| r.peak_value.is_finite()));
    }

    #[test]
    fn nan_threshold_rejects_pixels() {
        let image = Image::from_fn(5, 5, |y, x| if (y, x) == (2, 2) { 10. } else { 0. });
        let threshold = Image::from_fn(5, 5, |_, _| f64::NAN);
        assert!(find_peaks(&image, &threshold).unwrap().is_empty());
        assert!(find_peaks(&image, f64::NAN).unwrap().is_empty());
        let mut threshold = Image::from_fn(5, 5, |_, _| 1.);
        image_set(&mut threshold, 0, 0, f64::NAN);
        assert_eq!(find_peaks(&image, &threshold).unwrap().len(), 1);
    }

    fn image_set(image: &mut Image, y: usize, x: usize, value: f64) {
        let mut data = image.data().clone();
        data[(y, x)] = value;
        *image = Image::new(data);
    }
}
