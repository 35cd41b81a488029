//! Circular apertures and annuli

use std::{f64::consts::PI, ops::Range};

use nalgebra::DMatrix;

use crate::{
    geometry::{circular_overlap_grid, OverlapMethod},
    image::{Image, Mask},
};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ApertureError {
    #[error("aperture radius must be strictly positive, found {0}")]
    Radius(f64),
    #[error("annulus inner radius must be strictly positive, found {0}")]
    InnerRadius(f64),
    #[error("annulus outer radius ({r_out}) must be greater than the inner radius ({r_in})")]
    AnnulusRadii { r_in: f64, r_out: f64 },
    #[error("aperture center must be finite, found {0:?}")]
    Center((f64, f64)),
}
type Result<T> = std::result::Result<T, ApertureError>;

/// Pixel bounding box, the upper bounds are exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub ixmin: i64,
    pub ixmax: i64,
    pub iymin: i64,
    pub iymax: i64,
}
impl BoundingBox {
    pub fn new(ixmin: i64, ixmax: i64, iymin: i64, iymax: i64) -> Self {
        Self {
            ixmin,
            ixmax,
            iymin,
            iymax,
        }
    }
    /// Smallest bounding box containing the pixels whose centers lie within
    /// half a pixel of `[xmin, xmax] x [ymin, ymax]`
    pub fn from_float(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self {
            ixmin: (xmin + 0.5).floor() as i64,
            ixmax: (xmax + 0.5).ceil() as i64,
            iymin: (ymin + 0.5).floor() as i64,
            iymax: (ymax + 0.5).ceil() as i64,
        }
    }
    pub fn nx(&self) -> usize {
        (self.ixmax - self.ixmin).max(0) as usize
    }
    pub fn ny(&self) -> usize {
        (self.iymax - self.iymin).max(0) as usize
    }
    /// Overlap of the bounding box with an image of shape `(ny, nx)`
    ///
    /// Returns the `(rows, columns)` ranges into the image and the matching
    /// ranges into the bounding box, or `None` without overlap.
    pub fn overlap_slices(
        &self,
        shape: (usize, usize),
    ) -> Option<((Range<usize>, Range<usize>), (Range<usize>, Range<usize>))> {
        let (ny, nx) = (shape.0 as i64, shape.1 as i64);
        let (x0, x1) = (self.ixmin.max(0), self.ixmax.min(nx));
        let (y0, y1) = (self.iymin.max(0), self.iymax.min(ny));
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        let image = (y0 as usize..y1 as usize, x0 as usize..x1 as usize);
        let local = (
            (y0 - self.iymin) as usize..(y1 - self.iymin) as usize,
            (x0 - self.ixmin) as usize..(x1 - self.ixmin) as usize,
        );
        Some((image, local))
    }
}

/// Flux, flux error and unmasked area within an aperture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApertureSum {
    pub sum: f64,
    pub sum_err: Option<f64>,
    pub area: f64,
}
impl ApertureSum {
    fn off_image(with_error: bool) -> Self {
        Self {
            sum: f64::NAN,
            sum_err: with_error.then_some(f64::NAN),
            area: f64::NAN,
        }
    }
}

/// Aperture weights over the aperture bounding box
#[derive(Debug, Clone, PartialEq)]
pub struct ApertureMask {
    pub bbox: BoundingBox,
    pub weights: DMatrix<f64>,
}
impl ApertureMask {
    /// Iterator over the `(image row, image column, weight)` of the pixels
    /// overlapping an image of shape `shape`
    pub fn pixels(&self, shape: (usize, usize)) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.bbox
            .overlap_slices(shape)
            .into_iter()
            .flat_map(move |((rows, cols), (lrows, lcols))| {
                rows.zip(lrows).flat_map(move |(i, li)| {
                    cols.clone()
                        .zip(lcols.clone())
                        .map(move |(j, lj)| (i, j, self.weights[(li, lj)]))
                })
            })
            .filter(|&(_, _, w)| w > 0.)
    }
    /// Weighted sum of the unmasked `image` pixels
    ///
    /// The error is the square root of the weighted sum of the squared
    /// `error` pixels.
    pub fn weighted_sum(
        &self,
        image: &Image,
        error: Option<&Image>,
        mask: Option<&Mask>,
    ) -> ApertureSum {
        if self.bbox.overlap_slices(image.shape()).is_none() {
            return ApertureSum::off_image(error.is_some());
        }
        let (sum, var, area) = self
            .pixels(image.shape())
            .filter(|&(i, j, _)| !mask.map(|m| m[(i, j)]).unwrap_or(false))
            .fold((0f64, 0f64, 0f64), |(s, v, a), (i, j, w)| {
                let var = error.map(|e| e[(i, j)] * e[(i, j)] * w).unwrap_or(0.);
                (s + image[(i, j)] * w, v + var, a + w)
            });
        ApertureSum {
            sum,
            sum_err: error.map(|_| var.sqrt()),
            area,
        }
    }
    /// Sum of the weights of the unmasked pixels of an image of shape `shape`
    pub fn area_overlap(&self, shape: (usize, usize), mask: Option<&Mask>) -> f64 {
        if self.bbox.overlap_slices(shape).is_none() {
            return f64::NAN;
        }
        self.pixels(shape)
            .filter(|&(i, j, _)| !mask.map(|m| m[(i, j)]).unwrap_or(false))
            .map(|(_, _, w)| w)
            .sum()
    }
}

/// Common interface of the apertures
pub trait Aperture: Send + Sync {
    /// The `(x, y)` center in pixels
    fn center(&self) -> (f64, f64);
    /// The exact geometric area
    fn area(&self) -> f64;
    fn bbox(&self) -> BoundingBox;
    fn to_mask(&self, method: OverlapMethod) -> ApertureMask;
    fn do_photometry(
        &self,
        image: &Image,
        error: Option<&Image>,
        mask: Option<&Mask>,
        method: OverlapMethod,
    ) -> ApertureSum {
        self.to_mask(method).weighted_sum(image, error, mask)
    }
}

fn check_center(center: (f64, f64)) -> Result<()> {
    if center.0.is_finite() && center.1.is_finite() {
        Ok(())
    } else {
        Err(ApertureError::Center(center))
    }
}

/// Circular aperture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularAperture {
    center: (f64, f64),
    r: f64,
}
impl CircularAperture {
    pub fn new(center: (f64, f64), r: f64) -> Result<Self> {
        check_center(center)?;
        if !(r > 0.) {
            return Err(ApertureError::Radius(r));
        }
        Ok(Self { center, r })
    }
    pub fn radius(&self) -> f64 {
        self.r
    }
}
impl Aperture for CircularAperture {
    fn center(&self) -> (f64, f64) {
        self.center
    }
    fn area(&self) -> f64 {
        PI * self.r * self.r
    }
    fn bbox(&self) -> BoundingBox {
        let (x, y) = self.center;
        BoundingBox::from_float(x - self.r, x + self.r, y - self.r, y + self.r)
    }
    fn to_mask(&self, method: OverlapMethod) -> ApertureMask {
        let bbox = self.bbox();
        ApertureMask {
            weights: circular_overlap_grid(&bbox, self.center, self.r, method),
            bbox,
        }
    }
}

/// Circular annulus
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularAnnulus {
    center: (f64, f64),
    r_in: f64,
    r_out: f64,
}
impl CircularAnnulus {
    pub fn new(center: (f64, f64), r_in: f64, r_out: f64) -> Result<Self> {
        check_center(center)?;
        if !(r_in > 0.) {
            return Err(ApertureError::InnerRadius(r_in));
        }
        if !(r_out > r_in) {
            return Err(ApertureError::AnnulusRadii { r_in, r_out });
        }
        Ok(Self {
            center,
            r_in,
            r_out,
        })
    }
    pub fn radii(&self) -> (f64, f64) {
        (self.r_in, self.r_out)
    }
}
impl Aperture for CircularAnnulus {
    fn center(&self) -> (f64, f64) {
        self.center
    }
    fn area(&self) -> f64 {
        PI * (self.r_out * self.r_out - self.r_in * self.r_in)
    }
    fn bbox(&self) -> BoundingBox {
        let (x, y) = self.center;
        BoundingBox::from_float(
            x - self.r_out,
            x + self.r_out,
            y - self.r_out,
            y + self.r_out,
        )
    }
    fn to_mask(&self, method: OverlapMethod) -> ApertureMask {
        let bbox = self.bbox();
        let outer = circular_overlap_grid(&bbox, self.center, self.r_out, method);
        let inner = circular_overlap_grid(&bbox, self.center, self.r_in, method);
        ApertureMask {
            weights: outer - inner,
            bbox,
        }
    }
}

/// Aperture used to measure one bin of a radial profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProfileAperture {
    Circle(CircularAperture),
    Annulus(CircularAnnulus),
}
impl Aperture for ProfileAperture {
    fn center(&self) -> (f64, f64) {
        match self {
            ProfileAperture::Circle(a) => a.center(),
            ProfileAperture::Annulus(a) => a.center(),
        }
    }
    fn area(&self) -> f64 {
        match self {
            ProfileAperture::Circle(a) => a.area(),
            ProfileAperture::Annulus(a) => a.area(),
        }
    }
    fn bbox(&self) -> BoundingBox {
        match self {
            ProfileAperture::Circle(a) => a.bbox(),
            ProfileAperture::Annulus(a) => a.bbox(),
        }
    }
    fn to_mask(&self, method: OverlapMethod) -> ApertureMask {
        match self {
            ProfileAperture::Circle(a) => a.to_mask(method),
            ProfileAperture::Annulus(a) => a.to_mask(method),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box() {
        let bbox = CircularAperture::new((0., 0.), 1.).unwrap().bbox();
        assert_eq!(bbox, BoundingBox::new(-1, 2, -1, 2));
        assert_eq!((bbox.nx(), bbox.ny()), (3, 3));
        let bbox = CircularAperture::new((10.2, 5.7), 2.).unwrap().bbox();
        assert_eq!(bbox, BoundingBox::new(8, 13, 4, 9));
    }

    #[test]
    fn overlap_slices() {
        let bbox = BoundingBox::new(-2, 3, 8, 12);
        let ((rows, cols), (lrows, lcols)) = bbox.overlap_slices((10, 10)).unwrap();
        assert_eq!((rows, cols), (8..10, 0..3));
        assert_eq!((lrows, lcols), (0..2, 2..5));
        assert!(BoundingBox::new(20, 25, 0, 5)
            .overlap_slices((10, 10))
            .is_none());
    }

    #[test]
    fn invalid_apertures() {
        assert_eq!(
            CircularAperture::new((0., 0.), 0.),
            Err(ApertureError::Radius(0.))
        );
        assert_eq!(
            CircularAnnulus::new((0., 0.), 0., 2.),
            Err(ApertureError::InnerRadius(0.))
        );
        assert_eq!(
            CircularAnnulus::new((0., 0.), 3., 2.),
            Err(ApertureError::AnnulusRadii { r_in: 3., r_out: 2. })
        );
        assert!(CircularAperture::new((f64::NAN, 0.), 1.).is_err());
    }

    #[test]
    fn flat_image_sum_is_area() {
        let image = Image::from_fn(51, 51, |_, _| 2.);
        let aperture = CircularAperture::new((25.3, 24.8), 7.5).unwrap();
        let result = aperture.do_photometry(&image, None, None, OverlapMethod::Exact);
        assert!((result.sum - 2. * aperture.area()).abs() < 1e-9);
        assert!((result.area - aperture.area()).abs() < 1e-9);
        assert!(result.sum_err.is_none());
    }

    #[test]
    fn annulus_is_outer_minus_inner() {
        let image = Image::from_fn(41, 41, |y, x| (x + y) as f64);
        let error = Image::from_fn(41, 41, |_, _| 1.);
        let center = (20., 20.);
        let annulus = CircularAnnulus::new(center, 3., 8.).unwrap();
        let outer = CircularAperture::new(center, 8.).unwrap();
        let inner = CircularAperture::new(center, 3.).unwrap();
        let method = OverlapMethod::Exact;
        let a = annulus.do_photometry(&image, Some(&error), None, method);
        let o = outer.do_photometry(&image, Some(&error), None, method);
        let i = inner.do_photometry(&image, Some(&error), None, method);
        assert!((a.sum - (o.sum - i.sum)).abs() < 1e-8);
        assert!((a.area - annulus.area()).abs() < 1e-9);
        // unit errors: variance is the area
        assert!((a.sum_err.unwrap().powi(2) - a.area).abs() < 1e-9);
    }

    #[test]
    fn masked_pixels_are_excluded() {
        let image = Image::from_fn(21, 21, |_, _| 1.);
        let mask = Mask::from_fn(21, 21, |_, x| x > 10);
        let aperture = CircularAperture::new((10., 10.), 20.).unwrap();
        let result = aperture.do_photometry(&image, None, Some(&mask), OverlapMethod::Center);
        assert_eq!(result.sum, (21 * 11) as f64);
        assert_eq!(result.area, (21 * 11) as f64);
    }

    #[test]
    fn off_image_aperture_is_nan() {
        let image = Image::from_fn(10, 10, |_, _| 1.);
        let aperture = CircularAperture::new((100., 100.), 2.).unwrap();
        let result = aperture.do_photometry(&image, None, None, OverlapMethod::Exact);
        assert!(result.sum.is_nan() && result.area.is_nan());
    }
}
