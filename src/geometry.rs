//! Overlap of circles with the pixel grid

use std::{fmt, str::FromStr};

use itertools::iproduct;
use nalgebra::DMatrix;

use crate::aperture::BoundingBox;

/// Default number of sub-pixels per pixel side for [`OverlapMethod::Subpixel`]
pub const DEFAULT_SUBPIXELS: usize = 5;

#[derive(thiserror::Error, Debug)]
pub enum OverlapMethodError {
    #[error(r#"overlap method {0:?} is not recognized, expected "exact", "center" or "subpixel[:N]""#)]
    Unknown(String),
    #[error("the number of sub-pixels must be a positive integer, found {0:?}")]
    Subpixels(String),
}

/// Method used to compute the overlap of an aperture with a pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapMethod {
    /// Exact fractional overlap, weights between 0 and 1
    #[default]
    Exact,
    /// A pixel is in or out depending on its center, weights are 0 or 1
    Center,
    /// Each pixel is split into `n x n` sub-pixels tested on their center
    Subpixel(usize),
}
impl OverlapMethod {
    pub fn subpixel() -> Self {
        OverlapMethod::Subpixel(DEFAULT_SUBPIXELS)
    }
}
impl fmt::Display for OverlapMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlapMethod::Exact => write!(f, "exact"),
            OverlapMethod::Center => write!(f, "center"),
            OverlapMethod::Subpixel(n) => write!(f, "subpixel:{}", n),
        }
    }
}
impl FromStr for OverlapMethod {
    type Err = OverlapMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.split_once(':') {
            None => match s.as_str() {
                "exact" => Ok(OverlapMethod::Exact),
                "center" => Ok(OverlapMethod::Center),
                "subpixel" => Ok(OverlapMethod::subpixel()),
                _ => Err(OverlapMethodError::Unknown(s.to_string())),
            },
            Some(("subpixel", n)) => match n.parse::<usize>() {
                Ok(n) if n > 0 => Ok(OverlapMethod::Subpixel(n)),
                _ => Err(OverlapMethodError::Subpixels(n.to_string())),
            },
            Some(_) => Err(OverlapMethodError::Unknown(s.to_string())),
        }
    }
}

/// Area of the circle `X² + Y² <= r²` within `0 <= X <= x`, `0 <= Y <= y`,
/// extended as an odd function of both `x` and `y`
fn quadrant_area(x: f64, y: f64, r: f64) -> f64 {
    let sign = x.signum() * y.signum();
    let (x, y) = (x.abs().min(r), y.abs().min(r));
    if x == 0. || y == 0. {
        return 0.;
    }
    if x * x + y * y <= r * r {
        return sign * x * y;
    }
    let antiderivative =
        |u: f64| 0.5 * (u * (r * r - u * u).max(0.).sqrt() + r * r * (u / r).asin());
    let xc = (r * r - y * y).max(0.).sqrt();
    sign * (xc * y + antiderivative(x) - antiderivative(xc))
}

/// Exact area of the intersection of the circle of radius `r` centered on
/// the origin with the rectangle `[xmin, xmax] x [ymin, ymax]`
pub fn circle_rectangle_overlap(xmin: f64, xmax: f64, ymin: f64, ymax: f64, r: f64) -> f64 {
    if r <= 0. {
        return 0.;
    }
    quadrant_area(xmax, ymax, r) - quadrant_area(xmin, ymax, r) - quadrant_area(xmax, ymin, r)
        + quadrant_area(xmin, ymin, r)
}

/// Fraction of the pixel `[dx - 0.5, dx + 0.5] x [dy - 0.5, dy + 0.5]`
/// covered by the circle of radius `r` centered on the origin
pub fn pixel_overlap(dx: f64, dy: f64, r: f64, method: OverlapMethod) -> f64 {
    // pixels entirely inside or outside
    let near_x = (dx.abs() - 0.5).max(0.);
    let near_y = (dy.abs() - 0.5).max(0.);
    if near_x * near_x + near_y * near_y >= r * r {
        return 0.;
    }
    let far_x = dx.abs() + 0.5;
    let far_y = dy.abs() + 0.5;
    if far_x * far_x + far_y * far_y < r * r {
        return 1.;
    }
    match method {
        OverlapMethod::Exact => {
            circle_rectangle_overlap(dx - 0.5, dx + 0.5, dy - 0.5, dy + 0.5, r).clamp(0., 1.)
        }
        OverlapMethod::Center => {
            if dx * dx + dy * dy < r * r {
                1.
            } else {
                0.
            }
        }
        OverlapMethod::Subpixel(n) => {
            let n = n.max(1);
            let step = 1. / n as f64;
            let inside = iproduct!(0..n, 0..n)
                .filter(|&(i, j)| {
                    let x = dx - 0.5 + (j as f64 + 0.5) * step;
                    let y = dy - 0.5 + (i as f64 + 0.5) * step;
                    x * x + y * y < r * r
                })
                .count();
            inside as f64 / (n * n) as f64
        }
    }
}

/// Overlap weights of a circle with the pixels of a bounding box
///
/// The returned matrix has `bbox.ny()` rows and `bbox.nx()` columns; entry
/// `(i, j)` is the weight of pixel `(bbox.iymin + i, bbox.ixmin + j)`.
pub fn circular_overlap_grid(
    bbox: &BoundingBox,
    center: (f64, f64),
    r: f64,
    method: OverlapMethod,
) -> DMatrix<f64> {
    let (xc, yc) = center;
    DMatrix::from_fn(bbox.ny(), bbox.nx(), |i, j| {
        let dx = (bbox.ixmin + j as i64) as f64 - xc;
        let dy = (bbox.iymin + i as i64) as f64 - yc;
        pixel_overlap(dx, dy, r, method)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn full_circle() {
        let r = 3.7;
        let area = circle_rectangle_overlap(-10., 10., -10., 10., r);
        assert!((area - PI * r * r).abs() < 1e-12);
    }

    #[test]
    fn half_and_quarter_circle() {
        let r = 2.;
        let half = circle_rectangle_overlap(0., 5., -5., 5., r);
        assert!((half - 0.5 * PI * r * r).abs() < 1e-12);
        let quarter = circle_rectangle_overlap(0., 5., 0., 5., r);
        assert!((quarter - 0.25 * PI * r * r).abs() < 1e-12);
    }

    #[test]
    fn rectangle_inside_circle() {
        let area = circle_rectangle_overlap(-0.5, 0.5, -0.5, 0.5, 10.);
        assert!((area - 1.).abs() < 1e-12);
    }

    #[test]
    fn disjoint() {
        assert_eq!(circle_rectangle_overlap(5., 6., 5., 6., 1.), 0.);
        assert_eq!(circle_rectangle_overlap(-1., 1., -1., 1., 0.), 0.);
    }

    #[test]
    fn grid_weights_sum_to_area() {
        let r = 4.3;
        let bbox = BoundingBox::new(-6, 7, -6, 7);
        let center = (0.21, -0.37);
        let exact: f64 = circular_overlap_grid(&bbox, center, r, OverlapMethod::Exact).sum();
        assert!((exact - PI * r * r).abs() < 1e-10);
        let subpixel: f64 =
            circular_overlap_grid(&bbox, center, r, OverlapMethod::Subpixel(20)).sum();
        assert!((subpixel - PI * r * r).abs() < 0.5);
    }

    #[test]
    fn center_method_is_binary() {
        let bbox = BoundingBox::new(-3, 4, -3, 4);
        let weights = circular_overlap_grid(&bbox, (0., 0.), 2.5, OverlapMethod::Center);
        assert!(weights.iter().all(|&w| w == 0. || w == 1.));
        // pixel centers strictly inside a radius of 2.5: 21 of them
        assert_eq!(weights.sum(), 21.);
    }

    #[test]
    fn subpixel_one_is_center() {
        let bbox = BoundingBox::new(-4, 5, -4, 5);
        let center = (0.3, 0.1);
        let a = circular_overlap_grid(&bbox, center, 3.1, OverlapMethod::Center);
        let b = circular_overlap_grid(&bbox, center, 3.1, OverlapMethod::Subpixel(1));
        assert_eq!(a, b);
    }

    #[test]
    fn parse_method() {
        assert_eq!("exact".parse::<OverlapMethod>().unwrap(), OverlapMethod::Exact);
        assert_eq!("Center".parse::<OverlapMethod>().unwrap(), OverlapMethod::Center);
        assert_eq!(
            "subpixel".parse::<OverlapMethod>().unwrap(),
            OverlapMethod::Subpixel(DEFAULT_SUBPIXELS)
        );
        assert_eq!(
            "subpixel:10".parse::<OverlapMethod>().unwrap(),
            OverlapMethod::Subpixel(10)
        );
        assert!("subpixel:0".parse::<OverlapMethod>().is_err());
        assert!("nearest".parse::<OverlapMethod>().is_err());
    }
}
