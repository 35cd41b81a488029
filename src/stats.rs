//! Pixel statistics

use crate::image::{Image, ImageError, Mask};

/// Maximum of the finite values, `None` if there is none
pub fn nanmax(data: &[f64]) -> Option<f64> {
    data.iter()
        .copied()
        .filter(|x| x.is_finite())
        .fold(None, |m, x| Some(m.map_or(x, |m: f64| m.max(x))))
}

/// Sum of the finite values, `None` if there is none
pub fn nansum(data: &[f64]) -> Option<f64> {
    data.iter()
        .copied()
        .filter(|x| x.is_finite())
        .fold(None, |s, x| Some(s.unwrap_or(0.) + x))
}

/// Gini coefficient of the image pixels
///
/// The Gini coefficient measures how unequally the flux is distributed among
/// the pixels: 0 when all pixels have the same absolute value, 1 when all
/// the flux is in a single pixel. Masked and non-finite pixels are ignored.
///
/// Returns 0 when the pixel values sum to zero, and an error if the mask
/// and the image shapes differ.
pub fn gini(image: &Image, mask: Option<&Mask>) -> Result<f64, ImageError> {
    let mut values: Vec<f64> = match mask {
        Some(mask) => {
            image.check_shape("mask", mask.shape())?;
            image
                .iter()
                .zip(mask.iter())
                .filter(|&(_, &m)| !m)
                .map(|(&v, _)| v)
                .collect()
        }
        None => image.iter().copied().collect(),
    };
    values.retain(|v| v.is_finite());
    values.iter_mut().for_each(|v| *v = v.abs());
    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n < 2 {
        return Ok(0.);
    }
    let nf = n as f64;
    let mean = values.iter().sum::<f64>() / nf;
    let normalization = mean.abs() * nf * (nf - 1.);
    if normalization == 0. {
        return Ok(0.);
    }
    let kernel_sum: f64 = values
        .iter()
        .enumerate()
        .map(|(i, v)| (2. * (i + 1) as f64 - nf - 1.) * v)
        .sum();
    Ok(kernel_sum / normalization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

    #[test]
    fn nan_helpers() {
        assert_eq!(nanmax(&[1., f64::NAN, 3., 2.]), Some(3.));
        assert_eq!(nanmax(&[f64::NAN]), None);
        assert_eq!(nansum(&[1., f64::NAN, 3.]), Some(4.));
        assert_eq!(nansum(&[]), None);
    }

    #[test]
    fn uniform_image() {
        let image = Image::from_fn(10, 10, |_, _| 3.);
        assert!(gini(&image, None).unwrap().abs() < 1e-12);
    }

    #[test]
    fn single_bright_pixel() {
        let image = Image::from_fn(10, 10, |y, x| if (y, x) == (4, 7) { 5. } else { 0. });
        assert!((gini(&image, None).unwrap() - 1.).abs() < 1e-12);
    }

    #[test]
    fn zero_image_is_zero() {
        let image = Image::from_fn(5, 5, |_, _| 0.);
        assert_eq!(gini(&image, None).unwrap(), 0.);
    }

    #[test]
    fn masked_pixels_are_ignored() {
        let image = Image::from_fn(10, 10, |y, _| if y < 5 { 1. } else { 100. });
        let mask = Mask::from_fn(10, 10, |y, _| y >= 5);
        assert!(gini(&image, Some(&mask)).unwrap().abs() < 1e-12);
        assert!(gini(&image, None).unwrap() > 0.4);
        // everything masked
        let mask = Mask::from_fn(10, 10, |_, _| true);
        assert_eq!(gini(&image, Some(&mask)).unwrap(), 0.);
    }

    #[test]
    fn pixel_order_doesnt_matter() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut values: Vec<f64> = (0..400).map(|_| rng.gen_range(-1.0..10.0)).collect();
        let a = gini(&Image::from_fn(20, 20, |y, x| values[y * 20 + x]), None).unwrap();
        values.shuffle(&mut rng);
        let b = gini(&Image::from_fn(20, 20, |y, x| values[y * 20 + x]), None).unwrap();
        assert!((a - b).abs() < 1e-12);
        assert!(a > 0. && a < 1.);
    }

    #[test]
    fn two_values() {
        // sorted |v| = [1, 3]: (-1 * 1 + 1 * 3) / (2 * 2 * 1)
        let image = Image::from_fn(1, 2, |_, x| if x == 0 { -3. } else { 1. });
        assert!((gini(&image, None).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn mask_shape_mismatch() {
        let image = Image::from_fn(4, 4, |y, x| (y * 4 + x) as f64);
        let mask = Mask::from_fn(2, 2, |_, _| false);
        assert!(matches!(
            gini(&image, Some(&mask)),
            Err(ImageError::Shape { .. })
        ));
    }
}
