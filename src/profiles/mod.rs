/*!
# Radial profiles and curves of growth

Both profiles are measured with concentric circular apertures centred on
a source:

- [`CurveOfGrowth`] - the flux within circles of increasing radius
- [`RadialProfile`] - the azimuthally averaged flux within circular annuli

The data should be background-subtracted.

## Usage

```rust,no_run
use aperture_profiles::{Image, Normalization, ProfileConfig, RadialProfile};

let image = Image::from_npy("source.npy")?;
let mut rp = RadialProfile::new(ProfileConfig::new(&image, (47.8, 52.4), 0., 25., 1.))?;
rp.normalize(Normalization::Max);
rp.to_csv("radial_profile.csv")?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

use std::{fmt, path::Path};

use rayon::prelude::*;
use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::{
    aperture::{Aperture, ApertureError, CircularAperture},
    geometry::OverlapMethod,
    image::{Image, ImageError, Mask},
    photometry::effective_mask,
    stats::{nanmax, nansum},
};

mod curve_of_growth;
#[cfg(feature = "plot")]
mod plot;
mod radial;
pub use curve_of_growth::CurveOfGrowth;
#[cfg(feature = "plot")]
pub use plot::ERROR_FACECOLOR;
pub use radial::RadialProfile;

#[derive(thiserror::Error, Debug)]
pub enum ProfileError {
    #[error("radii and radius step must be finite, found {min}, {max} and {step}")]
    NonFinite { min: f64, max: f64, step: f64 },
    #[error("min_radius and max_radius must be >= 0, found {0} and {1}")]
    NegativeRadius(f64, f64),
    #[error("max_radius ({max}) must be greater than min_radius ({min})")]
    RadiusRange { min: f64, max: f64 },
    #[error("radius_step must be > 0, found {0}")]
    RadiusStep(f64),
    #[error("invalid profile input")]
    Image(#[from] ImageError),
    #[error("failed to create the profile apertures")]
    Aperture(#[from] ApertureError),
    #[error("failed to write the profile table")]
    Csv(#[from] csv::Error),
    #[error("failed to plot the profile: {0}")]
    Plot(String),
}
type Result<T> = std::result::Result<T, ProfileError>;

/// Profile normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Normalization {
    /// the profile peak is 1
    Max,
    /// the profile sum is 1
    Sum,
}

/// Profile inputs
#[derive(Debug, Clone)]
pub struct ProfileConfig<'a> {
    pub(crate) image: &'a Image,
    pub(crate) xycen: (f64, f64),
    pub(crate) min_radius: f64,
    pub(crate) max_radius: f64,
    pub(crate) radius_step: f64,
    pub(crate) error: Option<&'a Image>,
    pub(crate) mask: Option<&'a Mask>,
    pub(crate) method: OverlapMethod,
}
impl<'a> ProfileConfig<'a> {
    /// Creates a profile configuration for the source at `xycen` from
    /// `min_radius` to `max_radius` by steps of `radius_step` pixels
    pub fn new(
        image: &'a Image,
        xycen: (f64, f64),
        min_radius: f64,
        max_radius: f64,
        radius_step: f64,
    ) -> Self {
        Self {
            image,
            xycen,
            min_radius,
            max_radius,
            radius_step,
            error: None,
            mask: None,
            method: OverlapMethod::default(),
        }
    }
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
    pub fn validate(&self) -> Result<()> {
        if !(self.min_radius.is_finite()
            && self.max_radius.is_finite()
            && self.radius_step.is_finite())
        {
            return Err(ProfileError::NonFinite {
                min: self.min_radius,
                max: self.max_radius,
                step: self.radius_step,
            });
        }
        if self.min_radius < 0. || self.max_radius < 0. {
            return Err(ProfileError::NegativeRadius(
                self.min_radius,
                self.max_radius,
            ));
        }
        if self.min_radius >= self.max_radius {
            return Err(ProfileError::RadiusRange {
                min: self.min_radius,
                max: self.max_radius,
            });
        }
        if !(self.radius_step > 0.) {
            return Err(ProfileError::RadiusStep(self.radius_step));
        }
        if let Some(error) = self.error {
            self.image.check_shape("error", error.shape())?;
        }
        if let Some(mask) = self.mask {
            self.image.check_shape("mask", mask.shape())?;
        }
        Ok(())
    }
    /// The profile radii in pixels
    pub fn radius(&self) -> Vec<f64> {
        linear_radii(self.min_radius, self.max_radius, self.radius_step)
    }
    /// Fluxes, flux errors and unmasked areas of circular apertures of
    /// radii `radii`
    ///
    /// A radius `<= 0` has zero flux, error and area.
    pub(crate) fn circular_photometry(&self, radii: &[f64]) -> Result<EdgePhotometry> {
        let apertures = circular_apertures(self.xycen, radii)?;
        let mask = effective_mask(self.image, self.mask);
        let results: Vec<_> = apertures
            .par_iter()
            .map(|aperture| match aperture {
                Some(aperture) => {
                    let result =
                        aperture.do_photometry(self.image, self.error, mask.as_ref(), self.method);
                    (result.sum, result.sum_err.unwrap_or(0.), result.area)
                }
                None => (0., 0., 0.),
            })
            .collect();
        let mut edges = EdgePhotometry::default();
        for (flux, flux_err, area) in results {
            edges.flux.push(flux);
            if self.error.is_some() {
                edges.flux_err.push(flux_err);
            }
            edges.area.push(area);
        }
        Ok(edges)
    }
}

/// `min + k * step` for `k = 0..=floor((max - min) / step)`
pub(crate) fn linear_radii(min: f64, max: f64, step: f64) -> Vec<f64> {
    let nsteps = ((max - min) / step).floor() as usize;
    (0..=nsteps).map(|k| min + k as f64 * step).collect()
}

/// Circular apertures of radii `radii`, `None` for a radius `<= 0`
pub(crate) fn circular_apertures(
    xycen: (f64, f64),
    radii: &[f64],
) -> Result<Vec<Option<CircularAperture>>> {
    radii
        .iter()
        .map(|&r| {
            if r <= 0. {
                Ok(None)
            } else {
                Ok(Some(CircularAperture::new(xycen, r)?))
            }
        })
        .collect()
}

/// Photometry of circular apertures as a function of radius
#[derive(Debug, Default, Clone)]
pub(crate) struct EdgePhotometry {
    pub(crate) flux: Vec<f64>,
    pub(crate) flux_err: Vec<f64>,
    pub(crate) area: Vec<f64>,
}

#[derive(Serialize)]
struct ProfileRow {
    radius: f64,
    profile: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile_error: Option<f64>,
    area: f64,
}

/// Profile values as a function of radius
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Profile {
    pub(crate) radius: Vec<f64>,
    pub(crate) profile: Vec<f64>,
    pub(crate) profile_error: Vec<f64>,
    pub(crate) area: Vec<f64>,
    pub(crate) unit: Option<String>,
}
impl Profile {
    /// The profile radii in pixels
    pub fn radius(&self) -> &[f64] {
        &self.radius
    }
    pub fn profile(&self) -> &[f64] {
        &self.profile
    }
    /// The profile errors, empty if the error image was not given
    pub fn profile_error(&self) -> &[f64] {
        &self.profile_error
    }
    /// The unmasked area as a function of radius
    pub fn area(&self) -> &[f64] {
        &self.area
    }
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }
    pub fn len(&self) -> usize {
        self.radius.len()
    }
    pub fn is_empty(&self) -> bool {
        self.radius.is_empty()
    }
    /// Normalizes the profile and the profile errors
    ///
    /// The profile is left unchanged if the normalization is zero.
    pub fn normalize(&mut self, method: Normalization) {
        let normalization = match method {
            Normalization::Max => nanmax(&self.profile),
            Normalization::Sum => nansum(&self.profile),
        };
        match normalization {
            Some(n) if n != 0. => {
                self.profile.iter_mut().for_each(|x| *x /= n);
                self.profile_error.iter_mut().for_each(|x| *x /= n);
                self.unit = None;
            }
            _ => log::warn!(
                "The profile cannot be normalized because the {} is zero.",
                method
            ),
        }
    }
    /// Writes `radius, profile, profile_error, area` rows to a CSV file
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)?;
        for (k, ((&radius, &profile), &area)) in self
            .radius
            .iter()
            .zip(&self.profile)
            .zip(&self.area)
            .enumerate()
        {
            wtr.serialize(ProfileRow {
                radius,
                profile,
                profile_error: self.profile_error.get(k).copied(),
                area,
            })?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}
impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = self
            .unit
            .as_ref()
            .map(|u| format!(" [{}]", u))
            .unwrap_or_default();
        writeln!(
            f,
            "{:>10} {:>16} {:>16} {:>12}",
            "RADIUS",
            format!("PROFILE{}", unit),
            "ERROR",
            "AREA"
        )?;
        for (k, ((radius, profile), area)) in self
            .radius
            .iter()
            .zip(&self.profile)
            .zip(&self.area)
            .enumerate()
        {
            let error = self
                .profile_error
                .get(k)
                .map(|e| format!("{:.6e}", e))
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                f,
                "{:>10.3} {:>16.6e} {:>16} {:>12.3}",
                radius, profile, error, area
            )?;
        }
        Ok(())
    }
}
