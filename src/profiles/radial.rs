use std::ops::{Deref, DerefMut};

use super::{linear_radii, Profile, ProfileConfig, Result};
use crate::aperture::{CircularAnnulus, CircularAperture, ProfileAperture};

/// Radial profile
///
/// The azimuthally averaged flux in circular annuli as a function of radius.
///
/// The annuli are centred on the profile radii and are `radius_step` wide.
/// If the minimum radius is less than or equal to half the radius step, the
/// innermost aperture is a circle of radius `min_radius + radius_step / 2`.
#[derive(Debug, Clone)]
pub struct RadialProfile {
    profile: Profile,
    edge_radii: Vec<f64>,
    apertures: Vec<ProfileAperture>,
}
impl Deref for RadialProfile {
    type Target = Profile;

    fn deref(&self) -> &Self::Target {
        &self.profile
    }
}
impl DerefMut for RadialProfile {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.profile
    }
}
impl RadialProfile {
    pub fn new(config: ProfileConfig) -> Result<Self> {
        config.validate()?;
        let radius = config.radius();
        let shift = 0.5 * config.radius_step;
        let edge_radii = linear_radii(
            config.min_radius - shift,
            config.max_radius + shift,
            config.radius_step,
        );
        let apertures = edge_radii
            .windows(2)
            .map(|edges| {
                CircularAnnulus::new(config.xycen, edges[0], edges[1])
                    .map(ProfileAperture::Annulus)
                    .or_else(|_| {
                        CircularAperture::new(config.xycen, edges[1]).map(ProfileAperture::Circle)
                    })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let edges = config.circular_photometry(&edge_radii)?;
        let diff = |x: &[f64]| -> Vec<f64> { x.windows(2).map(|w| w[1] - w[0]).collect() };
        let area = diff(&edges.area);
        let flux = diff(&edges.flux);
        let profile: Vec<f64> = flux.iter().zip(&area).map(|(f, a)| f / a).collect();
        let profile_error: Vec<f64> = if config.error.is_some() {
            let var: Vec<f64> = edges.flux_err.iter().map(|e| e * e).collect();
            diff(&var)
                .into_iter()
                .zip(&area)
                .map(|(v, a)| v.max(0.).sqrt() / a)
                .collect()
        } else {
            vec![]
        };
        log::info!(
            "radial profile at ({:.3},{:.3}) over {} annuli",
            config.xycen.0,
            config.xycen.1,
            apertures.len()
        );

        Ok(Self {
            profile: Profile {
                radius,
                profile,
                profile_error,
                area,
                unit: config.image.unit().map(String::from),
            },
            edge_radii,
            apertures,
        })
    }
    /// The radii of the annuli edges
    pub fn edge_radii(&self) -> &[f64] {
        &self.edge_radii
    }
    /// The apertures used to measure the radial profile
    pub fn apertures(&self) -> &[ProfileAperture] {
        &self.apertures
    }
    pub fn into_profile(self) -> Profile {
        self.profile
    }
}
