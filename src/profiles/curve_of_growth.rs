use std::ops::{Deref, DerefMut};

use super::{circular_apertures, Profile, ProfileConfig, Result};
use crate::aperture::CircularAperture;

/// Curve of growth
///
/// The circular aperture flux as a function of the aperture radius.
#[derive(Debug, Clone)]
pub struct CurveOfGrowth {
    profile: Profile,
    apertures: Vec<Option<CircularAperture>>,
}
impl Deref for CurveOfGrowth {
    type Target = Profile;

    fn deref(&self) -> &Self::Target {
        &self.profile
    }
}
impl DerefMut for CurveOfGrowth {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.profile
    }
}
impl CurveOfGrowth {
    pub fn new(config: ProfileConfig) -> Result<Self> {
        config.validate()?;
        let radius = config.radius();
        let apertures = circular_apertures(config.xycen, &radius)?;
        let edges = config.circular_photometry(&radius)?;
        log::info!(
            "curve of growth at ({:.3},{:.3}) over {} radii",
            config.xycen.0,
            config.xycen.1,
            radius.len()
        );
        Ok(Self {
            profile: Profile {
                radius,
                profile: edges.flux,
                profile_error: edges.flux_err,
                area: edges.area,
                unit: config.image.unit().map(String::from),
            },
            apertures,
        })
    }
    /// The circular apertures used to measure the profile
    ///
    /// The first aperture is `None` if the minimum radius is zero.
    pub fn apertures(&self) -> &[Option<CircularAperture>] {
        &self.apertures
    }
    pub fn into_profile(self) -> Profile {
        self.profile
    }
}
