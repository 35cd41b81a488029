use crate::{
    aperture::ApertureError, geometry::OverlapMethodError, image::ImageError,
    peaks::PeakError, photometry::PhotometryError, profiles::ProfileError,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error in the `image` module")]
    Image(#[from] ImageError),
    #[error("Error in the `aperture` module")]
    Aperture(#[from] ApertureError),
    #[error("Error in the `geometry` module")]
    OverlapMethod(#[from] OverlapMethodError),
    #[error("Error in the `photometry` module")]
    Photometry(#[from] PhotometryError),
    #[error("Error in the `profiles` module")]
    Profile(#[from] ProfileError),
    #[error("Error in the `peaks` module")]
    Peak(#[from] PeakError),
}
pub type Result<T> = std::result::Result<T, Error>;
