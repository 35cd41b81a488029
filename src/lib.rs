/*!
# Aperture photometry and radial profiles

Circular aperture photometry of 2D images with exact pixel overlap, radial
profiles and curves of growth, local peak detection and the Gini
coefficient.

Images are loaded from `.npy` (optionally gzipped) or `.npz` files:

```rust,no_run
use aperture_profiles::{
    aperture_photometry, CircularAperture, CurveOfGrowth, Image, PhotometryOptions,
    ProfileConfig,
};

let image = Image::from_npy("source.npy.gz")?;
let apertures = vec![CircularAperture::new((47.8, 52.4), 5.)?];
let table = aperture_photometry(&image, &apertures, PhotometryOptions::default())?;
println!("{table}");

let cog = CurveOfGrowth::new(ProfileConfig::new(&image, (47.8, 52.4), 0., 25., 1.))?;
println!("{}", *cog);
# Ok::<(), Box<dyn std::error::Error>>(())
```

The `plot` feature adds [`Profile::plot`] and [`Profile::plot_error`].
*/

pub mod aperture;
pub mod error;
pub mod geometry;
pub mod image;
pub mod peaks;
pub mod photometry;
pub mod profiles;
pub mod stats;

pub use aperture::{Aperture, CircularAnnulus, CircularAperture};
pub use error::{Error, Result};
pub use geometry::OverlapMethod;
pub use image::{Image, Mask};
pub use peaks::{find_peaks, BorderWidth, PeakFinder, PeakTable, Threshold};
pub use photometry::{aperture_photometry, PhotometryOptions, PhotometryTable};
pub use profiles::{CurveOfGrowth, Normalization, Profile, ProfileConfig, RadialProfile};
pub use stats::gini;
