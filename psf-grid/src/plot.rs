use std::path::Path;

use image::{ImageBuffer, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use nalgebra::DMatrix;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{GriddedPsf, PsfGridError, Result};

/// Default color stretch of the PSFs
pub const VMAX_SCALE: f64 = 1.;
/// Default color stretch of the PSF deltas
pub const DELTAS_VMAX_SCALE: f64 = 0.03;

/// PSF grid colormaps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Colormap {
    #[default]
    Viridis,
    Magma,
    Inferno,
    Cubehelix,
    Greys,
    RedBlue,
}
impl Colormap {
    /// Names of all the colormaps
    pub fn names() -> Vec<String> {
        Self::iter().map(|cmap| cmap.to_string()).collect()
    }
    fn gradient(&self) -> colorous::Gradient {
        match self {
            Colormap::Viridis => colorous::VIRIDIS,
            Colormap::Magma => colorous::MAGMA,
            Colormap::Inferno => colorous::INFERNO,
            Colormap::Cubehelix => colorous::CUBEHELIX,
            Colormap::Greys => colorous::GREYS,
            Colormap::RedBlue => colorous::RED_BLUE,
        }
    }
    /// RGB color of `value` in the `[0, 1]` range
    pub fn eval(&self, value: f64) -> Rgb<u8> {
        let color = self.gradient().eval_continuous(value.clamp(0., 1.));
        Rgb([color.r, color.g, color.b])
    }
}

/// PSF grid plot options
///
/// The color stretch is `[0, vmax]`, or `[-vmax, vmax]` for the deltas,
/// with `vmax = vmax_scale * peak` and `peak` the maximum of the PSFs.
/// `vmax_scale` defaults to [`VMAX_SCALE`], or to [`DELTAS_VMAX_SCALE`] for
/// the deltas.
#[derive(Debug, Clone)]
pub struct PlotGridOptions {
    pub(crate) deltas: bool,
    pub(crate) vmax_scale: Option<f64>,
    pub(crate) peak_norm: bool,
    pub(crate) cmap: Colormap,
    pub(crate) dividers: bool,
}
impl Default for PlotGridOptions {
    fn default() -> Self {
        Self {
            deltas: false,
            vmax_scale: None,
            peak_norm: false,
            cmap: Colormap::default(),
            dividers: true,
        }
    }
}
impl PlotGridOptions {
    /// Plots the differences between each PSF and the mean PSF
    pub fn deltas(self, deltas: bool) -> Self {
        Self { deltas, ..self }
    }
    pub fn vmax_scale(self, vmax_scale: f64) -> Self {
        Self {
            vmax_scale: Some(vmax_scale),
            ..self
        }
    }
    /// Normalizes each PSF by its peak value
    pub fn peak_norm(self, peak_norm: bool) -> Self {
        Self { peak_norm, ..self }
    }
    pub fn cmap(self, cmap: Colormap) -> Self {
        Self { cmap, ..self }
    }
    /// Draws 1 pixel wide lines between the PSFs
    pub fn dividers(self, dividers: bool) -> Self {
        Self { dividers, ..self }
    }
    /// The effective color stretch scale
    pub fn scale(&self) -> f64 {
        self.vmax_scale.unwrap_or(if self.deltas {
            DELTAS_VMAX_SCALE
        } else {
            VMAX_SCALE
        })
    }
}

fn psf_peak(data: &DMatrix<f64>) -> Option<f64> {
    data.iter()
        .copied()
        .filter(|v| v.is_finite())
        .reduce(f64::max)
}

impl GriddedPsf {
    /// The PSF images as plotted, with the `(vmin, vmax)` color stretch
    pub fn plotted_data(&self, options: &PlotGridOptions) -> (Vec<DMatrix<f64>>, (f64, f64)) {
        let mut data: Vec<DMatrix<f64>> = self
            .data()
            .iter()
            .map(|psf| {
                let psf = psf.data().clone();
                match psf_peak(&psf) {
                    Some(p) if options.peak_norm && p != 0. => psf / p,
                    _ => psf,
                }
            })
            .collect();
        let peak = data.iter().filter_map(psf_peak).reduce(f64::max).unwrap_or(0.);
        let vmax = options.scale() * peak;
        if options.deltas {
            let (ny, nx) = self.psf_shape();
            let mean = data
                .iter()
                .fold(DMatrix::zeros(ny, nx), |sum, psf| sum + psf)
                / data.len() as f64;
            data.iter_mut().for_each(|psf| *psf -= &mean);
            (data, (-vmax, vmax))
        } else {
            (data, (0., vmax))
        }
    }

    /// Renders the PSF grid to an RGB image
    ///
    /// The PSFs are laid out on their grid nodes, x increasing to the right
    /// and y increasing upward, and each PSF is drawn with its first row at
    /// the bottom.
    pub fn render(&self, options: &PlotGridOptions) -> Result<RgbImage> {
        let (data, (vmin, vmax)) = self.plotted_data(options);
        let range = vmax - vmin;
        let (gy, gx) = self.grid_shape();
        let (py, px) = self.psf_shape();
        let d = usize::from(options.dividers);
        let width = gx * px + (gx - 1) * d;
        let height = gy * py + (gy - 1) * d;

        let mut rgb = vec![255u8; 3 * width * height];
        for (psf, &(ix, iy)) in data.iter().zip(self.nodes()) {
            let col0 = ix * (px + d);
            let row0 = (gy - 1 - iy) * (py + d);
            for r in 0..py {
                let row = row0 + py - 1 - r;
                for c in 0..px {
                    let value = psf[(r, c)];
                    let t = if !value.is_finite() {
                        0.
                    } else if range > 0. {
                        (value - vmin) / range
                    } else {
                        0.5
                    };
                    let k = 3 * (row * width + col0 + c);
                    rgb[k..k + 3].copy_from_slice(&options.cmap.eval(t).0);
                }
            }
        }
        let mut image = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(width as u32, height as u32, rgb)
            .ok_or(PsfGridError::Buffer)?;

        if options.dividers {
            let black = Rgb([0u8, 0u8, 0u8]);
            for ix in 1..gx {
                let x = (ix * (px + 1) - 1) as f32;
                draw_line_segment_mut(&mut image, (x, 0.), (x, (height - 1) as f32), black);
            }
            for iy in 1..gy {
                let y = (iy * (py + 1) - 1) as f32;
                draw_line_segment_mut(&mut image, (0., y), ((width - 1) as f32, y), black);
            }
        }
        Ok(image)
    }

    /// Saves the PSF grid to an image file
    pub fn plot_grid(&self, path: impl AsRef<Path>, options: &PlotGridOptions) -> Result<()> {
        let path = path.as_ref();
        log::info!(
            "plotting the PSF grid to {:?} (deltas: {}, vmax scale: {})",
            path,
            options.deltas,
            options.scale()
        );
        self.render(options)?
            .save(path)
            .map_err(|e| PsfGridError::Save(e, path.to_path_buf()))
    }
}
