//! Profile plots
//!
//! The backend is chosen from the file extension: SVG for `.svg`, bitmap
//! otherwise.

use std::path::Path;

use itertools::Itertools;
use plotters::{coord::Shift, prelude::*};

use super::{Profile, ProfileError, Result};

/// Default face color of the error band
pub const ERROR_FACECOLOR: RGBAColor = RGBAColor(128, 128, 128, 0.3);

fn plot_err<E: std::fmt::Display>(e: E) -> ProfileError {
    ProfileError::Plot(e.to_string())
}

impl Profile {
    /// Plots the profile
    pub fn plot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.render(path.as_ref(), None)
    }
    /// Plots the profile with the `profile ± profile_error` band
    ///
    /// The band face color defaults to [`ERROR_FACECOLOR`]. Nothing is drawn
    /// if the profile has no errors.
    pub fn plot_error<P: AsRef<Path>>(&self, path: P, facecolor: Option<RGBAColor>) -> Result<()> {
        if self.profile_error.is_empty() {
            log::warn!("Errors were not input");
            return Ok(());
        }
        self.render(path.as_ref(), Some(facecolor.unwrap_or(ERROR_FACECOLOR)))
    }
    fn render(&self, path: &Path, band: Option<RGBAColor>) -> Result<()> {
        log::info!("plotting profile to {:?}", path);
        let is_svg = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("svg"))
            .unwrap_or(false);
        if is_svg {
            let root = SVGBackend::new(path, (768, 512)).into_drawing_area();
            self.draw(&root, band)?;
            root.present().map_err(plot_err)
        } else {
            let root = BitMapBackend::new(path, (768, 512)).into_drawing_area();
            self.draw(&root, band)?;
            root.present().map_err(plot_err)
        }
    }
    fn draw<DB: DrawingBackend>(
        &self,
        root: &DrawingArea<DB, Shift>,
        band: Option<RGBAColor>,
    ) -> Result<()> {
        root.fill(&WHITE).map_err(plot_err)?;

        let points: Vec<(f64, f64, f64)> = self
            .radius
            .iter()
            .zip(&self.profile)
            .enumerate()
            .filter(|(_, (_, p))| p.is_finite())
            .map(|(k, (&r, &p))| {
                let e = band
                    .and(self.profile_error.get(k).copied())
                    .unwrap_or(0.);
                (r, p, if e.is_finite() { e } else { 0. })
            })
            .collect();
        let nothing = || ProfileError::Plot("nothing to plot".into());
        let (xmin, xmax) = points
            .iter()
            .map(|&(r, _, _)| r)
            .minmax()
            .into_option()
            .filter(|(xmin, xmax)| xmin < xmax)
            .ok_or_else(nothing)?;
        let (ymin, ymax) = points
            .iter()
            .flat_map(|&(_, p, e)| [p - e, p + e])
            .minmax()
            .into_option()
            .ok_or_else(nothing)?;
        let dy = if ymax > ymin { 0.05 * (ymax - ymin) } else { 1. };

        let ylabel = match &self.unit {
            Some(unit) => format!("Profile ({})", unit),
            None => String::from("Profile"),
        };
        let mut chart = ChartBuilder::on(root)
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .margin(10)
            .build_cartesian_2d(xmin..xmax, ymin - dy..ymax + dy)
            .map_err(plot_err)?;
        chart
            .configure_mesh()
            .x_desc("Radius (pixels)")
            .y_desc(ylabel)
            .draw()
            .map_err(plot_err)?;

        if let Some(facecolor) = band {
            let polygon: Vec<(f64, f64)> = points
                .iter()
                .map(|&(r, p, e)| (r, p + e))
                .chain(points.iter().rev().map(|&(r, p, e)| (r, p - e)))
                .collect();
            chart
                .draw_series(std::iter::once(Polygon::new(polygon, facecolor.filled())))
                .map_err(plot_err)?;
        }

        let color = colorous::TABLEAU10[0];
        let rgb = RGBColor(color.r, color.g, color.b);
        chart
            .draw_series(LineSeries::new(
                points.iter().map(|&(r, p, _)| (r, p)),
                &rgb,
            ))
            .map_err(plot_err)?;
        Ok(())
    }
}
