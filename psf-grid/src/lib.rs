/*!
# PSF grid plots

Plots of a gridded PSF model: PSF images sampled on a rectangular grid of
detector positions.

## Key Components

- [`GriddedPsf`] - PSF images and their `(x, y)` grid positions
- [`PlotGridOptions`] - plot settings: PSF deltas, color stretch, colormap and dividers

## Usage

```rust,no_run
use psf_grid::{Colormap, GriddedPsf, PlotGridOptions};

let model = GriddedPsf::from_npz("psf_grid.npz", 4)?;
// PSFs
model.plot_grid("psf_grid.png", &PlotGridOptions::default())?;
// differences with the mean PSF, within +/-3% of the peak
model.plot_grid(
    "psf_grid_deltas.png",
    &PlotGridOptions::default().deltas(true).cmap(Colormap::RedBlue),
)?;
# Ok::<(), psf_grid::PsfGridError>(())
```
*/

mod grid;
mod plot;
pub use grid::{GriddedPsf, PsfGridError, Result};
pub use plot::{Colormap, PlotGridOptions, DELTAS_VMAX_SCALE, VMAX_SCALE};
