use std::path::PathBuf;

use clap::Parser;
use psf_grid::{Colormap, GriddedPsf, PlotGridOptions};

#[derive(Parser)]
#[command(name = "psf-grid")]
#[command(about = "Plot a gridded PSF model")]
struct Args {
    /// `.npz` archive with the `data` (n, ny, nx) and `grid_xypos` (n, 2) arrays
    input: PathBuf,

    /// Output image file
    #[arg(short, long, default_value = "psf_grid.png")]
    output: PathBuf,

    /// PSF oversampling factor
    #[arg(long, default_value_t = 1)]
    oversampling: usize,

    /// Plot the differences with the mean PSF
    #[arg(long)]
    deltas: bool,

    /// Color stretch as a fraction of the PSF peak (default: 1, or 0.03 with --deltas)
    #[arg(long)]
    vmax_scale: Option<f64>,

    /// Normalize each PSF by its peak
    #[arg(long)]
    peak_norm: bool,

    /// Colormap: viridis, magma, inferno, cubehelix, greys or red_blue
    #[arg(long, default_value_t = Colormap::Viridis, value_parser = parse_cmap)]
    cmap: Colormap,

    /// Don't draw lines between the PSFs
    #[arg(long)]
    no_dividers: bool,
}

fn parse_cmap(name: &str) -> Result<Colormap, String> {
    name.parse()
        .map_err(|_| format!("expected one of: {}", Colormap::names().join(", ")))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let model = GriddedPsf::from_npz(&args.input, args.oversampling)?;
    println!(
        "{} PSFs on a {:?} grid, PSF shape: {:?}",
        model.len(),
        model.grid_shape(),
        model.psf_shape()
    );
    println!(" . x grid: {:?}", model.xgrid());
    println!(" . y grid: {:?}", model.ygrid());

    let mut options = PlotGridOptions::default()
        .deltas(args.deltas)
        .peak_norm(args.peak_norm)
        .cmap(args.cmap)
        .dividers(!args.no_dividers);
    if let Some(vmax_scale) = args.vmax_scale {
        options = options.vmax_scale(vmax_scale);
    }
    model.plot_grid(&args.output, &options)?;
    println!("PSF grid saved to {:?}", args.output);
    Ok(())
}
