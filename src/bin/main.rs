use std::path::{Path, PathBuf};

use anyhow::Context;
use aperture_profiles::{
    gini, BorderWidth, CurveOfGrowth, Image, Mask, Normalization, OverlapMethod, PeakFinder,
    Profile, ProfileConfig, RadialProfile,
};
use glob::glob;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "aperture-profiles",
    about = "Radial profiles, curves of growth, peaks and Gini coefficient of images"
)]
enum Opt {
    /// Radial profiles
    Radial(ProfileOpt),
    /// Curves of growth
    Cog(ProfileOpt),
    /// Local peaks
    Peaks(PeaksOpt),
    /// Gini coefficient
    Gini(GiniOpt),
}

#[derive(Debug, StructOpt)]
struct ProfileOpt {
    /// Image files (.npy, .npy.gz or .npz) or glob patterns
    #[structopt(required = true)]
    images: Vec<String>,
    /// Profile center `x,y` in pixels
    #[structopt(long, parse(try_from_str = parse_xy))]
    xycen: (f64, f64),
    /// Minimum radius in pixels
    #[structopt(long, default_value = "0")]
    min_radius: f64,
    /// Maximum radius in pixels
    #[structopt(long)]
    max_radius: f64,
    /// Radius step in pixels
    #[structopt(long, default_value = "1")]
    step: f64,
    /// 1-sigma error image
    #[structopt(short, long)]
    error: Option<PathBuf>,
    /// Mask file, `true` pixels are excluded
    #[structopt(short, long)]
    mask: Option<PathBuf>,
    /// Aperture overlap method: exact, center or subpixel[:N]
    #[structopt(long, default_value = "exact")]
    method: OverlapMethod,
    /// Profile normalization: max or sum
    #[structopt(short, long)]
    normalize: Option<Normalization>,
    /// Save the profiles to CSV files next to the images
    #[structopt(long)]
    csv: bool,
    /// Plot the profiles next to the images
    #[structopt(short, long)]
    plot: bool,
}

#[derive(Debug, StructOpt)]
struct PeaksOpt {
    /// Image file
    image: PathBuf,
    /// Detection threshold
    #[structopt(short, long)]
    threshold: f64,
    /// Size of the square footprint
    #[structopt(long, default_value = "3")]
    box_size: usize,
    /// Width of the excluded image border: `n` or `ny,nx`
    #[structopt(long, default_value = "0")]
    border_width: BorderWidth,
    /// Maximum number of peaks
    #[structopt(long)]
    npeaks: Option<usize>,
    /// Mask file, `true` pixels are excluded
    #[structopt(short, long)]
    mask: Option<PathBuf>,
    /// Save the peaks to a CSV file
    #[structopt(long)]
    csv: Option<PathBuf>,
}

#[derive(Debug, StructOpt)]
struct GiniOpt {
    /// Image file
    image: PathBuf,
    /// Mask file, `true` pixels are excluded
    #[structopt(short, long)]
    mask: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Radial,
    CurveOfGrowth,
}
impl Kind {
    fn suffix(&self) -> &'static str {
        match self {
            Kind::Radial => "radial",
            Kind::CurveOfGrowth => "cog",
        }
    }
}

fn parse_xy(s: &str) -> Result<(f64, f64), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, found {:?}", s))?;
    let parse = |v: &str| v.trim().parse::<f64>().map_err(|e| e.to_string());
    Ok((parse(x)?, parse(y)?))
}

fn load_image(path: &Path) -> anyhow::Result<Image> {
    let is_npz = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("npz"))
        .unwrap_or(false);
    let image = if is_npz {
        Image::from_npz(path, "data")
    } else {
        Image::from_npy(path)
    };
    image.with_context(|| format!("failed to load {:?}", path))
}

fn load_mask(path: Option<&PathBuf>) -> anyhow::Result<Option<Mask>> {
    path.map(|path| Mask::from_npy(path).with_context(|| format!("failed to load {:?}", path)))
        .transpose()
}

/// Expands glob patterns, keeping patterns without match as plain paths
fn expand(patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = vec![];
    for pattern in patterns {
        let matches = glob(pattern)?.collect::<Result<Vec<_>, _>>()?;
        if matches.is_empty() {
            paths.push(PathBuf::from(pattern));
        } else {
            paths.extend(matches);
        }
    }
    Ok(paths)
}

/// Output path `<image stem>_<suffix>.<ext>` next to the image
fn output_path(image: &Path, suffix: &str, ext: &str) -> PathBuf {
    let name = image
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("image");
    let stem = name.split('.').next().unwrap_or(name);
    image.with_file_name(format!("{}_{}.{}", stem, suffix, ext))
}

fn profile(path: &Path, opt: &ProfileOpt, kind: Kind) -> anyhow::Result<Profile> {
    let image = load_image(path)?;
    let error = opt.error.as_deref().map(load_image).transpose()?;
    let mask = load_mask(opt.mask.as_ref())?;

    let mut config = ProfileConfig::new(&image, opt.xycen, opt.min_radius, opt.max_radius, opt.step)
        .method(opt.method);
    if let Some(error) = &error {
        config = config.error(error);
    }
    if let Some(mask) = &mask {
        config = config.mask(mask);
    }
    let mut profile = match kind {
        Kind::Radial => RadialProfile::new(config)?.into_profile(),
        Kind::CurveOfGrowth => CurveOfGrowth::new(config)?.into_profile(),
    };
    if let Some(method) = opt.normalize {
        profile.normalize(method);
    }

    if opt.csv {
        profile.to_csv(output_path(path, kind.suffix(), "csv"))?;
    }
    if opt.plot {
        plot(&profile, &output_path(path, kind.suffix(), "svg"))?;
    }
    Ok(profile)
}

#[cfg(feature = "plot")]
fn plot(profile: &Profile, path: &Path) -> anyhow::Result<()> {
    if profile.profile_error().is_empty() {
        profile.plot(path)?;
    } else {
        profile.plot_error(path, None)?;
    }
    Ok(())
}
#[cfg(not(feature = "plot"))]
fn plot(_profile: &Profile, path: &Path) -> anyhow::Result<()> {
    log::warn!(
        "skipping {:?}: compiled without the `plot` feature",
        path
    );
    Ok(())
}

fn profiles(opt: ProfileOpt, kind: Kind) -> anyhow::Result<()> {
    let paths = expand(&opt.images)?;
    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )?
            .progress_chars("#>-"),
    );
    pb.set_message(format!("{} profiles", kind.suffix()));
    let results = paths
        .par_iter()
        .progress_with(pb.clone())
        .map(|path| profile(path, &opt, kind).map(|profile| (path, profile)))
        .collect::<anyhow::Result<Vec<_>>>()?;
    pb.finish_and_clear();

    for (path, profile) in results {
        println!("{}", path.display());
        println!("{}", profile);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    match Opt::from_args() {
        Opt::Radial(opt) => profiles(opt, Kind::Radial)?,
        Opt::Cog(opt) => profiles(opt, Kind::CurveOfGrowth)?,
        Opt::Peaks(opt) => {
            let image = load_image(&opt.image)?;
            let mask = load_mask(opt.mask.as_ref())?;
            let mut finder = PeakFinder::new(opt.threshold)
                .box_size(opt.box_size)
                .border_width(opt.border_width);
            if let Some(npeaks) = opt.npeaks {
                finder = finder.npeaks(npeaks);
            }
            if let Some(mask) = &mask {
                finder = finder.mask(mask);
            }
            let peaks = finder.find(&image)?;
            println!("{}", peaks);
            if let Some(path) = opt.csv {
                peaks.to_csv(path)?;
            }
        }
        Opt::Gini(opt) => {
            let image = load_image(&opt.image)?;
            let mask = load_mask(opt.mask.as_ref())?;
            println!("Gini coefficient: {:.6}", gini(&image, mask.as_ref())?);
        }
    }
    Ok(())
}
