use std::{
    io::Read,
    path::{Path, PathBuf},
};

use aperture_profiles::Image;
use nalgebra::DMatrix;
use npyz::{npz::NpzArchive, DType, NpyFile, Order};

#[derive(Debug, thiserror::Error)]
pub enum PsfGridError {
    #[error("found {positions} grid positions for {images} PSF images")]
    Count { positions: usize, images: usize },
    #[error("no PSF image")]
    Empty,
    #[error("PSF images have no pixel, shape {0:?}")]
    EmptyPsf((usize, usize)),
    #[error("PSF #{index} shape {found:?} doesn't match the first PSF shape {expected:?}")]
    Shape {
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("{0} positions don't fill the {1}x{2} grid")]
    NotAGrid(usize, usize, usize),
    #[error("duplicated grid position {0:?}")]
    Duplicate((f64, f64)),
    #[error("oversampling must be at least 1")]
    Oversampling,
    #[error("failed to read {1:?}")]
    Io(#[source] std::io::Error, PathBuf),
    #[error("array {0:?} not found in archive")]
    MissingArray(String),
    #[error("array {0:?} has element type {1}, expected f4 or f8")]
    DType(&'static str, String),
    #[error("array {name:?} has shape {shape:?}, expected {expected}")]
    ArrayShape {
        name: &'static str,
        shape: Vec<u64>,
        expected: &'static str,
    },
    #[error("Failed to create image buffer")]
    Buffer,
    #[error("Failed to save PSF grid to png file {1:?}")]
    Save(#[source] image::ImageError, PathBuf),
}
pub type Result<T> = std::result::Result<T, PsfGridError>;

/// PSF images sampled on a rectangular grid of detector positions
#[derive(Debug, Clone)]
pub struct GriddedPsf {
    grid_xypos: Vec<(f64, f64)>,
    data: Vec<Image>,
    oversampling: usize,
    xgrid: Vec<f64>,
    ygrid: Vec<f64>,
    // (ix, iy) grid indices of each PSF
    nodes: Vec<(usize, usize)>,
}
impl GriddedPsf {
    /// Creates a gridded PSF model from the PSF `data` at the `(x, y)`
    /// positions `grid_xypos`
    pub fn new(grid_xypos: Vec<(f64, f64)>, data: Vec<Image>, oversampling: usize) -> Result<Self> {
        if grid_xypos.len() != data.len() {
            return Err(PsfGridError::Count {
                positions: grid_xypos.len(),
                images: data.len(),
            });
        }
        let expected = data.first().ok_or(PsfGridError::Empty)?.shape();
        if expected.0 == 0 || expected.1 == 0 {
            return Err(PsfGridError::EmptyPsf(expected));
        }
        if let Some((index, psf)) = data
            .iter()
            .enumerate()
            .find(|(_, psf)| psf.shape() != expected)
        {
            return Err(PsfGridError::Shape {
                index,
                expected,
                found: psf.shape(),
            });
        }
        if oversampling < 1 {
            return Err(PsfGridError::Oversampling);
        }

        let unique = |mut v: Vec<f64>| {
            v.sort_by(f64::total_cmp);
            v.dedup();
            v
        };
        let xgrid = unique(grid_xypos.iter().map(|xy| xy.0).collect());
        let ygrid = unique(grid_xypos.iter().map(|xy| xy.1).collect());
        if xgrid.len() * ygrid.len() != grid_xypos.len() {
            return Err(PsfGridError::NotAGrid(
                grid_xypos.len(),
                ygrid.len(),
                xgrid.len(),
            ));
        }
        let mut occupied = DMatrix::from_element(ygrid.len(), xgrid.len(), false);
        let mut nodes = Vec::with_capacity(grid_xypos.len());
        for &(x, y) in &grid_xypos {
            let ix = xgrid.partition_point(|&v| v < x);
            let iy = ygrid.partition_point(|&v| v < y);
            if occupied[(iy, ix)] {
                return Err(PsfGridError::Duplicate((x, y)));
            }
            occupied[(iy, ix)] = true;
            nodes.push((ix, iy));
        }
        log::info!(
            "PSF grid: {}x{} PSFs of {}x{} pixels (oversampling: {})",
            ygrid.len(),
            xgrid.len(),
            expected.0,
            expected.1,
            oversampling
        );

        Ok(Self {
            grid_xypos,
            data,
            oversampling,
            xgrid,
            ygrid,
            nodes,
        })
    }
    /// Loads a gridded PSF model from a `.npz` archive with the arrays
    /// `data` of shape `(n, ny, nx)` and `grid_xypos` of shape `(n, 2)`
    pub fn from_npz<P: AsRef<Path>>(path: P, oversampling: usize) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading {:?}...", path);
        let mut npz = NpzArchive::open(path).map_err(|e| PsfGridError::Io(e, path.to_path_buf()))?;

        let (shape, values) = read_array(&mut npz, "data", path)?;
        if shape.len() != 3 {
            return Err(PsfGridError::ArrayShape {
                name: "data",
                shape,
                expected: "(n, ny, nx)",
            });
        }
        let (n, ny, nx) = (shape[0] as usize, shape[1] as usize, shape[2] as usize);
        let data: Vec<Image> = (0..n)
            .map(|k| {
                let psf = &values[k * ny * nx..(k + 1) * ny * nx];
                Image::new(DMatrix::from_row_slice(ny, nx, psf))
            })
            .collect();

        let (shape, values) = read_array(&mut npz, "grid_xypos", path)?;
        if !matches!(shape.as_slice(), &[_, 2]) {
            return Err(PsfGridError::ArrayShape {
                name: "grid_xypos",
                shape,
                expected: "(n, 2)",
            });
        }
        let grid_xypos = values.chunks(2).map(|xy| (xy[0], xy[1])).collect();

        Self::new(grid_xypos, data, oversampling)
    }

    /// Number of PSFs
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    /// Number of grid nodes along y and x
    pub fn grid_shape(&self) -> (usize, usize) {
        (self.ygrid.len(), self.xgrid.len())
    }
    /// PSF image shape
    pub fn psf_shape(&self) -> (usize, usize) {
        self.data[0].shape()
    }
    pub fn xgrid(&self) -> &[f64] {
        &self.xgrid
    }
    pub fn ygrid(&self) -> &[f64] {
        &self.ygrid
    }
    pub fn grid_xypos(&self) -> &[(f64, f64)] {
        &self.grid_xypos
    }
    pub fn data(&self) -> &[Image] {
        &self.data
    }
    pub fn oversampling(&self) -> usize {
        self.oversampling
    }
    /// `(ix, iy)` grid indices of each PSF
    pub fn nodes(&self) -> &[(usize, usize)] {
        &self.nodes
    }
    /// Mean of the PSF images
    pub fn mean(&self) -> DMatrix<f64> {
        let (ny, nx) = self.psf_shape();
        self.data
            .iter()
            .fold(DMatrix::zeros(ny, nx), |sum, psf| sum + psf.data())
            / self.data.len() as f64
    }
}

/// Reads a C ordered `f64` or `f32` array from an archive
fn read_array<R: Read + std::io::Seek>(
    npz: &mut NpzArchive<R>,
    name: &'static str,
    path: &Path,
) -> Result<(Vec<u64>, Vec<f64>)> {
    let io_err = |e| PsfGridError::Io(e, path.to_path_buf());
    let npy: NpyFile<_> = npz
        .by_name(name)
        .map_err(io_err)?
        .ok_or_else(|| PsfGridError::MissingArray(name.to_string()))?;
    let shape = npy.shape().to_vec();
    if matches!(npy.order(), Order::Fortran) && shape.len() > 1 {
        return Err(PsfGridError::ArrayShape {
            name,
            shape,
            expected: "a C ordered array",
        });
    }
    let type_str = match npy.dtype() {
        DType::Plain(ts) => ts.to_string(),
        dtype => return Err(PsfGridError::DType(name, format!("{:?}", dtype))),
    };
    let values = if type_str.ends_with("f4") {
        npy.into_vec::<f32>()
            .map_err(io_err)?
            .into_iter()
            .map(f64::from)
            .collect()
    } else if type_str.ends_with("f8") {
        npy.into_vec::<f64>().map_err(io_err)?
    } else {
        return Err(PsfGridError::DType(name, type_str));
    };
    Ok((shape, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use npyz::{npz::NpzWriter, AutoSerialize, WriteOptions, WriterBuilder};

    fn psf(x0: f64, y0: f64) -> Image {
        Image::from_fn(11, 11, |y, x| {
            let r2 = (x as f64 - 5. - x0).powi(2) + (y as f64 - 5. - y0).powi(2);
            (-0.5 * r2 / 2.).exp()
        })
    }

    fn grid(xs: &[f64], ys: &[f64]) -> Vec<(f64, f64)> {
        ys.iter()
            .flat_map(|&y| xs.iter().map(move |&x| (x, y)))
            .collect()
    }

    #[test]
    fn rectangular_grid() {
        let xypos = grid(&[0., 512., 1024.], &[0., 1024.]);
        let data = xypos.iter().map(|_| psf(0., 0.)).collect();
        let model = GriddedPsf::new(xypos, data, 4).unwrap();
        assert_eq!(model.len(), 6);
        assert_eq!(model.grid_shape(), (2, 3));
        assert_eq!(model.psf_shape(), (11, 11));
        assert_eq!(model.xgrid(), &[0., 512., 1024.]);
        assert_eq!(model.nodes()[4], (1, 1));
        assert_eq!(model.oversampling(), 4);
    }

    #[test]
    fn unordered_positions() {
        let xypos = vec![(10., 20.), (0., 0.), (0., 20.), (10., 0.)];
        let data = xypos.iter().map(|_| psf(0., 0.)).collect();
        let model = GriddedPsf::new(xypos, data, 1).unwrap();
        assert_eq!(model.nodes(), &[(1, 1), (0, 0), (0, 1), (1, 0)]);
    }

    #[test]
    fn invalid_grids() {
        let xypos = grid(&[0., 1.], &[0., 1.]);
        let data: Vec<_> = xypos.iter().map(|_| psf(0., 0.)).collect();
        assert!(matches!(
            GriddedPsf::new(xypos[..3].to_vec(), data.clone(), 1),
            Err(PsfGridError::Count { .. })
        ));
        assert!(matches!(
            GriddedPsf::new(xypos[..3].to_vec(), data[..3].to_vec(), 1),
            Err(PsfGridError::NotAGrid(3, 2, 2))
        ));
        let mut wrong_shape = data.clone();
        wrong_shape[2] = Image::from_fn(5, 5, |_, _| 0.);
        assert!(matches!(
            GriddedPsf::new(xypos.clone(), wrong_shape, 1),
            Err(PsfGridError::Shape { index: 2, .. })
        ));
        assert!(matches!(
            GriddedPsf::new(xypos.clone(), data.clone(), 0),
            Err(PsfGridError::Oversampling)
        ));
        let duplicate = vec![(0., 0.), (1., 0.), (0., 1.), (0., 0.)];
        assert!(matches!(
            GriddedPsf::new(duplicate, data, 1),
            Err(PsfGridError::Duplicate((x, y))) if x == 0. && y == 0.
        ));
        assert!(matches!(
            GriddedPsf::new(vec![], vec![], 1),
            Err(PsfGridError::Empty)
        ));
    }

    #[test]
    fn empty_psf_images() {
        let xypos = vec![(0., 0.), (1., 0.)];
        for (ny, nx) in [(0, 3), (3, 0), (0, 0)] {
            let data = vec![Image::from_fn(ny, nx, |_, _| 0.); 2];
            assert!(matches!(
                GriddedPsf::new(xypos.clone(), data, 1),
                Err(PsfGridError::EmptyPsf(shape)) if shape == (ny, nx)
            ));
        }
    }

    #[test]
    fn mean_psf() {
        let xypos = vec![(0., 0.), (1., 0.)];
        let data = vec![
            Image::from_fn(2, 2, |_, _| 1.),
            Image::from_fn(2, 2, |_, _| 3.),
        ];
        let model = GriddedPsf::new(xypos, data, 1).unwrap();
        assert!(model.mean().iter().all(|&v| v == 2.));
    }

    fn write_array<T: AutoSerialize>(
        npz: &mut NpzWriter<std::io::BufWriter<std::fs::File>>,
        name: &str,
        shape: &[u64],
        order: Order,
        values: Vec<T>,
    ) {
        let mut npy = npz
            .array::<T>(name, Default::default())
            .unwrap()
            .default_dtype()
            .order(order)
            .shape(shape)
            .begin_nd()
            .unwrap();
        npy.extend(values).unwrap();
        npy.finish().unwrap();
    }

    // 3 PSFs of 2x3 pixels, PSF k pixel (y, x) is 100k + 10y + x
    fn psf_values() -> Vec<f32> {
        (0..3)
            .flat_map(|k| {
                (0..2).flat_map(move |y| (0..3).map(move |x| (100 * k + 10 * y + x) as f32))
            })
            .collect()
    }

    #[test]
    fn load_npz() {
        let path = std::env::temp_dir().join("psf_grid_model.npz");
        {
            let mut npz = NpzWriter::create(&path).unwrap();
            write_array(&mut npz, "data", &[3, 2, 3], Order::C, psf_values());
            let xypos = vec![0f64, 0., 10., 0., 20., 0.];
            write_array(&mut npz, "grid_xypos", &[3, 2], Order::C, xypos);
        }
        let model = GriddedPsf::from_npz(&path, 2).unwrap();
        assert_eq!(model.len(), 3);
        assert_eq!(model.psf_shape(), (2, 3));
        assert_eq!(model.grid_shape(), (1, 3));
        assert_eq!(model.grid_xypos()[1], (10., 0.));
        assert_eq!(model.oversampling(), 2);
        assert_eq!(model.data()[2][(1, 2)], 212.);
        assert_eq!(model.data()[1][(0, 1)], 101.);
    }

    #[test]
    fn invalid_npz_arrays() {
        let path = std::env::temp_dir().join("psf_grid_fortran.npz");
        {
            let mut npz = NpzWriter::create(&path).unwrap();
            write_array(&mut npz, "data", &[3, 2, 3], Order::Fortran, psf_values());
        }
        assert!(matches!(
            GriddedPsf::from_npz(&path, 1),
            Err(PsfGridError::ArrayShape { name: "data", .. })
        ));

        let path = std::env::temp_dir().join("psf_grid_no_positions.npz");
        {
            let mut npz = NpzWriter::create(&path).unwrap();
            write_array(&mut npz, "data", &[3, 2, 3], Order::C, psf_values());
        }
        assert!(matches!(
            GriddedPsf::from_npz(&path, 1),
            Err(PsfGridError::MissingArray(name)) if name == "grid_xypos"
        ));

        let path = std::env::temp_dir().join("psf_grid_int.npz");
        {
            let mut npz = NpzWriter::create(&path).unwrap();
            write_array(&mut npz, "data", &[1, 2, 2], Order::C, vec![1i64, 2, 3, 4]);
        }
        assert!(matches!(
            GriddedPsf::from_npz(&path, 1),
            Err(PsfGridError::DType("data", _))
        ));
    }
}
