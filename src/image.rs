//! Image and mask containers
//!
//! Images are stored as [`nalgebra::DMatrix`] with rows along the y axis
//! and columns along the x axis, so pixel `(y, x)` is centred on the
//! integer coordinates `(x, y)`.

use std::{
    fs::File,
    io::{BufReader, Read},
    ops::Deref,
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;
use nalgebra::DMatrix;
use npyz::{npz::NpzArchive, DType, NpyFile, Order};

#[derive(thiserror::Error, Debug)]
pub enum ImageError {
    #[error("failed to read {1:?}")]
    Io(#[source] std::io::Error, PathBuf),
    #[error("expected a 2D array, found shape {0:?}")]
    NotTwoDimensional(Vec<u64>),
    #[error("unsupported array element type: {0}")]
    DType(String),
    #[error("array {0:?} not found in archive")]
    MissingArray(String),
    #[error("{what} shape {found:?} doesn't match the image shape {expected:?}")]
    Shape {
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
}
type Result<T> = std::result::Result<T, ImageError>;

/// 2D image
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    data: DMatrix<f64>,
    unit: Option<String>,
}
impl Deref for Image {
    type Target = DMatrix<f64>;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
impl From<DMatrix<f64>> for Image {
    fn from(data: DMatrix<f64>) -> Self {
        Self::new(data)
    }
}
impl Image {
    pub fn new(data: DMatrix<f64>) -> Self {
        Self { data, unit: None }
    }
    /// Creates an image of `ny` rows and `nx` columns from `f(y, x)`
    pub fn from_fn<F>(ny: usize, nx: usize, f: F) -> Self
    where
        F: FnMut(usize, usize) -> f64,
    {
        Self::new(DMatrix::from_fn(ny, nx, f))
    }
    /// Attaches a physical unit to the pixel values
    pub fn with_unit(mut self, unit: impl ToString) -> Self {
        self.unit = Some(unit.to_string());
        self
    }
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }
    /// Image shape as `(ny, nx)`
    pub fn shape(&self) -> (usize, usize) {
        self.data.shape()
    }
    /// Mask of the NaN and infinite pixels
    pub fn non_finite_mask(&self) -> Mask {
        Mask(self.data.map(|x| !x.is_finite()))
    }
    /// Checks that `shape` matches the image shape
    pub fn check_shape(&self, what: &'static str, shape: (usize, usize)) -> Result<()> {
        if shape == self.shape() {
            Ok(())
        } else {
            Err(ImageError::Shape {
                what,
                expected: self.shape(),
                found: shape,
            })
        }
    }
    /// Loads an image from a `.npy` file, gunzipping `.npy.gz` files
    pub fn from_npy<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading {:?}...", path);
        let data = read_image(open_npy(path)?, path)?;
        Ok(Self::new(data))
    }
    /// Loads the array `name` from a `.npz` archive
    pub fn from_npz<P: AsRef<Path>>(path: P, name: &str) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading {:?} from {:?}...", name, path);
        let mut npz =
            NpzArchive::open(path).map_err(|e| ImageError::Io(e, path.to_path_buf()))?;
        let npy = npz
            .by_name(name)
            .map_err(|e| ImageError::Io(e, path.to_path_buf()))?
            .ok_or_else(|| ImageError::MissingArray(name.to_string()))?;
        let data = read_image(npy, path)?;
        Ok(Self::new(data))
    }
}

/// Boolean pixel mask, `true` pixels are excluded from all calculations
#[derive(Debug, Clone, PartialEq)]
pub struct Mask(DMatrix<bool>);
impl Deref for Mask {
    type Target = DMatrix<bool>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl From<DMatrix<bool>> for Mask {
    fn from(mask: DMatrix<bool>) -> Self {
        Self(mask)
    }
}
impl Mask {
    pub fn from_fn<F>(ny: usize, nx: usize, f: F) -> Self
    where
        F: FnMut(usize, usize) -> bool,
    {
        Self(DMatrix::from_fn(ny, nx, f))
    }
    /// Loads a boolean mask from a `.npy` file
    pub fn from_npy<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading mask {:?}...", path);
        let data = read_2d(open_npy(path)?, path, |npy| npy.into_vec::<bool>())?;
        Ok(Self(data))
    }
    pub fn shape(&self) -> (usize, usize) {
        self.0.shape()
    }
    /// Union of two masks
    pub fn or(&self, other: &Mask) -> Mask {
        Mask(self.0.zip_map(&other.0, |a, b| a || b))
    }
    /// Number of masked pixels
    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&m| m).count()
    }
}

fn open_npy(path: &Path) -> Result<NpyFile<Box<dyn Read>>> {
    let file = File::open(path).map_err(|e| ImageError::Io(e, path.to_path_buf()))?;
    let is_gz = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);
    let reader: Box<dyn Read> = if is_gz {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(BufReader::new(file))
    };
    NpyFile::new(reader).map_err(|e| ImageError::Io(e, path.to_path_buf()))
}

/// Reads a 2D `f4` or `f8` array as `f64`
fn read_image<R: Read>(npy: NpyFile<R>, path: &Path) -> Result<DMatrix<f64>> {
    let type_str = match npy.dtype() {
        DType::Plain(ts) => ts.to_string(),
        dtype => return Err(ImageError::DType(format!("{:?}", dtype))),
    };
    if type_str.ends_with("f4") {
        read_2d(npy, path, |npy| {
            Ok(npy.into_vec::<f32>()?.into_iter().map(f64::from).collect())
        })
    } else if type_str.ends_with("f8") {
        read_2d(npy, path, |npy| npy.into_vec::<f64>())
    } else {
        Err(ImageError::DType(type_str))
    }
}

fn read_2d<R, T, F>(npy: NpyFile<R>, path: &Path, into_vec: F) -> Result<DMatrix<T>>
where
    R: Read,
    T: nalgebra::Scalar,
    F: FnOnce(NpyFile<R>) -> std::io::Result<Vec<T>>,
{
    let shape = npy.shape().to_vec();
    if shape.len() != 2 {
        return Err(ImageError::NotTwoDimensional(shape));
    }
    if let DType::Record(_) | DType::Array(..) = npy.dtype() {
        return Err(ImageError::DType(format!("{:?}", npy.dtype())));
    }
    let (ny, nx) = (shape[0] as usize, shape[1] as usize);
    let order = npy.order();
    let data = into_vec(npy).map_err(|e| ImageError::Io(e, path.to_path_buf()))?;
    Ok(match order {
        Order::C => DMatrix::from_row_slice(ny, nx, &data),
        Order::Fortran => DMatrix::from_vec(ny, nx, data),
    })
}
