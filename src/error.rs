use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PerimeterError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Input raster has invalid dimensions: {0}x{1}")]
    InvalidDimensions(usize, usize),

    #[error("Pixel size is non-positive: {0}")]
    InvalidPixelSize(f64),

    #[error("Invalid percentile: {0} (must be within 0..=100)")]
    InvalidPercentile(f64),

    #[error("Heat level thresholds must be strictly increasing: {0:?}")]
    InvalidHeatLevels(Vec<u16>),

    #[error("Band has no valid pixels (every pixel is nodata)")]
    NoValidPixels,

    #[error("No pixel reaches threshold {0}; nothing to vectorize")]
    EmptyClassification(u16),

    #[error("CRS error: {0}")]
    CrsError(String),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(String),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// What went wrong with a single feature's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryErrorKind {
    /// Self-intersecting or otherwise not OGC-valid
    Invalid,
    /// Zero area, usually after a shrinking buffer
    Empty,
}

impl fmt::Display for GeometryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryErrorKind::Invalid => write!(f, "invalid"),
            GeometryErrorKind::Empty => write!(f, "empty"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} geometry in stage '{stage}' (feature {index}): {detail}")]
pub struct GeometryError {
    pub kind: GeometryErrorKind,
    pub stage: &'static str,
    pub index: usize,
    pub detail: String,
}

pub type Result<T> = std::result::Result<T, PerimeterError>;
