// Library exports for testing and reuse

pub mod classify;
pub mod cli;
pub mod config;
pub mod crs;
pub mod error;
pub mod geometry;
pub mod io;
pub mod pipeline;
pub mod reproject;
pub mod threshold;
pub mod vectorize;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use crs::Crs;
pub use error::{GeometryError, GeometryErrorKind, PerimeterError, Result};
pub use geometry::{FeatureCollection, InvalidGeometryPolicy};
pub use pipeline::{Pipeline, PipelineOutput};
pub use threshold::{BandStatistics, ThresholdStrategy};
pub use vectorize::Connectivity;
