use crate::error::{PerimeterError, Result};
use crate::geometry::InvalidGeometryPolicy;
use crate::threshold::ThresholdStrategy;
use crate::vectorize::Connectivity;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the classification threshold is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMethod {
    Fixed,
    Otsu,
    Percentile,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassificationConfig {
    pub method: ThresholdMethod,
    /// Used when `method = "fixed"`
    pub threshold: u16,
    /// Used when `method = "percentile"`
    pub percentile: f64,
    pub connectivity: Connectivity,
    /// Ascending thresholds for low/medium/high heat classes; empty disables
    pub heat_levels: Vec<u16>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            method: ThresholdMethod::Fixed,
            threshold: 33332,
            percentile: 99.0,
            connectivity: Connectivity::Four,
            heat_levels: vec![33000, 39000, 53000],
        }
    }
}

impl ClassificationConfig {
    pub fn strategy(&self) -> ThresholdStrategy {
        match self.method {
            ThresholdMethod::Fixed => ThresholdStrategy::Fixed(self.threshold),
            ThresholdMethod::Otsu => ThresholdStrategy::Otsu,
            ThresholdMethod::Percentile => ThresholdStrategy::Percentile(self.percentile),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReprojectionConfig {
    pub source_epsg: u32,
    pub target_epsg: u32,
}

impl Default for ReprojectionConfig {
    fn default() -> Self {
        Self {
            source_epsg: 4326,
            target_epsg: 26910,
        }
    }
}

/// Distances and areas are in target CRS units.
///
/// `expand_distance` and `shrink_distance` are tuned independently; nothing
/// forces them to cancel.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PostprocessingConfig {
    pub expand_distance: f64,
    pub min_interior_ring_area: f64,
    pub shrink_distance: f64,
    /// Polygons at or below this area are dropped after shrinking; 0 disables
    pub min_polygon_area: f64,
    /// Concavity of the hull around all detections, written only when set;
    /// larger values approach the convex hull
    pub concavity: Option<f64>,
    pub geometry_policy: InvalidGeometryPolicy,
}

impl Default for PostprocessingConfig {
    fn default() -> Self {
        Self {
            expand_distance: 40.0,
            min_interior_ring_area: 500.0,
            shrink_distance: -43.0,
            min_polygon_area: 0.0,
            concavity: None,
            geometry_policy: InvalidGeometryPolicy::Repair,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// Write every stage's shapefile, not only the final ones
    pub intermediate: bool,
    pub export_raster: bool,
    pub export_heat_levels: bool,
    pub compression: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./data"),
            intermediate: true,
            export_raster: false,
            export_heat_levels: false,
            compression: "DEFLATE".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub classification: ClassificationConfig,
    pub reprojection: ReprojectionConfig,
    pub postprocessing: PostprocessingConfig,
    pub output: OutputConfig,
}

impl PipelineConfig {
    /// Load a TOML config file; absent keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration: {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.classification;
        if c.method == ThresholdMethod::Percentile && !(0.0..=100.0).contains(&c.percentile) {
            return Err(PerimeterError::InvalidPercentile(c.percentile));
        }
        if c.heat_levels.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PerimeterError::InvalidHeatLevels(c.heat_levels.clone()));
        }

        let r = &self.reprojection;
        if r.source_epsg == 0 || r.target_epsg == 0 {
            return Err(PerimeterError::InvalidConfig(
                "EPSG codes must be non-zero".to_string(),
            ));
        }

        let p = &self.postprocessing;
        if !(p.expand_distance > 0.0) {
            return Err(PerimeterError::InvalidConfig(format!(
                "expand_distance must be positive, got {}",
                p.expand_distance
            )));
        }
        if !(p.shrink_distance < 0.0) {
            return Err(PerimeterError::InvalidConfig(format!(
                "shrink_distance must be negative, got {}",
                p.shrink_distance
            )));
        }
        if p.min_interior_ring_area < 0.0 || p.min_polygon_area < 0.0 {
            return Err(PerimeterError::InvalidConfig(
                "area thresholds must not be negative".to_string(),
            ));
        }
        if let Some(concavity) = p.concavity {
            if !(concavity > 0.0) {
                return Err(PerimeterError::InvalidConfig(format!(
                    "concavity must be positive, got {}",
                    concavity
                )));
            }
        }

        crate::io::validate_compression(&self.output.compression)?;
        Ok(())
    }
}
