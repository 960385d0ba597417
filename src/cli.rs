use crate::config::{PipelineConfig, ThresholdMethod};
use crate::geometry::InvalidGeometryPolicy;
use crate::vectorize::Connectivity;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    Repair,
    Drop,
    Abort,
}

impl From<PolicyArg> for InvalidGeometryPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Repair => InvalidGeometryPolicy::Repair,
            PolicyArg::Drop => InvalidGeometryPolicy::Drop,
            PolicyArg::Abort => InvalidGeometryPolicy::Abort,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "fire-perimeter")]
#[command(about = "Approximate fire perimeters from a thermal-infrared GeoTIFF")]
#[command(version)]
pub struct Args {
    /// Input GeoTIFF path (single band, 16-bit thermal intensities)
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// TOML configuration file; command-line flags override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory for shapefiles and raster exports
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Fixed classification threshold
    #[arg(short, long, value_name = "VALUE", conflicts_with_all = ["otsu", "percentile"])]
    pub threshold: Option<u16>,

    /// Pick the threshold with Otsu's method
    #[arg(long, conflicts_with = "percentile")]
    pub otsu: bool,

    /// Pick the threshold at this percentile of the band (0-100)
    #[arg(long, value_name = "P")]
    pub percentile: Option<f64>,

    /// EPSG code the raster coordinates are declared in
    #[arg(long, value_name = "CODE")]
    pub source_epsg: Option<u32>,

    /// EPSG code of the projected CRS used for buffering
    #[arg(long, value_name = "CODE")]
    pub target_epsg: Option<u32>,

    /// Outward buffer distance used to merge nearby detections
    #[arg(long, value_name = "DISTANCE")]
    pub expand: Option<f64>,

    /// Inward buffer distance (negative) applied after merging
    #[arg(long, value_name = "DISTANCE", allow_hyphen_values = true)]
    pub shrink: Option<f64>,

    /// Holes at or below this area are filled
    #[arg(long, value_name = "AREA")]
    pub min_hole_area: Option<f64>,

    /// Final polygons at or below this area are dropped
    #[arg(long, value_name = "AREA")]
    pub min_area: Option<f64>,

    /// Concave hull concavity; enables the hull output
    #[arg(long, value_name = "C")]
    pub concavity: Option<f64>,

    /// Pixel connectivity for vectorization (4 or 8)
    #[arg(long, value_name = "N", value_parser = parse_connectivity)]
    pub connectivity: Option<Connectivity>,

    /// Handling of invalid geometries
    #[arg(long, value_enum)]
    pub geometry_policy: Option<PolicyArg>,

    /// Also write the binary classification raster
    #[arg(long)]
    pub export_raster: bool,

    /// Also write the low/medium/high heat level raster
    #[arg(long)]
    pub export_heat_levels: bool,

    /// Only write the final shapefiles
    #[arg(long)]
    pub no_intermediate: bool,

    /// Compute band statistics and the threshold, then exit
    #[arg(long)]
    pub stats_only: bool,

    /// Number of threads (default: all available)
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_connectivity(value: &str) -> Result<Connectivity, String> {
    let n: u8 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    Connectivity::try_from(n)
}

impl Args {
    /// Overlay command-line values onto a loaded configuration
    pub fn apply(&self, config: &mut PipelineConfig) {
        let c = &mut config.classification;
        if let Some(threshold) = self.threshold {
            c.method = ThresholdMethod::Fixed;
            c.threshold = threshold;
        }
        if self.otsu {
            c.method = ThresholdMethod::Otsu;
        }
        if let Some(percentile) = self.percentile {
            c.method = ThresholdMethod::Percentile;
            c.percentile = percentile;
        }
        if let Some(connectivity) = self.connectivity {
            c.connectivity = connectivity;
        }

        let r = &mut config.reprojection;
        if let Some(code) = self.source_epsg {
            r.source_epsg = code;
        }
        if let Some(code) = self.target_epsg {
            r.target_epsg = code;
        }

        let p = &mut config.postprocessing;
        if let Some(distance) = self.expand {
            p.expand_distance = distance;
        }
        if let Some(distance) = self.shrink {
            p.shrink_distance = distance;
        }
        if let Some(area) = self.min_hole_area {
            p.min_interior_ring_area = area;
        }
        if let Some(area) = self.min_area {
            p.min_polygon_area = area;
        }
        if let Some(concavity) = self.concavity {
            p.concavity = Some(concavity);
        }
        if let Some(policy) = self.geometry_policy {
            p.geometry_policy = policy.into();
        }

        let o = &mut config.output;
        if let Some(dir) = &self.output_dir {
            o.directory = dir.clone();
        }
        if self.export_raster {
            o.export_raster = true;
        }
        if self.export_heat_levels {
            o.export_heat_levels = true;
        }
        if self.no_intermediate {
            o.intermediate = false;
        }
    }
}
