//! Stage composition: threshold, classify + vectorize, reproject, aggregate,
//! interior ring filter, shrink, then the final dissolve.
//!
//! Stages pass feature collections in memory. Shapefiles are written only at
//! checkpoints: every stage when intermediate output is on, otherwise just
//! the final results.

use crate::classify::{classify_binary, classify_heat_levels};
use crate::config::PipelineConfig;
use crate::crs::{check_declared_source, check_distance_units, Crs};
use crate::error::{PerimeterError, Result};
use crate::geometry::{self, FeatureCollection};
use crate::io::{self, RasterMetadata};
use crate::reproject::reproject;
use crate::threshold::{select_threshold, BandStatistics};
use crate::vectorize::hot_polygons;
use geo::{Area, Geometry};
use log::{info, warn};
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Output file names for one threshold: `class<t>[.<suffix>].shp`
#[derive(Debug, Clone)]
pub struct OutputPaths {
    directory: PathBuf,
    prefix: String,
}

impl OutputPaths {
    pub fn new<P: AsRef<Path>>(directory: P, threshold: u16) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            prefix: format!("class{}", threshold),
        }
    }

    pub fn polygons(&self) -> PathBuf {
        self.directory.join(format!("{}.shp", self.prefix))
    }

    pub fn stage(&self, suffix: &str) -> PathBuf {
        self.directory.join(format!("{}.{}.shp", self.prefix, suffix))
    }

    /// Raster exports are named after the input image
    pub fn raster(&self, input: &Path, suffix: &str) -> PathBuf {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("input");
        self.directory.join(format!("{}_{}.tif", stem, suffix))
    }
}

/// Result of every stage kept in memory
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub threshold: u16,
    pub statistics: BandStatistics,
    pub detections: FeatureCollection,
    pub projected: FeatureCollection,
    pub aggregated: FeatureCollection,
    pub filtered: FeatureCollection,
    pub shrunk: FeatureCollection,
    pub dissolved: geo::MultiPolygon<f64>,
    pub hull: Option<geo::Polygon<f64>>,
    pub written: Vec<PathBuf>,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stage 1: statistics over valid pixels and threshold
    pub fn threshold(
        &self,
        band: &Array2<u16>,
        metadata: &RasterMetadata,
    ) -> Result<(u16, BandStatistics)> {
        select_threshold(
            band,
            self.config.classification.strategy(),
            metadata.nodata_u16(),
        )
    }

    /// Stage 2: hot pixel polygons in the declared source CRS
    pub fn detect(
        &self,
        band: &Array2<u16>,
        metadata: &RasterMetadata,
        threshold: u16,
    ) -> Result<(Array2<u8>, FeatureCollection)> {
        let source = Crs::from_epsg(self.config.reprojection.source_epsg)?;
        check_declared_source(&metadata.projection, &source);

        let classified = classify_binary(band, threshold, metadata.nodata_u16())?;
        if classified.iter().all(|&v| v == 0) {
            return Err(PerimeterError::EmptyClassification(threshold));
        }

        let polygons = hot_polygons(
            &classified,
            &metadata.geotransform,
            self.config.classification.connectivity,
        )?;
        Ok((classified, FeatureCollection::new(source, polygons)))
    }

    /// Stage 3: into the projected CRS where distances are metric
    pub fn project(&self, detections: &FeatureCollection) -> Result<FeatureCollection> {
        let target = Crs::from_epsg(self.config.reprojection.target_epsg)?;
        check_distance_units(&target)?;
        reproject(detections, &target)
    }

    /// Stages 4 to 6 plus minimum area, entirely in memory
    pub fn postprocess(
        &self,
        projected: &FeatureCollection,
    ) -> Result<(FeatureCollection, FeatureCollection, FeatureCollection)> {
        let p = &self.config.postprocessing;

        let aggregated = geometry::aggregate(projected, p.expand_distance, p.geometry_policy)?;
        let filtered = geometry::filter_holes(&aggregated, p.min_interior_ring_area);
        let shrunk = geometry::shrink(&filtered, p.shrink_distance, p.geometry_policy)?;
        let shrunk = geometry::filter_min_area(&shrunk, p.min_polygon_area);

        if shrunk.is_empty() {
            warn!(
                "No polygon survived the shrinking buffer of {}",
                p.shrink_distance
            );
        }
        Ok((aggregated, filtered, shrunk))
    }

    /// Run all stages on one thermal GeoTIFF
    pub fn run<P: AsRef<Path>>(&self, input: P) -> Result<PipelineOutput> {
        let input = input.as_ref();
        let output = &self.config.output;
        let mut written = Vec::new();

        let (band, metadata) = io::read_thermal_band(input)?;
        info!("Raster size: {}x{}", metadata.width, metadata.height);

        let (threshold, statistics) = self.threshold(&band, &metadata)?;
        let paths = OutputPaths::new(&output.directory, threshold);
        std::fs::create_dir_all(&output.directory)?;

        let (classified, detections) = self.detect(&band, &metadata, threshold)?;
        if output.export_raster {
            let path = paths.raster(input, "class");
            io::write_u8_raster(&path, &classified, &metadata, &output.compression)?;
            written.push(path);
        }
        if output.export_heat_levels && !self.config.classification.heat_levels.is_empty() {
            let levels = classify_heat_levels(
                &band,
                &self.config.classification.heat_levels,
                metadata.nodata_u16(),
            )?;
            let path = paths.raster(input, "heat_levels");
            io::write_u8_raster(&path, &levels, &metadata, &output.compression)?;
            written.push(path);
        }
        if output.intermediate {
            let path = paths.polygons();
            io::write_collection(&path, &detections)?;
            written.push(path);
        }

        let projected = self.project(&detections)?;
        if output.intermediate {
            let path = paths.stage("proj");
            io::write_collection(&path, &projected)?;
            written.push(path);
        }

        let hull = match self.config.postprocessing.concavity {
            Some(concavity) => {
                let hull = geometry::concave_hull(&projected, concavity);
                if let Some(hull) = &hull {
                    info!("Concave hull area: {:.1}", hull.unsigned_area());
                    let path = paths.stage("concave");
                    io::write_shapefile(&path, &projected.crs, &[Geometry::Polygon(hull.clone())])?;
                    written.push(path);
                }
                hull
            }
            None => None,
        };

        let (aggregated, filtered, shrunk) = self.postprocess(&projected)?;
        if output.intermediate {
            for (suffix, collection) in [("agg", &aggregated), ("holes", &filtered)] {
                let path = paths.stage(suffix);
                io::write_collection(&path, collection)?;
                written.push(path);
            }
        }

        let path = paths.stage("negbuf");
        io::write_collection(&path, &shrunk)?;
        written.push(path);

        let dissolved = geometry::dissolve(&shrunk);
        info!(
            "Dissolved perimeter: {} parts, area {:.1}",
            dissolved.0.len(),
            dissolved.unsigned_area()
        );
        let path = paths.stage("dissolve");
        io::write_shapefile(&path, &shrunk.crs, &[Geometry::MultiPolygon(dissolved.clone())])?;
        written.push(path);

        Ok(PipelineOutput {
            threshold,
            statistics,
            detections,
            projected,
            aggregated,
            filtered,
            shrunk,
            dissolved,
            hull,
            written,
        })
    }
}
