use crate::crs::Crs;
use crate::error::{PerimeterError, Result};
use crate::geometry::FeatureCollection;
use gdal::cpl::CslStringList;
use gdal::raster::RasterBand;
use gdal::vector::{LayerAccess, LayerOptions, OGRwkbGeometryType, ToGdal};
use gdal::{Dataset, DriverManager};
use geo::Geometry;
use log::{debug, info};
use ndarray::Array2;
use std::path::Path;

const SHAPEFILE_SIDECARS: [&str; 5] = ["shp", "shx", "dbf", "prj", "cpg"];

#[derive(Debug, Clone)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    pub geotransform: [f64; 6],
    pub projection: String,
    pub nodata: Option<f64>,
}

impl RasterMetadata {
    /// Nodata as a band value; ignored when it cannot occur in a u16 band
    pub fn nodata_u16(&self) -> Option<u16> {
        self.nodata
            .filter(|v| v.fract() == 0.0 && (0.0..=u16::MAX as f64).contains(v))
            .map(|v| v as u16)
    }
}

/// Extract metadata from a dataset without reading pixel data
pub fn extract_metadata_from_dataset(dataset: &Dataset) -> Result<RasterMetadata> {
    let rasterband: RasterBand = dataset.rasterband(1)?;

    let width = rasterband.x_size() as usize;
    let height = rasterband.y_size() as usize;

    if width == 0 || height == 0 {
        return Err(PerimeterError::InvalidDimensions(width, height));
    }

    let nodata = rasterband.no_data_value();
    let geotransform = dataset.geo_transform()?;
    let pixel_width = geotransform[1].abs();
    let pixel_height = geotransform[5].abs();

    if pixel_width <= 0.0 {
        return Err(PerimeterError::InvalidPixelSize(pixel_width));
    }
    if pixel_height <= 0.0 {
        return Err(PerimeterError::InvalidPixelSize(pixel_height));
    }
    debug!("Pixel size: {:.9} x {:.9}", pixel_width, pixel_height);

    Ok(RasterMetadata {
        width,
        height,
        geotransform,
        projection: dataset.projection(),
        nodata,
    })
}

/// Read band 1 of a thermal GeoTIFF as unsigned 16-bit intensities
pub fn read_thermal_band<P: AsRef<Path>>(path: P) -> Result<(Array2<u16>, RasterMetadata)> {
    let path = path.as_ref();
    info!("Opening input raster: {}", path.display());
    let dataset = Dataset::open(path)?;

    let metadata = extract_metadata_from_dataset(&dataset)?;
    let rasterband = dataset.rasterband(1)?;
    let (width, height) = (metadata.width, metadata.height);

    debug!("Raster dimensions: {}x{}", width, height);
    if let Some(nodata) = metadata.nodata {
        debug!("Nodata value: {}", nodata);
    }

    // Read entire band; GDAL clamps wider source types into u16
    let buffer = rasterband.read_as::<u16>((0, 0), (width, height), (width, height), None)?;
    let data_vec: Vec<u16> = buffer.into_iter().collect();
    let data = Array2::from_shape_vec((height, width), data_vec)?;

    Ok((data, metadata))
}

/// Validate compression type
pub fn validate_compression(compression: &str) -> Result<()> {
    let valid_types = ["DEFLATE", "LZW", "ZSTD", "NONE"];
    if !valid_types.contains(&compression) {
        return Err(PerimeterError::InvalidCompression(compression.to_string()));
    }
    Ok(())
}

/// Write a single-band u8 GeoTIFF with the source georeferencing
pub fn write_u8_raster<P: AsRef<Path>>(
    path: P,
    data: &Array2<u8>,
    metadata: &RasterMetadata,
    compression: &str,
) -> Result<()> {
    let path = path.as_ref();
    validate_compression(compression)?;
    info!("Creating output raster: {}", path.display());

    let (height, width) = data.dim();
    if width != metadata.width || height != metadata.height {
        return Err(PerimeterError::InvalidDimensions(width, height));
    }

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut options = CslStringList::new();
    options.add_string(&format!("COMPRESS={}", compression))?;

    let mut dataset =
        driver.create_with_band_type_with_options::<u8, _>(path, width, height, 1, &options)?;
    dataset.set_geo_transform(&metadata.geotransform)?;
    if !metadata.projection.is_empty() {
        dataset.set_projection(&metadata.projection)?;
    }

    let mut raster_band = dataset.rasterband(1)?;
    let mut buffer = gdal::raster::Buffer::new((width, height), data.iter().copied().collect());
    raster_band.write((0, 0), (width, height), &mut buffer)?;

    debug!("Wrote {}x{} u8 raster", width, height);
    Ok(())
}

/// Remove a shapefile and its sidecar files if present
pub fn remove_shapefile<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    for extension in SHAPEFILE_SIDECARS {
        let sidecar = path.with_extension(extension);
        if sidecar.exists() {
            debug!("Removing {}", sidecar.display());
            std::fs::remove_file(&sidecar)?;
        }
    }
    Ok(())
}

/// Write polygonal geometries to a fresh ESRI Shapefile with no attributes
pub fn write_shapefile<P: AsRef<Path>>(
    path: P,
    crs: &Crs,
    geometries: &[Geometry<f64>],
) -> Result<()> {
    let path = path.as_ref();
    info!(
        "Writing {} features to {} ({})",
        geometries.len(),
        path.display(),
        crs
    );

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    remove_shapefile(path)?;

    let layer_type = if geometries
        .iter()
        .any(|g| matches!(g, Geometry::MultiPolygon(_)))
    {
        OGRwkbGeometryType::wkbMultiPolygon
    } else {
        OGRwkbGeometryType::wkbPolygon
    };

    let layer_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("features")
        .to_string();
    let spatial_ref = crs.spatial_ref()?;

    let driver = DriverManager::get_driver_by_name("ESRI Shapefile")?;
    let mut dataset = driver.create_vector_only(path)?;
    let mut layer = dataset.create_layer(LayerOptions {
        name: &layer_name,
        srs: Some(&spatial_ref),
        ty: layer_type,
        ..Default::default()
    })?;

    for geometry in geometries {
        layer.create_feature(geometry.to_gdal()?)?;
    }

    Ok(())
}

/// Write a feature collection as a polygon shapefile
pub fn write_collection<P: AsRef<Path>>(path: P, collection: &FeatureCollection) -> Result<()> {
    write_shapefile(path, &collection.crs, &collection.to_geometries())
}

/// Read every polygon of the first layer of a vector dataset
pub fn read_collection<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let path = path.as_ref();
    info!("Reading features: {}", path.display());
    let dataset = Dataset::open(path)?;
    let mut layer = dataset.layer(0)?;

    let crs = match layer.spatial_ref() {
        Some(spatial_ref) => Crs::from_spatial_ref(&spatial_ref)?,
        None => {
            return Err(PerimeterError::CrsError(format!(
                "{} has no CRS",
                path.display()
            )))
        }
    };

    let mut geometries = Vec::new();
    for feature in layer.features() {
        if let Some(geometry) = feature.geometry() {
            geometries.push(geometry.to_geo()?);
        }
    }

    let collection = FeatureCollection::from_geometries(crs, geometries)?;
    debug!("Read {} polygons from {}", collection.len(), path.display());
    Ok(collection)
}
