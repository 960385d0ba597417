use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::DriverManager;
use ndarray::Array2;
use std::path::Path;

/// North-up geographic transform near the Mills Fire, ~8 m x 11 m pixels
pub const MILLS_GEOTRANSFORM: [f64; 6] = [-122.40, 0.0001, 0.0, 41.45, 0.0, -0.0001];

/// Write a single-band u16 GeoTIFF in EPSG:4326
pub fn write_thermal_tiff(path: &Path, data: &Array2<u16>, geotransform: [f64; 6]) {
    let (height, width) = data.dim();
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type::<u16, _>(path, width, height, 1)
        .unwrap();
    dataset.set_geo_transform(&geotransform).unwrap();
    dataset
        .set_spatial_ref(&SpatialRef::from_epsg(4326).unwrap())
        .unwrap();

    let mut band = dataset.rasterband(1).unwrap();
    let mut buffer = Buffer::new((width, height), data.iter().copied().collect());
    band.write((0, 0), (width, height), &mut buffer).unwrap();
}

/// Background of 100 with hot blocks set to 40000
pub fn thermal_scene(size: usize, blocks: &[(usize, usize, usize, usize)]) -> Array2<u16> {
    let mut data = Array2::from_elem((size, size), 100u16);
    for &(row, col, height, width) in blocks {
        for r in row..row + height {
            for c in col..col + width {
                data[[r, c]] = 40000;
            }
        }
    }
    data
}
