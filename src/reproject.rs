use crate::crs::Crs;
use crate::error::{PerimeterError, Result};
use crate::geometry::FeatureCollection;
use gdal::spatial_ref::CoordTransform;
use geo::{Coord, LineString, Polygon};
use log::{debug, info};

/// Transforms coordinates between two CRSs via GDAL/PROJ
pub struct Reprojector {
    transform: CoordTransform,
    target: Crs,
}

impl Reprojector {
    pub fn new(source: &Crs, target: &Crs) -> Result<Self> {
        let transform = CoordTransform::new(&source.spatial_ref()?, &target.spatial_ref()?)
            .map_err(|e| {
                PerimeterError::CrsError(format!(
                    "No transformation from {} to {}: {}",
                    source, target, e
                ))
            })?;
        Ok(Self {
            transform,
            target: target.clone(),
        })
    }

    pub fn transform_ring(&self, ring: &LineString<f64>) -> Result<LineString<f64>> {
        let mut xs: Vec<f64> = ring.coords().map(|c| c.x).collect();
        let mut ys: Vec<f64> = ring.coords().map(|c| c.y).collect();
        let mut zs = vec![0.0; xs.len()];

        self.transform.transform_coords(&mut xs, &mut ys, &mut zs)?;

        Ok(xs
            .into_iter()
            .zip(ys)
            .map(|(x, y)| Coord { x, y })
            .collect())
    }

    pub fn transform_polygon(&self, polygon: &Polygon<f64>) -> Result<Polygon<f64>> {
        let exterior = self.transform_ring(polygon.exterior())?;
        let interiors = polygon
            .interiors()
            .iter()
            .map(|ring| self.transform_ring(ring))
            .collect::<Result<Vec<_>>>()?;
        Ok(Polygon::new(exterior, interiors))
    }

    /// Transform every feature; any failing coordinate fails the whole collection
    pub fn transform_collection(&self, collection: &FeatureCollection) -> Result<FeatureCollection> {
        let polygons = collection
            .polygons
            .iter()
            .enumerate()
            .map(|(index, polygon)| {
                debug!("Reprojecting feature {}", index);
                self.transform_polygon(polygon)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(FeatureCollection::new(self.target.clone(), polygons))
    }
}

/// Reproject a feature collection into the target CRS
pub fn reproject(collection: &FeatureCollection, target: &Crs) -> Result<FeatureCollection> {
    info!(
        "Reprojecting {} features from {} to {}",
        collection.len(),
        collection.crs,
        target
    );
    let reprojector = Reprojector::new(&collection.crs, target)?;
    reprojector.transform_collection(collection)
}
