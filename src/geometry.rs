//! In-memory feature collections and the polygon post-processing stages:
//! expand and merge, interior ring filtering, shrink, minimum area,
//! dissolve and concave hull.

use crate::crs::Crs;
use crate::error::{GeometryError, GeometryErrorKind, PerimeterError, Result};
use geo::algorithm::bool_ops::FillRule;
use geo::orient::Direction;
use geo::{
    unary_union, Area, BooleanOps, Buffer, ConcaveHull, ConvexHull, Geometry, MultiPolygon,
    Orient, Polygon, Validation,
};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// What to do with a polygon that fails validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidGeometryPolicy {
    /// Rebuild the polygon with an even-odd self-union, keeping every lobe
    Repair,
    /// Discard the feature
    Drop,
    /// Fail the stage
    Abort,
}

/// Ordered polygon features sharing one CRS; attributes are empty
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCollection {
    pub crs: Crs,
    pub polygons: Vec<Polygon<f64>>,
}

impl FeatureCollection {
    pub fn new(crs: Crs, polygons: Vec<Polygon<f64>>) -> Self {
        Self { crs, polygons }
    }

    /// Collect polygonal geometries, splitting multi-polygons into parts
    pub fn from_geometries<I>(crs: Crs, geometries: I) -> Result<Self>
    where
        I: IntoIterator<Item = Geometry<f64>>,
    {
        let mut polygons = Vec::new();
        for (index, geometry) in geometries.into_iter().enumerate() {
            match geometry {
                Geometry::Polygon(polygon) => polygons.push(polygon),
                Geometry::MultiPolygon(multi) => polygons.extend(multi),
                other => {
                    return Err(GeometryError {
                        kind: GeometryErrorKind::Invalid,
                        stage: "read",
                        index,
                        detail: format!("expected a polygon, found {}", geometry_name(&other)),
                    }
                    .into())
                }
            }
        }
        Ok(Self::new(crs, polygons))
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn total_area(&self) -> f64 {
        self.polygons.iter().map(|p| p.unsigned_area()).sum()
    }

    pub fn to_geometries(&self) -> Vec<Geometry<f64>> {
        self.polygons.iter().cloned().map(Geometry::Polygon).collect()
    }
}

fn geometry_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Rebuild a self-intersecting polygon from the areas its rings enclose.
///
/// Even-odd filling keeps every lobe of a figure-eight, whatever the winding
/// of each lobe; the parts come back with counter-clockwise exteriors.
pub fn repair(polygon: &Polygon<f64>) -> Vec<Polygon<f64>> {
    polygon
        .union_with_fill_rule(polygon, FillRule::EvenOdd)
        .into_iter()
        .map(|part| part.orient(Direction::Default))
        .collect()
}

/// Handle invalid polygons according to the policy, then drop empty ones
pub fn apply_policy(
    stage: &'static str,
    polygons: Vec<Polygon<f64>>,
    policy: InvalidGeometryPolicy,
) -> Result<Vec<Polygon<f64>>> {
    let mut kept = Vec::with_capacity(polygons.len());

    for (index, polygon) in polygons.into_iter().enumerate() {
        let candidates = match polygon.check_validation() {
            Ok(()) => vec![polygon],
            Err(reason) => {
                let err = GeometryError {
                    kind: GeometryErrorKind::Invalid,
                    stage,
                    index,
                    detail: reason.to_string(),
                };
                match policy {
                    InvalidGeometryPolicy::Abort => return Err(PerimeterError::Geometry(err)),
                    InvalidGeometryPolicy::Drop => {
                        warn!("{}; dropped", err);
                        Vec::new()
                    }
                    InvalidGeometryPolicy::Repair => {
                        let repaired = repair(&polygon);
                        warn!("{}; repaired into {} part(s)", err, repaired.len());
                        repaired
                    }
                }
            }
        };

        for part in candidates {
            if part.unsigned_area() > 0.0 {
                kept.push(part);
            } else {
                let err = GeometryError {
                    kind: GeometryErrorKind::Empty,
                    stage,
                    index,
                    detail: "zero area".to_string(),
                };
                warn!("{}; dropped", err);
            }
        }
    }

    Ok(kept)
}

/// Buffer each polygon by `distance`, union the results and explode the union.
///
/// Positive distances grow polygons so that nearby ones merge; negative
/// distances shrink them, possibly to nothing.
pub fn buffer_union(polygons: &[Polygon<f64>], distance: f64) -> Vec<Polygon<f64>> {
    let buffered: Vec<MultiPolygon<f64>> = polygons
        .par_iter()
        .map(|polygon| polygon.buffer(distance))
        .collect();

    let merged = unary_union(buffered.iter());
    debug!(
        "Buffered {} polygons by {} into {} merged polygons",
        polygons.len(),
        distance,
        merged.0.len()
    );
    merged.0
}

/// Expand every polygon outward and merge overlapping results
pub fn aggregate(
    collection: &FeatureCollection,
    expand_distance: f64,
    policy: InvalidGeometryPolicy,
) -> Result<FeatureCollection> {
    info!(
        "Aggregating {} polygons with buffer distance {}",
        collection.len(),
        expand_distance
    );
    let input = apply_policy("aggregate", collection.polygons.clone(), policy)?;
    let merged = buffer_union(&input, expand_distance);
    let merged = apply_policy("aggregate", merged, policy)?;

    let output = FeatureCollection::new(collection.crs.clone(), merged);
    info!(
        "Aggregated into {} polygons, area {:.1} -> {:.1}",
        output.len(),
        collection.total_area(),
        output.total_area()
    );
    Ok(output)
}

/// Keep each exterior as is; keep holes only if their area exceeds `min_area`
pub fn filter_interior_rings(polygon: &Polygon<f64>, min_area: f64) -> Polygon<f64> {
    let interiors = polygon
        .interiors()
        .iter()
        .filter(|ring| Polygon::new((*ring).clone(), vec![]).unsigned_area() > min_area)
        .cloned()
        .collect();
    Polygon::new(polygon.exterior().clone(), interiors)
}

/// Filter small holes in every polygon of the collection
pub fn filter_holes(collection: &FeatureCollection, min_area: f64) -> FeatureCollection {
    let polygons: Vec<Polygon<f64>> = collection
        .polygons
        .iter()
        .map(|polygon| filter_interior_rings(polygon, min_area))
        .collect();

    let holes_before: usize = collection.polygons.iter().map(|p| p.interiors().len()).sum();
    let holes_after: usize = polygons.iter().map(|p| p.interiors().len()).sum();
    let output = FeatureCollection::new(collection.crs.clone(), polygons);
    info!(
        "Interior ring filter (min area {}): {} -> {} holes, area {:.1} -> {:.1}",
        min_area,
        holes_before,
        holes_after,
        collection.total_area(),
        output.total_area()
    );
    output
}

/// Shrink every polygon inward and merge what remains
pub fn shrink(
    collection: &FeatureCollection,
    shrink_distance: f64,
    policy: InvalidGeometryPolicy,
) -> Result<FeatureCollection> {
    info!(
        "Shrinking {} polygons with buffer distance {}",
        collection.len(),
        shrink_distance
    );
    let merged = buffer_union(&collection.polygons, shrink_distance);
    let merged = apply_policy("shrink", merged, policy)?;

    let output = FeatureCollection::new(collection.crs.clone(), merged);
    info!(
        "Shrunk into {} polygons, area {:.1} -> {:.1}",
        output.len(),
        collection.total_area(),
        output.total_area()
    );
    Ok(output)
}

/// Keep polygons whose area is strictly greater than `min_area`
pub fn filter_min_area(collection: &FeatureCollection, min_area: f64) -> FeatureCollection {
    let polygons: Vec<Polygon<f64>> = collection
        .polygons
        .iter()
        .filter(|p| p.unsigned_area() > min_area)
        .cloned()
        .collect();
    let dropped = collection.len() - polygons.len();
    if dropped > 0 {
        info!("Dropped {} polygons with area <= {}", dropped, min_area);
    }
    FeatureCollection::new(collection.crs.clone(), polygons)
}

/// Union all polygons into a single multi-polygon
pub fn dissolve(collection: &FeatureCollection) -> MultiPolygon<f64> {
    unary_union(collection.polygons.iter())
}

/// Concave hull around all detections; larger concavity is closer to convex
pub fn concave_hull(collection: &FeatureCollection, concavity: f64) -> Option<Polygon<f64>> {
    if collection.is_empty() {
        return None;
    }
    let dissolved = dissolve(collection);
    if concavity.is_infinite() {
        return Some(dissolved.convex_hull());
    }
    Some(dissolved.concave_hull(concavity))
}
