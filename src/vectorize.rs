//! Raster to polygon conversion.
//!
//! Pixels are grouped into connected regions of equal value, and each region's
//! boundary is traced along pixel edges into an exterior ring plus holes.
//! Coordinates are mapped through the raster's affine geotransform.

use crate::error::{PerimeterError, Result};
use geo::{Coord, LineString, MultiPolygon, Orient, Polygon};
use geo::orient::Direction;
use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pixel neighbourhood used to group a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Connectivity {
    /// Edge neighbours only
    Four,
    /// Edge and corner neighbours
    Eight,
}

impl TryFrom<u8> for Connectivity {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            4 => Ok(Connectivity::Four),
            8 => Ok(Connectivity::Eight),
            other => Err(format!("connectivity must be 4 or 8, got {}", other)),
        }
    }
}

impl From<Connectivity> for u8 {
    fn from(value: Connectivity) -> Self {
        match value {
            Connectivity::Four => 4,
            Connectivity::Eight => 8,
        }
    }
}

impl Connectivity {
    fn offsets(self) -> &'static [(i64, i64)] {
        const FOUR: [(i64, i64); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
        const EIGHT: [(i64, i64); 8] = [
            (-1, -1),
            (-1, 0),
            (-1, 1),
            (0, -1),
            (0, 1),
            (1, -1),
            (1, 0),
            (1, 1),
        ];
        match self {
            Connectivity::Four => &FOUR,
            Connectivity::Eight => &EIGHT,
        }
    }
}

/// A connected region of equal pixel value.
///
/// Under 8-connectivity a region may consist of several edge-connected parts
/// that only touch at pixel corners; each part is its own valid polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub shape: MultiPolygon<f64>,
    pub value: u8,
}

/// Map pixel-corner coordinates (column, row) to georeferenced coordinates
pub fn pixel_to_geo(geotransform: &[f64; 6], x: f64, y: f64) -> Coord<f64> {
    Coord {
        x: geotransform[0] + x * geotransform[1] + y * geotransform[2],
        y: geotransform[3] + x * geotransform[4] + y * geotransform[5],
    }
}

/// Label connected regions of equal value in raster scan order
fn label_regions(
    data: &Array2<u8>,
    connectivity: Connectivity,
) -> (Array2<usize>, Vec<(u8, Vec<(usize, usize)>)>) {
    let (nrows, ncols) = data.dim();
    let mut labels = Array2::from_elem((nrows, ncols), usize::MAX);
    let mut regions = Vec::new();
    let mut stack = Vec::new();

    for row in 0..nrows {
        for col in 0..ncols {
            if labels[[row, col]] != usize::MAX {
                continue;
            }

            let label = regions.len();
            let value = data[[row, col]];
            let mut pixels = Vec::new();

            labels[[row, col]] = label;
            stack.push((row, col));
            while let Some((r, c)) = stack.pop() {
                pixels.push((r, c));
                for &(dr, dc) in connectivity.offsets() {
                    let nr = r as i64 + dr;
                    let nc = c as i64 + dc;
                    if nr < 0 || nc < 0 || nr >= nrows as i64 || nc >= ncols as i64 {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    if labels[[nr, nc]] == usize::MAX && data[[nr, nc]] == value {
                        labels[[nr, nc]] = label;
                        stack.push((nr, nc));
                    }
                }
            }

            pixels.sort_unstable();
            regions.push((value, pixels));
        }
    }

    (labels, regions)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    East,
    South,
    West,
    North,
}

impl Step {
    fn delta(self) -> (i64, i64) {
        match self {
            Step::East => (1, 0),
            Step::South => (0, 1),
            Step::West => (-1, 0),
            Step::North => (0, -1),
        }
    }

    // Rows grow downwards, so a left turn from East faces North.
    fn turn_left(self) -> Self {
        match self {
            Step::East => Step::North,
            Step::North => Step::West,
            Step::West => Step::South,
            Step::South => Step::East,
        }
    }
}

/// Unit boundary edge between pixel corners, region on its right
#[derive(Debug, Clone, Copy)]
struct Edge {
    from: (i64, i64),
    step: Step,
}

impl Edge {
    fn end(&self) -> (i64, i64) {
        let (dx, dy) = self.step.delta();
        (self.from.0 + dx, self.from.1 + dy)
    }
}

/// Trace all boundary rings of one edge-connected component, as corner
/// vertices in pixel space.
///
/// Where two of its pixels touch only at a corner the trace turns left, so the
/// background pockets on either side end up in separate rings and no ring
/// visits a vertex twice.
fn trace_rings(labels: &Array2<usize>, label: usize, pixels: &[(usize, usize)]) -> Vec<Vec<(i64, i64)>> {
    let (nrows, ncols) = labels.dim();
    let member = |r: i64, c: i64| {
        r >= 0
            && c >= 0
            && (r as usize) < nrows
            && (c as usize) < ncols
            && labels[[r as usize, c as usize]] == label
    };

    let mut edges = Vec::new();
    for &(r, c) in pixels {
        let (r, c) = (r as i64, c as i64);
        if !member(r - 1, c) {
            edges.push(Edge { from: (c, r), step: Step::East });
        }
        if !member(r, c + 1) {
            edges.push(Edge { from: (c + 1, r), step: Step::South });
        }
        if !member(r + 1, c) {
            edges.push(Edge { from: (c + 1, r + 1), step: Step::West });
        }
        if !member(r, c - 1) {
            edges.push(Edge { from: (c, r + 1), step: Step::North });
        }
    }

    let mut outgoing: HashMap<(i64, i64), Vec<usize>> = HashMap::with_capacity(edges.len());
    for (i, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.from).or_default().push(i);
    }

    let next_edge = |i: usize| -> Option<usize> {
        let edge = &edges[i];
        let candidates = outgoing.get(&edge.end())?;
        match candidates.as_slice() {
            [only] => Some(*only),
            many => {
                let wanted = edge.step.turn_left();
                many.iter().copied().find(|&j| edges[j].step == wanted)
            }
        }
    };

    let mut visited = vec![false; edges.len()];
    let mut rings = Vec::new();
    for start in 0..edges.len() {
        if visited[start] {
            continue;
        }

        let mut ring = Vec::new();
        let mut current = start;
        loop {
            visited[current] = true;
            let Some(next) = next_edge(current) else {
                break;
            };
            if edges[current].step != edges[next].step {
                ring.push(edges[current].end());
            }
            if next == start || visited[next] {
                break;
            }
            current = next;
        }

        if ring.len() >= 4 {
            rings.push(ring);
        }
    }

    rings
}

/// Twice the signed shoelace area; positive for exterior rings in pixel space
fn doubled_signed_area(ring: &[(i64, i64)]) -> i64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = ring[i];
            let (x1, y1) = ring[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum()
}

fn ring_to_line_string<F>(ring: &[(i64, i64)], map: F) -> LineString<f64>
where
    F: Fn(f64, f64) -> Coord<f64>,
{
    let mut coords: Vec<Coord<f64>> = ring.iter().map(|&(x, y)| map(x as f64, y as f64)).collect();
    if let Some(&first) = coords.first() {
        coords.push(first);
    }
    LineString::new(coords)
}

/// Assemble the rings of one edge-connected component in pixel space.
///
/// Such a component has exactly one outer boundary, so every negative ring is
/// one of its holes.
fn component_polygon(rings: Vec<Vec<(i64, i64)>>) -> Option<Polygon<f64>> {
    let (shells, holes): (Vec<_>, Vec<_>) = rings
        .into_iter()
        .partition(|ring| doubled_signed_area(ring) > 0);
    debug_assert_eq!(shells.len(), 1);

    let pixel = |x: f64, y: f64| Coord { x, y };
    let shell = shells.first()?;
    let interiors = holes
        .iter()
        .map(|hole| ring_to_line_string(hole, pixel))
        .collect();
    Some(Polygon::new(ring_to_line_string(shell, pixel), interiors))
}

fn georeference(polygon: &Polygon<f64>, geotransform: &[f64; 6]) -> Polygon<f64> {
    let to_geo = |c: &Coord<f64>| pixel_to_geo(geotransform, c.x, c.y);
    let exterior: LineString<f64> = polygon.exterior().coords().map(to_geo).collect();
    let interiors: Vec<LineString<f64>> = polygon
        .interiors()
        .iter()
        .map(|ring| ring.coords().map(to_geo).collect::<LineString<f64>>())
        .collect();
    Polygon::new(exterior, interiors).orient(Direction::Default)
}

/// Group edge-connected components into regions of the requested connectivity
fn group_components(
    data: &Array2<u8>,
    components: &[(u8, Vec<(usize, usize)>)],
    connectivity: Connectivity,
) -> Vec<(u8, Vec<usize>)> {
    match connectivity {
        Connectivity::Four => components
            .iter()
            .enumerate()
            .map(|(label, (value, _))| (*value, vec![label]))
            .collect(),
        Connectivity::Eight => {
            let (labels, regions) = label_regions(data, Connectivity::Eight);
            let mut groups: Vec<(u8, Vec<usize>)> = regions
                .iter()
                .map(|(value, _)| (*value, Vec::new()))
                .collect();
            for (label, (_, pixels)) in components.iter().enumerate() {
                if let Some(&(r, c)) = pixels.first() {
                    groups[labels[[r, c]]].1.push(label);
                }
            }
            groups
        }
    }
}

fn vectorize_regions<F>(
    data: &Array2<u8>,
    geotransform: &[f64; 6],
    connectivity: Connectivity,
    keep: F,
) -> Result<Vec<Region>>
where
    F: Fn(u8) -> bool,
{
    let (nrows, ncols) = data.dim();
    if nrows == 0 || ncols == 0 {
        return Err(PerimeterError::InvalidDimensions(ncols, nrows));
    }

    let (parts, components) = label_regions(data, Connectivity::Four);
    let groups: Vec<(u8, Vec<usize>)> = group_components(data, &components, connectivity)
        .into_iter()
        .filter(|(value, _)| keep(*value))
        .collect();
    debug!(
        "Tracing {} regions ({:?} connectivity, {} edge-connected parts) in {}x{} raster",
        groups.len(),
        connectivity,
        components.len(),
        ncols,
        nrows
    );

    let regions: Vec<Region> = groups
        .par_iter()
        .map(|(value, members)| {
            let polygons: Vec<Polygon<f64>> = members
                .iter()
                .filter_map(|&label| {
                    let rings = trace_rings(&parts, label, &components[label].1);
                    component_polygon(rings)
                })
                .map(|polygon| georeference(&polygon, geotransform))
                .collect();
            Region {
                shape: MultiPolygon::new(polygons),
                value: *value,
            }
        })
        .collect();

    Ok(regions)
}

/// Vectorize every region of the raster into (shape, value) pairs.
///
/// Regions come out in raster scan order of their first pixel, with
/// counter-clockwise exteriors and clockwise holes.
pub fn polygonize(
    data: &Array2<u8>,
    geotransform: &[f64; 6],
    connectivity: Connectivity,
) -> Result<Vec<Region>> {
    vectorize_regions(data, geotransform, connectivity, |_| true)
}

/// Polygons of all regions with a positive value; the background is never traced
pub fn hot_polygons(
    classified: &Array2<u8>,
    geotransform: &[f64; 6],
    connectivity: Connectivity,
) -> Result<Vec<Polygon<f64>>> {
    let regions = vectorize_regions(classified, geotransform, connectivity, |value| value > 0)?;
    let region_count = regions.len();
    let polygons: Vec<Polygon<f64>> = regions
        .into_iter()
        .flat_map(|region| region.shape)
        .collect();

    info!(
        "Vectorized {} hot regions into {} polygons",
        region_count,
        polygons.len()
    );
    Ok(polygons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, BoundingRect, Validation};
    use ndarray::arr2;

    const IDENTITY: [f64; 6] = [0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

    #[test]
    fn test_connectivity_from_u8() {
        assert_eq!(Connectivity::try_from(4).unwrap(), Connectivity::Four);
        assert_eq!(Connectivity::try_from(8).unwrap(), Connectivity::Eight);
        assert!(Connectivity::try_from(6).is_err());
        assert_eq!(u8::from(Connectivity::Eight), 8);
    }

    #[test]
    fn test_single_block() {
        let data = arr2(&[
            [0u8, 0, 0, 0],
            [0, 1, 1, 0],
            [0, 1, 1, 0],
            [0, 0, 0, 0],
        ]);
        let polygons = hot_polygons(&data, &IDENTITY, Connectivity::Four).unwrap();
        assert_eq!(polygons.len(), 1);
        assert!((polygons[0].unsigned_area() - 4.0).abs() < 1e-9);
        // four corners plus the closing coordinate
        assert_eq!(polygons[0].exterior().0.len(), 5);
        assert!(polygons[0].interiors().is_empty());
    }

    #[test]
    fn test_background_region_has_hole() {
        let data = arr2(&[
            [0u8, 0, 0, 0],
            [0, 1, 1, 0],
            [0, 1, 1, 0],
            [0, 0, 0, 0],
        ]);
        let regions = polygonize(&data, &IDENTITY, Connectivity::Four).unwrap();
        assert_eq!(regions.len(), 2);
        let background = regions.iter().find(|r| r.value == 0).unwrap();
        assert_eq!(background.shape.0.len(), 1);
        assert_eq!(background.shape.0[0].interiors().len(), 1);
        assert!((background.shape.unsigned_area() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_ring_with_hole() {
        let data = arr2(&[[1u8, 1, 1], [1, 0, 1], [1, 1, 1]]);
        let polygons = hot_polygons(&data, &IDENTITY, Connectivity::Four).unwrap();
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].interiors().len(), 1);
        assert!((polygons[0].unsigned_area() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_l_shape_vertices() {
        let data = arr2(&[[1u8, 0], [1, 1]]);
        let polygons = hot_polygons(&data, &IDENTITY, Connectivity::Four).unwrap();
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].exterior().0.len(), 7);
        assert!((polygons[0].unsigned_area() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_diagonal_pixels_depend_on_connectivity() {
        let data = arr2(&[[1u8, 0], [0, 1]]);
        let hot = |connectivity| -> Vec<Region> {
            polygonize(&data, &IDENTITY, connectivity)
                .unwrap()
                .into_iter()
                .filter(|r| r.value == 1)
                .collect()
        };

        let four = hot(Connectivity::Four);
        assert_eq!(four.len(), 2);

        let eight = hot(Connectivity::Eight);
        assert_eq!(eight.len(), 1);
        assert_eq!(eight[0].shape.0.len(), 2);
        assert!((eight[0].shape.unsigned_area() - 2.0).abs() < 1e-9);
        assert!(eight[0].shape.0.iter().all(|p| p.is_valid()));

        let polygons = hot_polygons(&data, &IDENTITY, Connectivity::Eight).unwrap();
        assert_eq!(polygons.len(), 2);
    }

    #[test]
    fn test_output_is_valid_for_both_connectivities() {
        let data = arr2(&[
            [1u8, 0, 1, 0, 0, 1],
            [0, 1, 0, 1, 1, 0],
            [1, 1, 0, 0, 1, 0],
            [1, 0, 1, 1, 1, 1],
            [1, 0, 1, 0, 1, 0],
            [0, 1, 1, 1, 0, 1],
        ]);
        for connectivity in [Connectivity::Four, Connectivity::Eight] {
            let regions = polygonize(&data, &IDENTITY, connectivity).unwrap();
            for region in &regions {
                for polygon in &region.shape.0 {
                    assert!(
                        polygon.is_valid(),
                        "{:?} value {}: {:?}",
                        connectivity,
                        region.value,
                        polygon.check_validation()
                    );
                }
            }
            let area: f64 = regions.iter().map(|r| r.shape.unsigned_area()).sum();
            assert!((area - 36.0).abs() < 1e-9, "{:?}: {}", connectivity, area);
        }
    }

    #[test]
    fn test_island_touching_hole_corner_is_separate() {
        let data = arr2(&[
            [1u8, 1, 1, 1, 1],
            [1, 1, 0, 0, 1],
            [1, 0, 1, 0, 1],
            [1, 0, 0, 0, 1],
            [1, 1, 1, 1, 1],
        ]);
        let polygons = hot_polygons(&data, &IDENTITY, Connectivity::Eight).unwrap();
        assert_eq!(polygons.len(), 2);
        assert!(polygons.iter().all(|p| p.is_valid()));
        let area: f64 = polygons.iter().map(|p| p.unsigned_area()).sum();
        assert!((area - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_geotransform_applied() {
        let data = arr2(&[
            [0u8, 0, 0, 0],
            [0, 1, 1, 0],
            [0, 1, 1, 0],
            [0, 0, 0, 0],
        ]);
        let gt = [500000.0, 10.0, 0.0, 4600000.0, 0.0, -10.0];
        let polygons = hot_polygons(&data, &gt, Connectivity::Four).unwrap();
        assert_eq!(polygons.len(), 1);
        assert!((polygons[0].unsigned_area() - 400.0).abs() < 1e-6);

        let rect = polygons[0].bounding_rect().unwrap();
        assert!((rect.min().x - 500010.0).abs() < 1e-9);
        assert!((rect.max().x - 500030.0).abs() < 1e-9);
        assert!((rect.min().y - 4599970.0).abs() < 1e-9);
        assert!((rect.max().y - 4599990.0).abs() < 1e-9);
    }

    #[test]
    fn test_revectorize_is_identical() {
        let data = arr2(&[
            [1u8, 1, 0, 0, 1],
            [1, 0, 0, 1, 1],
            [1, 1, 1, 1, 0],
            [0, 0, 1, 0, 0],
            [1, 0, 1, 1, 1],
        ]);
        let first = hot_polygons(&data, &IDENTITY, Connectivity::Four).unwrap();
        let second = hot_polygons(&data, &IDENTITY, Connectivity::Four).unwrap();
        assert_eq!(first, second);

        let hot_pixels = data.iter().filter(|&&v| v == 1).count() as f64;
        let area: f64 = first.iter().map(|p| p.unsigned_area()).sum();
        assert!((area - hot_pixels).abs() < 1e-9);
    }

    #[test]
    fn test_no_hot_pixels() {
        let data = Array2::<u8>::zeros((3, 3));
        let polygons = hot_polygons(&data, &IDENTITY, Connectivity::Four).unwrap();
        assert!(polygons.is_empty());
    }

    #[test]
    fn test_regions_tile_the_raster() {
        let data = arr2(&[[1u8, 0, 1], [0, 1, 0], [1, 0, 1]]);
        for connectivity in [Connectivity::Four, Connectivity::Eight] {
            let regions = polygonize(&data, &IDENTITY, connectivity).unwrap();
            let area: f64 = regions.iter().map(|r| r.shape.unsigned_area()).sum();
            assert!((area - 9.0).abs() < 1e-9, "{:?}: {}", connectivity, area);
        }
    }
}
