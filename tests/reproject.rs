use fire_perimeter::crs::DistanceUnits;
use fire_perimeter::io::{read_collection, write_collection};
use fire_perimeter::reproject::{reproject, Reprojector};
use fire_perimeter::{Crs, FeatureCollection, PerimeterError};
use geo::{polygon, Area, Polygon};

fn lonlat_square() -> Polygon<f64> {
    polygon![
        (x: -122.40, y: 41.45),
        (x: -122.39, y: 41.45),
        (x: -122.39, y: 41.46),
        (x: -122.40, y: 41.46),
        (x: -122.40, y: 41.45),
    ]
}

#[test]
fn test_geographic_to_utm_axis_order() {
    let wgs84 = Crs::from_epsg(4326).unwrap();
    let utm = Crs::from_epsg(26910).unwrap();
    let collection = FeatureCollection::new(wgs84, vec![lonlat_square()]);

    let projected = reproject(&collection, &utm).unwrap();
    assert_eq!(projected.crs.epsg(), Some(26910));

    let first = projected.polygons[0].exterior().0[0];
    // zone 10 central meridian is -123, so -122.4 lies east of 500 km
    assert!(first.x > 540_000.0 && first.x < 560_000.0, "x = {}", first.x);
    assert!(first.y > 4_580_000.0 && first.y < 4_600_000.0, "y = {}", first.y);

    // 0.01 deg x 0.01 deg at 41.45 N is roughly 834 m x 1111 m
    let area = projected.total_area();
    assert!((area - 834.0 * 1111.0).abs() < 0.02 * area, "area = {}", area);
    assert_eq!(utm.units().unwrap(), DistanceUnits::Meters);
}

#[test]
fn test_round_trip_within_tolerance() {
    let wgs84 = Crs::from_epsg(4326).unwrap();
    let utm = Crs::from_epsg(26910).unwrap();
    let original = FeatureCollection::new(wgs84.clone(), vec![lonlat_square()]);

    let forward = Reprojector::new(&wgs84, &utm).unwrap();
    let backward = Reprojector::new(&utm, &wgs84).unwrap();
    let round_trip = backward
        .transform_collection(&forward.transform_collection(&original).unwrap())
        .unwrap();

    for (a, b) in original.polygons[0]
        .exterior()
        .coords()
        .zip(round_trip.polygons[0].exterior().coords())
    {
        assert!((a.x - b.x).abs() < 1e-8, "{:?} vs {:?}", a, b);
        assert!((a.y - b.y).abs() < 1e-8, "{:?} vs {:?}", a, b);
    }
}

#[test]
fn test_holes_are_reprojected() {
    let wgs84 = Crs::from_epsg(4326).unwrap();
    let utm = Crs::from_epsg(26910).unwrap();
    let hole = polygon![
        (x: -122.398, y: 41.452),
        (x: -122.392, y: 41.452),
        (x: -122.392, y: 41.458),
        (x: -122.398, y: 41.458),
        (x: -122.398, y: 41.452),
    ];
    let with_hole = Polygon::new(
        lonlat_square().exterior().clone(),
        vec![hole.exterior().clone()],
    );
    let collection = FeatureCollection::new(wgs84, vec![with_hole]);

    let projected = reproject(&collection, &utm).unwrap();
    assert_eq!(projected.polygons[0].interiors().len(), 1);
    assert!(projected.polygons[0].unsigned_area() < 834.0 * 1111.0);
}

#[test]
fn test_unknown_target_is_fatal() {
    assert!(matches!(
        Crs::from_epsg(123_456_789),
        Err(PerimeterError::CrsError(_))
    ));
}

#[test]
fn test_shapefile_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("class1.proj.shp");
    let utm = Crs::from_epsg(26910).unwrap();
    let polygon = Polygon::new(
        polygon![
            (x: 550000.0, y: 4590000.0),
            (x: 550100.0, y: 4590000.0),
            (x: 550100.0, y: 4590100.0),
            (x: 550000.0, y: 4590100.0),
            (x: 550000.0, y: 4590000.0),
        ]
        .exterior()
        .clone(),
        vec![polygon![
            (x: 550040.0, y: 4590040.0),
            (x: 550060.0, y: 4590040.0),
            (x: 550060.0, y: 4590060.0),
            (x: 550040.0, y: 4590060.0),
            (x: 550040.0, y: 4590040.0),
        ]
        .exterior()
        .clone()],
    );
    let collection = FeatureCollection::new(utm, vec![polygon]);

    write_collection(&path, &collection).unwrap();
    let reread = read_collection(&path).unwrap();

    assert_eq!(reread.len(), 1);
    assert_eq!(reread.polygons[0].interiors().len(), 1);
    assert!((reread.total_area() - 9600.0).abs() < 1e-6);
    assert_eq!(reread.crs.units().unwrap(), DistanceUnits::Meters);
}
