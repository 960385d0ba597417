use crate::error::{PerimeterError, Result};
use gdal::spatial_ref::{AxisMappingStrategy, SpatialRef};
use log::{info, warn};

/// Coordinate reference system, stored as WKT with its EPSG code when known
#[derive(Debug, Clone, PartialEq)]
pub struct Crs {
    epsg: Option<u32>,
    wkt: String,
}

/// Linear unit of a CRS, relevant for buffer distances and area thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceUnits {
    Meters,
    Degrees,
    /// Projected with a non-metre unit (factor to metres)
    Other(f64),
}

impl Crs {
    pub fn from_epsg(code: u32) -> Result<Self> {
        let spatial_ref = SpatialRef::from_epsg(code)
            .map_err(|e| PerimeterError::CrsError(format!("EPSG:{} is not usable: {}", code, e)))?;
        Ok(Self {
            epsg: Some(code),
            wkt: spatial_ref.to_wkt()?,
        })
    }

    pub fn from_wkt(wkt: &str) -> Result<Self> {
        let spatial_ref = SpatialRef::from_wkt(wkt)
            .map_err(|e| PerimeterError::CrsError(format!("Failed to parse WKT: {}", e)))?;
        Self::from_spatial_ref(&spatial_ref)
    }

    pub fn from_spatial_ref(spatial_ref: &SpatialRef) -> Result<Self> {
        let epsg = spatial_ref
            .auth_code()
            .ok()
            .and_then(|code| u32::try_from(code).ok());
        Ok(Self {
            epsg,
            wkt: spatial_ref.to_wkt()?,
        })
    }

    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    pub fn wkt(&self) -> &str {
        &self.wkt
    }

    /// GDAL spatial reference with x = easting/longitude axis order
    pub fn spatial_ref(&self) -> Result<SpatialRef> {
        let mut spatial_ref = SpatialRef::from_wkt(&self.wkt)
            .map_err(|e| PerimeterError::CrsError(format!("Failed to parse WKT: {}", e)))?;
        spatial_ref.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        Ok(spatial_ref)
    }

    pub fn units(&self) -> Result<DistanceUnits> {
        let spatial_ref = self.spatial_ref()?;
        if spatial_ref.is_geographic() {
            return Ok(DistanceUnits::Degrees);
        }

        let linear_units = spatial_ref.linear_units();
        // Most metric projected systems report exactly 1.0
        if (linear_units - 1.0).abs() < 0.01 {
            Ok(DistanceUnits::Meters)
        } else {
            Ok(DistanceUnits::Other(linear_units))
        }
    }

    /// Whether this CRS and the other one are the same EPSG definition
    pub fn same_epsg(&self, other: &Crs) -> bool {
        matches!((self.epsg, other.epsg), (Some(a), Some(b)) if a == b)
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.epsg {
            Some(code) => write!(f, "EPSG:{}", code),
            None => write!(f, "custom CRS"),
        }
    }
}

/// Warn when buffer distances would not be interpreted in metres
pub fn check_distance_units(crs: &Crs) -> Result<DistanceUnits> {
    let units = crs.units()?;
    match units {
        DistanceUnits::Meters => {
            info!("{} uses metres; buffer distances and areas are in m / m²", crs);
        }
        DistanceUnits::Degrees => {
            warn!(
                "{} is geographic; buffer distances would be applied in degrees",
                crs
            );
        }
        DistanceUnits::Other(factor) => {
            warn!(
                "{} uses non-metre units (factor {:.6}); buffer distances are in those units",
                crs, factor
            );
        }
    }
    Ok(units)
}

/// Compare the raster's own CRS to the declared source CRS
pub fn check_declared_source(raster_projection: &str, declared: &Crs) {
    if raster_projection.trim().is_empty() {
        info!("Raster carries no CRS, assuming declared source {}", declared);
        return;
    }

    match Crs::from_wkt(raster_projection) {
        Ok(raster_crs) if raster_crs.same_epsg(declared) => {
            info!("Raster CRS matches declared source {}", declared);
        }
        Ok(raster_crs) => {
            warn!(
                "Raster CRS ({}) differs from declared source {}; using the declared one",
                raster_crs, declared
            );
        }
        Err(e) => {
            warn!("Failed to parse raster CRS, using declared source {}: {}", declared, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let crs = Crs {
            epsg: Some(26910),
            wkt: String::new(),
        };
        assert_eq!(crs.to_string(), "EPSG:26910");

        let custom = Crs {
            epsg: None,
            wkt: String::new(),
        };
        assert_eq!(custom.to_string(), "custom CRS");
    }

    #[test]
    fn test_same_epsg() {
        let a = Crs {
            epsg: Some(4326),
            wkt: "a".to_string(),
        };
        let b = Crs {
            epsg: Some(4326),
            wkt: "b".to_string(),
        };
        let unknown = Crs {
            epsg: None,
            wkt: "a".to_string(),
        };
        assert!(a.same_epsg(&b));
        assert!(!a.same_epsg(&unknown));
        assert!(!unknown.same_epsg(&unknown.clone()));
    }

    #[test]
    fn test_units_of_known_codes() {
        assert_eq!(Crs::from_epsg(4326).unwrap().units().unwrap(), DistanceUnits::Degrees);
        assert_eq!(Crs::from_epsg(26910).unwrap().units().unwrap(), DistanceUnits::Meters);
    }

    #[test]
    fn test_unknown_epsg_is_crs_error() {
        assert!(matches!(
            Crs::from_epsg(999_999),
            Err(PerimeterError::CrsError(_))
        ));
    }

    #[test]
    fn test_empty_projection_is_not_an_error() {
        let declared = Crs::from_epsg(4326).unwrap();
        check_declared_source("", &declared);
    }
}
