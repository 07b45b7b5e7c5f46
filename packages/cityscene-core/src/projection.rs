//! Coordinate reference systems.
//!
//! Only EPSG codes are understood. Actual transformations are delegated to
//! PROJ through the optional `proj` feature; runs whose inputs already share
//! the target CRS need nothing beyond the identity.

use geo::{Coord, MapCoords, Polygon};

use crate::error::{Result, SceneError};

pub const WGS84: u32 = 4326;

/// Extract an EPSG code from the spellings found in GeoJSON and CityJSON files.
pub fn parse_epsg(name: &str) -> Option<u32> {
    let name = name.trim();
    let upper = name.to_ascii_uppercase();
    if upper.ends_with("CRS84") || upper.ends_with("CRS:84") {
        return Some(WGS84);
    }
    let tail = if let Some(rest) = upper.strip_prefix("EPSG:") {
        rest
    } else if upper.contains(":EPSG:") || upper.contains("/EPSG/") {
        upper.rsplit(|c: char| c == ':' || c == '/').next()?
    } else {
        return None;
    };
    tail.parse().ok()
}

/// `referenceSystem` value: the OGC URL form for CityJSON 2.x, the URN form
/// for older versions.
pub fn reference_system_uri(epsg: u32, cityjson_version: &str) -> String {
    if cityjson_version.starts_with('1') {
        format!("urn:ogc:def:crs:EPSG::{}", epsg)
    } else {
        format!("https://www.opengis.net/def/crs/EPSG/0/{}", epsg)
    }
}

/// Legacy GeoJSON `crs` name.
pub fn crs_urn(epsg: u32) -> String {
    format!("urn:ogc:def:crs:EPSG::{}", epsg)
}

/// Point transformation between two EPSG systems.
pub trait Reprojector {
    fn source_epsg(&self) -> u32;
    fn target_epsg(&self) -> u32;
    fn convert(&self, x: f64, y: f64) -> std::result::Result<(f64, f64), String>;

    fn is_identity(&self) -> bool {
        self.source_epsg() == self.target_epsg()
    }

    fn reproject_polygon(&self, polygon: &Polygon<f64>) -> std::result::Result<Polygon<f64>, String> {
        if self.is_identity() {
            return Ok(polygon.clone());
        }
        polygon.try_map_coords(|c: Coord<f64>| {
            self.convert(c.x, c.y).map(|(x, y)| Coord { x, y })
        })
    }
}

/// Same CRS on both sides.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub epsg: u32,
}

impl Reprojector for Identity {
    fn source_epsg(&self) -> u32 {
        self.epsg
    }

    fn target_epsg(&self) -> u32 {
        self.epsg
    }

    fn convert(&self, x: f64, y: f64) -> std::result::Result<(f64, f64), String> {
        Ok((x, y))
    }
}

#[cfg(feature = "proj")]
pub struct ProjReprojector {
    from: u32,
    to: u32,
    proj: proj::Proj,
}

#[cfg(feature = "proj")]
impl ProjReprojector {
    pub fn new(from: u32, to: u32) -> Result<Self> {
        let proj = proj::Proj::new_known_crs(&format!("EPSG:{}", from), &format!("EPSG:{}", to), None)
            .map_err(|e| SceneError::Reprojection {
                from,
                to,
                reason: e.to_string(),
            })?;
        Ok(Self { from, to, proj })
    }
}

#[cfg(feature = "proj")]
impl Reprojector for ProjReprojector {
    fn source_epsg(&self) -> u32 {
        self.from
    }

    fn target_epsg(&self) -> u32 {
        self.to
    }

    fn convert(&self, x: f64, y: f64) -> std::result::Result<(f64, f64), String> {
        self.proj.convert((x, y)).map_err(|e| e.to_string())
    }
}

/// Transformation from `from` to `to`.
pub fn reprojector(from: u32, to: u32) -> Result<Box<dyn Reprojector>> {
    if from == to {
        return Ok(Box::new(Identity { epsg: to }));
    }
    #[cfg(feature = "proj")]
    {
        Ok(Box::new(ProjReprojector::new(from, to)?))
    }
    #[cfg(not(feature = "proj"))]
    {
        Err(SceneError::Reprojection {
            from,
            to,
            reason: "built without the `proj` feature".to_string(),
        })
    }
}
