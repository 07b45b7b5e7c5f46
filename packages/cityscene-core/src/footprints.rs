//! Building footprint layer.
//!
//! Footprints come from a GeoJSON document whose legacy `crs` member, when
//! present, names the source CRS (EPSG:4326 otherwise). Each polygon part of a
//! feature becomes one [`Footprint`]; features that cannot produce a footprint
//! are recorded as failures instead of aborting the run.

use std::path::Path;

use geo_types::{Geometry, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson};
use log::{debug, info, warn};

use crate::compression::read_document;
use crate::error::{FootprintFailure, Result, SceneError, SkipReason};
use crate::object_keys::FootprintId;
use crate::projection::{self, Reprojector};

/// One polygon part, in whatever CRS the layer currently is.
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    pub id: FootprintId,
    pub polygon: Polygon<f64>,
}

#[derive(Debug, Clone)]
pub struct FootprintLayer {
    pub epsg: u32,
    /// Number of features in the source document.
    pub feature_count: usize,
    pub footprints: Vec<Footprint>,
    pub skipped: Vec<FootprintFailure>,
}

impl FootprintLayer {
    /// Transform every footprint into the reprojector's target CRS. Parts that
    /// fail to transform move to `skipped`.
    pub fn reproject(mut self, reprojector: &dyn Reprojector) -> Self {
        if reprojector.is_identity() {
            return self;
        }
        let mut kept = Vec::with_capacity(self.footprints.len());
        for footprint in self.footprints {
            match reprojector.reproject_polygon(&footprint.polygon) {
                Ok(polygon) => kept.push(Footprint {
                    id: footprint.id,
                    polygon,
                }),
                Err(reason) => self.skipped.push(FootprintFailure {
                    id: footprint.id,
                    reason: SkipReason::Reprojection(reason),
                }),
            }
        }
        self.footprints = kept;
        self.epsg = reprojector.target_epsg();
        self
    }

    /// Keep only footprints accepted by `keep`; returns how many were removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&Footprint) -> bool) -> usize {
        let before = self.footprints.len();
        self.footprints.retain(|f| keep(f));
        before - self.footprints.len()
    }
}

/// EPSG code named by a collection's legacy `crs` member.
pub fn detect_crs(collection: &FeatureCollection) -> Result<u32> {
    let Some(crs) = collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
    else {
        return Ok(projection::WGS84);
    };
    let name = crs
        .get("properties")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
        .ok_or_else(|| SceneError::UnsupportedCrs(crs.to_string()))?;
    projection::parse_epsg(name).ok_or_else(|| SceneError::UnsupportedCrs(name.to_string()))
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

fn is_empty(polygon: &Polygon<f64>) -> bool {
    polygon.exterior().0.is_empty()
}

/// Polygon parts of one feature, or the reason it has none.
fn feature_parts(feature: Feature) -> std::result::Result<Vec<Polygon<f64>>, SkipReason> {
    let Some(geometry) = feature.geometry else {
        return Err(SkipReason::EmptyGeometry);
    };
    let geometry = Geometry::<f64>::try_from(geometry)
        .map_err(|e| SkipReason::UnsupportedGeometry(e.to_string()))?;

    let parts: Vec<Polygon<f64>> = match geometry {
        Geometry::Polygon(polygon) => vec![polygon],
        Geometry::MultiPolygon(multi) => multi.0,
        other => return Err(SkipReason::UnsupportedGeometry(geometry_name(&other).to_string())),
    };
    if parts.is_empty() || parts.iter().all(is_empty) {
        return Err(SkipReason::EmptyGeometry);
    }
    Ok(parts)
}

/// Parse a GeoJSON document into footprints, keeping source coordinates.
pub fn parse_footprints(text: &str, path: &Path) -> Result<FootprintLayer> {
    let geojson: GeoJson = text.parse().map_err(|source| SceneError::GeoJson {
        path: path.to_path_buf(),
        source,
    })?;

    let collection = match geojson {
        GeoJson::FeatureCollection(collection) => collection,
        GeoJson::Feature(feature) => FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        },
        GeoJson::Geometry(geometry) => FeatureCollection {
            bbox: None,
            features: vec![Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            foreign_members: None,
        },
    };

    let epsg = detect_crs(&collection)?;
    let feature_count = collection.features.len();
    let mut footprints = Vec::new();
    let mut skipped = Vec::new();

    for (source_index, feature) in collection.features.into_iter().enumerate() {
        match feature_parts(feature) {
            Ok(parts) => {
                for (part, polygon) in parts.into_iter().enumerate() {
                    let id = FootprintId::new(source_index, part);
                    if is_empty(&polygon) {
                        skipped.push(FootprintFailure {
                            id,
                            reason: SkipReason::EmptyGeometry,
                        });
                    } else {
                        footprints.push(Footprint { id, polygon });
                    }
                }
            }
            Err(reason) => skipped.push(FootprintFailure {
                id: FootprintId::new(source_index, 0),
                reason,
            }),
        }
    }

    debug!(
        "Parsed {} features into {} footprint parts ({} skipped), EPSG:{}",
        feature_count,
        footprints.len(),
        skipped.len(),
        epsg
    );

    Ok(FootprintLayer {
        epsg,
        feature_count,
        footprints,
        skipped,
    })
}

/// Read footprints from `path` and bring them into `target_epsg`.
pub fn load_footprints(path: &Path, target_epsg: u32) -> Result<FootprintLayer> {
    let text = read_document(path)?;
    let layer = parse_footprints(&text, path)?;
    info!(
        "Loaded {} footprint features from {} (EPSG:{})",
        layer.feature_count,
        path.display(),
        layer.epsg
    );
    if !layer.skipped.is_empty() {
        warn!("{} footprint features have no usable polygon", layer.skipped.len());
    }

    let reprojector = projection::reprojector(layer.epsg, target_epsg)?;
    Ok(layer.reproject(reprojector.as_ref()))
}
