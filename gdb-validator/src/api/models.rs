//! Boundary service payloads
//!
//! The service answers with an EsriJSON feature set (`features[].geometry.rings`)
//! or a GeoJSON `FeatureCollection` of Polygon / MultiPolygon features. Error
//! payloads (`{"error": {...}}`) are reported as [`BoundaryError::Service`].

use serde::Deserialize;
use serde_json::Value;

use crate::geometry::{Coord, MultiPolygon, Polygon, polygons_from_rings};

/// Boundary service failures callers report verbatim
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryError {
    /// Non-success HTTP status
    Http { status: u16, body: String },
    /// The service answered with an error payload
    Service { code: Option<i64>, message: String },
    /// The body is not a recognizable feature set
    Malformed(String),
}

impl std::fmt::Display for BoundaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http { status, body } if body.is_empty() => {
                write!(f, "boundary service returned HTTP {}", status)
            }
            Self::Http { status, body } => {
                write!(f, "boundary service returned HTTP {}: {}", status, body)
            }
            Self::Service { code: Some(code), message } => {
                write!(f, "boundary service error {}: {}", code, message)
            }
            Self::Service { code: None, message } => write!(f, "boundary service error: {}", message),
            Self::Malformed(reason) => write!(f, "unexpected boundary service response: {}", reason),
        }
    }
}

impl std::error::Error for BoundaryError {}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EsriFeatureSet {
    #[serde(default)]
    features: Vec<EsriFeature>,
}

#[derive(Debug, Deserialize)]
struct EsriFeature {
    geometry: Option<EsriGeometry>,
}

#[derive(Debug, Deserialize)]
struct EsriGeometry {
    #[serde(default)]
    rings: Vec<Vec<Vec<f64>>>,
}

#[derive(Debug, Deserialize)]
struct GeoJsonCollection {
    #[serde(default)]
    features: Vec<GeoJsonFeature>,
}

#[derive(Debug, Deserialize)]
struct GeoJsonFeature {
    geometry: Option<GeoJsonGeometry>,
}

#[derive(Debug, Deserialize)]
struct GeoJsonGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

/// Parse a boundary service body into one polygon set per feature
///
/// Features without geometry are skipped; an empty result is not an error.
pub fn parse_boundary_response(body: &str) -> Result<Vec<MultiPolygon>, BoundaryError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| BoundaryError::Malformed(format!("invalid JSON: {}", e)))?;

    if let Some(error) = value.get("error") {
        let error: ServiceError = serde_json::from_value(error.clone())
            .map_err(|e| BoundaryError::Malformed(format!("invalid error payload: {}", e)))?;
        let mut message = error.message.unwrap_or_else(|| "unknown error".to_string());
        if !error.details.is_empty() {
            message = format!("{} ({})", message, error.details.join("; "));
        }
        return Err(BoundaryError::Service {
            code: error.code,
            message,
        });
    }

    let is_geojson = value.get("type").and_then(Value::as_str) == Some("FeatureCollection");
    if is_geojson {
        let collection: GeoJsonCollection = serde_json::from_value(value)
            .map_err(|e| BoundaryError::Malformed(format!("invalid GeoJSON: {}", e)))?;
        return collection
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .map(geojson_polygons)
            .filter(|r| !matches!(r, Ok(p) if p.0.is_empty()))
            .collect();
    }

    if value.get("features").is_none() {
        return Err(BoundaryError::Malformed("no features member".to_string()));
    }

    let feature_set: EsriFeatureSet = serde_json::from_value(value)
        .map_err(|e| BoundaryError::Malformed(format!("invalid feature set: {}", e)))?;

    let mut result = Vec::new();
    for geometry in feature_set.features.into_iter().filter_map(|f| f.geometry) {
        let rings = geometry
            .rings
            .iter()
            .map(|ring| to_ring(ring))
            .collect::<Result<Vec<_>, _>>()?;
        let polygons = polygons_from_rings(rings);
        if !polygons.is_empty() {
            result.push(MultiPolygon(polygons));
        }
    }
    Ok(result)
}

fn geojson_polygons(geometry: GeoJsonGeometry) -> Result<MultiPolygon, BoundaryError> {
    let invalid = |e: serde_json::Error| BoundaryError::Malformed(format!("invalid coordinates: {}", e));
    match geometry.kind.as_str() {
        "Polygon" => {
            let rings: Vec<Vec<Vec<f64>>> =
                serde_json::from_value(geometry.coordinates).map_err(invalid)?;
            Ok(MultiPolygon(geojson_polygon(&rings)?.into_iter().collect()))
        }
        "MultiPolygon" => {
            let parts: Vec<Vec<Vec<Vec<f64>>>> =
                serde_json::from_value(geometry.coordinates).map_err(invalid)?;
            let mut polygons = Vec::new();
            for rings in &parts {
                polygons.extend(geojson_polygon(rings)?);
            }
            Ok(MultiPolygon(polygons))
        }
        other => Err(BoundaryError::Malformed(format!(
            "boundary features must be polygons, got {}",
            other
        ))),
    }
}

fn geojson_polygon(rings: &[Vec<Vec<f64>>]) -> Result<Option<Polygon>, BoundaryError> {
    let mut rings = rings.iter().map(|r| to_ring(r));
    let Some(exterior) = rings.next().transpose()? else {
        return Ok(None);
    };
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Some(Polygon::new(exterior, interiors)))
}

fn to_ring(points: &[Vec<f64>]) -> Result<Vec<Coord>, BoundaryError> {
    points
        .iter()
        .map(|p| match p.as_slice() {
            [x, y, ..] => Ok(Coord::new(*x, *y)),
            _ => Err(BoundaryError::Malformed(format!(
                "coordinate with {} values",
                p.len()
            ))),
        })
        .collect()
}
