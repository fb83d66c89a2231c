//! GeoPackage geometry blob decoding
//!
//! A GeoPackage blob is a small header (magic `GP`, version, flags, SRS id,
//! optional envelope) followed by standard WKB. Only what the validators
//! need is decoded: the geometry kind and part count of any geometry, and
//! the rings of polygonal geometries.

use super::{Coord, MultiPolygon, Polygon};

/// Error when decoding a geometry blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WkbError {
    /// Blob ended before the geometry was complete
    UnexpectedEnd { offset: usize },
    /// Byte order marker was neither 0 nor 1
    InvalidByteOrder(u8),
    /// GeoPackage envelope indicator outside 0..=4
    InvalidEnvelope(u8),
    /// Geometry kind that cannot be read as the requested shape
    Unsupported(String),
}

impl std::fmt::Display for WkbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WkbError::UnexpectedEnd { offset } => {
                write!(f, "geometry blob truncated at byte {}", offset)
            }
            WkbError::InvalidByteOrder(b) => write!(f, "invalid WKB byte order marker {}", b),
            WkbError::InvalidEnvelope(e) => write!(f, "invalid GeoPackage envelope indicator {}", e),
            WkbError::Unsupported(kind) => write!(f, "unsupported geometry type {}", kind),
        }
    }
}

impl std::error::Error for WkbError {}

/// WKB geometry kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WkbKind {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
    Other(u32),
}

impl WkbKind {
    fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Point,
            2 => Self::LineString,
            3 => Self::Polygon,
            4 => Self::MultiPoint,
            5 => Self::MultiLineString,
            6 => Self::MultiPolygon,
            7 => Self::GeometryCollection,
            other => Self::Other(other),
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(
            self,
            Self::MultiPoint | Self::MultiLineString | Self::MultiPolygon | Self::GeometryCollection
        )
    }
}

/// Kind and part count of one geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometrySummary {
    pub kind: WkbKind,
    /// Number of parts; 1 for single-part geometries
    pub parts: usize,
}

impl GeometrySummary {
    /// A line, polygon or collection feature holding more than one part.
    /// Multipoints are a simple feature type whatever their point count.
    pub fn is_multipart(&self) -> bool {
        matches!(
            self.kind,
            WkbKind::MultiLineString | WkbKind::MultiPolygon | WkbKind::GeometryCollection
        ) && self.parts > 1
    }
}

const GPKG_EMPTY_FLAG: u8 = 0b0001_0000;

/// Strip the GeoPackage header from a blob.
///
/// Returns `None` for blobs flagged empty. Blobs without the `GP` magic are
/// returned unchanged and treated as plain WKB.
pub fn geopackage_body(blob: &[u8]) -> Result<Option<&[u8]>, WkbError> {
    if blob.len() < 2 || &blob[0..2] != b"GP" {
        return Ok(Some(blob));
    }
    if blob.len() < 8 {
        return Err(WkbError::UnexpectedEnd { offset: blob.len() });
    }

    let flags = blob[3];
    if flags & GPKG_EMPTY_FLAG != 0 {
        return Ok(None);
    }

    let envelope_len = match (flags >> 1) & 0b111 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => return Err(WkbError::InvalidEnvelope(other)),
    };

    let start = 8 + envelope_len;
    if blob.len() < start {
        return Err(WkbError::UnexpectedEnd { offset: blob.len() });
    }
    Ok(Some(&blob[start..]))
}

/// Summarize a GeoPackage blob. `None` for empty geometries.
pub fn summarize(blob: &[u8]) -> Result<Option<GeometrySummary>, WkbError> {
    let Some(body) = geopackage_body(blob)? else {
        return Ok(None);
    };
    let mut reader = Reader::new(body);
    let header = reader.header()?;
    let parts = match header.kind {
        k if k.is_multi() => reader.u32()? as usize,
        _ => 1,
    };
    Ok(Some(GeometrySummary {
        kind: header.kind,
        parts,
    }))
}

/// Read the polygons of a Polygon or MultiPolygon blob. `None` for empty
/// geometries.
pub fn read_polygons(blob: &[u8]) -> Result<Option<MultiPolygon>, WkbError> {
    let Some(body) = geopackage_body(blob)? else {
        return Ok(None);
    };
    let mut reader = Reader::new(body);
    let header = reader.header()?;
    match header.kind {
        WkbKind::Polygon => Ok(Some(MultiPolygon(vec![reader.polygon(header.dims)?]))),
        WkbKind::MultiPolygon => {
            let count = reader.u32()? as usize;
            let mut polygons = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                let part = reader.header()?;
                if part.kind != WkbKind::Polygon {
                    return Err(WkbError::Unsupported(format!("{:?} inside MultiPolygon", part.kind)));
                }
                polygons.push(reader.polygon(part.dims)?);
            }
            Ok(Some(MultiPolygon(polygons)))
        }
        other => Err(WkbError::Unsupported(format!("{:?}", other))),
    }
}

struct Header {
    kind: WkbKind,
    dims: usize,
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    little_endian: bool,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            little_endian: true,
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], WkbError> {
        let end = self.pos + N;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(WkbError::UnexpectedEnd { offset: self.pos })?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(slice);
        self.pos = end;
        Ok(bytes)
    }

    fn u32(&mut self) -> Result<u32, WkbError> {
        let bytes = self.take::<4>()?;
        Ok(if self.little_endian {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        })
    }

    fn f64(&mut self) -> Result<f64, WkbError> {
        let bytes = self.take::<8>()?;
        Ok(if self.little_endian {
            f64::from_le_bytes(bytes)
        } else {
            f64::from_be_bytes(bytes)
        })
    }

    /// Byte order marker and type code; handles ISO (1000s) and EWKB (flag
    /// bits) dimension encodings
    fn header(&mut self) -> Result<Header, WkbError> {
        let [order] = self.take::<1>()?;
        self.little_endian = match order {
            0 => false,
            1 => true,
            other => return Err(WkbError::InvalidByteOrder(other)),
        };

        let code = self.u32()?;
        let ewkb_z = code & 0x8000_0000 != 0;
        let ewkb_m = code & 0x4000_0000 != 0;
        if code & 0x2000_0000 != 0 {
            // Embedded SRID
            self.u32()?;
        }

        let base = code & 0x0FFF_FFFF;
        let (iso_z, iso_m) = match base / 1000 {
            1 => (true, false),
            2 => (false, true),
            3 => (true, true),
            _ => (false, false),
        };

        let dims = 2 + usize::from(ewkb_z || iso_z) + usize::from(ewkb_m || iso_m);
        Ok(Header {
            kind: WkbKind::from_code(base % 1000),
            dims,
        })
    }

    fn coord(&mut self, dims: usize) -> Result<Coord, WkbError> {
        let x = self.f64()?;
        let y = self.f64()?;
        for _ in 2..dims {
            self.f64()?;
        }
        Ok(Coord::new(x, y))
    }

    fn ring(&mut self, dims: usize) -> Result<Vec<Coord>, WkbError> {
        let count = self.u32()? as usize;
        let mut points = Vec::with_capacity(count.min(65_536));
        for _ in 0..count {
            points.push(self.coord(dims)?);
        }
        Ok(points)
    }

    fn polygon(&mut self, dims: usize) -> Result<Polygon, WkbError> {
        let ring_count = self.u32()? as usize;
        let mut rings = Vec::with_capacity(ring_count.min(1024));
        for _ in 0..ring_count {
            rings.push(self.ring(dims)?);
        }
        let mut rings = rings.into_iter();
        let exterior = rings.next().unwrap_or_default();
        Ok(Polygon::new(exterior, rings.collect()))
    }
}

/// Encode polygons as a little-endian GeoPackage blob without envelope
#[cfg(test)]
pub(crate) fn encode_geopackage(polygons: &MultiPolygon, srs_id: i32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"GP");
    out.push(0); // version
    out.push(0b0000_0001); // little endian header, no envelope
    out.extend_from_slice(&srs_id.to_le_bytes());

    let write_polygon = |out: &mut Vec<u8>, polygon: &Polygon| {
        out.push(1);
        out.extend_from_slice(&3u32.to_le_bytes());
        let rings: Vec<&Vec<Coord>> = std::iter::once(&polygon.exterior)
            .chain(polygon.interiors.iter())
            .collect();
        out.extend_from_slice(&(rings.len() as u32).to_le_bytes());
        for ring in rings {
            out.extend_from_slice(&(ring.len() as u32).to_le_bytes());
            for c in ring {
                out.extend_from_slice(&c.x.to_le_bytes());
                out.extend_from_slice(&c.y.to_le_bytes());
            }
        }
    };

    if polygons.0.len() == 1 {
        write_polygon(&mut out, &polygons.0[0]);
    } else {
        out.push(1);
        out.extend_from_slice(&6u32.to_le_bytes());
        out.extend_from_slice(&(polygons.0.len() as u32).to_le_bytes());
        for polygon in &polygons.0 {
            write_polygon(&mut out, polygon);
        }
    }
    out
}

/// Encode a single point as a GeoPackage blob
#[cfg(test)]
pub(crate) fn encode_point(x: f64, y: f64, srs_id: i32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"GP");
    out.push(0);
    out.push(0b0000_0001);
    out.extend_from_slice(&srs_id.to_le_bytes());
    out.push(1);
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&x.to_le_bytes());
    out.extend_from_slice(&y.to_le_bytes());
    out
}
