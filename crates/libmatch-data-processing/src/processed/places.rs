use std::{fmt, io::BufRead, str::FromStr};

use geo_types::{Coord, Geometry, LineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::{DataError, Result};

/// The kinds of places the registry keeps track of.
///
/// These are not precise legal terms. Every census-designated place is a
/// `City`, and a nation's top-level divisions are `State`s whatever the
/// nation calls them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceType {
    Nation,
    State,
    County,
    City,
    PostalCode,
    LibraryServiceArea,
    Everywhere,
}

impl PlaceType {
    pub const ALL: [Self; 7] = [
        Self::Nation,
        Self::State,
        Self::County,
        Self::City,
        Self::PostalCode,
        Self::LibraryServiceArea,
        Self::Everywhere,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nation => "nation",
            Self::State => "state",
            Self::County => "county",
            Self::City => "city",
            Self::PostalCode => "postal_code",
            Self::LibraryServiceArea => "library_service_area",
            Self::Everywhere => "everywhere",
        }
    }
}

impl fmt::Display for PlaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaceType {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DataError::UnknownPlaceType(s.to_string()))
    }
}

/// An alternate name for a place, optionally tagged with a language code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AliasRecord {
    pub name: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// The metadata line of a place in the NDJSON stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceMetadata {
    /// Identifier of the place in its source dataset.
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub place_type: PlaceType,
    #[serde(default)]
    pub abbreviated_name: Option<String>,
    /// Source-dataset identifier of the enclosing place.
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub aliases: Vec<AliasRecord>,
}

/// A place as read from the raw data, before it is placed in a store.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceRecord {
    pub metadata: PlaceMetadata,
    pub geometry: Option<Geometry<f64>>,
}

impl PlaceRecord {
    /// Build a record from one metadata line and one geometry line.
    pub fn from_lines(metadata: &str, geometry: &str) -> Result<Self> {
        let metadata: PlaceMetadata = serde_json::from_str(metadata.trim())?;
        let geometry = parse_geometry(geometry)?;
        trace!(id = %metadata.id, place_type = %metadata.place_type, has_geometry = geometry.is_some(), "Parsed place record");
        Ok(Self { metadata, geometry })
    }
}

type Position = Vec<f64>;

/// The subset of GeoJSON geometry objects found in place data.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJsonGeometry {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
}

fn coord(position: &[f64]) -> Result<Coord<f64>> {
    match position {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => Err(DataError::Geometry(format!(
            "position needs at least two ordinates, got {}",
            position.len()
        ))),
    }
}

fn ring(positions: &[Position]) -> Result<LineString<f64>> {
    positions
        .iter()
        .map(|p| coord(p))
        .collect::<Result<Vec<_>>>()
        .map(LineString::new)
}

fn polygon(rings: &[Vec<Position>]) -> Result<Polygon<f64>> {
    let Some((exterior, interiors)) = rings.split_first() else {
        return Err(DataError::Geometry("polygon without rings".to_string()));
    };
    let interiors = interiors
        .iter()
        .map(|r| ring(r))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(ring(exterior)?, interiors))
}

impl TryFrom<GeoJsonGeometry> for Geometry<f64> {
    type Error = DataError;

    fn try_from(value: GeoJsonGeometry) -> Result<Self> {
        Ok(match value {
            GeoJsonGeometry::Point { coordinates } => Point::from(coord(&coordinates)?).into(),
            GeoJsonGeometry::MultiPoint { coordinates } => MultiPoint::new(
                coordinates
                    .iter()
                    .map(|p| coord(p).map(Point::from))
                    .collect::<Result<Vec<_>>>()?,
            )
            .into(),
            GeoJsonGeometry::Polygon { coordinates } => polygon(&coordinates)?.into(),
            GeoJsonGeometry::MultiPolygon { coordinates } => MultiPolygon::new(
                coordinates
                    .iter()
                    .map(|rings| polygon(rings))
                    .collect::<Result<Vec<_>>>()?,
            )
            .into(),
        })
    }
}

fn parse_wkt(text: &str) -> Result<Geometry<f64>> {
    // EWKT carries a "SRID=4326;" prefix; everything here is already 4326.
    let text = match text.split_once(';') {
        Some((prefix, rest)) if prefix.trim().to_ascii_uppercase().starts_with("SRID=") => rest,
        _ => text,
    };
    wkt::Wkt::from_str(text)
        .map_err(|e| DataError::Geometry(format!("{e:?}")))
        .and_then(|w| {
            w.try_into()
                .map_err(|e: wkt::conversion::Error| DataError::Geometry(format!("{e:?}")))
        })
}

/// Parse a geometry written either as GeoJSON or as (E)WKT.
///
/// An empty line or a JSON `null` means the place has no geometry.
pub fn parse_geometry(text: &str) -> Result<Option<Geometry<f64>>> {
    let text = text.trim();
    if text.is_empty() || text == "null" {
        return Ok(None);
    }
    if text.starts_with('{') {
        let geojson: GeoJsonGeometry = serde_json::from_str(text)?;
        return Geometry::try_from(geojson).map(Some);
    }
    parse_wkt(text).map(Some)
}

/// Read an NDJSON place stream: a metadata line followed by a geometry line,
/// repeated. Blank lines are skipped.
#[instrument(name = "Read places NDJSON", skip_all, level = "debug")]
pub fn read_places_ndjson<R: BufRead>(reader: R) -> Result<Vec<PlaceRecord>> {
    let mut records = Vec::new();
    let mut lines = reader
        .lines()
        .enumerate()
        .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.trim().is_empty()));

    while let Some((idx, metadata)) = lines.next() {
        let metadata = metadata?;
        let Some((_, geometry)) = lines.next() else {
            return Err(DataError::MissingGeometryLine { line: idx + 1 });
        };
        records.push(PlaceRecord::from_lines(&metadata, &geometry?)?);
    }
    debug!(num_records = records.len(), "Finished reading place records");
    Ok(records)
}
