use std::io::Write;
use std::path::Path;

use itertools::Itertools;
use tempfile::NamedTempFile;
use tracing::info;

use super::error::Result;
use crate::{
    CityZipIndex, Dataset, DatasetMetadata, read_places_ndjson,
    raw::{PLACES_FILE, ZIPCODES_FILE},
};

/// Configuration for test data generation
#[derive(Debug, Clone)]
pub struct TestDataConfig {
    /// Include counties (Cook, Kern)
    pub include_counties: bool,
    /// Include postal code places
    pub include_postal_codes: bool,
    /// Include Mexico and its places
    pub include_mexico: bool,
}

impl Default for TestDataConfig {
    fn default() -> Self {
        Self::sample()
    }
}

impl TestDataConfig {
    /// Nations, states and a handful of cities
    pub fn minimal() -> Self {
        Self {
            include_counties: false,
            include_postal_codes: false,
            include_mexico: false,
        }
    }

    /// Everything in the fixture gazetteer
    pub fn sample() -> Self {
        Self {
            include_counties: true,
            include_postal_codes: true,
            include_mexico: true,
        }
    }
}

#[derive(Clone, Copy)]
enum Shape {
    /// min_lon, min_lat, max_lon, max_lat
    Rect(f64, f64, f64, f64),
    /// lon, lat
    Point(f64, f64),
}

impl Shape {
    fn to_wkt(self) -> String {
        match self {
            Self::Rect(x0, y0, x1, y1) => {
                format!("POLYGON(({x0} {y0}, {x1} {y0}, {x1} {y1}, {x0} {y1}, {x0} {y0}))")
            }
            Self::Point(x, y) => format!("POINT({x} {y})"),
        }
    }

    fn to_geojson(self) -> String {
        match self {
            Self::Rect(x0, y0, x1, y1) => serde_json::json!({
                "type": "Polygon",
                "coordinates": [[[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]],
            })
            .to_string(),
            Self::Point(x, y) => serde_json::json!({
                "type": "Point",
                "coordinates": [x, y],
            })
            .to_string(),
        }
    }
}

struct FixturePlace {
    id: &'static str,
    name: &'static str,
    place_type: &'static str,
    abbreviation: Option<&'static str>,
    parent: Option<&'static str>,
    aliases: &'static [&'static str],
    shape: Shape,
}

const fn place(
    id: &'static str,
    name: &'static str,
    place_type: &'static str,
    abbreviation: Option<&'static str>,
    parent: Option<&'static str>,
    shape: Shape,
) -> FixturePlace {
    FixturePlace {
        id,
        name,
        place_type,
        abbreviation,
        parent,
        aliases: &[],
        shape,
    }
}

const fn with_aliases(mut p: FixturePlace, aliases: &'static [&'static str]) -> FixturePlace {
    p.aliases = aliases;
    p
}

// Parents always precede their children.
const NATIONS_AND_STATES: &[FixturePlace] = &[
    with_aliases(
        place("US", "United States", "nation", Some("US"), None, Shape::Rect(-125.0, 32.5, -66.0, 50.0)),
        &["USA", "United States of America"],
    ),
    place("CA", "California", "state", Some("CA"), Some("US"), Shape::Rect(-124.0, 32.5, -114.0, 42.0)),
    place("UT", "Utah", "state", Some("UT"), Some("US"), Shape::Rect(-114.0, 37.0, -109.0, 42.0)),
    with_aliases(
        place("NY", "New York", "state", Some("NY"), Some("US"), Shape::Rect(-79.8, 40.5, -73.5, 45.0)),
        &["New York State"],
    ),
    place("MA", "Massachusetts", "state", Some("MA"), Some("US"), Shape::Rect(-73.5, 41.2, -69.9, 42.9)),
    place("IL", "Illinois", "state", Some("IL"), Some("US"), Shape::Rect(-91.5, 37.0, -87.5, 42.5)),
];

const CITIES: &[FixturePlace] = &[
    place("0667000", "San Francisco", "city", None, Some("CA"), Shape::Rect(-122.52, 37.70, -122.35, 37.83)),
    place("0644000", "Los Angeles", "city", None, Some("CA"), Shape::Rect(-118.67, 33.70, -118.15, 34.34)),
    place("0636770", "Irvine", "city", None, Some("CA"), Shape::Rect(-117.87, 33.60, -117.68, 33.75)),
    place("4967000", "Salt Lake City", "city", None, Some("UT"), Shape::Rect(-112.10, 40.70, -111.74, 40.85)),
    with_aliases(
        place("3651000", "New York", "city", None, Some("NY"), Shape::Rect(-74.26, 40.50, -73.70, 40.92)),
        &["New York City", "NYC"],
    ),
    place("2507000", "Boston", "city", None, Some("MA"), Shape::Rect(-71.19, 42.23, -70.99, 42.40)),
    place("2567000", "Springfield", "city", None, Some("MA"), Shape::Rect(-72.62, 42.07, -72.47, 42.16)),
    place("1714000", "Chicago", "city", None, Some("IL"), Shape::Rect(-87.94, 41.64, -87.52, 42.02)),
    place("1772000", "Springfield", "city", None, Some("IL"), Shape::Rect(-89.77, 39.70, -89.55, 39.87)),
];

const COUNTIES: &[FixturePlace] = &[
    place("17031", "Cook", "county", None, Some("IL"), Shape::Rect(-88.30, 41.40, -87.50, 42.20)),
    place("06029", "Kern", "county", None, Some("CA"), Shape::Rect(-120.20, 34.80, -117.60, 35.80)),
];

const POSTAL_CODES: &[FixturePlace] = &[
    place("94103", "94103", "postal_code", None, Some("CA"), Shape::Point(-122.41, 37.77)),
    place("91302", "91302", "postal_code", None, Some("CA"), Shape::Point(-118.66, 34.12)),
    place("84101", "84101", "postal_code", None, Some("UT"), Shape::Point(-111.90, 40.76)),
    place("10018", "10018", "postal_code", None, Some("NY"), Shape::Point(-73.99, 40.755)),
    place("02108", "02108", "postal_code", None, Some("MA"), Shape::Point(-71.06, 42.357)),
    place("60601", "60601", "postal_code", None, Some("IL"), Shape::Point(-87.62, 41.886)),
];

const MEXICO: &[FixturePlace] = &[
    place("MX", "Mexico", "nation", Some("MX"), None, Shape::Rect(-118.0, 14.0, -86.0, 32.5)),
    place("JAL", "Jalisco", "state", Some("JAL"), Some("MX"), Shape::Rect(-105.7, 18.9, -101.5, 22.7)),
    place("MX-CDMX", "Mexico City", "city", None, Some("MX"), Shape::Rect(-99.36, 19.05, -98.94, 19.59)),
    place("MX-GDL", "Guadalajara", "city", None, Some("JAL"), Shape::Rect(-103.45, 20.60, -103.25, 20.76)),
];

const ZIP_INDEX_JSON: &str = r#"{
  "CA": {
    "Calabasas": [{"zipcode": "91301"}, {"zipcode": "91302"}],
    "San Francisco": [{"zipcode": "94103"}]
  },
  "MA": {
    "Cambridge": [{"zipcode": "02138"}, {"zipcode": "02139"}]
  },
  "NY": {
    "Manhattan": [{"zipcode": "10001"}, {"zipcode": "10018"}]
  }
}"#;

fn selected_places(config: &TestDataConfig) -> impl Iterator<Item = &'static FixturePlace> {
    let mut groups: Vec<&'static [FixturePlace]> = vec![NATIONS_AND_STATES, CITIES];
    if config.include_counties {
        groups.push(COUNTIES);
    }
    if config.include_postal_codes {
        groups.push(POSTAL_CODES);
    }
    if config.include_mexico {
        groups.push(MEXICO);
    }
    groups.into_iter().flatten()
}

/// The fixture gazetteer as an NDJSON place stream.
///
/// Polygons alternate between GeoJSON and WKT so both readers get exercised.
pub fn places_ndjson(config: &TestDataConfig) -> String {
    selected_places(config)
        .enumerate()
        .map(|(i, p)| {
            let metadata = serde_json::json!({
                "id": p.id,
                "name": p.name,
                "type": p.place_type,
                "abbreviated_name": p.abbreviation,
                "parent_id": p.parent,
                "aliases": p.aliases.iter().map(|a| serde_json::json!({"name": a, "language": "eng"})).collect::<Vec<_>>(),
            });
            let geometry = if i % 2 == 0 {
                p.shape.to_geojson()
            } else {
                p.shape.to_wkt()
            };
            format!("{metadata}\n{geometry}")
        })
        .join("\n")
}

/// The fixture city/ZIP index as JSON.
pub fn zip_index_json() -> &'static str {
    ZIP_INDEX_JSON
}

/// Create test data files in temporary files: (places NDJSON, ZIP index JSON).
pub fn create_test_data(config: &TestDataConfig) -> Result<(NamedTempFile, NamedTempFile)> {
    info!("Creating test data with config: {:?}", config);

    let mut places = NamedTempFile::new()?;
    writeln!(places, "{}", places_ndjson(config))?;
    places.flush()?;

    let mut zips = NamedTempFile::new()?;
    zips.write_all(ZIP_INDEX_JSON.as_bytes())?;
    zips.flush()?;

    Ok((places, zips))
}

/// Write `places.ndjson` and `zipcodes.json` into `dir`.
pub fn write_test_data_dir(dir: &Path, config: &TestDataConfig) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(PLACES_FILE), places_ndjson(config))?;
    std::fs::write(dir.join(ZIPCODES_FILE), ZIP_INDEX_JSON)?;
    Ok(())
}

/// Build the fixture dataset in memory without touching disk.
pub fn test_dataset(config: &TestDataConfig) -> Result<Dataset> {
    let places = read_places_ndjson(places_ndjson(config).as_bytes())?;
    let zip_index = CityZipIndex::from_json_str(ZIP_INDEX_JSON)?;
    let metadata = DatasetMetadata {
        source: "test_data".to_string(),
        loaded_at: chrono::Utc::now(),
        place_rows: places.len(),
        zip_states: zip_index.state_count(),
    };
    Ok(Dataset {
        places,
        zip_index,
        metadata,
    })
}
