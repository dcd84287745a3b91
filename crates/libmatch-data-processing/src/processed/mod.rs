//! Parsed forms of the raw datasets.

pub mod places;
pub mod zipcodes;

pub use places::{
    AliasRecord, PlaceMetadata, PlaceRecord, PlaceType, parse_geometry, read_places_ndjson,
};
pub use zipcodes::{CityZipIndex, ZipRecord};
