//! Points on the earth given by the people searching for libraries.

use std::{fmt, str::FromStr};

use geo_types::Point;
use once_cell::sync::Lazy;
use regex::Regex;

pub use error::LocationError;
use error::Result;

/// SRID assumed when none is given: WGS84 longitude/latitude.
pub const DEFAULT_SRID: u32 = 4326;

/// "40.7, -73.9" or "40.7 -73.9", latitude first. Trailing whitespace is
/// allowed, nothing else.
static LAT_LONG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)^
        (?P<latitude> -? (?: 90 | [1-8][0-9] | [0-9] ) (?: \.[0-9]+ )? )
        [,\ ] \ *
        (?P<longitude> -? (?: 180 | 1[0-7][0-9] | [1-9][0-9] | [0-9] ) (?: \.[0-9]+ )? )
        \s* $",
    )
    .expect("valid regex")
});

/// "POINT(-73.9 40.7)" or "SRID=4326;POINT(-73.9 40.7)", longitude first.
static WKT_POINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?xi)^
        (?: SRID=(?P<srid>[0-9]+); )?
        POINT\(
            (?P<longitude> -? (?: 180 | 1[0-7][0-9] | [1-9][0-9] | [0-9] ) (?: \.[0-9]+ )? )
            \
            (?P<latitude> -? (?: 90 | [1-8][0-9] | [0-9] ) (?: \.[0-9]+ )? )
        \)$",
    )
    .expect("valid regex")
});

/// Rough boxes of open ocean as (south, north, west, east).
const OCEAN_BOXES: [(f64, f64, f64, f64); 14] = [
    (-12.35, 50.25, -151.27, -129.95),
    (-24.44, 14.62, -146.73, -94.48),
    (-9.35, 50.98, -180.0, -162.44),
    (-1.48, 41.61, 145.66, 180.00),
    (-64.47, -35.54, 73.84, 135.41),
    (2.33, 27.57, 129.39, 145.66),
    (-7.83, 16.89, 82.89, 94.09),
    (-47.83, 5.45, 51.07, 94.53),
    (-18.17, 14.22, 55.71, 72.32),
    (-70.54, -18.42, -180.0, -116.75),
    (-66.11, 2.22, -33.89, 7.24),
    (40.87, 56.60, -51.67, -10.17),
    (18.69, 42.81, -65.21, -18.94),
    (22.78, 28.69, -96.44, -84.44),
];

/// A validated latitude/longitude pair with its SRID.
///
/// Two locations are equal when they agree to six decimal places.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy)]
pub struct Location {
    latitude: f64,
    longitude: f64,
    srid: u32,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(LocationError::InvalidLocation(format!("{latitude}, {longitude}")));
        }
        Ok(Self {
            latitude,
            longitude,
            srid: DEFAULT_SRID,
        })
    }

    #[must_use]
    pub fn with_srid(mut self, srid: u32) -> Self {
        self.srid = srid;
        self
    }

    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    #[must_use]
    pub fn srid(&self) -> u32 {
        self.srid
    }

    /// The location as a lon/lat point.
    #[must_use]
    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    #[must_use]
    pub fn wkt(&self) -> String {
        format!("POINT({} {})", self.longitude, self.latitude)
    }

    #[must_use]
    pub fn ewkt(&self) -> String {
        format!("SRID={};{}", self.srid, self.wkt())
    }

    /// Whether the location is, very roughly, in the middle of an ocean.
    #[must_use]
    pub fn in_ocean(&self) -> bool {
        OCEAN_BOXES.iter().any(|&(south, north, west, east)| {
            south < self.latitude
                && self.latitude < north
                && west < self.longitude
                && self.longitude < east
        })
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        let round = |v: f64| (v * 1e6).round();
        round(self.latitude) == round(other.latitude)
            && round(self.longitude) == round(other.longitude)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ewkt())
    }
}

impl FromStr for Location {
    type Err = LocationError;

    /// Accepts "lat, lon", "lat lon", "POINT(lon lat)" and
    /// "SRID=n;POINT(lon lat)".
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || LocationError::InvalidLocation(s.to_string());
        let upper = s.to_uppercase();
        let is_wkt = upper.starts_with("POINT") || upper.starts_with("SRID");

        let captures = if is_wkt && !s.contains(',') {
            WKT_POINT.captures(s)
        } else {
            LAT_LONG.captures(s)
        }
        .ok_or_else(invalid)?;

        let coordinate = |name: &str| -> Result<f64> {
            captures
                .name(name)
                .ok_or_else(invalid)?
                .as_str()
                .parse()
                .map_err(|_| invalid())
        };
        let location = Self::new(coordinate("latitude")?, coordinate("longitude")?)?;

        match captures.name("srid") {
            Some(srid) => Ok(location.with_srid(srid.as_str().parse().map_err(|_| invalid())?)),
            None => Ok(location),
        }
    }
}

impl TryFrom<(f64, f64)> for Location {
    type Error = LocationError;

    fn try_from((latitude, longitude): (f64, f64)) -> Result<Self> {
        Self::new(latitude, longitude)
    }
}

impl TryFrom<(f64, f64, u32)> for Location {
    type Error = LocationError;

    fn try_from((latitude, longitude, srid): (f64, f64, u32)) -> Result<Self> {
        Ok(Self::new(latitude, longitude)?.with_srid(srid))
    }
}

impl From<Location> for Point<f64> {
    fn from(location: Location) -> Self {
        location.point()
    }
}

mod error {
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum LocationError {
        #[error("Could not create a Location from input: {0}")]
        InvalidLocation(String),
    }
    pub type Result<T> = std::result::Result<T, LocationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lat_long() {
        let location: Location = "33.33, 105.5".parse().unwrap();
        assert_eq!((location.latitude(), location.longitude()), (33.33, 105.5));
        assert_eq!(location.srid(), DEFAULT_SRID);

        let location: Location = "33.33 105.5".parse().unwrap();
        assert_eq!((location.latitude(), location.longitude()), (33.33, 105.5));

        let location: Location = "-33.5,  -70.25".parse().unwrap();
        assert_eq!((location.latitude(), location.longitude()), (-33.5, -70.25));

        let location: Location = "40.7, -73.9 \n".parse().unwrap();
        assert_eq!((location.latitude(), location.longitude()), (40.7, -73.9));
    }

    #[test]
    fn test_parse_wkt_and_ewkt() {
        let location: Location = "POINT(102.11 82.3)".parse().unwrap();
        assert_eq!((location.latitude(), location.longitude()), (82.3, 102.11));
        assert_eq!(location.srid(), DEFAULT_SRID);

        let location: Location = "SRID=3857;POINT(170.144 20.03)".parse().unwrap();
        assert_eq!((location.latitude(), location.longitude(), location.srid()), (20.03, 170.144, 3857));

        let location: Location = "point(0 0)".parse().unwrap();
        assert_eq!(location.point(), Point::new(0.0, 0.0));
    }

    #[test]
    fn test_parse_failures() {
        for input in [
            "not a real value",
            "SRID=4326.0;POINT(102.11 82.3)",
            "SRID=4326;POINT(100.1 101.2)",
            "SRID=4326;POINT(200.1, 89.1)",
            "POINT(181.12345 91.12345)",
            "95.5, 100.5",
            "40.7, -73.9garbage",
            "40.7, -73.9 40.8",
            "33.33, 1805.5",
            "",
        ] {
            assert!(input.parse::<Location>().is_err(), "{input}");
        }
    }

    #[test]
    fn test_tuples() {
        assert!(Location::try_from((95.5, 100.5, 3857)).is_err());
        assert!(Location::try_from((85.5, 185.5)).is_err());
        let location = Location::try_from((33.33, 105.5, 3857)).unwrap();
        assert_eq!(location.srid(), 3857);
    }

    #[test]
    fn test_wkt_output_and_equality() {
        let location: Location = "SRID=4326;POINT(-73.98018 40.75238)".parse().unwrap();
        assert_eq!(location.wkt(), "POINT(-73.98018 40.75238)");
        assert_eq!(location.to_string(), "SRID=4326;POINT(-73.98018 40.75238)");
        assert!(!location.in_ocean());

        let close = Location::new(40.752_380_1, -73.980_180_2).unwrap();
        assert_eq!(location, close);
        let far = Location::new(40.7524, -73.98018).unwrap();
        assert_ne!(location, far);
    }

    #[test]
    fn test_in_ocean() {
        assert!(Location::new(30.0, -140.0).unwrap().in_ocean());
        assert!(Location::new(25.0, -90.0).unwrap().in_ocean());
        assert!(!Location::new(41.88, -87.63).unwrap().in_ocean());
    }
}
