//! Declarative coverage statements and their resolution into places.
//!
//! A coverage statement says which places a library serves. It is either the
//! literal `"everywhere"`, a place name or list of place names inside the
//! default nation, or an object mapping nation names to `"everywhere"`, a
//! place name or a list of place names:
//!
//! ```json
//! {"US": ["Boston, MA", "Kern County, CA"], "CA": "everywhere"}
//! ```

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

pub use error::CoverageError;
pub(crate) use error::Result;

use crate::{
    place::{Place, PlaceId, PlaceType},
    resolve::{LookupOptions, ResolveError, Resolver},
};

/// The literal meaning "every place there is".
pub const EVERYWHERE: &str = "everywhere";

/// Key under which a nation-less statement is reported when there is no
/// default nation.
pub const UNKNOWN_NATION_KEY: &str = "??";

/// What a coverage statement says about one nation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverageValue {
    Everywhere,
    Name(String),
    Names(Vec<String>),
}

impl CoverageValue {
    fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) if s == EVERYWHERE => Ok(Self::Everywhere),
            Value::String(s) => Ok(Self::Name(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(CoverageError::InvalidCoverage(format!(
                        "place names must be strings, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Self::Names),
            other => Err(CoverageError::InvalidCoverage(format!(
                "expected \"everywhere\", a place name or a list of place names, got {other}"
            ))),
        }
    }

    /// The place names this value lists; none for `Everywhere`.
    #[must_use]
    pub fn names(&self) -> &[String] {
        match self {
            Self::Everywhere => &[],
            Self::Name(name) => std::slice::from_ref(name),
            Self::Names(names) => names,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Everywhere => Value::String(EVERYWHERE.to_string()),
            Self::Name(name) => Value::String(name.clone()),
            Self::Names(names) => Value::Array(names.iter().cloned().map(Value::String).collect()),
        }
    }
}

/// A parsed coverage statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coverage {
    Everywhere,
    SingleName(String),
    NameList(Vec<String>),
    NationMap(Vec<(String, CoverageValue)>),
}

impl Coverage {
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => map
                .iter()
                .map(|(nation, value)| Ok((nation.clone(), CoverageValue::from_json(value)?)))
                .collect::<Result<Vec<_>>>()
                .map(Self::NationMap),
            other => Ok(match CoverageValue::from_json(other)? {
                CoverageValue::Everywhere => Self::Everywhere,
                CoverageValue::Name(name) => Self::SingleName(name),
                CoverageValue::Names(names) => Self::NameList(names),
            }),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Everywhere => Value::String(EVERYWHERE.to_string()),
            Self::SingleName(name) => Value::String(name.clone()),
            Self::NameList(names) => Value::Array(names.iter().cloned().map(Value::String).collect()),
            Self::NationMap(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(nation, value)| (nation.clone(), value.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }

    /// An empty name, list or object says nothing and counts as absent.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Everywhere => false,
            Self::SingleName(name) => name.is_empty(),
            Self::NameList(names) => names.is_empty(),
            Self::NationMap(entries) => entries.is_empty(),
        }
    }

    /// A nation-less statement as the value for a single nation.
    fn as_nation_value(&self) -> Option<CoverageValue> {
        match self {
            Self::Everywhere => Some(CoverageValue::Everywhere),
            Self::SingleName(name) => Some(CoverageValue::Name(name.clone())),
            Self::NameList(names) => Some(CoverageValue::Names(names.clone())),
            Self::NationMap(_) => None,
        }
    }
}

impl TryFrom<&Value> for Coverage {
    type Error = CoverageError;

    fn try_from(value: &Value) -> Result<Self> {
        Self::from_json(value)
    }
}

impl FromStr for Coverage {
    type Err = CoverageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_json(&serde_json::from_str(s)?)
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// The places a coverage statement resolved to, plus the parts of it that
/// named no place (`unknown`) or more than one (`ambiguous`), keyed by
/// nation.
///
/// A resolution with unknown or ambiguous parts is only good for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageResolution {
    pub places: Vec<PlaceId>,
    pub unknown: BTreeMap<String, CoverageValue>,
    pub ambiguous: BTreeMap<String, CoverageValue>,
}

impl CoverageResolution {
    /// Resolution to the `everywhere` sentinel alone.
    #[must_use]
    pub fn everywhere(everywhere: &Place) -> Self {
        Self {
            places: vec![everywhere.id()],
            ..Self::default()
        }
    }

    /// Nothing resolved and nothing reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.places.is_empty() && self.unknown.is_empty() && self.ambiguous.is_empty()
    }

    /// No unknown or ambiguous parts.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.unknown.is_empty() && self.ambiguous.is_empty()
    }

    #[must_use]
    pub fn unknown_json(&self) -> Value {
        to_json_object(&self.unknown)
    }

    #[must_use]
    pub fn ambiguous_json(&self) -> Value {
        to_json_object(&self.ambiguous)
    }
}

fn to_json_object(map: &BTreeMap<String, CoverageValue>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect::<Map<_, _>>(),
    )
}

fn push_name(map: &mut BTreeMap<String, CoverageValue>, nation: &str, name: &str) {
    let entry = map
        .entry(nation.to_string())
        .or_insert_with(|| CoverageValue::Names(Vec::new()));
    match entry {
        CoverageValue::Names(names) => names.push(name.to_string()),
        other => {
            let mut names = other.names().to_vec();
            names.push(name.to_string());
            *other = CoverageValue::Names(names);
        }
    }
}

/// Resolve a coverage statement into places.
///
/// Each name is looked up inside its nation with `options`. Names that
/// match nothing land in `unknown`, names matching several places land in
/// `ambiguous`. A nation-less statement is read as belonging to
/// `default_nation`; without one it is reported unknown under `"??"`.
#[instrument(name = "Parse coverage", level = "debug", skip_all, fields(coverage = %coverage))]
pub fn parse_coverage(
    resolver: &Resolver<'_>,
    coverage: &Coverage,
    default_nation: Option<&Place>,
    options: LookupOptions,
) -> CoverageResolution {
    let store = resolver.store();
    let mut resolution = CoverageResolution::default();

    if *coverage == Coverage::Everywhere {
        return CoverageResolution::everywhere(store.everywhere());
    }

    let wrapped;
    let entries: &[(String, CoverageValue)] = match (coverage, coverage.as_nation_value()) {
        (Coverage::NationMap(entries), _) => entries.as_slice(),
        (_, Some(value)) => match default_nation {
            Some(nation) => {
                let key = nation
                    .abbreviated_name
                    .clone()
                    .unwrap_or_else(|| nation.external_name.clone());
                wrapped = [(key, value)];
                &wrapped[..]
            }
            None => {
                warn!("Coverage names no nation and there is no default nation");
                resolution.unknown.insert(UNKNOWN_NATION_KEY.to_string(), value);
                return resolution;
            }
        },
        (_, None) => &[],
    };

    for (nation_key, value) in entries {
        let nations = store.find_by_name(nation_key, Some(PlaceType::Nation));
        let nation = match nations.as_slice() {
            [nation] => *nation,
            [] => {
                debug!(nation = %nation_key, "Unknown nation");
                resolution.unknown.insert(nation_key.clone(), value.clone());
                continue;
            }
            _ => {
                debug!(nation = %nation_key, "Ambiguous nation");
                resolution.ambiguous.insert(nation_key.clone(), value.clone());
                continue;
            }
        };

        if *value == CoverageValue::Everywhere {
            resolution.places.push(nation.id());
            continue;
        }

        for name in value.names() {
            match resolver.lookup_inside(nation, name, options) {
                Ok(Some(place)) => resolution.places.push(place.id()),
                Ok(None) => push_name(&mut resolution.unknown, nation_key, name),
                Err(ResolveError::AmbiguousPlace { .. }) => {
                    push_name(&mut resolution.ambiguous, nation_key, name);
                }
            }
        }
    }

    debug!(
        places = resolution.places.len(),
        unknown = resolution.unknown.len(),
        ambiguous = resolution.ambiguous.len(),
        "Coverage parsed"
    );
    resolution
}

/// Resolve a library's service area and focus area together.
///
/// A missing (or blank) service area means everywhere; a missing focus area
/// means the same as the service area.
pub fn parse_service_and_focus_area(
    resolver: &Resolver<'_>,
    service_area: Option<&Coverage>,
    focus_area: Option<&Coverage>,
    default_nation: Option<&Place>,
    options: LookupOptions,
) -> (CoverageResolution, CoverageResolution) {
    let service = match service_area.filter(|c| !c.is_blank()) {
        Some(coverage) => parse_coverage(resolver, coverage, default_nation, options),
        None => CoverageResolution::everywhere(resolver.store().everywhere()),
    };
    let focus = match focus_area.filter(|c| !c.is_blank()) {
        Some(coverage) => parse_coverage(resolver, coverage, default_nation, options),
        None => service.clone(),
    };
    (service, focus)
}

mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum CoverageError {
        #[error("Invalid coverage: {0}")]
        InvalidCoverage(String),
        #[error("Coverage is not valid JSON: {0}")]
        Json(#[from] serde_json::Error),
    }
    pub type Result<T> = std::result::Result<T, CoverageError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::place::{InMemoryPlaceStore, PlaceStore};

    struct Fixture {
        store: InMemoryPlaceStore,
        us: PlaceId,
        mx: PlaceId,
        us_sf: PlaceId,
        mx_sf: PlaceId,
        mexico_city: PlaceId,
        ca: PlaceId,
        ut: PlaceId,
    }

    fn fixture() -> Fixture {
        let mut store = InMemoryPlaceStore::new();
        let us = store.insert(Place::new(PlaceType::Nation, "United States").with_abbreviation("US"));
        let mx = store.insert(Place::new(PlaceType::Nation, "Mexico").with_abbreviation("MX"));
        let us_sf = store.insert(Place::new(PlaceType::City, "San Francisco").with_parent(us));
        let mx_sf = store.insert(Place::new(PlaceType::City, "San Francisco").with_parent(mx));
        let mexico_city = store.insert(Place::new(PlaceType::City, "Mexico City").with_parent(mx));
        let ca = store.insert(
            Place::new(PlaceType::State, "California")
                .with_abbreviation("CA")
                .with_parent(us),
        );
        let ut = store.insert(Place::new(PlaceType::State, "Utah").with_abbreviation("UT").with_parent(us));
        store.insert(Place::new(PlaceType::City, "Springfield").with_parent(us));
        store.insert(Place::new(PlaceType::City, "Springfield").with_parent(us));
        Fixture {
            store,
            us,
            mx,
            us_sf,
            mx_sf,
            mexico_city,
            ca,
            ut,
        }
    }

    fn parse(store: &InMemoryPlaceStore, coverage: &Value) -> CoverageResolution {
        let resolver = Resolver::new(store);
        let coverage = Coverage::from_json(coverage).unwrap();
        parse_coverage(&resolver, &coverage, store.default_nation(), LookupOptions::default())
    }

    #[test]
    fn test_coverage_from_json() {
        assert_eq!(Coverage::from_json(&json!("everywhere")).unwrap(), Coverage::Everywhere);
        assert_eq!(
            Coverage::from_json(&json!("Boston")).unwrap(),
            Coverage::SingleName("Boston".to_string())
        );
        assert_eq!(
            Coverage::from_json(&json!({"US": "everywhere", "MX": ["Mexico City"]})).unwrap(),
            Coverage::NationMap(vec![
                ("MX".to_string(), CoverageValue::Names(vec!["Mexico City".to_string()])),
                ("US".to_string(), CoverageValue::Everywhere),
            ])
        );
        assert!(Coverage::from_json(&json!(42)).is_err());
        assert!(Coverage::from_json(&json!(["Boston", 7])).is_err());
        assert!(Coverage::from_json(&json!({"US": {"nested": true}})).is_err());
        assert!("not json".parse::<Coverage>().is_err());
    }

    #[test]
    fn test_everywhere() {
        let mut f = fixture();
        for with_default in [false, true] {
            if with_default {
                f.store.set_default_nation("US").unwrap();
            }
            let result = parse(&f.store, &json!("everywhere"));
            assert_eq!(result.places, vec![f.store.everywhere().id()]);
            assert!(result.is_resolved());
        }
    }

    #[test]
    fn test_whole_nation() {
        let f = fixture();
        let result = parse(&f.store, &json!({"US": "everywhere"}));
        assert_eq!(result.places, vec![f.us]);
        assert!(result.is_resolved());
    }

    #[test]
    fn test_same_city_name_in_two_nations() {
        let f = fixture();
        let result = parse(
            &f.store,
            &json!({"US": "San Francisco", "MX": ["San Francisco", "Mexico City"]}),
        );
        assert!(result.is_resolved());
        assert_eq!(result.places.len(), 3);
        for id in [f.us_sf, f.mx_sf, f.mexico_city] {
            assert!(result.places.contains(&id));
        }
    }

    #[test]
    fn test_no_default_nation() {
        let f = fixture();
        let result = parse(&f.store, &json!("CA"));
        assert!(result.places.is_empty());
        assert!(result.ambiguous.is_empty());
        assert_eq!(result.unknown_json(), json!({"??": "CA"}));

        let result = parse(&f.store, &json!(["CA", "UT"]));
        assert_eq!(result.unknown_json(), json!({"??": ["CA", "UT"]}));
    }

    #[test]
    fn test_default_nation() {
        let mut f = fixture();
        f.store.set_default_nation("US").unwrap();
        let result = parse(&f.store, &json!(["CA", "UT"]));
        assert!(result.is_resolved());
        assert_eq!(result.places, vec![f.ca, f.ut]);
    }

    #[test]
    fn test_unknown_and_ambiguous() {
        let f = fixture();
        let result = parse(
            &f.store,
            &json!({
                "US": ["Springfield", "Narnia", "Utah"],
                "Atlantis": ["Poseidonia"],
                "MX": "Gotham",
            }),
        );
        assert_eq!(result.places, vec![f.ut]);
        assert_eq!(
            result.unknown_json(),
            json!({"Atlantis": ["Poseidonia"], "MX": ["Gotham"], "US": ["Narnia"]})
        );
        assert_eq!(result.ambiguous_json(), json!({"US": ["Springfield"]}));
    }

    #[test]
    fn test_ambiguous_nation() {
        let mut f = fixture();
        f.store.insert(Place::new(PlaceType::Nation, "Congo"));
        f.store.insert(Place::new(PlaceType::Nation, "Congo"));
        let result = parse(&f.store, &json!({"Congo": "everywhere"}));
        assert!(result.places.is_empty());
        assert_eq!(result.ambiguous_json(), json!({"Congo": "everywhere"}));
    }

    #[test]
    fn test_service_and_focus_defaults() {
        let f = fixture();
        let resolver = Resolver::new(&f.store);
        let options = LookupOptions::default();
        let everywhere = f.store.everywhere().id();

        let (service, focus) = parse_service_and_focus_area(&resolver, None, None, None, options);
        assert_eq!(service.places, vec![everywhere]);
        assert_eq!(focus, service);

        let service_area = Coverage::from_json(&json!({"US": "everywhere"})).unwrap();
        let focus_area = Coverage::from_json(&json!({"MX": ["Mexico City"]})).unwrap();
        let (service, focus) =
            parse_service_and_focus_area(&resolver, Some(&service_area), None, None, options);
        assert_eq!(service.places, vec![f.us]);
        assert_eq!(focus, service);

        let (service, focus) = parse_service_and_focus_area(
            &resolver,
            Some(&Coverage::NameList(Vec::new())),
            Some(&focus_area),
            None,
            options,
        );
        assert_eq!(service.places, vec![everywhere]);
        assert_eq!(focus.places, vec![f.mexico_city]);
        assert_ne!(focus.places, vec![f.mx]);
    }
}
