//! Turning a free-text query into the fragments each search strategy needs.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::place::{PlaceType, parse_name};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static US_ZIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}$").expect("valid regex"));
static US_ZIP4: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}-\d{4}$").expect("valid regex"));

/// Misspellings corrected in every query.
const CORRECTIONS: &[(&str, &str)] = &[("libary", "library")];

/// Words stripped from a query before it is read as a place name, longest
/// first. "irvine public library" is looked up as the place "irvine".
const LIBRARY_WORDS: &[&str] = &["public library", "library"];

/// Lowercase, collapse whitespace and correct common misspellings.
#[must_use]
pub fn normalize_query(query: &str) -> String {
    let mut query = WHITESPACE
        .replace_all(&query.to_lowercase(), " ")
        .trim()
        .to_string();
    for (wrong, right) in CORRECTIONS {
        query = query.replace(wrong, right);
    }
    query
}

/// A five digit postal code, or the first five digits of a ZIP+4 code.
#[must_use]
pub fn as_postal_code(query: &str) -> Option<&str> {
    if US_ZIP.is_match(query) {
        Some(query)
    } else if US_ZIP4.is_match(query) {
        query.get(..5)
    } else {
        None
    }
}

/// What a query is matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParts {
    /// Compared with library names and aliases. `None` for postal codes.
    pub library_query: Option<String>,
    /// Compared with place names.
    pub place_query: String,
    /// Restricts the place match, when the query implies a type.
    pub place_type: Option<PlaceType>,
}

/// Split a query into a library name query and a place query.
#[must_use]
pub fn query_parts(query: &str) -> QueryParts {
    let query = normalize_query(query);

    if let Some(postal_code) = as_postal_code(&query) {
        return QueryParts {
            library_query: None,
            place_query: postal_code.to_string(),
            place_type: Some(PlaceType::PostalCode),
        };
    }

    let mut place_query = query.clone();
    for word in LIBRARY_WORDS {
        if place_query.contains(word) {
            place_query = place_query.replace(word, "").trim().to_string();
        }
    }
    let (place_name, place_type) = parse_name(&place_query);

    QueryParts {
        place_query: place_name.to_string(),
        place_type,
        library_query: Some(query),
    }
}
