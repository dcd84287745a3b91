use rapidfuzz::distance::levenshtein;

/// Shorter field values must match exactly.
pub const MIN_FUZZY_LENGTH: usize = 6;
pub const MAX_EDIT_DISTANCE: usize = 2;

/// Whether `field` is the same as `query` give or take a typo or two.
///
/// Case never matters. A field of at least [`MIN_FUZZY_LENGTH`] characters
/// matches within [`MAX_EDIT_DISTANCE`] edits; a shorter one only exactly.
#[must_use]
pub fn fuzzy_match(field: &str, query: &str) -> bool {
    let (field, query) = (field.to_lowercase(), query.to_lowercase());
    if field == query {
        return true;
    }
    field.chars().count() >= MIN_FUZZY_LENGTH
        && levenshtein::distance(field.chars(), query.chars()) <= MAX_EDIT_DISTANCE
}

/// Whether `query` appears anywhere in `field`, ignoring case.
#[must_use]
pub fn partial_match(field: &str, query: &str) -> bool {
    field.to_lowercase().contains(&query.to_lowercase())
}
