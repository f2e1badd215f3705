use std::collections::HashSet;

use super::Endpoint;

/// Keep the first endpoint per service key and sort by key.
///
/// Precedence comes from input order, so callers concatenate live buckets
/// before configured entries. Output is sorted by byte order of the key.
pub fn deduplicate<I>(endpoints: I) -> Vec<Endpoint>
where
    I: IntoIterator<Item = Endpoint>,
{
    let mut seen = HashSet::new();
    let mut unique: Vec<Endpoint> = endpoints
        .into_iter()
        .filter(|endpoint| seen.insert(endpoint.service.clone()))
        .collect();

    unique.sort_by(|a, b| a.service.cmp(&b.service));
    unique
}
