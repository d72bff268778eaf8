/// Matches a single Wildland URL segment against a candidate path.
///
/// A segment is either an exact absolute path, the bare wildcard `*`
/// (matches any path), or a path with one or more `*` components acting as
/// a single-level wildcard (e.g. `/forests/*` matches `/forests/bob` but not
/// `/forests/bob/deeper`), per spec.md §4.4.
pub fn segment_matches(pattern: &str, candidate: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let pattern_parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let candidate_parts: Vec<&str> = candidate.split('/').filter(|s| !s.is_empty()).collect();

    if pattern_parts.len() != candidate_parts.len() {
        return false;
    }

    pattern_parts
        .iter()
        .zip(candidate_parts.iter())
        .all(|(p, c)| *p == "*" || p == c)
}
