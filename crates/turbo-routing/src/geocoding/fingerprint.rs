use sha2::{Digest, Sha256};

/// Canonical text of an address: lowercase, single-spaced, with the city and
/// country appended.
///
/// ```
/// use turbo_routing::geocoding::normalize_address;
///
/// assert_eq!(
///     normalize_address("  Av. Corrientes   1234 ", "CABA", "AR"),
///     "av. corrientes 1234, caba, ar"
/// );
/// ```
pub fn normalize_address(address: &str, city: &str, country: &str) -> String {
    [address, city, country]
        .iter()
        .map(|part| collapse_whitespace(part).to_lowercase())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 hex digest of a normalized address; the geocoding cache key.
pub fn fingerprint(normalized_address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_address.as_bytes());
    format!("{:x}", hasher.finalize())
}
