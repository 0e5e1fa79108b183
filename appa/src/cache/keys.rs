use sha2::{Digest, Sha256};

/// Hex SHA-256 over canonical key material. Stable across process restarts,
/// which matters because cache snapshots persist.
pub fn digest_key(material: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Canonical form of a query for keying: trimmed, lowercased, inner
/// whitespace collapsed so formatting differences do not split cache lines.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_and_distinct() {
        assert_eq!(digest_key("abc"), digest_key("abc"));
        assert_ne!(digest_key("abc"), digest_key("abd"));
        assert_eq!(digest_key("abc").len(), 64);
    }

    #[test]
    fn test_normalize_query_collapses_whitespace_and_case() {
        assert_eq!(normalize_query("  What   IS\tRust? "), "what is rust?");
        assert_eq!(normalize_query("what is rust?"), normalize_query("What is Rust?"));
    }
}
