//! Short unique identifiers for new cards and columns.
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new id (12 hex chars).
/// An atomic counter gives intra-process uniqueness, combined with a
/// nanosecond timestamp and hashed via SHA-256 for uniform distribution.
pub fn generate_id() -> String {
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut hasher = Sha256::new();
    hasher.update(seq.to_le_bytes());
    hasher.update(ts.to_le_bytes());
    hex::encode(&hasher.finalize()[..6])
}

pub fn generate_card_id() -> String {
    format!("card-{}", generate_id())
}

pub fn generate_column_id() -> String {
    format!("col-{}", generate_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_id_format() {
        let id = generate_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(generate_card_id().starts_with("card-"));
        assert!(generate_column_id().starts_with("col-"));
    }

    #[test]
    fn test_generate_id_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
