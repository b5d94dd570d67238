//! Semantic cache keys. The key binds the normalized command text to the
//! three context fields that change the right answer: rank level, mission
//! stage, and location. Any of them moving produces a fresh key, so stale
//! answers cannot leak across a promotion or a location change.

use sha2::{Digest, Sha256};

pub const CACHE_TTL_SECS: u64 = 300;

pub fn semantic_key(text: &str, rank_level: i64, mission_stage: i64, location: &str) -> String {
    let normalized = text.trim().to_lowercase();
    let raw = format!("{rank_level}-{mission_stage}-{location}:{normalized}");
    let mut h = Sha256::new();
    h.update(raw.as_bytes());
    format!("sem_cache:{}", hex(&h.finalize()))
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_pure_and_normalizes_text() {
        let a = semantic_key("Shields Up", 0, 1, "Bridge");
        let b = semantic_key("  shields up  ", 0, 1, "Bridge");
        assert_eq!(a, b);
        assert!(a.starts_with("sem_cache:"));
        assert_eq!(a.len(), "sem_cache:".len() + 64);
    }

    #[test]
    fn any_context_field_changes_the_key() {
        let base = semantic_key("scan the nebula", 2, 3, "Bridge");
        assert_ne!(base, semantic_key("scan the nebula", 3, 3, "Bridge"));
        assert_ne!(base, semantic_key("scan the nebula", 2, 4, "Bridge"));
        assert_ne!(base, semantic_key("scan the nebula", 2, 3, "Engineering"));
        assert_ne!(base, semantic_key("scan the asteroid", 2, 3, "Bridge"));
    }
}
