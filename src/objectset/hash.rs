//! Template hashing for ObjectDeployment revision names.
//!
//! The hash is FNV-1a over the JSON form of the template plus the current
//! collision count, rendered into a DNS-safe alphabet without vowels so
//! generated names cannot spell words.

use serde::Serialize;

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// Lowercase consonants and digits that read unambiguously
const SAFE_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

fn fnv32a(data: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in data {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn safe_encode(data: &[u8]) -> String {
    data.iter()
        .map(|b| SAFE_ALPHABET[usize::from(*b) % SAFE_ALPHABET.len()] as char)
        .collect()
}

/// Hash a template together with the collision count. Bumping the count
/// yields a fresh name when two distinct templates collide.
pub fn compute_hash<T: Serialize>(template: &T, collision_count: Option<i32>) -> String {
    // Serialization of our own template types cannot fail
    let encoded = serde_json::to_string(&(template, collision_count)).unwrap_or_default();
    safe_encode(&fnv32a(encoded.as_bytes()).to_be_bytes())
}
