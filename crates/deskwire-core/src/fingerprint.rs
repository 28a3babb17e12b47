//! Cheap change detection over whole collections
//!
//! The polling fallback has no delta API to lean on, so it compares a digest
//! of the mutable fields of every record between two full fetches.

use crate::types::{Notice, Ticket};
use sha2::{Digest, Sha256};

/// A record that contributes to a collection fingerprint
pub trait Fingerprintable {
    /// Identity plus every field whose change should count as an update
    fn fingerprint_key(&self) -> String;
}

impl Fingerprintable for Ticket {
    fn fingerprint_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.id,
            self.status.as_str(),
            self.updated_at.timestamp_millis()
        )
    }
}

impl Fingerprintable for Notice {
    fn fingerprint_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.id,
            self.active,
            self.updated_at.timestamp_millis()
        )
    }
}

/// Order-independent fingerprint of a collection.
///
/// Keys are sorted before hashing, so the same records returned in a
/// different order produce the same value.
pub fn fingerprint<T: Fingerprintable>(items: &[T]) -> String {
    let mut keys: Vec<String> = items.iter().map(Fingerprintable::fingerprint_key).collect();
    keys.sort_unstable();

    let mut hasher = Sha256::new();
    for key in &keys {
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
