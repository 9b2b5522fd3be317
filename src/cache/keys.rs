//! Cache key derivation.
//!
//! A key is a stable digest of every descriptor field that changes the result, plus the current
//! cache version and the partition it belongs to.

use sha2::{Digest, Sha256};

use crate::domain::QueryDescriptor;

use super::entry::ResultKind;

const KEY_PREFIX: &str = "eligo";

/// Derive the storage key for a descriptor.
///
/// Equal descriptors always map to the same key within a version and partition; bumping the
/// version yields a disjoint key space.
pub fn derive_key(
    descriptor: &QueryDescriptor,
    kind: ResultKind,
    version: u64,
    partition: &str,
) -> String {
    let mut hasher = Sha256::new();
    feed(&mut hasher, descriptor.content_type());
    feed(&mut hasher, descriptor.status().as_str());
    feed(&mut hasher, &optional(descriptor.category_id()));
    feed(&mut hasher, &optional(descriptor.author_id()));
    feed(&mut hasher, flag(descriptor.allow_recompute()));
    feed(&mut hasher, flag(descriptor.allow_override_protected()));
    feed(&mut hasher, descriptor.workflow().as_str());
    feed(&mut hasher, &version.to_string());
    feed(&mut hasher, partition);

    format!(
        "{KEY_PREFIX}:{}:{}",
        kind.as_str(),
        hex::encode(hasher.finalize())
    )
}

// Length prefix keeps adjacent fields from running into each other.
fn feed(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_be_bytes());
    hasher.update(field.as_bytes());
}

fn optional(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}
