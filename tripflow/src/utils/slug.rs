//! Filesystem-safe slugs for place names.

use sha2::{Digest, Sha256};

const MAX_SLUG_LEN: usize = 32;

/// Converts a free-form place name into a stable lowercase slug.
///
/// ASCII letters and digits are kept, every other run of characters becomes a
/// single `-`. Names with no ASCII alphanumerics (e.g. `東京`) fall back to a
/// short content hash so the slug stays stable and non-empty.
#[must_use]
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        let digest = Sha256::digest(input.trim().as_bytes());
        return format!("x{}", &hex::encode(digest)[..8]);
    }

    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    slug
}
