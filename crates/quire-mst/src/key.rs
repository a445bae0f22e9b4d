//! Key validation and layer assignment.

use quire_crypto::ContentHasher;

use crate::error::{MstError, MstResult};

/// Longest accepted key, in bytes.
pub const MAX_KEY_LEN: usize = 1024;

/// Layer of a key: leading zero bits of its hash, two bits per layer.
pub fn key_height(key: &str) -> u32 {
    let hash = ContentHasher::raw_hash(key.as_bytes());
    let mut zeros = 0;
    for byte in hash {
        if byte == 0 {
            zeros += 8;
            continue;
        }
        zeros += byte.leading_zeros();
        break;
    }
    zeros / 2
}

/// Check that `key` is a `collection/rkey` path.
pub fn validate_key(key: &str) -> MstResult<()> {
    let invalid = |reason: &str| MstError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    if key.len() > MAX_KEY_LEN {
        return Err(invalid("key too long"));
    }
    let (collection, rkey) = key
        .split_once('/')
        .ok_or_else(|| invalid("expected collection/rkey"))?;
    if collection.is_empty() || rkey.is_empty() {
        return Err(invalid("empty path segment"));
    }
    if rkey.contains('/') {
        return Err(invalid("too many path segments"));
    }
    if rkey == "." || rkey == ".." {
        return Err(invalid("reserved record key"));
    }
    if !key.bytes().all(|b| b == b'/' || is_key_char(b)) {
        return Err(invalid("disallowed character"));
    }
    Ok(())
}

fn is_key_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'~' | b'-')
}
