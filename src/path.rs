//! Archive path validation (§4.1).
//!
//! Two modes share one character-set and segment check: plain item *names*,
//! and *symlink targets*, which additionally may walk up to `depth(name)`
//! levels via a leading run of `..` segments. Ported from the reference
//! implementation's `validate_archive_path`, kept as two entry points rather
//! than one function with a mode flag so each call site states its intent.

use crate::error::{PoafError, Result};

const NAME_LENGTH_LIMIT: usize = 16383;
const SYMLINK_LENGTH_LIMIT: usize = 4095;

fn has_forbidden_byte(name: &[u8]) -> bool {
    name.iter().any(|&b| b <= 0x1f || matches!(b, b'"' | b'*' | b':' | b'<' | b'>' | b'?' | b'\\' | b'|'))
}

/// Validate an item name. Returns the UTF-8 bytes on success.
pub fn validate_name(name: &str) -> Result<Vec<u8>> {
    if name.is_empty() {
        return Err(PoafError::InvalidArchivePath("path must not be empty".into()));
    }
    let bytes = name.as_bytes().to_vec();
    if bytes.len() > NAME_LENGTH_LIMIT {
        return Err(PoafError::InvalidArchivePath(format!(
            "path must not be longer than {NAME_LENGTH_LIMIT} bytes"
        )));
    }
    if has_forbidden_byte(&bytes) {
        return Err(PoafError::InvalidArchivePath(
            "path must not contain control characters or any of [\"*:<>?\\|]".into(),
        ));
    }

    let segments: Vec<&[u8]> = bytes.split(|&b| b == b'/').collect();
    if segments[0].is_empty() {
        return Err(PoafError::InvalidArchivePath("path must not be absolute".into()));
    }
    if segments.iter().any(|s| s.is_empty()) {
        return Err(PoafError::InvalidArchivePath("path must not contain empty segments".into()));
    }
    if segments.iter().any(|&s| s == b"..") {
        return Err(PoafError::InvalidArchivePath("path must not contain '..' segments".into()));
    }
    if segments.iter().any(|&s| s == b".") {
        return Err(PoafError::InvalidArchivePath("path must not contain '.' segments".into()));
    }

    Ok(bytes)
}

/// Validate a symlink target. `file_name` is the archive path of the
/// symlink itself — its `/`-count bounds how many leading `..` segments the
/// target may spend climbing out before normal name rules apply.
pub fn validate_symlink_target(target: &str, file_name: &str) -> Result<Vec<u8>> {
    if target.is_empty() {
        return Err(PoafError::InvalidArchivePath("symlink target must not be empty".into()));
    }
    let bytes = target.as_bytes().to_vec();
    if bytes.len() > SYMLINK_LENGTH_LIMIT {
        return Err(PoafError::InvalidArchivePath(format!(
            "symlink target must not be longer than {SYMLINK_LENGTH_LIMIT} bytes"
        )));
    }
    if has_forbidden_byte(&bytes) {
        return Err(PoafError::InvalidArchivePath(
            "symlink target must not contain control characters or any of [\"*:<>?\\|]".into(),
        ));
    }
    if target == "." {
        return Ok(bytes);
    }

    let mut segments: Vec<&[u8]> = bytes.split(|&b| b == b'/').collect();
    if segments[0].is_empty() {
        return Err(PoafError::InvalidArchivePath("symlink target must not be absolute".into()));
    }
    if segments.iter().any(|s| s.is_empty()) {
        return Err(PoafError::InvalidArchivePath("symlink target must not contain empty segments".into()));
    }

    let depth = file_name.matches('/').count();
    let mut allowed_up = depth;
    while allowed_up > 0 && !segments.is_empty() && segments[0] == b".." {
        segments.remove(0);
        allowed_up -= 1;
    }

    if segments.iter().any(|&s| s == b"..") {
        return Err(PoafError::InvalidArchivePath(
            "symlink target may only have '..' segments at the start, up to the symlink's depth".into(),
        ));
    }
    if segments.iter().any(|&s| s == b".") {
        return Err(PoafError::InvalidArchivePath("symlink target must not contain '.' segments".into()));
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_name() {
        assert_eq!(validate_name("a/b/c.txt").unwrap(), b"a/b/c.txt");
    }

    #[test]
    fn rejects_empty_and_absolute() {
        assert!(validate_name("").is_err());
        assert!(validate_name("/a").is_err());
        assert!(validate_name("a//b").is_err());
    }

    #[test]
    fn rejects_dot_segments_and_control_chars() {
        assert!(validate_name("a/./b").is_err());
        assert!(validate_name("a/../b").is_err());
        assert!(validate_name("a:b").is_err());
        assert!(validate_name("a\x01b").is_err());
    }

    #[test]
    fn symlink_target_dot_alone_is_allowed() {
        assert_eq!(validate_symlink_target(".", "a/b").unwrap(), b".");
    }

    #[test]
    fn symlink_target_respects_depth() {
        // "a/c/b" has depth 2 — two '..' segments may climb out.
        assert!(validate_symlink_target("../../x", "a/c/b").is_ok());
        // Three '..' segments exceed the depth of 2.
        assert!(validate_symlink_target("../../../b.sh", "a/c/b").is_err());
    }

    #[test]
    fn symlink_target_forbids_dot_after_leading_up_run() {
        assert!(validate_symlink_target("../.", "a/b").is_err());
        assert!(validate_symlink_target("../x/..", "a/b").is_err());
    }
}
