//! Routing Unit Naming
//!
//! Derives a collision-free file name for a location's unit from its root
//! path. ASCII alphanumerics pass through; every other byte, `_` included,
//! becomes `_xx` (lowercase hex). Because `_` only ever starts an escape the
//! mapping is injective: two different roots never share a file name.

use std::path::Path;

/// File extension for generated units
pub const UNIT_EXTENSION: &str = "conf";

/// Escape a root path into a file-name-safe token
pub fn encode_root(root: &Path) -> String {
    let raw = root.as_os_str().as_encoded_bytes();
    let mut out = String::with_capacity(raw.len() * 2);
    for &b in raw {
        if b.is_ascii_alphanumeric() {
            out.push(b as char);
        } else {
            out.push('_');
            out.push_str(&format!("{:02x}", b));
        }
    }
    out
}

/// Inverse of [`encode_root`]; `None` for tokens it could not have produced
pub fn decode_root(token: &str) -> Option<Vec<u8>> {
    let bytes = token.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                let hex = token.get(i + 1..i + 3)?;
                let b = u8::from_str_radix(hex, 16).ok()?;
                if b.is_ascii_alphanumeric() || hex.chars().any(|c| c.is_ascii_uppercase()) {
                    return None;
                }
                out.push(b);
                i += 3;
            }
            b if b.is_ascii_alphanumeric() => {
                out.push(b);
                i += 1;
            }
            _ => return None,
        }
    }
    Some(out)
}

/// `<prefix><encoded-root>.conf`
pub fn unit_file_name(prefix: &str, root: &Path) -> String {
    format!("{}{}.{}", prefix, encode_root(root), UNIT_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_encode_root() {
        assert_eq!(encode_root(Path::new("/srv/webdav")), "_2fsrv_2fwebdav");
        assert_eq!(encode_root(Path::new("/a_b")), "_2fa_5fb");
        assert_eq!(
            unit_file_name("webdav-", Path::new("/srv/webdav")),
            "webdav-_2fsrv_2fwebdav.conf"
        );
    }

    #[test]
    fn test_substitution_collisions_are_avoided() {
        // naive "replace non-alphanumerics with _" maps all of these to _srv_a_b
        let roots = ["/srv/a_b", "/srv/a/b", "/srv/a-b", "/srv_a/b", "/srv/a.b"];
        let names: std::collections::HashSet<_> =
            roots.iter().map(|r| encode_root(Path::new(r))).collect();
        assert_eq!(names.len(), roots.len());
    }

    #[test]
    fn test_decode_inverts_encode() {
        for root in ["/srv/webdav", "/mnt/raid/dav_1", "/data/üser files"] {
            let encoded = encode_root(Path::new(root));
            let decoded = decode_root(&encoded).unwrap();
            assert_eq!(PathBuf::from(String::from_utf8(decoded).unwrap()), PathBuf::from(root));
        }
        assert!(decode_root("_2").is_none());
        assert!(decode_root("_41").is_none());
        assert!(decode_root("a-b").is_none());
    }
}
