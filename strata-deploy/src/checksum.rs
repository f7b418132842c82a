//! Content checksums for rendered scripts.

use sha2::{Digest, Sha224};

/// Compute the checksum of a rendered script.
///
/// SHA-224 over the UTF-8 bytes, as a lowercase hex string. The digest is
/// byte-exact: any change to the rendered text, including whitespace, yields
/// a different checksum.
pub fn script_checksum(content: &str) -> String {
    let mut hasher = Sha224::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_known_vectors() {
        // Standard SHA-224 test vectors.
        assert_eq!(
            script_checksum(""),
            "d14a028c2a3a2bc9476102bb288234c415a2b01f828ea62ac5b3e42f"
        );
        assert_eq!(
            script_checksum("abc"),
            "23097d223405d8228642a477bda255b32aadbce4bda0b3f7e36c9da7"
        );
    }

    #[test]
    fn test_deterministic() {
        let sql = "CREATE TABLE users (id INT);";
        assert_eq!(script_checksum(sql), script_checksum(sql));
    }

    #[test]
    fn test_whitespace_changes_digest() {
        assert_ne!(
            script_checksum("SELECT 1;"),
            script_checksum("SELECT 1; ")
        );
        assert_ne!(
            script_checksum("SELECT 1;\n"),
            script_checksum("SELECT 1;\r\n")
        );
    }
}
