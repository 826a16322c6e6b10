// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Content hashing and validator (ETag) handling

use crate::config::DigestAlgorithm;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

const READ_BUFFER: usize = 64 * 1024;

/// Incremental hasher for the configured digest.
#[derive(Debug, Clone)]
pub enum ContentHasher {
    Md5(Md5),
    Sha256(Sha256),
}

impl ContentHasher {
    #[must_use]
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Self::Md5(Md5::new()),
            DigestAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(hasher) => hasher.update(data),
            Self::Sha256(hasher) => hasher.update(data),
        }
    }

    /// Lowercase hex digest.
    #[must_use]
    pub fn finalize_hex(self) -> String {
        match self {
            Self::Md5(hasher) => format!("{:x}", hasher.finalize()),
            Self::Sha256(hasher) => format!("{:x}", hasher.finalize()),
        }
    }
}

#[must_use]
pub fn hash_bytes(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    let mut hasher = ContentHasher::new(algorithm);
    hasher.update(data);
    hasher.finalize_hex()
}

pub fn hash_file(algorithm: DigestAlgorithm, path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = ContentHasher::new(algorithm);
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize_hex())
}

/// Fingerprint of the installed payload sent as `If-None-Match`. An unreadable file simply
/// means we have nothing to validate against.
#[must_use]
pub fn installed_validator(algorithm: DigestAlgorithm, path: &Path) -> Option<String> {
    match hash_file(algorithm, path) {
        Ok(hash) => Some(hash),
        Err(e) => {
            tracing::warn!("Unable to hash {}: {e}", path.display());
            None
        }
    }
}

/// Parses an `ETag` header into a comparable validator.
///
/// Quotes and the weak prefix are stripped and the result is lowercased. ETags containing a
/// `-` (a bare `-` marker or multipart upload tags such as `"abc-3"`) are not content hashes
/// and yield `None`.
#[must_use]
pub fn parse_validator(header: Option<&str>) -> Option<String> {
    let raw = header?.trim();
    let raw = raw.strip_prefix("W/").unwrap_or(raw);
    let value = raw.trim_matches('"');
    if value.is_empty() || value.contains('-') {
        return None;
    }
    Some(value.to_ascii_lowercase())
}

#[must_use]
pub fn validator_matches(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            hash_bytes(DigestAlgorithm::Md5, b"hello"),
            "5d41402abc4b2a76b9719d911017c592"
        );
        assert_eq!(
            hash_bytes(DigestAlgorithm::Sha256, b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hasher = ContentHasher::new(DigestAlgorithm::Md5);
        hasher.update(b"hel");
        hasher.update(b"lo");
        assert_eq!(hasher.finalize_hex(), hash_bytes(DigestAlgorithm::Md5, b"hello"));
    }

    #[test]
    fn test_hash_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        file.flush().unwrap();

        let hash = hash_file(DigestAlgorithm::Md5, file.path()).unwrap();
        assert_eq!(hash, "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_installed_validator_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("fluxion.lzma");
        assert_eq!(installed_validator(DigestAlgorithm::Md5, &missing), None);
    }

    #[test]
    fn test_parse_validator() {
        assert_eq!(
            parse_validator(Some("\"5D41402ABC4B2A76B9719D911017C592\"")),
            Some("5d41402abc4b2a76b9719d911017c592".to_string())
        );
        assert_eq!(
            parse_validator(Some("W/\"abc123\"")),
            Some("abc123".to_string())
        );
        assert_eq!(parse_validator(Some("abc123")), Some("abc123".to_string()));
    }

    #[test]
    fn test_parse_validator_without_content_hash() {
        assert_eq!(parse_validator(None), None);
        assert_eq!(parse_validator(Some("")), None);
        assert_eq!(parse_validator(Some("\"\"")), None);
        assert_eq!(parse_validator(Some("-")), None);
        assert_eq!(parse_validator(Some("\"9b2cf535f27731c974343645a3985328-2\"")), None);
    }

    #[test]
    fn test_validator_matches_ignores_case() {
        assert!(validator_matches("ABCDEF", "abcdef"));
        assert!(!validator_matches("abcdef", "abcde0"));
    }
}
