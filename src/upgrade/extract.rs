use flate2::read::GzDecoder;
use std::io::Read;
use tar::{Archive, EntryType};
use tracing::debug;

use crate::core::UpdateError;

/// Pulls the executable out of a downloaded archive.
pub trait BinaryExtractor: Send + Sync {
    fn extract(&self, archive: &[u8]) -> Result<Vec<u8>, UpdateError>;
}

/// Extractor for gzip-compressed tar archives.
///
/// An entry is a candidate when its file name is `binary_name` or starts with
/// `binary_name` followed by `-`, `_` or `.`, and it is a regular file or
/// carries an executable bit. Exactly one candidate must exist.
#[derive(Debug, Clone)]
pub struct TarGzExtractor {
    binary_name: String,
}

impl TarGzExtractor {
    pub fn new(binary_name: impl Into<String>) -> Self {
        Self {
            binary_name: binary_name.into(),
        }
    }

    fn name_matches(&self, file_name: &str) -> bool {
        match file_name.strip_prefix(self.binary_name.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with(['-', '_', '.']) && !is_sidecar(rest),
            None => false,
        }
    }
}

/// Documentation and signature files shipped next to the binary.
fn is_sidecar(suffix: &str) -> bool {
    let lower = suffix.to_ascii_lowercase();
    [".md", ".txt", ".sig", ".asc", ".sha256", ".pem", ".json"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

fn malformed(reason: impl std::fmt::Display) -> UpdateError {
    UpdateError::MalformedArchive {
        reason: reason.to_string(),
    }
}

impl BinaryExtractor for TarGzExtractor {
    fn extract(&self, archive: &[u8]) -> Result<Vec<u8>, UpdateError> {
        if archive.is_empty() {
            return Err(malformed("archive is empty"));
        }

        let mut tar = Archive::new(GzDecoder::new(archive));
        let mut found: Vec<(String, Vec<u8>)> = Vec::new();

        for entry in tar.entries().map_err(malformed)? {
            let mut entry = entry.map_err(malformed)?;
            let header = entry.header();
            let entry_type = header.entry_type();
            if matches!(
                entry_type,
                EntryType::Directory | EntryType::Symlink | EntryType::Link
            ) {
                continue;
            }

            let executable = header.mode().is_ok_and(|mode| mode & 0o111 != 0);
            if !(executable || entry_type == EntryType::Regular) {
                continue;
            }

            let path = entry.path().map_err(malformed)?.to_string_lossy().into_owned();
            let file_name = path.rsplit('/').next().unwrap_or(&path).to_string();
            if !self.name_matches(&file_name) {
                continue;
            }

            let mut data = Vec::new();
            entry.read_to_end(&mut data).map_err(malformed)?;
            debug!("Archive candidate {path} ({} bytes)", data.len());
            found.push((path, data));
        }

        match found.len() {
            0 => Err(UpdateError::BinaryNotFound {
                binary: self.binary_name.clone(),
            }),
            1 => {
                let (path, data) = found.remove(0);
                if data.is_empty() {
                    return Err(malformed(format!("{path} is empty")));
                }
                Ok(data)
            }
            _ => {
                let mut candidates: Vec<String> = found.into_iter().map(|(p, _)| p).collect();
                candidates.sort();
                Err(UpdateError::AmbiguousArchive {
                    what: format!("'{}' entries in archive", self.binary_name),
                    candidates,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::build_tar_gz;

    #[test]
    fn test_extracts_single_binary_from_nested_dir() {
        let archive = build_tar_gz(&[
            ("pchaind_1.0.0_linux_amd64/README.md", b"docs", 0o644),
            ("pchaind_1.0.0_linux_amd64/pchaind", b"\x7fELFbinary", 0o755),
        ]);
        let data = TarGzExtractor::new("pchaind").extract(&archive).unwrap();
        assert_eq!(data, b"\x7fELFbinary");
    }

    #[test]
    fn test_platform_suffixed_name_matches() {
        let archive = build_tar_gz(&[("push-validator-linux-amd64", b"cli", 0o755)]);
        let data = TarGzExtractor::new("push-validator").extract(&archive).unwrap();
        assert_eq!(data, b"cli");
    }

    #[test]
    fn test_missing_binary() {
        let archive = build_tar_gz(&[("other", b"x", 0o755), ("pchaind.md", b"docs", 0o644)]);
        let err = TarGzExtractor::new("pchaind").extract(&archive).unwrap_err();
        assert!(matches!(err, UpdateError::BinaryNotFound { .. }));
    }

    #[test]
    fn test_multiple_candidates_are_ambiguous() {
        let archive = build_tar_gz(&[("a/pchaind", b"one", 0o755), ("b/pchaind", b"two", 0o755)]);
        let err = TarGzExtractor::new("pchaind").extract(&archive).unwrap_err();
        match err {
            UpdateError::AmbiguousArchive {
                candidates,
                ..
            } => assert_eq!(candidates, vec!["a/pchaind".to_string(), "b/pchaind".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = TarGzExtractor::new("pchaind").extract(b"definitely not gzip").unwrap_err();
        assert!(matches!(err, UpdateError::MalformedArchive { .. }));

        let err = TarGzExtractor::new("pchaind").extract(b"").unwrap_err();
        assert!(matches!(err, UpdateError::MalformedArchive { .. }));
    }

    #[test]
    fn test_prefix_must_end_at_separator() {
        let archive = build_tar_gz(&[("pchaindx", b"nope", 0o755)]);
        let err = TarGzExtractor::new("pchaind").extract(&archive).unwrap_err();
        assert!(matches!(err, UpdateError::BinaryNotFound { .. }));
    }
}
