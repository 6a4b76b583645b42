//! # Code Assets
//!
//! Content-addressed function packages. The S3 key is derived from the SHA-256
//! of the zip so a code change always yields a new key (and a new version).

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read code asset {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("code asset {0} is not a .zip package")]
    NotAZip(PathBuf),

    #[error("code asset {0} has not been built")]
    Missing(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAsset {
    pub path: PathBuf,
    /// Lowercase hex SHA-256 of the package
    pub sha256: String,
    available: bool,
}

impl CodeAsset {
    /// Hash a built zip package
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        if path.extension().and_then(|e| e.to_str()) != Some("zip") {
            return Err(AssetError::NotAZip(path.to_path_buf()));
        }
        let bytes = std::fs::read(path).map_err(|source| AssetError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_bytes(path, &bytes))
    }

    pub fn from_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> Self {
        Self {
            path: path.into(),
            sha256: hex(&Sha256::digest(bytes)),
            available: true,
        }
    }

    /// Hash the package if it exists, otherwise a placeholder that synthesizes
    /// but cannot be deployed
    pub fn resolve(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::from_file(path);
        }
        warn!(
            path = %path.display(),
            "Code asset not built yet, using placeholder hash"
        );
        Ok(Self {
            path: path.to_path_buf(),
            sha256: "0".repeat(64),
            available: false,
        })
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Fail unless the package exists on disk
    pub fn ensure_available(&self) -> Result<(), AssetError> {
        if self.available {
            Ok(())
        } else {
            Err(AssetError::Missing(self.path.clone()))
        }
    }

    pub fn s3_key(&self) -> String {
        format!("assets/{}.zip", self.sha256)
    }

    /// First eight hex digits, used to name the published version
    pub fn short_hash(&self) -> &str {
        &self.sha256[..8]
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_hash_is_content_addressed() {
        let a = CodeAsset::from_bytes("a.zip", b"package-one");
        let b = CodeAsset::from_bytes("b.zip", b"package-one");
        let c = CodeAsset::from_bytes("a.zip", b"package-two");
        assert_eq!(a.sha256, b.sha256);
        assert_ne!(a.sha256, c.sha256);
        assert_eq!(a.sha256.len(), 64);
        assert_eq!(a.s3_key(), format!("assets/{}.zip", a.sha256));
        assert_eq!(a.short_hash().len(), 8);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootstrap.zip");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"zip bytes")
            .unwrap();

        let asset = CodeAsset::from_file(&path).unwrap();
        assert_eq!(asset, CodeAsset::from_bytes(&path, b"zip bytes"));
        assert!(asset.ensure_available().is_ok());
    }

    #[test]
    fn test_rejects_non_zip() {
        assert!(matches!(
            CodeAsset::from_file("bootstrap.tar"),
            Err(AssetError::NotAZip(_))
        ));
    }

    #[test]
    fn test_missing_asset_resolves_to_placeholder() {
        let asset = CodeAsset::resolve("/nonexistent/bootstrap.zip").unwrap();
        assert!(!asset.is_available());
        assert!(matches!(asset.ensure_available(), Err(AssetError::Missing(_))));
    }
}
