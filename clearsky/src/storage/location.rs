use std::fmt;
use std::str::FromStr;

use super::StorageError;

/// Address of an object: `scheme://bucket/key`.
///
/// A plain path (no scheme) is a `file` location with an empty bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    scheme: String,
    bucket: String,
    key: String,
}

impl ObjectLocation {
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        let invalid = || StorageError::InvalidLocation(s.to_string());
        let s = s.trim();
        if s.is_empty() {
            return Err(invalid());
        }

        let Some((scheme, rest)) = s.split_once("://") else {
            if s.ends_with('/') {
                return Err(invalid());
            }
            return Ok(Self {
                scheme: "file".into(),
                bucket: String::new(),
                key: s.to_string(),
            });
        };
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid());
        }
        if scheme == "file" {
            if rest.is_empty() || rest.ends_with('/') {
                return Err(invalid());
            }
            return Ok(Self {
                scheme: "file".into(),
                bucket: String::new(),
                key: rest.to_string(),
            });
        }

        let (bucket, key) = rest.split_once('/').ok_or_else(invalid)?;
        if bucket.is_empty() || key.is_empty() || key.ends_with('/') {
            return Err(invalid());
        }
        if key.split('/').any(|part| part == "..") {
            return Err(invalid());
        }
        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Final path segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    pub fn is_file(&self) -> bool {
        self.scheme == "file"
    }
}

impl FromStr for ObjectLocation {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_file() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_key() {
        let loc = ObjectLocation::parse("gs://composites/2024/tile512-0.tif").unwrap();
        assert_eq!(loc.scheme(), "gs");
        assert_eq!(loc.bucket(), "composites");
        assert_eq!(loc.key(), "2024/tile512-0.tif");
        assert_eq!(loc.file_name(), "tile512-0.tif");
        assert_eq!(loc.to_string(), "gs://composites/2024/tile512-0.tif");
    }

    #[test]
    fn test_plain_path_is_file() {
        let loc = ObjectLocation::parse("/data/out/tile0-0.tif").unwrap();
        assert!(loc.is_file());
        assert_eq!(loc.key(), "/data/out/tile0-0.tif");
        assert_eq!(loc.to_string(), "/data/out/tile0-0.tif");
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "gs://", "gs://bucket", "gs://bucket/", "gs://b/dir/", "gs://b/../x", "://b/k", "out/"] {
            assert!(ObjectLocation::parse(bad).is_err(), "{}", bad);
        }
    }
}
