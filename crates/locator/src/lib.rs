//! Locator resolution for input and output URIs
//!
//! Classifies a URI into one of four storage schemes and parses object-store
//! addressing out of HTTPS S3 URLs. Four URL shapes are tried in a fixed
//! priority order:
//!
//! 1. virtual-hosted: `https://{bucket}.s3.{region}.amazonaws.com/{key}`
//! 2. path-style: `https://s3.{region}.amazonaws.com/{bucket}/{key}`
//! 3. legacy dash-region: `https://{bucket}.s3-{region}.amazonaws.com/{key}`
//! 4. global: `https://{bucket}.s3.amazonaws.com/{key}` (region defaults)
//!
//! # Example
//!
//! ```rust
//! use video_palette_locator::{resolve, Locator};
//!
//! let locator = resolve("https://mybucket.s3.us-east-1.amazonaws.com/a%20b/c.png").unwrap();
//! let address = locator.object_address().unwrap();
//! assert_eq!(address.bucket, "mybucket");
//! assert_eq!(address.key, "a b/c.png");
//! assert_eq!(address.escaped_key(), "a+b/c.png");
//! ```

pub mod cdn;
pub mod escape;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;
use video_palette_common::PaletteError;

pub use cdn::{replace_url_if_bucket_match, replace_url_with_bucket_mapping, BucketMapping};
pub use escape::{key_escape, query_unescape};

/// Region applied to the global URL shape, which carries none
pub const GLOBAL_DEFAULT_REGION: &str = "us-east-1";

static S3_VIRTUAL_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://([^.]+)\.s3\.([^.]+)\.amazonaws\.com(/[^?^#]*)?")
        .expect("valid virtual-host regex")
});
static S3_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://s3\.([^.]+)\.amazonaws\.com/([^/]+)(/[^?^#]*)?")
        .expect("valid path-style regex")
});
static S3_DASH_REGION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://([^.]+)\.s3-([^.]+)\.amazonaws\.com(/[^?^#]*)?")
        .expect("valid dash-region regex")
});
static S3_GLOBAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://([^.]+)\.s3\.amazonaws\.com(/[^?^#]*)?").expect("valid global regex")
});

/// Locator parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    #[error("pattern of S3 URL not found: {0}")]
    PatternNotFound(String),

    #[error("error unescaping key in {uri}: {reason}")]
    KeyDecode { uri: String, reason: String },

    #[error("invalid bucket mapping entry: {0}")]
    InvalidMapping(String),
}

impl From<LocatorError> for PaletteError {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::PatternNotFound(uri) => PaletteError::LocatorUnresolved(uri),
            LocatorError::KeyDecode { uri, reason } => {
                PaletteError::KeyDecodeError { uri, reason }
            }
            LocatorError::InvalidMapping(entry) => {
                PaletteError::InvalidConfig(format!("bucket mapping entry {entry:?}"))
            }
        }
    }
}

/// Storage scheme of a resolved locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    Local,
    ObjectStore,
    Discard,
    Unresolved,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::ObjectStore => "object_store",
            Self::Discard => "discard",
            Self::Unresolved => "unresolved",
        };
        f.write_str(name)
    }
}

/// Region, bucket and decoded key of an object-store URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectAddress {
    /// `None` only for the global URL shape
    pub region: Option<String>,
    pub bucket: String,
    pub key: String,
}

impl ObjectAddress {
    /// Region to address, falling back to [`GLOBAL_DEFAULT_REGION`]
    #[must_use]
    pub fn effective_region(&self) -> &str {
        self.region.as_deref().unwrap_or(GLOBAL_DEFAULT_REGION)
    }

    /// Key escaped with object-store rules
    #[must_use]
    pub fn escaped_key(&self) -> String {
        key_escape(&self.key)
    }

    /// Virtual-hosted URL for this address
    #[must_use]
    pub fn to_url(&self) -> String {
        match &self.region {
            Some(region) => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket,
                region,
                self.escaped_key()
            ),
            None => format!("https://{}.s3.amazonaws.com/{}", self.bucket, self.escaped_key()),
        }
    }
}

impl fmt::Display for ObjectAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Resolved description of a URI
///
/// The object-store variant always holds a non-empty bucket and key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Local { path: PathBuf, raw: String },
    ObjectStore { address: ObjectAddress, raw: String },
    Discard,
    Unresolved { raw: String },
}

impl Locator {
    #[must_use]
    pub fn scheme(&self) -> Scheme {
        match self {
            Self::Local { .. } => Scheme::Local,
            Self::ObjectStore { .. } => Scheme::ObjectStore,
            Self::Discard => Scheme::Discard,
            Self::Unresolved { .. } => Scheme::Unresolved,
        }
    }

    /// The URI this locator was resolved from
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Local { raw, .. } | Self::ObjectStore { raw, .. } | Self::Unresolved { raw } => {
                raw
            }
            Self::Discard => "",
        }
    }

    #[must_use]
    pub fn object_address(&self) -> Option<&ObjectAddress> {
        match self {
            Self::ObjectStore { address, .. } => Some(address),
            _ => None,
        }
    }

    #[must_use]
    pub fn local_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Local { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discard => f.write_str("<discard>"),
            other => f.write_str(other.raw()),
        }
    }
}

/// Resolve a URI into a [`Locator`].
///
/// An empty string resolves to [`Locator::Discard`]. An object-store URL whose
/// key cannot be decoded is an error rather than an unresolved locator.
pub fn resolve(uri: &str) -> Result<Locator, LocatorError> {
    if uri.is_empty() {
        return Ok(Locator::Discard);
    }

    match parse_object_url(uri) {
        Ok(address) => {
            debug!(
                "Resolved {} as object store bucket={} region={}",
                uri,
                address.bucket,
                address.effective_region()
            );
            return Ok(Locator::ObjectStore {
                address,
                raw: uri.to_string(),
            });
        }
        Err(LocatorError::PatternNotFound(_)) => {}
        Err(err) => return Err(err),
    }

    if let Some(path) = uri.strip_prefix("file://") {
        return Ok(Locator::Local {
            path: PathBuf::from(path),
            raw: uri.to_string(),
        });
    }

    if !uri.contains("://") {
        return Ok(Locator::Local {
            path: PathBuf::from(uri),
            raw: uri.to_string(),
        });
    }

    debug!("No locator scheme matched {}", uri);
    Ok(Locator::Unresolved {
        raw: uri.to_string(),
    })
}

/// Parse an HTTPS S3 URL into region, bucket and key.
pub fn parse_object_url(url: &str) -> Result<ObjectAddress, LocatorError> {
    // (region, bucket, raw key path) per shape, in priority order
    let matched = if let Some(caps) = S3_VIRTUAL_HOST.captures(url) {
        Some((Some(caps[2].to_string()), caps[1].to_string(), capture_or_empty(&caps, 3)))
    } else if let Some(caps) = S3_PATH.captures(url) {
        Some((Some(caps[1].to_string()), caps[2].to_string(), capture_or_empty(&caps, 3)))
    } else if let Some(caps) = S3_DASH_REGION.captures(url) {
        Some((Some(caps[2].to_string()), caps[1].to_string(), capture_or_empty(&caps, 3)))
    } else {
        S3_GLOBAL
            .captures(url)
            .map(|caps| (None, caps[1].to_string(), capture_or_empty(&caps, 2)))
    };

    let Some((region, bucket, raw_key)) = matched else {
        return Err(LocatorError::PatternNotFound(url.to_string()));
    };

    // Only the separator slash goes; keys may themselves start with '/'
    let raw_key = raw_key.strip_prefix('/').unwrap_or(&raw_key);
    let key = query_unescape(raw_key).map_err(|reason| {
        LocatorError::KeyDecode {
            uri: url.to_string(),
            reason,
        }
    })?;

    // A bucket with no object is not an addressable object
    if key.is_empty() {
        return Err(LocatorError::PatternNotFound(url.to_string()));
    }

    Ok(ObjectAddress {
        region,
        bucket,
        key,
    })
}

fn capture_or_empty(caps: &regex::Captures<'_>, index: usize) -> String {
    caps.get(index)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
