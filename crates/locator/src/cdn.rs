//! Rewrites of object-store URLs onto content-delivery hosts
//!
//! Both rewrites return the input unchanged when it is not an object-store
//! URL, when the bucket has no CDN, or when the CDN URL cannot be parsed.
//! The original query string and fragment are carried over verbatim.

use crate::{escape::key_escape, parse_object_url, LocatorError};
use url::Url;

/// Ordered bucket to CDN base URL mapping; the first matching entry wins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketMapping {
    entries: Vec<(String, String)>,
}

impl BucketMapping {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; earlier entries take precedence
    #[must_use]
    pub fn with(mut self, bucket: impl Into<String>, cdn_url: impl Into<String>) -> Self {
        self.entries.push((bucket.into(), cdn_url.into()));
        self
    }

    /// Parse `bucket:https://cdn.example.com,other:https://cdn2.example.com`
    ///
    /// Blank entries are skipped. The bucket ends at the first `:`.
    pub fn parse(mapping: &str) -> Result<Self, LocatorError> {
        let mut parsed = Self::new();
        for entry in mapping.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (bucket, cdn_url) = entry
                .split_once(':')
                .ok_or_else(|| LocatorError::InvalidMapping(entry.to_string()))?;
            if bucket.is_empty() || cdn_url.is_empty() {
                return Err(LocatorError::InvalidMapping(entry.to_string()));
            }
            parsed.entries.push((bucket.to_string(), cdn_url.to_string()));
        }
        Ok(parsed)
    }

    #[must_use]
    pub fn lookup(&self, bucket: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == bucket)
            .map(|(_, cdn_url)| cdn_url.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<B: Into<String>, C: Into<String>> FromIterator<(B, C)> for BucketMapping {
    fn from_iter<I: IntoIterator<Item = (B, C)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(bucket, cdn_url)| (bucket.into(), cdn_url.into()))
                .collect(),
        }
    }
}

/// Replace an object-store URL with a CDN URL when its bucket is `expected_bucket`
#[must_use]
pub fn replace_url_if_bucket_match(s3_url: &str, cdn_url: &str, expected_bucket: &str) -> String {
    match parse_object_url(s3_url) {
        Ok(address) if address.bucket == expected_bucket => {
            rewrite(s3_url, cdn_url, &address.key).unwrap_or_else(|| s3_url.to_string())
        }
        _ => s3_url.to_string(),
    }
}

/// Replace an object-store URL with the CDN URL mapped to its bucket
#[must_use]
pub fn replace_url_with_bucket_mapping(s3_url: &str, mapping: &BucketMapping) -> String {
    let Ok(address) = parse_object_url(s3_url) else {
        return s3_url.to_string();
    };
    mapping
        .lookup(&address.bucket)
        .and_then(|cdn_url| rewrite(s3_url, cdn_url, &address.key))
        .unwrap_or_else(|| s3_url.to_string())
}

fn rewrite(s3_url: &str, cdn_url: &str, key: &str) -> Option<String> {
    let cdn = Url::parse(cdn_url).ok()?;
    let host = cdn.host_str()?;

    let mut result = match cdn.port() {
        Some(port) => format!("{}://{}:{}/{}", cdn.scheme(), host, port, key_escape(key)),
        None => format!("{}://{}/{}", cdn.scheme(), host, key_escape(key)),
    };

    let (query, fragment) = split_query_fragment(s3_url);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        result.push('?');
        result.push_str(query);
    }
    if let Some(fragment) = fragment.filter(|f| !f.is_empty()) {
        result.push('#');
        result.push_str(fragment);
    }
    Some(result)
}

/// Raw query and fragment of a URL, without their delimiters
fn split_query_fragment(url: &str) -> (Option<&str>, Option<&str>) {
    let (before_fragment, fragment) = match url.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (url, None),
    };
    let query = before_fragment.split_once('?').map(|(_, query)| query);
    (query, fragment)
}
