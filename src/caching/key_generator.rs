//! # Cache Key Generator
//!
//! Cache keys are `catalog:<operation>:<discriminator>`. For query-driven operations the
//! discriminator is the canonical serialization of the parameters: sorted by name and
//! percent-encoded, so `page=1&sort_by=x` and `sort_by=x&page=1` map to the same entry.

use crate::upstream::QueryParams;
use sha2::{Digest, Sha256};
use std::fmt;

/// Fixed namespace token shared by every key
pub const CACHE_NAMESPACE: &str = "catalog";

/// A fully derived cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// `catalog:discover:{type}:{canonical-query}`
    pub fn discover(resource_type: &str, filters: &QueryParams) -> Self {
        Self::build("discover", &[resource_type, &canonical_query(filters)])
    }

    /// `catalog:media:{type}:{id}`
    pub fn media(resource_type: &str, id: u64) -> Self {
        Self::build("media", &[resource_type, &id.to_string()])
    }

    /// `catalog:search:{q}:{page}`
    pub fn search(query: &str, page: u32) -> Self {
        Self::build("search", &[query, &page.to_string()])
    }

    fn build(operation: &str, parts: &[&str]) -> Self {
        let mut key = format!("{}:{}", CACHE_NAMESPACE, operation);
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        Self(key)
    }

    /// Replace keys longer than `max_length` with a fixed-length digest that keeps the
    /// namespace and operation readable.
    pub fn with_max_length(self, max_length: usize) -> Self {
        if self.0.len() <= max_length {
            return self;
        }

        let mut parts = self.0.splitn(3, ':');
        let namespace = parts.next().unwrap_or(CACHE_NAMESPACE);
        let operation = parts.next().unwrap_or("key");

        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let hash = hex::encode(hasher.finalize());

        Self(format!("{}:{}:sha256:{}", namespace, operation, hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonical query string: parameters sorted by name, names and values percent-encoded
pub fn canonical_query(params: &QueryParams) -> String {
    let mut pairs: Vec<(&str, &str)> = params.iter().collect();
    pairs.sort();

    pairs
        .into_iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}
