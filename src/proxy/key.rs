use axum::http::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Builds the cache key for an inbound request.
///
/// The handler only ever calls through this trait, so a stricter key can
/// be swapped in without touching it.
pub trait CacheKeyStrategy: Send + Sync {
    fn key(&self, target_url: &str, method: &Method, body: &[u8]) -> String;
}

/// Key on the target URL alone.
///
/// Requests with different methods or bodies to the same URL share one
/// entry: a cached `GET /widgets` also answers `POST /widgets`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlKey;

impl CacheKeyStrategy for UrlKey {
    fn key(&self, target_url: &str, _method: &Method, _body: &[u8]) -> String {
        target_url.to_string()
    }
}

/// Key on method, target URL and a SHA-256 of the request body
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodUrlBodyKey;

impl CacheKeyStrategy for MethodUrlBodyKey {
    fn key(&self, target_url: &str, method: &Method, body: &[u8]) -> String {
        let digest = Sha256::digest(body);
        format!("{} {} {}", method, target_url, hex::encode(digest))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategyKind {
    #[default]
    Url,
    MethodUrlBody,
}

impl KeyStrategyKind {
    pub fn build(self) -> Box<dyn CacheKeyStrategy> {
        match self {
            KeyStrategyKind::Url => Box::new(UrlKey),
            KeyStrategyKind::MethodUrlBody => Box::new(MethodUrlBodyKey),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_key_ignores_method_and_body() {
        let url = "http://example.test/widgets?page=2";
        let get = UrlKey.key(url, &Method::GET, b"");
        let post = UrlKey.key(url, &Method::POST, b"{\"name\":\"gear\"}");

        assert_eq!(get, url);
        assert_eq!(get, post);
    }

    #[test]
    fn test_strict_key_separates_method_and_body() {
        let url = "http://example.test/widgets";
        let get = MethodUrlBodyKey.key(url, &Method::GET, b"");
        let post_a = MethodUrlBodyKey.key(url, &Method::POST, b"a");
        let post_b = MethodUrlBodyKey.key(url, &Method::POST, b"b");

        assert_ne!(get, post_a);
        assert_ne!(post_a, post_b);
        assert_eq!(post_a, MethodUrlBodyKey.key(url, &Method::POST, b"a"));
        assert!(get.starts_with("GET http://example.test/widgets "));
    }

    #[test]
    fn test_kind_from_config_name() {
        let kind: KeyStrategyKind = serde_yaml::from_str("method_url_body").unwrap();
        assert_eq!(kind, KeyStrategyKind::MethodUrlBody);
        assert_eq!(KeyStrategyKind::default(), KeyStrategyKind::Url);
    }
}
