use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use rand::Rng;
use rand::distributions::Alphanumeric;
use thiserror::Error;

use linkcast_common::config::ShortenerConfig;
use linkcast_common::error::AppError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShortenError {
    #[error("url parameter is required")]
    MissingUrl,

    #[error("Invalid URL format")]
    InvalidUrl,

    #[error("Could not generate unique short code")]
    CodeSpaceExhausted,
}

impl From<ShortenError> for AppError {
    fn from(err: ShortenError) -> Self {
        match err {
            ShortenError::MissingUrl | ShortenError::InvalidUrl => {
                AppError::Validation(err.to_string())
            }
            ShortenError::CodeSpaceExhausted => AppError::Internal(err.to_string()),
        }
    }
}

/// Result of [`UrlStore::shorten`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortened {
    pub code: String,
    pub url: String,
    /// False when the URL was already mapped and the existing code was returned.
    pub created: bool,
}

#[derive(Default)]
struct Mappings {
    by_code: BTreeMap<String, String>,
    by_url: HashMap<String, String>,
}

/// Bidirectional code ↔ URL map shared by all request handlers.
pub struct UrlStore {
    config: ShortenerConfig,
    mappings: RwLock<Mappings>,
}

impl UrlStore {
    pub fn new(config: ShortenerConfig) -> Self {
        Self {
            config,
            mappings: RwLock::new(Mappings::default()),
        }
    }

    /// Map `url` to a short code, reusing the existing code if `url` is already stored.
    pub fn shorten(&self, url: &str) -> Result<Shortened, ShortenError> {
        let length = self.config.code_length;
        self.shorten_with(url, || random_code(length))
    }

    /// Like [`shorten`](Self::shorten) with a caller-supplied code generator.
    pub fn shorten_with(
        &self,
        url: &str,
        mut generate: impl FnMut() -> String,
    ) -> Result<Shortened, ShortenError> {
        if url.is_empty() {
            return Err(ShortenError::MissingUrl);
        }

        let mut mappings = self.mappings.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(code) = mappings.by_url.get(url) {
            return Ok(Shortened {
                code: code.clone(),
                url: url.to_string(),
                created: false,
            });
        }

        for attempt in 1..=self.config.max_attempts {
            let code = generate();
            if mappings.by_code.contains_key(&code) {
                tracing::debug!(attempt, code = %code, "Short code collision");
                continue;
            }

            mappings.by_code.insert(code.clone(), url.to_string());
            mappings.by_url.insert(url.to_string(), code.clone());
            tracing::info!(code = %code, url = %url, "Short code created");

            return Ok(Shortened {
                code,
                url: url.to_string(),
                created: true,
            });
        }

        tracing::warn!(
            max_attempts = self.config.max_attempts,
            "Gave up generating a unique short code"
        );
        Err(ShortenError::CodeSpaceExhausted)
    }

    pub fn resolve(&self, code: &str) -> Option<String> {
        self.mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_code
            .get(code)
            .cloned()
    }

    /// All mappings as `(code, url)`, ordered by code.
    pub fn list(&self) -> Vec<(String, String)> {
        self.mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_code
            .iter()
            .map(|(code, url)| (code.clone(), url.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_code
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for UrlStore {
    fn default() -> Self {
        Self::new(ShortenerConfig::default())
    }
}

/// Random `[A-Za-z0-9]` string of the given length.
pub fn random_code(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_code_shape() {
        let code = random_code(5);
        assert_eq!(code.len(), 5);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_shorten_and_resolve() {
        let store = UrlStore::default();
        let shortened = store.shorten("https://example.com").unwrap();

        assert!(shortened.created);
        assert_eq!(shortened.code.len(), 5);
        assert_eq!(
            store.resolve(&shortened.code).as_deref(),
            Some("https://example.com")
        );
        assert!(store.resolve("zzzzz").is_none());
    }

    #[test]
    fn test_same_url_reuses_code() {
        let store = UrlStore::default();
        let first = store.shorten("https://example.com").unwrap();
        let second = store.shorten("https://example.com").unwrap();

        assert!(!second.created);
        assert_eq!(first.code, second.code);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_collision_retries_with_new_code() {
        let store = UrlStore::default();
        store.shorten_with("https://a.example", || "AAAAA".to_string()).unwrap();

        let mut codes = vec!["BBBBB", "AAAAA"];
        let shortened = store
            .shorten_with("https://b.example", || codes.pop().unwrap().to_string())
            .unwrap();

        assert_eq!(shortened.code, "BBBBB");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let store = UrlStore::new(ShortenerConfig {
            code_length: 5,
            max_attempts: 3,
        });
        store.shorten_with("https://a.example", || "AAAAA".to_string()).unwrap();

        let mut calls = 0;
        let result = store.shorten_with("https://b.example", || {
            calls += 1;
            "AAAAA".to_string()
        });

        assert_eq!(result, Err(ShortenError::CodeSpaceExhausted));
        assert_eq!(calls, 3);
        assert!(store.resolve("AAAAA").is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_list_is_ordered_by_code() {
        let store = UrlStore::default();
        store.shorten_with("https://b.example", || "bbbbb".to_string()).unwrap();
        store.shorten_with("https://a.example", || "aaaaa".to_string()).unwrap();

        assert_eq!(
            store.list(),
            vec![
                ("aaaaa".to_string(), "https://a.example".to_string()),
                ("bbbbb".to_string(), "https://b.example".to_string()),
            ]
        );
    }

    #[test]
    fn test_error_mapping() {
        let err: AppError = ShortenError::InvalidUrl.into();
        assert!(matches!(err, AppError::Validation(ref msg) if msg == "Invalid URL format"));
        let err: AppError = ShortenError::CodeSpaceExhausted.into();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
