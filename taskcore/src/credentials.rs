//! Credential lookup with memoization and explicit invalidation.
//!
//! [`CredentialCache`] sits in front of a [`CredentialSource`] (a keychain,
//! an interactive prompt, an environment lookup). Successful lookups are
//! cached per `(origin, scheme)`. When a caller finds a credential rejected
//! it reports the origin invalid, and the next lookup for that origin goes
//! back to the source once.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::TaskError;

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    secret: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Underlying credential store queried on a cache miss.
pub trait CredentialSource: Send + Sync {
    fn lookup(&self, origin: &str, scheme: &str) -> Option<Credential>;
}

/// What tasks use to obtain credentials.
pub trait CredentialProvider: Send + Sync {
    /// Credential for `origin` under auth `scheme`, if one is known.
    ///
    /// Empty `origin` or `scheme` is a validation error.
    fn get_credential(&self, origin: &str, scheme: &str) -> Result<Option<Credential>, TaskError>;

    /// Record that the credential last returned for `origin` was rejected.
    fn report_invalid(&self, origin: &str);
}

/// Provider that never has a credential.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn get_credential(
        &self,
        origin: &str,
        scheme: &str,
    ) -> Result<Option<Credential>, TaskError> {
        validate_key(origin, scheme)?;
        Ok(None)
    }

    fn report_invalid(&self, _origin: &str) {}
}

/// Origins whose cached credentials were reported invalid.
///
/// Owned explicitly and shared through [`Arc`] when several caches should
/// honor the same reports.
#[derive(Debug, Default)]
pub struct InvalidOrigins {
    origins: Mutex<HashSet<String>>,
}

impl InvalidOrigins {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.origins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `origin` invalid. Returns `false` if it already was.
    pub fn mark(&self, origin: &str) -> bool {
        self.lock().insert(origin.to_string())
    }

    /// Clear the mark for `origin`, returning whether it was set.
    pub fn take(&self, origin: &str) -> bool {
        self.lock().remove(origin)
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.lock().contains(origin)
    }
}

type CacheKey = (String, String);

/// Memoizing [`CredentialProvider`] over a [`CredentialSource`].
///
/// Locks are never held while the source is queried, so a slow source (a
/// user prompt, say) does not block other origins.
pub struct CredentialCache<S> {
    source: S,
    entries: Mutex<HashMap<CacheKey, Credential>>,
    invalid: Arc<InvalidOrigins>,
}

impl<S: CredentialSource> CredentialCache<S> {
    pub fn new(source: S) -> Self {
        Self::with_invalid_origins(source, Arc::new(InvalidOrigins::new()))
    }

    pub fn with_invalid_origins(source: S, invalid: Arc<InvalidOrigins>) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
            invalid,
        }
    }

    pub fn invalid_origins(&self) -> &Arc<InvalidOrigins> {
        &self.invalid
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Credential>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(origin: &str, scheme: &str) -> CacheKey {
        (origin.to_string(), scheme.to_string())
    }
}

impl<S: CredentialSource> CredentialProvider for CredentialCache<S> {
    fn get_credential(
        &self,
        origin: &str,
        scheme: &str,
    ) -> Result<Option<Credential>, TaskError> {
        validate_key(origin, scheme)?;
        let key = Self::key(origin, scheme);

        if self.invalid.take(origin) {
            debug!(origin, scheme, "origin reported invalid, bypassing cache");
            self.entries().remove(&key);
        } else if let Some(cached) = self.entries().get(&key).cloned() {
            debug!(origin, scheme, "credential cache hit");
            return Ok(Some(cached));
        }

        let fresh = self.source.lookup(origin, scheme);
        match &fresh {
            Some(credential) => {
                debug!(origin, scheme, "caching credential");
                self.entries().insert(key, credential.clone());
            }
            None => debug!(origin, scheme, "no credential from source"),
        }
        Ok(fresh)
    }

    fn report_invalid(&self, origin: &str) {
        if self.invalid.mark(origin) {
            debug!(origin, "credential reported invalid");
        }
    }
}

fn validate_key(origin: &str, scheme: &str) -> Result<(), TaskError> {
    if origin.trim().is_empty() {
        return Err(TaskError::validation("credential origin must not be empty"));
    }
    if scheme.trim().is_empty() {
        return Err(TaskError::validation("auth scheme must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source that hands out a numbered credential per lookup.
    #[derive(Default)]
    struct Counting {
        lookups: AtomicUsize,
    }

    impl CredentialSource for Counting {
        fn lookup(&self, origin: &str, _scheme: &str) -> Option<Credential> {
            if origin == "https://anonymous.example" {
                return None;
            }
            let n = self.lookups.fetch_add(1, Ordering::SeqCst) + 1;
            Some(Credential::new("user", format!("secret-{n}")))
        }
    }

    const ORIGIN: &str = "https://pkgs.example/feed";

    #[test]
    fn second_lookup_is_served_from_cache() {
        let cache = CredentialCache::new(Counting::default());

        let first = cache.get_credential(ORIGIN, "basic").expect("first");
        let second = cache.get_credential(ORIGIN, "basic").expect("second");

        assert_eq!(first, second);
        assert_eq!(cache.source().lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn schemes_are_cached_separately() {
        let cache = CredentialCache::new(Counting::default());
        cache.get_credential(ORIGIN, "basic").expect("basic");
        cache.get_credential(ORIGIN, "bearer").expect("bearer");
        assert_eq!(cache.source().lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn report_invalid_bypasses_cache_once() {
        let cache = CredentialCache::new(Counting::default());
        cache.get_credential(ORIGIN, "basic").expect("prime");

        cache.report_invalid(ORIGIN);
        let refreshed = cache
            .get_credential(ORIGIN, "basic")
            .expect("refresh")
            .expect("credential");
        let cached = cache
            .get_credential(ORIGIN, "basic")
            .expect("cached")
            .expect("credential");

        assert_eq!(refreshed.secret(), "secret-2");
        assert_eq!(cached.secret(), "secret-2");
        assert_eq!(cache.source().lookups.load(Ordering::SeqCst), 2);
        assert!(!cache.invalid_origins().contains(ORIGIN));
    }

    #[test]
    fn report_invalid_is_idempotent() {
        let invalid = InvalidOrigins::new();
        assert!(invalid.mark(ORIGIN));
        assert!(!invalid.mark(ORIGIN));
        assert!(invalid.take(ORIGIN));
        assert!(!invalid.take(ORIGIN));
    }

    #[test]
    fn missing_credentials_are_not_cached() {
        let cache = CredentialCache::new(Counting::default());
        let origin = "https://anonymous.example";
        assert!(cache.get_credential(origin, "basic").expect("lookup").is_none());
        assert!(cache.get_credential(origin, "basic").expect("lookup").is_none());
        assert!(cache.entries().is_empty());
    }

    #[test]
    fn shared_invalid_set_reaches_every_cache() {
        let invalid = Arc::new(InvalidOrigins::new());
        let a = CredentialCache::with_invalid_origins(Counting::default(), Arc::clone(&invalid));
        let b = CredentialCache::with_invalid_origins(Counting::default(), Arc::clone(&invalid));
        b.get_credential(ORIGIN, "basic").expect("prime b");

        a.report_invalid(ORIGIN);
        b.get_credential(ORIGIN, "basic").expect("refresh b");

        assert_eq!(b.source().lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_origin_is_rejected() {
        let cache = CredentialCache::new(Counting::default());
        let err = cache.get_credential("", "basic").expect_err("empty origin");
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = NoCredentials
            .get_credential(ORIGIN, " ")
            .expect_err("empty scheme");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn debug_redacts_secret() {
        let credential = Credential::new("alice", "hunter2");
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }
}
