//! Machine-keyed TTL cache for fetched secret sets.
//!
//! Entries are `(timestamp, payload)` pairs keyed by
//! `organization:project`. A payload is sealed with [`SecretCipher`]
//! whenever sealing succeeds; when crypto is unavailable the entry is kept
//! as a plaintext map instead (documented fallback tier). A sealed entry
//! that will not open (foreign machine, corrupted blob) is a cache miss,
//! never an error: the only failures a caller sees come from the gateway.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::crypto::{CryptoError, MachineId, SecretCipher};
use crate::gateway::{GatewayError, SecretMap, SecretsGateway};

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

enum Payload {
    /// `base64url(salt):token` produced by the cipher.
    Sealed(String),
    /// Plaintext fallback tier, used when sealing is unavailable.
    Plain(SecretMap),
}

struct Entry {
    stored_at: Instant,
    payload: Payload,
}

/// Keyed store of fetched secret sets with expiry and tier fallback.
pub struct SecretsCache {
    ttl: Duration,
    cipher: SecretCipher,
    entries: Mutex<HashMap<String, Entry>>,
}

impl SecretsCache {
    pub fn new(machine_id: MachineId) -> Self {
        Self::with_ttl(machine_id, DEFAULT_TTL)
    }

    pub fn with_ttl(machine_id: MachineId, ttl: Duration) -> Self {
        Self {
            ttl,
            cipher: SecretCipher::new(machine_id),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Serve `(organization, project)` from cache, refreshing through the
    /// gateway on miss, expiry, open failure, or `force_refresh`.
    ///
    /// The entries lock is not held across the gateway call, so two
    /// concurrent callers can both observe a stale entry and fetch twice.
    /// Entries are immutable once written and the latest write wins; the
    /// race costs a redundant fetch, nothing else.
    pub async fn get(
        &self,
        gateway: &dyn SecretsGateway,
        organization_id: &str,
        project_id: Option<&str>,
        force_refresh: bool,
    ) -> Result<SecretMap, GatewayError> {
        let key = cache_key(organization_id, project_id);

        if !force_refresh {
            if let Some(secrets) = self.lookup(&key) {
                return Ok(secrets);
            }
        }

        let fresh = gateway.fetch(organization_id, project_id).await?;
        self.store(key, &fresh);
        Ok(fresh)
    }

    /// A fresh entry, opened. `None` covers absent, expired, and
    /// failed-to-open entries alike; all roads lead to a refresh.
    fn lookup(&self, key: &str) -> Option<SecretMap> {
        let entries = self.entries.lock();
        let entry = entries.get(key)?;

        if entry.stored_at.elapsed() >= self.ttl {
            debug!("cache entry '{key}' expired");
            return None;
        }

        match &entry.payload {
            Payload::Plain(map) => Some(map.clone()),
            Payload::Sealed(blob) => match self.cipher.open(blob) {
                Ok(map) => Some(map),
                Err(e) => {
                    debug!("cache entry '{key}' failed to open ({e}), treating as miss");
                    None
                }
            },
        }
    }

    /// Stamp and store a fetched map, sealed when possible.
    fn store(&self, key: String, secrets: &SecretMap) {
        let payload = match self.cipher.seal(secrets) {
            Ok(blob) => Payload::Sealed(blob),
            Err(CryptoError::Unavailable) => {
                warn!("cache encryption unavailable, storing plaintext entry");
                Payload::Plain(secrets.clone())
            }
            Err(e) => {
                warn!("sealing failed ({e}), storing plaintext entry");
                Payload::Plain(secrets.clone())
            }
        };

        self.entries.lock().insert(
            key,
            Entry {
                stored_at: Instant::now(),
                payload,
            },
        );
    }

    /// Insert a plaintext entry directly, stamped now. This is the legacy
    /// tier: a map cached without encryption is served as-is, no decrypt
    /// attempted.
    pub fn store_plain(
        &self,
        organization_id: &str,
        project_id: Option<&str>,
        secrets: SecretMap,
    ) {
        self.entries.lock().insert(
            cache_key(organization_id, project_id),
            Entry {
                stored_at: Instant::now(),
                payload: Payload::Plain(secrets),
            },
        );
    }

    /// Drop all entries, wiping plaintext-tier values first. Safe to call
    /// any number of times.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        for entry in entries.values_mut() {
            if let Payload::Plain(map) = &mut entry.payload {
                for value in map.values_mut() {
                    value.zeroize();
                }
            }
        }
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

fn cache_key(organization_id: &str, project_id: Option<&str>) -> String {
    format!("{organization_id}:{}", project_id.unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Gateway fake that counts fetches and returns a fixed map.
    struct CountingGateway {
        calls: AtomicUsize,
        secrets: SecretMap,
    }

    impl CountingGateway {
        fn new(secrets: SecretMap) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                secrets,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SecretsGateway for CountingGateway {
        async fn fetch(
            &self,
            _organization_id: &str,
            _project_id: Option<&str>,
        ) -> Result<SecretMap, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.secrets.clone())
        }

        async fn projects(
            &self,
            _organization_id: &str,
        ) -> Result<Vec<crate::gateway::Project>, GatewayError> {
            Ok(vec![])
        }
    }

    fn sample() -> SecretMap {
        SecretMap::from([
            ("A".to_string(), "1".to_string()),
            ("B".to_string(), "2".to_string()),
        ])
    }

    fn cache() -> SecretsCache {
        SecretsCache::new(MachineId::fixed("cache-test-machine"))
    }

    #[tokio::test]
    async fn second_get_within_ttl_is_served_from_cache() {
        let cache = cache();
        let gateway = CountingGateway::new(sample());

        let first = cache.get(&gateway, "o1", Some("p1"), false).await.unwrap();
        let second = cache.get(&gateway, "o1", Some("p1"), false).await.unwrap();

        assert_eq!(first, sample());
        assert_eq!(second, sample());
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn expired_entry_triggers_refetch() {
        let cache = SecretsCache::with_ttl(
            MachineId::fixed("cache-test-machine"),
            Duration::from_millis(40),
        );
        let gateway = CountingGateway::new(sample());

        cache.get(&gateway, "o1", Some("p1"), false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        let after = cache.get(&gateway, "o1", Some("p1"), false).await.unwrap();

        assert_eq!(after, sample());
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_a_fresh_entry() {
        let cache = cache();
        let gateway = CountingGateway::new(sample());

        cache.get(&gateway, "o1", Some("p1"), false).await.unwrap();
        cache.get(&gateway, "o1", Some("p1"), true).await.unwrap();

        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn returned_map_is_an_independent_copy() {
        let cache = cache();
        let gateway = CountingGateway::new(sample());

        let mut first = cache.get(&gateway, "o1", None, false).await.unwrap();
        first.insert("INJECTED".to_string(), "x".to_string());

        let second = cache.get(&gateway, "o1", None, false).await.unwrap();
        assert!(!second.contains_key("INJECTED"));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn distinct_projects_get_distinct_entries() {
        let cache = cache();
        let gateway = CountingGateway::new(sample());

        cache.get(&gateway, "o1", Some("p1"), false).await.unwrap();
        cache.get(&gateway, "o1", Some("p2"), false).await.unwrap();
        cache.get(&gateway, "o1", None, false).await.unwrap();

        assert_eq!(gateway.calls(), 3);
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn plaintext_tier_is_served_without_decryption() {
        let cache = cache();
        // A gateway that would be counted if the plain entry were missed.
        let gateway = CountingGateway::new(SecretMap::new());

        cache.store_plain("o1", Some("p1"), sample());
        let served = cache.get(&gateway, "o1", Some("p1"), false).await.unwrap();

        assert_eq!(served, sample());
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn unopenable_entry_is_a_miss_not_an_error() {
        let cache = cache();
        let gateway = CountingGateway::new(sample());

        // Seal under a different machine identity and plant the blob.
        let foreign = SecretCipher::new(MachineId::fixed("other-machine"));
        let blob = foreign.seal(&sample()).unwrap();
        cache.entries.lock().insert(
            cache_key("o1", Some("p1")),
            Entry {
                stored_at: Instant::now(),
                payload: Payload::Sealed(blob),
            },
        );

        let served = cache.get(&gateway, "o1", Some("p1"), false).await.unwrap();
        assert_eq!(served, sample());
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let cache = cache();
        let gateway = CountingGateway::new(sample());

        cache.get(&gateway, "o1", None, false).await.unwrap();
        assert!(!cache.is_empty());

        cache.clear();
        assert!(cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn cache_key_uses_empty_string_for_all_projects() {
        assert_eq!(cache_key("o1", None), "o1:");
        assert_eq!(cache_key("o1", Some("p1")), "o1:p1");
    }
}
