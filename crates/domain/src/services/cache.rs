use std::time::Duration;

use moka::sync::Cache;

use crate::model::{AccountId, SessionFingerprint};

/// Short-lived memory of which session fingerprints were recently validated,
/// so authenticated requests skip the session lookup.
#[derive(Debug, Clone)]
pub struct SessionCache {
    sessions: Cache<String, AccountId>,
}

impl SessionCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
    pub const DEFAULT_CAPACITY: u64 = 100_000;

    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, capacity: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            sessions: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(capacity)
                .build(),
        }
    }

    pub fn lookup(&self, fingerprint: &SessionFingerprint) -> Option<AccountId> {
        self.sessions.get(fingerprint.as_str())
    }

    pub fn remember(&self, fingerprint: &SessionFingerprint, account: AccountId) {
        self.sessions
            .insert(fingerprint.as_str().to_owned(), account);
    }

    pub fn forget(&self, fingerprint: &SessionFingerprint) {
        self.sessions.invalidate(fingerprint.as_str());
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionToken;

    #[test]
    fn remembers_and_forgets() {
        let cache = SessionCache::default();
        let fingerprint = SessionToken::new("token-a").fingerprint();
        assert_eq!(cache.lookup(&fingerprint), None);
        cache.remember(&fingerprint, AccountId::new(7));
        assert_eq!(cache.lookup(&fingerprint), Some(AccountId::new(7)));
        cache.forget(&fingerprint);
        assert_eq!(cache.lookup(&fingerprint), None);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = SessionCache::new(Duration::from_millis(20));
        let fingerprint = SessionToken::new("token-b").fingerprint();
        cache.remember(&fingerprint, AccountId::new(1));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.lookup(&fingerprint), None);
    }
}
