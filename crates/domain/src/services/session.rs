use chrono::Utc;
use tracing::{debug, info};

use crate::error::{RewardsError, RewardsResult};
use crate::model::{AccountRecord, NewSession, SessionFingerprint, SessionToken};
use crate::services::SessionCache;
use crate::storage::{AccountStore, SessionStore};

/// An authenticated caller: the account behind a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub account: AccountRecord,
    pub fingerprint: SessionFingerprint,
}

pub struct SessionManager<'a, S> {
    store: &'a S,
    cache: &'a SessionCache,
}

impl<'a, S> SessionManager<'a, S>
where
    S: SessionStore + AccountStore,
{
    pub fn new(store: &'a S, cache: &'a SessionCache) -> Self {
        Self { store, cache }
    }

    /// Issues a fresh bearer token for `account`. The token itself is returned
    /// exactly once; only its fingerprint is stored.
    pub async fn open(&self, account: AccountRecord) -> RewardsResult<(SessionToken, Session)> {
        let token = SessionToken::generate()?;
        let fingerprint = token.fingerprint();
        let record = self
            .store
            .insert_session(NewSession {
                fingerprint: fingerprint.clone(),
                account_id: account.id,
                issued_at: Utc::now(),
            })
            .await?;
        self.cache.remember(&record.fingerprint, account.id);
        info!(account = %account.id, "session opened");

        Ok((
            token,
            Session {
                account,
                fingerprint,
            },
        ))
    }

    pub async fn authenticate(&self, token: &SessionToken) -> RewardsResult<Session> {
        let fingerprint = token.fingerprint();
        let account_id = match self.cache.lookup(&fingerprint) {
            Some(id) => id,
            None => {
                let record = self
                    .store
                    .find_session(&fingerprint)
                    .await?
                    .filter(|session| session.is_active())
                    .ok_or(RewardsError::Unauthenticated)?;
                self.cache.remember(&fingerprint, record.account_id);
                record.account_id
            }
        };

        let Some(account) = self.store.find_account(account_id).await? else {
            self.cache.forget(&fingerprint);
            debug!(account = %account_id, "session points at a missing account");
            return Err(RewardsError::Unauthenticated);
        };
        Ok(Session {
            account,
            fingerprint,
        })
    }

    /// Revokes the session behind `token`. Closing an unknown or already
    /// closed session is not an error.
    pub async fn close(&self, token: &SessionToken) -> RewardsResult<()> {
        let fingerprint = token.fingerprint();
        self.cache.forget(&fingerprint);
        if let Some(session) = self.store.revoke_session(&fingerprint, Utc::now()).await? {
            info!(account = %session.account_id, "session closed");
        }
        Ok(())
    }
}
