//! Identity resolution: turns a game id or a verified provider profile into a
//! stable account, creating it on first sight.

use chrono::Utc;
use metrics::counter;
use tracing::{debug, info};

use crate::error::{RewardsError, RewardsResult};
use crate::model::{
    normalize_nickname, random_index, AccountId, AccountRecord, GameId, IdentityAssertion,
    IdentityKey, NewAccount, RenameOutcome, Role, MAX_NICKNAME_CHANGES, NICKNAME_MAX_LEN,
};
use crate::storage::AccountStore;

/// Fallback nicknames handed to accounts whose identity carries no display name.
pub const DEFAULT_NICKNAMES: [&str; 10] = [
    "ShadowWarrior",
    "PhoenixBlade",
    "DragonSlayer",
    "NightHawk",
    "StormRider",
    "FireFist",
    "IcePhoenix",
    "ThunderBolt",
    "StarLord",
    "DarkKnight",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub account: AccountRecord,
    pub created: bool,
}

pub struct IdentityResolver<'a, S> {
    store: &'a S,
}

impl<'a, S> IdentityResolver<'a, S>
where
    S: AccountStore,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, assertion: IdentityAssertion) -> RewardsResult<Resolution> {
        let (identity, display_name, avatar_url) = match assertion {
            IdentityAssertion::Game(raw) => {
                let game_id = GameId::parse(&raw)?;
                (IdentityKey::game(&game_id), None, None)
            }
            IdentityAssertion::External(profile) => {
                let key = IdentityKey::external(profile.source, &profile.external_id)?;
                (key, profile.display_name, profile.avatar_url)
            }
        };

        if let Some(account) = self.store.find_account_by_identity(&identity).await? {
            debug!(%identity, account = %account.id, "resolved existing account");
            return Ok(Resolution {
                account,
                created: false,
            });
        }

        let nickname = match display_name.as_deref().map(clamp_display_name) {
            Some(Some(name)) => name,
            _ => self.pick_nickname()?,
        };
        let inserted = self
            .store
            .insert_account_if_absent(NewAccount {
                identity: identity.clone(),
                nickname: Some(nickname),
                avatar_url,
                created_at: Utc::now(),
            })
            .await?;

        if inserted.created {
            counter!("accounts_created_total", "source" => identity.source().as_str())
                .increment(1);
            info!(%identity, account = %inserted.account.id, "created account");
        }

        Ok(Resolution {
            account: inserted.account,
            created: inserted.created,
        })
    }

    pub async fn account(&self, id: AccountId) -> RewardsResult<AccountRecord> {
        self.store
            .find_account(id)
            .await?
            .ok_or(RewardsError::AccountNotFound)
    }

    pub async fn update_nickname(
        &self,
        id: AccountId,
        nickname: &str,
    ) -> RewardsResult<AccountRecord> {
        let nickname = normalize_nickname(nickname)?;
        match self
            .store
            .rename_account(id, nickname, MAX_NICKNAME_CHANGES, Utc::now())
            .await?
        {
            RenameOutcome::Renamed(account) => {
                info!(
                    account = %account.id,
                    changes = account.nickname_changes,
                    "nickname updated"
                );
                Ok(account)
            }
            RenameOutcome::LimitReached => Err(RewardsError::NicknameLocked),
            RenameOutcome::AccountMissing => Err(RewardsError::AccountNotFound),
        }
    }

    /// Privileged role change; the actor must already be an administrator.
    pub async fn assign_role(
        &self,
        actor: &AccountRecord,
        target: AccountId,
        role: Role,
    ) -> RewardsResult<AccountRecord> {
        if !actor.is_admin() {
            return Err(RewardsError::Authorization);
        }
        let updated = self
            .store
            .set_role(target, role)
            .await?
            .ok_or(RewardsError::AccountNotFound)?;
        info!(actor = %actor.id, target = %target, role = role.as_str(), "role assigned");
        Ok(updated)
    }

    fn pick_nickname(&self) -> RewardsResult<String> {
        let index = random_index(DEFAULT_NICKNAMES.len())?;
        Ok(DEFAULT_NICKNAMES[index].to_string())
    }
}

fn clamp_display_name(name: &str) -> Option<String> {
    let cleaned: String = name
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(NICKNAME_MAX_LEN)
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_are_cleaned_and_clamped() {
        assert_eq!(clamp_display_name("  Nadia "), Some("Nadia".to_string()));
        assert_eq!(clamp_display_name("   "), None);
        let long = "y".repeat(NICKNAME_MAX_LEN + 10);
        assert_eq!(
            clamp_display_name(&long).map(|n| n.chars().count()),
            Some(NICKNAME_MAX_LEN)
        );
    }
}
