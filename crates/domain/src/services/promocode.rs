use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::info;

use crate::error::{RewardsError, RewardsResult, ValidationError};
use crate::model::{
    AccountId, AccountRecord, NewPromocode, PromocodeCode, PromocodeRecord, RedemptionOutcome,
};
use crate::storage::PromocodeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redeemed {
    pub reward: i64,
    pub balance: i64,
}

/// Input for administrators creating a code; the text is validated on create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromocodeDraft {
    pub code: String,
    pub reward: i64,
    pub max_uses: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct PromocodeRedemption<'a, S> {
    store: &'a S,
}

impl<'a, S> PromocodeRedemption<'a, S>
where
    S: PromocodeStore,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn redeem(&self, account: AccountId, code: &str) -> RewardsResult<Redeemed> {
        // Malformed text can never match a stored code.
        let Ok(code) = PromocodeCode::parse(code) else {
            return Err(RewardsError::PromocodeNotFound);
        };

        let outcome = self
            .store
            .redeem_promocode(account, &code, Utc::now())
            .await?;
        let result = match outcome {
            RedemptionOutcome::Redeemed { reward, balance } => {
                info!(%account, code = code.as_str(), reward, balance, "promocode redeemed");
                Ok(Redeemed { reward, balance })
            }
            RedemptionOutcome::NotFound => Err(RewardsError::PromocodeNotFound),
            RedemptionOutcome::Expired => Err(RewardsError::PromocodeExpired),
            RedemptionOutcome::Exhausted => Err(RewardsError::PromocodeExhausted),
            RedemptionOutcome::AlreadyRedeemed => Err(RewardsError::AlreadyRedeemed),
            RedemptionOutcome::AccountMissing => Err(RewardsError::AccountNotFound),
            RedemptionOutcome::BalanceOverflow => Err(ValidationError::BalanceOverflow.into()),
        };

        let label = match &result {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };
        counter!("promocode_redemptions_total", "result" => label).increment(1);
        result
    }

    pub async fn create(
        &self,
        actor: &AccountRecord,
        draft: PromocodeDraft,
    ) -> RewardsResult<PromocodeRecord> {
        if !actor.is_admin() {
            return Err(RewardsError::Authorization);
        }
        let promo = NewPromocode {
            code: PromocodeCode::parse(&draft.code)?,
            reward: draft.reward,
            max_uses: draft.max_uses,
            expires_at: draft.expires_at,
            created_at: Utc::now(),
        };
        promo.validate()?;

        let record = self
            .store
            .insert_promocode(promo)
            .await?
            .ok_or(RewardsError::DuplicatePromocode)?;
        info!(
            actor = %actor.id,
            code = record.code.as_str(),
            reward = record.reward,
            max_uses = record.max_uses,
            "promocode created"
        );
        Ok(record)
    }

    pub async fn list(&self, actor: &AccountRecord) -> RewardsResult<Vec<PromocodeRecord>> {
        if !actor.is_admin() {
            return Err(RewardsError::Authorization);
        }
        Ok(self.store.list_promocodes().await?)
    }
}
