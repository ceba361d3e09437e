use chrono::{DateTime, Utc};
use rewards_domain::model::{
    AccountId, BalanceChange, CreditOutcome, LedgerReason, NewPromocode, PromocodeCode,
    PromocodeRecord, RedemptionOutcome,
};
use rewards_domain::storage::{PromocodeStore, StorageResult};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};

use crate::entity::{promocode_uses, promocodes};
use crate::errors::StorageError;
use crate::ledger_store::apply_credit;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl PromocodeStore for SeaOrmStorage {
    async fn insert_promocode(
        &self,
        promo: NewPromocode,
    ) -> StorageResult<Option<PromocodeRecord>> {
        let code = promo.code.clone();
        let model = promocodes::ActiveModel {
            code: Set(promo.code.into_inner()),
            reward: Set(promo.reward),
            max_uses: Set(promo.max_uses),
            current_uses: Set(0),
            expires_at: Set(promo.expires_at),
            created_at: Set(promo.created_at),
            ..Default::default()
        };
        let inserted = promocodes::Entity::insert(model)
            .on_conflict(
                OnConflict::column(promocodes::Column::Code)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        if inserted == 0 {
            return Ok(None);
        }
        find_by_code(self.connection(), &code).await
    }

    async fn find_promocode(
        &self,
        code: &PromocodeCode,
    ) -> StorageResult<Option<PromocodeRecord>> {
        find_by_code(self.connection(), code).await
    }

    async fn list_promocodes(&self) -> StorageResult<Vec<PromocodeRecord>> {
        let rows = promocodes::Entity::find()
            .order_by_desc(promocodes::Column::Id)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(rows.into_iter().map(promocode_to_record).collect())
    }

    async fn redeem_promocode(
        &self,
        account: AccountId,
        code: &PromocodeCode,
        at: DateTime<Utc>,
    ) -> StorageResult<RedemptionOutcome> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(StorageError::from_source)?;

        // The claiming UPDATE must be the first statement: it takes the write
        // lock, so racing redemptions wait on each other instead of failing on a
        // stale read snapshot. Every early return below rolls the claim back.
        let claimed = promocodes::Entity::update_many()
            .col_expr(
                promocodes::Column::CurrentUses,
                Expr::col(promocodes::Column::CurrentUses).add(1),
            )
            .filter(promocodes::Column::Code.eq(code.as_str()))
            .filter(
                Expr::col(promocodes::Column::CurrentUses)
                    .lt(Expr::col(promocodes::Column::MaxUses)),
            )
            .exec(&txn)
            .await
            .map_err(StorageError::from_source)?;

        let Some(promo) = find_by_code(&txn, code).await? else {
            return Ok(RedemptionOutcome::NotFound);
        };
        if promo.is_expired(at) {
            return Ok(RedemptionOutcome::Expired);
        }
        if claimed.rows_affected == 0 {
            return Ok(RedemptionOutcome::Exhausted);
        }

        let recorded = promocode_uses::Entity::insert(promocode_uses::ActiveModel {
            account_id: Set(account.get()),
            promocode_id: Set(promo.id),
            redeemed_at: Set(at),
        })
        .on_conflict(
            OnConflict::columns([
                promocode_uses::Column::AccountId,
                promocode_uses::Column::PromocodeId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(&txn)
        .await
        .map_err(StorageError::from_source)?;
        if recorded == 0 {
            return Ok(RedemptionOutcome::AlreadyRedeemed);
        }

        let change = BalanceChange {
            account_id: account,
            amount: promo.reward,
            reason: LedgerReason::Promocode,
            reference: Some(promo.code.into_inner()),
            at,
        };
        let balance = match apply_credit(&txn, &change).await? {
            CreditOutcome::Credited { balance } => balance,
            CreditOutcome::Overflow { .. } => return Ok(RedemptionOutcome::BalanceOverflow),
            CreditOutcome::AccountMissing => return Ok(RedemptionOutcome::AccountMissing),
        };

        txn.commit().await.map_err(StorageError::from_source)?;
        Ok(RedemptionOutcome::Redeemed {
            reward: promo.reward,
            balance,
        })
    }
}

async fn find_by_code<C>(conn: &C, code: &PromocodeCode) -> StorageResult<Option<PromocodeRecord>>
where
    C: ConnectionTrait,
{
    let maybe = promocodes::Entity::find()
        .filter(promocodes::Column::Code.eq(code.as_str()))
        .one(conn)
        .await
        .map_err(StorageError::from_source)?;
    Ok(maybe.map(promocode_to_record))
}

fn promocode_to_record(model: promocodes::Model) -> PromocodeRecord {
    PromocodeRecord {
        id: model.id,
        code: PromocodeCode::from_stored(model.code),
        reward: model.reward,
        max_uses: model.max_uses,
        current_uses: model.current_uses,
        expires_at: model.expires_at,
        created_at: model.created_at,
    }
}
