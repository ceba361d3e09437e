use rewards_domain::model::{
    AccountId, BalanceChange, CreditOutcome, DebitOutcome, GameId, LedgerReason, NewWithdrawal,
    StatusTransition, TransitionOutcome, WithdrawalCreation, WithdrawalFilter, WithdrawalId,
    WithdrawalRecord, WithdrawalStatus,
};
use rewards_domain::storage::{StorageResult, WithdrawalStore};
use sea_orm::sea_query::{Expr, Func, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};

use crate::entity::accounts;
use crate::entity::withdrawals::{self, WithdrawalStatusDb};
use crate::errors::{corrupt, StorageError};
use crate::ledger_store::{apply_credit, apply_debit};
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl WithdrawalStore for SeaOrmStorage {
    async fn create_withdrawal(
        &self,
        request: NewWithdrawal,
    ) -> StorageResult<WithdrawalCreation> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(StorageError::from_source)?;

        let created = withdrawals::ActiveModel {
            account_id: Set(request.account_id.get()),
            amount: Set(request.amount),
            recipient: Set(request.recipient.into_inner()),
            status: Set(WithdrawalStatusDb::Pending),
            created_at: Set(request.requested_at),
            updated_at: Set(request.requested_at),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(StorageError::from_source)?;

        let debit = apply_debit(
            &txn,
            &BalanceChange {
                account_id: request.account_id,
                amount: request.amount,
                reason: LedgerReason::Withdrawal,
                reference: Some(withdrawal_reference(created.id)),
                at: request.requested_at,
            },
        )
        .await?;

        // Dropping the transaction on the failure arms discards the row.
        match debit {
            DebitOutcome::Debited { balance } => {
                txn.commit().await.map_err(StorageError::from_source)?;
                Ok(WithdrawalCreation::Created {
                    withdrawal: withdrawal_to_record(created)?,
                    balance,
                })
            }
            DebitOutcome::InsufficientBalance { available } => {
                Ok(WithdrawalCreation::InsufficientBalance { available })
            }
            DebitOutcome::AccountMissing => Ok(WithdrawalCreation::AccountMissing),
        }
    }

    async fn find_withdrawal(&self, id: WithdrawalId) -> StorageResult<Option<WithdrawalRecord>> {
        let maybe = withdrawals::Entity::find_by_id(id.get())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        maybe.map(withdrawal_to_record).transpose()
    }

    async fn list_withdrawals(
        &self,
        filter: &WithdrawalFilter,
    ) -> StorageResult<Vec<WithdrawalRecord>> {
        let mut query = withdrawals::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(withdrawals::Column::Status.eq(status_to_db(status)));
        }
        if let Some(account) = filter.account_id {
            query = query.filter(withdrawals::Column::AccountId.eq(account.get()));
        }
        if let Some(search) = filter.search.as_deref().and_then(like_pattern) {
            let owners = Query::select()
                .column(accounts::Column::Id)
                .from(accounts::Entity)
                .cond_where(
                    Condition::any()
                        .add(
                            Expr::expr(Func::lower(Expr::col(accounts::Column::Nickname)))
                                .like(search.as_str()),
                        )
                        .add(Expr::col(accounts::Column::Subject).like(search.as_str())),
                )
                .to_owned();
            query = query.filter(
                Condition::any()
                    .add(withdrawals::Column::Recipient.like(search.as_str()))
                    .add(withdrawals::Column::AccountId.in_subquery(owners)),
            );
        }

        let rows = query
            .order_by_desc(withdrawals::Column::Id)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        rows.into_iter().map(withdrawal_to_record).collect()
    }

    async fn transition_withdrawal(
        &self,
        transition: StatusTransition,
    ) -> StorageResult<TransitionOutcome> {
        let sources: Vec<WithdrawalStatusDb> = transition
            .target
            .allowed_sources()
            .iter()
            .copied()
            .map(status_to_db)
            .collect();

        let txn = self
            .connection()
            .begin()
            .await
            .map_err(StorageError::from_source)?;

        let result = withdrawals::Entity::update_many()
            .col_expr(
                withdrawals::Column::Status,
                Expr::value(status_to_db(transition.target)),
            )
            .col_expr(withdrawals::Column::UpdatedAt, Expr::value(transition.at))
            .filter(withdrawals::Column::Id.eq(transition.id.get()))
            .filter(withdrawals::Column::Status.is_in(sources))
            .exec(&txn)
            .await
            .map_err(StorageError::from_source)?;

        let Some(updated) = find_model(&txn, transition.id).await? else {
            return Ok(TransitionOutcome::NotFound);
        };
        if result.rows_affected == 0 {
            return Ok(TransitionOutcome::Conflict {
                current: status_from_db(updated.status),
            });
        }

        let refunded = if transition.refund {
            let change = BalanceChange {
                account_id: AccountId::new(updated.account_id),
                amount: updated.amount,
                reason: LedgerReason::WithdrawalRefund,
                reference: Some(withdrawal_reference(updated.id)),
                at: transition.at,
            };
            match apply_credit(&txn, &change).await? {
                CreditOutcome::Credited { .. } => Some(updated.amount),
                CreditOutcome::Overflow { .. } => return Ok(TransitionOutcome::RefundOverflow),
                CreditOutcome::AccountMissing => {
                    return Err(corrupt("withdrawals", "refund target account is missing"));
                }
            }
        } else {
            None
        };

        txn.commit().await.map_err(StorageError::from_source)?;
        Ok(TransitionOutcome::Applied {
            withdrawal: withdrawal_to_record(updated)?,
            refunded,
        })
    }
}

async fn find_model<C>(conn: &C, id: WithdrawalId) -> StorageResult<Option<withdrawals::Model>>
where
    C: ConnectionTrait,
{
    withdrawals::Entity::find_by_id(id.get())
        .one(conn)
        .await
        .map_err(StorageError::from_source)
}

fn withdrawal_reference(id: i64) -> String {
    format!("withdrawal:{id}")
}

/// Lowercased `%term%` pattern with LIKE wildcards stripped from the input.
fn like_pattern(search: &str) -> Option<String> {
    let cleaned: String = search
        .trim()
        .chars()
        .filter(|c| *c != '%' && *c != '_')
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(format!("%{}%", cleaned.to_lowercase()))
    }
}

fn withdrawal_to_record(model: withdrawals::Model) -> StorageResult<WithdrawalRecord> {
    let recipient = GameId::parse(&model.recipient)
        .map_err(|err| corrupt("withdrawals", format!("recipient: {err}")))?;

    Ok(WithdrawalRecord {
        id: WithdrawalId::new(model.id),
        account_id: AccountId::new(model.account_id),
        amount: model.amount,
        recipient,
        status: status_from_db(model.status),
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn status_from_db(status: WithdrawalStatusDb) -> WithdrawalStatus {
    match status {
        WithdrawalStatusDb::Pending => WithdrawalStatus::Pending,
        WithdrawalStatusDb::Processing => WithdrawalStatus::Processing,
        WithdrawalStatusDb::Completed => WithdrawalStatus::Completed,
        WithdrawalStatusDb::Rejected => WithdrawalStatus::Rejected,
    }
}

fn status_to_db(status: WithdrawalStatus) -> WithdrawalStatusDb {
    match status {
        WithdrawalStatus::Pending => WithdrawalStatusDb::Pending,
        WithdrawalStatus::Processing => WithdrawalStatusDb::Processing,
        WithdrawalStatus::Completed => WithdrawalStatusDb::Completed,
        WithdrawalStatus::Rejected => WithdrawalStatusDb::Rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_strips_wildcards_and_lowercases() {
        assert_eq!(like_pattern(" Night%Hawk "), Some("%nighthawk%".to_string()));
        assert_eq!(like_pattern("%_"), None);
        assert_eq!(like_pattern("   "), None);
    }
}
