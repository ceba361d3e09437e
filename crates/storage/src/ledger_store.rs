use rewards_domain::model::{
    AccountId, BalanceChange, CreditOutcome, DebitOutcome, LedgerEntry, LedgerReason,
};
use rewards_domain::storage::{LedgerStore, StorageResult};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

use crate::entity::accounts;
use crate::entity::ledger_entries::{self, LedgerReasonDb};
use crate::errors::{corrupt, StorageError};
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl LedgerStore for SeaOrmStorage {
    async fn credit(&self, change: BalanceChange) -> StorageResult<CreditOutcome> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(StorageError::from_source)?;
        let outcome = apply_credit(&txn, &change).await?;
        if matches!(outcome, CreditOutcome::Credited { .. }) {
            txn.commit().await.map_err(StorageError::from_source)?;
        }
        Ok(outcome)
    }

    async fn debit(&self, change: BalanceChange) -> StorageResult<DebitOutcome> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(StorageError::from_source)?;
        let outcome = apply_debit(&txn, &change).await?;
        if matches!(outcome, DebitOutcome::Debited { .. }) {
            txn.commit().await.map_err(StorageError::from_source)?;
        }
        Ok(outcome)
    }

    async fn ledger_entries(&self, account: AccountId) -> StorageResult<Vec<LedgerEntry>> {
        let rows = ledger_entries::Entity::find()
            .filter(ledger_entries::Column::AccountId.eq(account.get()))
            .order_by_desc(ledger_entries::Column::Id)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(rows.into_iter().map(entry_to_domain).collect())
    }
}

/// Adds `change.amount` and appends the ledger row. Runs on the caller's
/// transaction. The `UPDATE` only matches while the sum still fits in an
/// `i64`; SQLite would otherwise promote the column to REAL.
pub(crate) async fn apply_credit<C>(
    conn: &C,
    change: &BalanceChange,
) -> StorageResult<CreditOutcome>
where
    C: ConnectionTrait,
{
    let result = accounts::Entity::update_many()
        .col_expr(
            accounts::Column::Balance,
            Expr::col(accounts::Column::Balance).add(change.amount),
        )
        .col_expr(accounts::Column::UpdatedAt, Expr::value(change.at))
        .filter(accounts::Column::Id.eq(change.account_id.get()))
        .filter(accounts::Column::Balance.lte(i64::MAX.saturating_sub(change.amount)))
        .exec(conn)
        .await
        .map_err(StorageError::from_source)?;

    if result.rows_affected == 0 {
        let existing = accounts::Entity::find_by_id(change.account_id.get())
            .one(conn)
            .await
            .map_err(StorageError::from_source)?;
        return Ok(match existing {
            Some(account) => CreditOutcome::Overflow {
                balance: account.balance,
            },
            None => CreditOutcome::AccountMissing,
        });
    }

    let balance = current_balance(conn, change.account_id).await?;
    append_entry(conn, change, change.amount, balance).await?;
    Ok(CreditOutcome::Credited { balance })
}

/// Compare-and-set debit: the `UPDATE` only matches while the balance covers
/// the amount, so two racing debits can never overdraw the account.
pub(crate) async fn apply_debit<C>(conn: &C, change: &BalanceChange) -> StorageResult<DebitOutcome>
where
    C: ConnectionTrait,
{
    let result = accounts::Entity::update_many()
        .col_expr(
            accounts::Column::Balance,
            Expr::col(accounts::Column::Balance).sub(change.amount),
        )
        .col_expr(accounts::Column::UpdatedAt, Expr::value(change.at))
        .filter(accounts::Column::Id.eq(change.account_id.get()))
        .filter(accounts::Column::Balance.gte(change.amount))
        .exec(conn)
        .await
        .map_err(StorageError::from_source)?;

    if result.rows_affected == 0 {
        let existing = accounts::Entity::find_by_id(change.account_id.get())
            .one(conn)
            .await
            .map_err(StorageError::from_source)?;
        return Ok(match existing {
            Some(account) => DebitOutcome::InsufficientBalance {
                available: account.balance,
            },
            None => DebitOutcome::AccountMissing,
        });
    }

    let balance = current_balance(conn, change.account_id).await?;
    append_entry(conn, change, -change.amount, balance).await?;
    Ok(DebitOutcome::Debited { balance })
}

async fn current_balance<C>(conn: &C, account: AccountId) -> StorageResult<i64>
where
    C: ConnectionTrait,
{
    accounts::Entity::find_by_id(account.get())
        .one(conn)
        .await
        .map_err(StorageError::from_source)?
        .map(|model| model.balance)
        .ok_or_else(|| corrupt("accounts", "row vanished inside balance update"))
}

async fn append_entry<C>(
    conn: &C,
    change: &BalanceChange,
    delta: i64,
    balance_after: i64,
) -> StorageResult<()>
where
    C: ConnectionTrait,
{
    ledger_entries::ActiveModel {
        account_id: Set(change.account_id.get()),
        delta: Set(delta),
        reason: Set(reason_to_db(change.reason)),
        reference: Set(change.reference.clone()),
        balance_after: Set(balance_after),
        created_at: Set(change.at),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(StorageError::from_source)?;
    Ok(())
}

fn entry_to_domain(model: ledger_entries::Model) -> LedgerEntry {
    LedgerEntry {
        account_id: AccountId::new(model.account_id),
        delta: model.delta,
        reason: match model.reason {
            LedgerReasonDb::Promocode => LedgerReason::Promocode,
            LedgerReasonDb::AdminGrant => LedgerReason::AdminGrant,
            LedgerReasonDb::AdminDebit => LedgerReason::AdminDebit,
            LedgerReasonDb::Withdrawal => LedgerReason::Withdrawal,
            LedgerReasonDb::WithdrawalRefund => LedgerReason::WithdrawalRefund,
        },
        reference: model.reference,
        balance_after: model.balance_after,
        created_at: model.created_at,
    }
}

fn reason_to_db(reason: LedgerReason) -> LedgerReasonDb {
    match reason {
        LedgerReason::Promocode => LedgerReasonDb::Promocode,
        LedgerReason::AdminGrant => LedgerReasonDb::AdminGrant,
        LedgerReason::AdminDebit => LedgerReasonDb::AdminDebit,
        LedgerReason::Withdrawal => LedgerReasonDb::Withdrawal,
        LedgerReason::WithdrawalRefund => LedgerReasonDb::WithdrawalRefund,
    }
}
