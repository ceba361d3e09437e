use sea_orm::sea_query::{
    ColumnDef, Index, IndexCreateStatement, Table, TableCreateStatement,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::{accounts, ledger_entries, promocode_uses, promocodes, sessions, withdrawals};
use crate::errors::StorageError;
use rewards_domain::storage::StorageResult;

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let accounts_table = Table::create()
        .table(accounts::Entity)
        .col(
            ColumnDef::new(accounts::Column::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(accounts::Column::Source)
                .string_len(16)
                .not_null(),
        )
        .col(
            ColumnDef::new(accounts::Column::Subject)
                .string_len(64)
                .not_null(),
        )
        .col(ColumnDef::new(accounts::Column::Nickname).string_len(64).null())
        .col(ColumnDef::new(accounts::Column::AvatarUrl).string().null())
        .col(
            ColumnDef::new(accounts::Column::NicknameChanges)
                .small_integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(accounts::Column::Balance)
                .big_integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(accounts::Column::Role)
                .tiny_integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(accounts::Column::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(
            ColumnDef::new(accounts::Column::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, accounts_table).await?;
    create_index(
        db,
        backend,
        Index::create()
            .name("idx_accounts_identity")
            .table(accounts::Entity)
            .col(accounts::Column::Source)
            .col(accounts::Column::Subject)
            .unique()
            .to_owned(),
    )
    .await?;

    let ledger_table = Table::create()
        .table(ledger_entries::Entity)
        .col(
            ColumnDef::new(ledger_entries::Column::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(ledger_entries::Column::AccountId)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(ledger_entries::Column::Delta)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(ledger_entries::Column::Reason)
                .tiny_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(ledger_entries::Column::Reference)
                .string_len(64)
                .null(),
        )
        .col(
            ColumnDef::new(ledger_entries::Column::BalanceAfter)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(ledger_entries::Column::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, ledger_table).await?;
    create_index(
        db,
        backend,
        Index::create()
            .name("idx_ledger_entries_account")
            .table(ledger_entries::Entity)
            .col(ledger_entries::Column::AccountId)
            .to_owned(),
    )
    .await?;

    let withdrawals_table = Table::create()
        .table(withdrawals::Entity)
        .col(
            ColumnDef::new(withdrawals::Column::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(withdrawals::Column::AccountId)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(withdrawals::Column::Amount)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(withdrawals::Column::Recipient)
                .string_len(16)
                .not_null(),
        )
        .col(
            ColumnDef::new(withdrawals::Column::Status)
                .tiny_integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(withdrawals::Column::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(
            ColumnDef::new(withdrawals::Column::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, withdrawals_table).await?;
    create_index(
        db,
        backend,
        Index::create()
            .name("idx_withdrawals_status")
            .table(withdrawals::Entity)
            .col(withdrawals::Column::Status)
            .to_owned(),
    )
    .await?;

    let promocodes_table = Table::create()
        .table(promocodes::Entity)
        .col(
            ColumnDef::new(promocodes::Column::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(promocodes::Column::Code)
                .string_len(32)
                .not_null()
                .unique_key(),
        )
        .col(
            ColumnDef::new(promocodes::Column::Reward)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(promocodes::Column::MaxUses)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(promocodes::Column::CurrentUses)
                .big_integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(promocodes::Column::ExpiresAt)
                .timestamp_with_time_zone()
                .null(),
        )
        .col(
            ColumnDef::new(promocodes::Column::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, promocodes_table).await?;

    let uses_table = Table::create()
        .table(promocode_uses::Entity)
        .col(
            ColumnDef::new(promocode_uses::Column::AccountId)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(promocode_uses::Column::PromocodeId)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(promocode_uses::Column::RedeemedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .primary_key(
            Index::create()
                .col(promocode_uses::Column::AccountId)
                .col(promocode_uses::Column::PromocodeId),
        )
        .to_owned();
    create_table(db, backend, uses_table).await?;

    let sessions_table = Table::create()
        .table(sessions::Entity)
        .col(
            ColumnDef::new(sessions::Column::Fingerprint)
                .string_len(64)
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(sessions::Column::AccountId)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(sessions::Column::IssuedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(
            ColumnDef::new(sessions::Column::RevokedAt)
                .timestamp_with_time_zone()
                .null(),
        )
        .to_owned();
    create_table(db, backend, sessions_table).await?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}

async fn create_index(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: IndexCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
