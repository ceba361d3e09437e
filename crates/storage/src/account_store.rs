use chrono::{DateTime, Utc};
use rewards_domain::model::{
    AccountId, AccountRecord, IdentityKey, IdentitySource, InsertedAccount, NewAccount,
    RenameOutcome, Role,
};
use rewards_domain::storage::{AccountStore, StorageResult};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};

use crate::entity::accounts::{self, RoleDb};
use crate::errors::{corrupt, StorageError};
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl AccountStore for SeaOrmStorage {
    async fn insert_account_if_absent(
        &self,
        account: NewAccount,
    ) -> StorageResult<InsertedAccount> {
        let model = accounts::ActiveModel {
            source: Set(account.identity.source().as_str().to_owned()),
            subject: Set(account.identity.subject().to_owned()),
            nickname: Set(account.nickname),
            avatar_url: Set(account.avatar_url),
            nickname_changes: Set(0),
            balance: Set(0),
            role: Set(RoleDb::User),
            created_at: Set(account.created_at),
            updated_at: Set(account.created_at),
            ..Default::default()
        };
        let inserted = accounts::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([accounts::Column::Source, accounts::Column::Subject])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;

        let stored = find_by_identity(self.connection(), &account.identity)
            .await?
            .ok_or_else(|| corrupt("accounts", "row vanished after insert"))?;
        Ok(InsertedAccount {
            account: stored,
            created: inserted == 1,
        })
    }

    async fn find_account(&self, id: AccountId) -> StorageResult<Option<AccountRecord>> {
        find_by_id(self.connection(), id).await
    }

    async fn find_account_by_identity(
        &self,
        identity: &IdentityKey,
    ) -> StorageResult<Option<AccountRecord>> {
        find_by_identity(self.connection(), identity).await
    }

    async fn rename_account(
        &self,
        id: AccountId,
        nickname: String,
        max_changes: i16,
        at: DateTime<Utc>,
    ) -> StorageResult<RenameOutcome> {
        let result = accounts::Entity::update_many()
            .col_expr(accounts::Column::Nickname, Expr::value(nickname))
            .col_expr(
                accounts::Column::NicknameChanges,
                Expr::col(accounts::Column::NicknameChanges).add(1),
            )
            .col_expr(accounts::Column::UpdatedAt, Expr::value(at))
            .filter(accounts::Column::Id.eq(id.get()))
            .filter(accounts::Column::NicknameChanges.lt(max_changes))
            .exec(self.connection())
            .await
            .map_err(StorageError::from_source)?;

        let current = find_by_id(self.connection(), id).await?;
        Ok(match (result.rows_affected, current) {
            (_, None) => RenameOutcome::AccountMissing,
            (0, Some(_)) => RenameOutcome::LimitReached,
            (_, Some(account)) => RenameOutcome::Renamed(account),
        })
    }

    async fn set_role(&self, id: AccountId, role: Role) -> StorageResult<Option<AccountRecord>> {
        let result = accounts::Entity::update_many()
            .col_expr(accounts::Column::Role, Expr::value(role_to_db(role)))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(accounts::Column::Id.eq(id.get()))
            .exec(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        find_by_id(self.connection(), id).await
    }
}

pub(crate) async fn find_by_id<C>(conn: &C, id: AccountId) -> StorageResult<Option<AccountRecord>>
where
    C: ConnectionTrait,
{
    let maybe = accounts::Entity::find_by_id(id.get())
        .one(conn)
        .await
        .map_err(StorageError::from_source)?;
    maybe.map(account_to_record).transpose()
}

async fn find_by_identity<C>(
    conn: &C,
    identity: &IdentityKey,
) -> StorageResult<Option<AccountRecord>>
where
    C: ConnectionTrait,
{
    let maybe = accounts::Entity::find()
        .filter(accounts::Column::Source.eq(identity.source().as_str()))
        .filter(accounts::Column::Subject.eq(identity.subject()))
        .one(conn)
        .await
        .map_err(StorageError::from_source)?;
    maybe.map(account_to_record).transpose()
}

fn account_to_record(model: accounts::Model) -> StorageResult<AccountRecord> {
    let source = parse_source(&model.source)
        .ok_or_else(|| corrupt("accounts", format!("unknown source `{}`", model.source)))?;

    Ok(AccountRecord {
        id: AccountId::new(model.id),
        identity: IdentityKey::from_parts(source, model.subject),
        nickname: model.nickname,
        avatar_url: model.avatar_url,
        nickname_changes: model.nickname_changes,
        balance: model.balance,
        role: match model.role {
            RoleDb::User => Role::User,
            RoleDb::Admin => Role::Admin,
        },
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn parse_source(raw: &str) -> Option<IdentitySource> {
    match raw {
        "game" => Some(IdentitySource::Game),
        "discord" => Some(IdentitySource::Discord),
        _ => None,
    }
}

fn role_to_db(role: Role) -> RoleDb {
    match role {
        Role::User => RoleDb::User,
        Role::Admin => RoleDb::Admin,
    }
}
