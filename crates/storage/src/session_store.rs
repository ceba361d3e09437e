use chrono::{DateTime, Utc};
use rewards_domain::model::{AccountId, NewSession, SessionFingerprint, SessionRecord};
use rewards_domain::storage::{SessionStore, StorageResult};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};

use crate::entity::sessions;
use crate::errors::StorageError;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl SessionStore for SeaOrmStorage {
    async fn insert_session(&self, session: NewSession) -> StorageResult<SessionRecord> {
        let model = sessions::ActiveModel {
            fingerprint: Set(session.fingerprint.as_str().to_owned()),
            account_id: Set(session.account_id.get()),
            issued_at: Set(session.issued_at),
            revoked_at: Set(None),
        };
        let created = model
            .insert(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(session_to_record(created))
    }

    async fn find_session(
        &self,
        fingerprint: &SessionFingerprint,
    ) -> StorageResult<Option<SessionRecord>> {
        let maybe = sessions::Entity::find_by_id(fingerprint.as_str().to_owned())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(maybe.map(session_to_record))
    }

    async fn revoke_session(
        &self,
        fingerprint: &SessionFingerprint,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<SessionRecord>> {
        // Only the first revocation stamps the row; later calls see it as-is.
        sessions::Entity::update_many()
            .col_expr(sessions::Column::RevokedAt, Expr::value(Some(at)))
            .filter(sessions::Column::Fingerprint.eq(fingerprint.as_str()))
            .filter(sessions::Column::RevokedAt.is_null())
            .exec(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        self.find_session(fingerprint).await
    }
}

fn session_to_record(model: sessions::Model) -> SessionRecord {
    SessionRecord {
        fingerprint: SessionFingerprint::from_stored(model.fingerprint),
        account_id: AccountId::new(model.account_id),
        issued_at: model.issued_at,
        revoked_at: model.revoked_at,
    }
}
