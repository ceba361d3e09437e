use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{
    AccountId, AccountRecord, BalanceChange, CreditOutcome, DebitOutcome, IdentityKey,
    InsertedAccount, LedgerEntry, NewAccount, NewPromocode, NewSession, NewWithdrawal,
    PromocodeCode, PromocodeRecord, RedemptionOutcome, RenameOutcome, Role, SessionFingerprint,
    SessionRecord, StatusTransition, TransitionOutcome, WithdrawalCreation, WithdrawalFilter,
    WithdrawalId, WithdrawalRecord,
};

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }
}

/// Accounts keyed by external identity. Creation is a single conditional
/// insert so concurrent resolves of one identity converge on one row.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_account_if_absent(&self, account: NewAccount)
        -> StorageResult<InsertedAccount>;
    async fn find_account(&self, id: AccountId) -> StorageResult<Option<AccountRecord>>;
    async fn find_account_by_identity(
        &self,
        identity: &IdentityKey,
    ) -> StorageResult<Option<AccountRecord>>;
    /// Applies the rename only while `nickname_changes < max_changes`.
    async fn rename_account(
        &self,
        id: AccountId,
        nickname: String,
        max_changes: i16,
        at: DateTime<Utc>,
    ) -> StorageResult<RenameOutcome>;
    async fn set_role(&self, id: AccountId, role: Role) -> StorageResult<Option<AccountRecord>>;
}

/// Balance mutations. Each call writes the balance and its ledger entry in
/// one transaction.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Returns the new balance, or `None` when the account does not exist.
    async fn credit(&self, change: BalanceChange) -> StorageResult<CreditOutcome>;
    /// Compare-and-set debit: succeeds only while `balance >= amount`.
    async fn debit(&self, change: BalanceChange) -> StorageResult<DebitOutcome>;
    async fn ledger_entries(&self, account: AccountId) -> StorageResult<Vec<LedgerEntry>>;
}

#[async_trait]
pub trait WithdrawalStore: Send + Sync {
    /// Debits the owner and inserts the `pending` row atomically.
    async fn create_withdrawal(&self, request: NewWithdrawal)
        -> StorageResult<WithdrawalCreation>;
    async fn find_withdrawal(&self, id: WithdrawalId) -> StorageResult<Option<WithdrawalRecord>>;
    async fn list_withdrawals(
        &self,
        filter: &WithdrawalFilter,
    ) -> StorageResult<Vec<WithdrawalRecord>>;
    /// Moves the request to `transition.target` only if it currently sits in
    /// one of the target's allowed source states.
    async fn transition_withdrawal(
        &self,
        transition: StatusTransition,
    ) -> StorageResult<TransitionOutcome>;
}

#[async_trait]
pub trait PromocodeStore: Send + Sync {
    /// Returns `None` when the code already exists.
    async fn insert_promocode(&self, promo: NewPromocode)
        -> StorageResult<Option<PromocodeRecord>>;
    async fn find_promocode(&self, code: &PromocodeCode)
        -> StorageResult<Option<PromocodeRecord>>;
    async fn list_promocodes(&self) -> StorageResult<Vec<PromocodeRecord>>;
    /// Increments the usage counter, records the (account, code) use and
    /// credits the reward as one unit.
    async fn redeem_promocode(
        &self,
        account: AccountId,
        code: &PromocodeCode,
        at: DateTime<Utc>,
    ) -> StorageResult<RedemptionOutcome>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: NewSession) -> StorageResult<SessionRecord>;
    async fn find_session(
        &self,
        fingerprint: &SessionFingerprint,
    ) -> StorageResult<Option<SessionRecord>>;
    async fn revoke_session(
        &self,
        fingerprint: &SessionFingerprint,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<SessionRecord>>;
}
