//! Error taxonomy surfaced by the domain services.

use thiserror::Error;

use crate::model::{EntropyError, WithdrawalStatus};
use crate::provider::ProviderError;
use crate::storage::StorageError;

/// Malformed caller input, rejected before any state is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("game id must be {min} to {max} digits long")]
    GameIdLength { min: usize, max: usize },
    #[error("game id must contain only digits")]
    GameIdNonDigit,
    #[error("external account id is malformed")]
    ExternalId,
    #[error("nickname must be between 1 and {max} characters")]
    NicknameLength { max: usize },
    #[error("nickname contains control characters")]
    NicknameCharacters,
    #[error("amount must be a positive integer")]
    NonPositiveAmount,
    #[error("amount must be at least {min}")]
    BelowMinimum { min: i64 },
    #[error("amount must be a multiple of {step}")]
    NotMultiple { step: i64 },
    #[error("promocode must be 3-32 characters of letters, digits, '-' or '_'")]
    PromocodeFormat,
    #[error("max uses must be a positive integer")]
    NonPositiveUses,
    #[error("expiry must be in the future")]
    ExpiryInPast,
    #[error("a recipient game id is required for this account")]
    MissingRecipient,
    #[error("credit would exceed the maximum balance")]
    BalanceOverflow,
}

#[derive(Debug, Error)]
pub enum RewardsError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("identity provider error: {0}")]
    AuthProvider(#[from] ProviderError),
    #[error("authentication required")]
    Unauthenticated,
    #[error("administrator role required")]
    Authorization,
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },
    #[error("promocode not found")]
    PromocodeNotFound,
    #[error("promocode has expired")]
    PromocodeExpired,
    #[error("promocode has no uses left")]
    PromocodeExhausted,
    #[error("promocode already redeemed by this account")]
    AlreadyRedeemed,
    #[error("promocode already exists")]
    DuplicatePromocode,
    #[error("account not found")]
    AccountNotFound,
    #[error("withdrawal not found")]
    WithdrawalNotFound,
    #[error("cannot update nickname")]
    NicknameLocked,
    #[error("cannot move withdrawal from {from} to {to}")]
    InvalidTransition {
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    },
    #[error("entropy failure: {0}")]
    Entropy(#[from] EntropyError),
    #[error("storage failure: {0}")]
    Persistence(#[from] StorageError),
}

impl RewardsError {
    /// Stable snake_case tag used in API bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            RewardsError::Validation(_) => "validation",
            RewardsError::AuthProvider(_) => "auth_provider",
            RewardsError::Unauthenticated => "unauthenticated",
            RewardsError::Authorization => "authorization",
            RewardsError::InsufficientBalance { .. } => "insufficient_balance",
            RewardsError::PromocodeNotFound => "not_found",
            RewardsError::PromocodeExpired => "expired",
            RewardsError::PromocodeExhausted => "exhausted",
            RewardsError::AlreadyRedeemed => "already_redeemed",
            RewardsError::DuplicatePromocode => "duplicate_promocode",
            RewardsError::AccountNotFound => "account_not_found",
            RewardsError::WithdrawalNotFound => "withdrawal_not_found",
            RewardsError::NicknameLocked => "nickname_locked",
            RewardsError::InvalidTransition { .. } => "invalid_transition",
            RewardsError::Entropy(_) => "entropy",
            RewardsError::Persistence(_) => "persistence",
        }
    }
}

pub type RewardsResult<T> = Result<T, RewardsError>;
