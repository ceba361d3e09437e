use std::fmt;

use chrono::{DateTime, Utc};

use super::{AccountId, GameId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WithdrawalId(i64);

impl WithdrawalId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for WithdrawalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WithdrawalStatus::Completed | WithdrawalStatus::Rejected
        )
    }

    /// States a request must currently be in for an administrator to move it
    /// to `self`. Empty when `self` can never be a transition target.
    pub fn allowed_sources(self) -> &'static [WithdrawalStatus] {
        match self {
            WithdrawalStatus::Pending => &[],
            WithdrawalStatus::Processing => &[WithdrawalStatus::Pending],
            WithdrawalStatus::Completed | WithdrawalStatus::Rejected => {
                &[WithdrawalStatus::Pending, WithdrawalStatus::Processing]
            }
        }
    }

    pub fn can_transition_to(self, target: WithdrawalStatus) -> bool {
        target.allowed_sources().contains(&self)
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRecord {
    pub id: WithdrawalId,
    pub account_id: AccountId,
    pub amount: i64,
    pub recipient: GameId,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWithdrawal {
    pub account_id: AccountId,
    pub amount: i64,
    pub recipient: GameId,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalCreation {
    Created {
        withdrawal: WithdrawalRecord,
        balance: i64,
    },
    InsufficientBalance {
        available: i64,
    },
    AccountMissing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub id: WithdrawalId,
    pub target: WithdrawalStatus,
    /// Credit the amount back to the owner in the same transaction.
    pub refund: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied {
        withdrawal: WithdrawalRecord,
        refunded: Option<i64>,
    },
    Conflict {
        current: WithdrawalStatus,
    },
    /// The refund would overflow the owner's balance; the status is unchanged.
    RefundOverflow,
    NotFound,
}

/// Admin-side listing filter. `search` matches the recipient id or the owner's
/// nickname, case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WithdrawalFilter {
    pub status: Option<WithdrawalStatus>,
    pub account_id: Option<AccountId>,
    pub search: Option<String>,
}
