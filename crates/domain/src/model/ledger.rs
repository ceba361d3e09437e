use chrono::{DateTime, Utc};

use super::AccountId;

/// Why a balance moved. Every mutation is recorded with one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerReason {
    Promocode,
    AdminGrant,
    AdminDebit,
    Withdrawal,
    WithdrawalRefund,
}

impl LedgerReason {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerReason::Promocode => "promocode",
            LedgerReason::AdminGrant => "admin_grant",
            LedgerReason::AdminDebit => "admin_debit",
            LedgerReason::Withdrawal => "withdrawal",
            LedgerReason::WithdrawalRefund => "withdrawal_refund",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub account_id: AccountId,
    /// Signed change: positive for credits, negative for debits.
    pub delta: i64,
    pub reason: LedgerReason,
    pub reference: Option<String>,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChange {
    pub account_id: AccountId,
    /// Always positive; direction comes from the operation.
    pub amount: i64,
    pub reason: LedgerReason,
    pub reference: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Credited { balance: i64 },
    /// The credit would push the balance past `i64::MAX`; nothing was written.
    Overflow { balance: i64 },
    AccountMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited { balance: i64 },
    InsufficientBalance { available: i64 },
    AccountMissing,
}

/// Format rules for withdrawal amounts. `step == 1` disables the multiple-of
/// rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalPolicy {
    min_amount: i64,
    step: i64,
}

impl WithdrawalPolicy {
    pub const DEFAULT_MIN_AMOUNT: i64 = 100;
    pub const DEFAULT_STEP: i64 = 100;

    pub fn new(min_amount: i64, step: i64) -> Self {
        Self {
            min_amount: min_amount.max(1),
            step: step.max(1),
        }
    }

    pub fn min_amount(&self) -> i64 {
        self.min_amount
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    pub fn check(&self, amount: i64) -> Result<(), crate::error::ValidationError> {
        use crate::error::ValidationError;

        if amount <= 0 {
            return Err(ValidationError::NonPositiveAmount);
        }
        if amount < self.min_amount {
            return Err(ValidationError::BelowMinimum {
                min: self.min_amount,
            });
        }
        if amount % self.step != 0 {
            return Err(ValidationError::NotMultiple { step: self.step });
        }
        Ok(())
    }
}

impl Default for WithdrawalPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_AMOUNT, Self::DEFAULT_STEP)
    }
}
