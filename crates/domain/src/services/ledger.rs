use std::cmp::Ordering;

use chrono::Utc;
use metrics::counter;
use tracing::{info, warn};

use crate::error::{RewardsError, RewardsResult, ValidationError};
use crate::model::{
    AccountId, AccountRecord, BalanceChange, CreditOutcome, DebitOutcome, LedgerEntry,
    LedgerReason,
};
use crate::storage::LedgerStore;

/// Credit/debit entry point. Amounts are validated here; the store applies
/// them with conditional writes so the balance can never go negative.
pub struct Ledger<'a, S> {
    store: &'a S,
}

impl<'a, S> Ledger<'a, S>
where
    S: LedgerStore,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Returns the balance after the credit.
    pub async fn credit(
        &self,
        account: AccountId,
        amount: i64,
        reason: LedgerReason,
        reference: Option<String>,
    ) -> RewardsResult<i64> {
        ensure_positive(amount)?;
        let outcome = self
            .store
            .credit(BalanceChange {
                account_id: account,
                amount,
                reason,
                reference,
                at: Utc::now(),
            })
            .await?;
        match outcome {
            CreditOutcome::Credited { balance } => {
                counter!(
                    "ledger_mutations_total",
                    "direction" => "credit",
                    "reason" => reason.as_str()
                )
                .increment(1);
                info!(%account, amount, balance, reason = reason.as_str(), "balance credited");
                Ok(balance)
            }
            CreditOutcome::Overflow { balance } => {
                warn!(%account, amount, balance, "credit rejected, balance would overflow");
                Err(ValidationError::BalanceOverflow.into())
            }
            CreditOutcome::AccountMissing => Err(RewardsError::AccountNotFound),
        }
    }

    /// Returns the balance after the debit.
    pub async fn debit(
        &self,
        account: AccountId,
        amount: i64,
        reference: Option<String>,
    ) -> RewardsResult<i64> {
        ensure_positive(amount)?;
        let outcome = self
            .store
            .debit(BalanceChange {
                account_id: account,
                amount,
                reason: LedgerReason::AdminDebit,
                reference,
                at: Utc::now(),
            })
            .await?;
        match outcome {
            DebitOutcome::Debited { balance } => {
                counter!(
                    "ledger_mutations_total",
                    "direction" => "debit",
                    "reason" => "admin_debit"
                )
                .increment(1);
                info!(%account, amount, balance, "balance debited");
                Ok(balance)
            }
            DebitOutcome::InsufficientBalance { available } => {
                Err(RewardsError::InsufficientBalance {
                    requested: amount,
                    available,
                })
            }
            DebitOutcome::AccountMissing => Err(RewardsError::AccountNotFound),
        }
    }

    /// Administrator correction: a positive `delta` credits as `admin_grant`,
    /// a negative one debits as `admin_debit`.
    pub async fn adjust(
        &self,
        actor: &AccountRecord,
        account: AccountId,
        delta: i64,
        reference: Option<String>,
    ) -> RewardsResult<i64> {
        if !actor.is_admin() {
            return Err(RewardsError::Authorization);
        }
        match delta.cmp(&0) {
            Ordering::Greater => {
                self.credit(account, delta, LedgerReason::AdminGrant, reference)
                    .await
            }
            Ordering::Less => {
                let amount = delta
                    .checked_neg()
                    .ok_or(ValidationError::NonPositiveAmount)?;
                self.debit(account, amount, reference).await
            }
            Ordering::Equal => Err(ValidationError::NonPositiveAmount.into()),
        }
    }

    pub async fn entries(&self, account: AccountId) -> RewardsResult<Vec<LedgerEntry>> {
        Ok(self.store.ledger_entries(account).await?)
    }
}

pub(crate) fn ensure_positive(amount: i64) -> Result<(), ValidationError> {
    if amount <= 0 {
        return Err(ValidationError::NonPositiveAmount);
    }
    Ok(())
}
