//! Withdrawal lifecycle: `pending -> [processing ->] completed | rejected`.

use chrono::Utc;
use metrics::counter;
use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::error::{RewardsError, RewardsResult, ValidationError};
use crate::model::{
    AccountId, AccountRecord, GameId, NewWithdrawal, StatusTransition, TransitionOutcome,
    WithdrawalCreation, WithdrawalFilter, WithdrawalId, WithdrawalRecord, WithdrawalStatus,
};
use crate::storage::WithdrawalStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedWithdrawal {
    pub withdrawal: WithdrawalRecord,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWithdrawal {
    pub withdrawal: WithdrawalRecord,
    pub refunded: Option<i64>,
}

pub struct WithdrawalWorkflow<'a, S> {
    store: &'a S,
    config: &'a LedgerConfig,
}

impl<'a, S> WithdrawalWorkflow<'a, S>
where
    S: WithdrawalStore,
{
    pub fn new(store: &'a S, config: &'a LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Debits `amount` and files a `pending` request. `recipient` defaults to
    /// the account's own game id.
    pub async fn request(
        &self,
        account: &AccountRecord,
        amount: i64,
        recipient: Option<&str>,
    ) -> RewardsResult<RequestedWithdrawal> {
        self.config.withdrawal_policy().check(amount)?;
        let recipient = match recipient {
            Some(raw) => GameId::parse(raw)?,
            None => account
                .identity
                .game_id()
                .ok_or(ValidationError::MissingRecipient)?,
        };
        if amount > account.balance {
            counter!("withdrawal_requests_total", "result" => "insufficient").increment(1);
            return Err(RewardsError::InsufficientBalance {
                requested: amount,
                available: account.balance,
            });
        }

        let creation = self
            .store
            .create_withdrawal(NewWithdrawal {
                account_id: account.id,
                amount,
                recipient,
                requested_at: Utc::now(),
            })
            .await?;

        match creation {
            WithdrawalCreation::Created {
                withdrawal,
                balance,
            } => {
                counter!("withdrawal_requests_total", "result" => "created").increment(1);
                info!(
                    account = %account.id,
                    withdrawal = %withdrawal.id,
                    amount,
                    balance,
                    "withdrawal requested"
                );
                Ok(RequestedWithdrawal {
                    withdrawal,
                    balance,
                })
            }
            WithdrawalCreation::InsufficientBalance { available } => {
                counter!("withdrawal_requests_total", "result" => "insufficient").increment(1);
                Err(RewardsError::InsufficientBalance {
                    requested: amount,
                    available,
                })
            }
            WithdrawalCreation::AccountMissing => Err(RewardsError::AccountNotFound),
        }
    }

    pub async fn transition(
        &self,
        actor: &AccountRecord,
        id: WithdrawalId,
        target: WithdrawalStatus,
    ) -> RewardsResult<ResolvedWithdrawal> {
        if !actor.is_admin() {
            warn!(actor = %actor.id, withdrawal = %id, "non-admin attempted withdrawal transition");
            return Err(RewardsError::Authorization);
        }
        if target.allowed_sources().is_empty() {
            let current = self
                .store
                .find_withdrawal(id)
                .await?
                .ok_or(RewardsError::WithdrawalNotFound)?;
            return Err(RewardsError::InvalidTransition {
                from: current.status,
                to: target,
            });
        }

        let refund = target == WithdrawalStatus::Rejected && self.config.refund_on_reject();
        let outcome = self
            .store
            .transition_withdrawal(StatusTransition {
                id,
                target,
                refund,
                at: Utc::now(),
            })
            .await?;

        match outcome {
            TransitionOutcome::Applied {
                withdrawal,
                refunded,
            } => {
                counter!("withdrawal_transitions_total", "target" => target.as_str()).increment(1);
                info!(
                    actor = %actor.id,
                    withdrawal = %withdrawal.id,
                    status = target.as_str(),
                    refunded = refunded.unwrap_or(0),
                    "withdrawal status changed"
                );
                Ok(ResolvedWithdrawal {
                    withdrawal,
                    refunded,
                })
            }
            TransitionOutcome::Conflict { current } => Err(RewardsError::InvalidTransition {
                from: current,
                to: target,
            }),
            TransitionOutcome::RefundOverflow => Err(ValidationError::BalanceOverflow.into()),
            TransitionOutcome::NotFound => Err(RewardsError::WithdrawalNotFound),
        }
    }

    pub async fn list_for_account(
        &self,
        account: AccountId,
    ) -> RewardsResult<Vec<WithdrawalRecord>> {
        let filter = WithdrawalFilter {
            account_id: Some(account),
            ..WithdrawalFilter::default()
        };
        Ok(self.store.list_withdrawals(&filter).await?)
    }

    pub async fn list(
        &self,
        actor: &AccountRecord,
        filter: &WithdrawalFilter,
    ) -> RewardsResult<Vec<WithdrawalRecord>> {
        if !actor.is_admin() {
            return Err(RewardsError::Authorization);
        }
        Ok(self.store.list_withdrawals(filter).await?)
    }
}
