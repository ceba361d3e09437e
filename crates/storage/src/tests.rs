use chrono::{Duration, Utc};
use rewards_domain::config::LedgerConfig;
use rewards_domain::model::{
    AccountRecord, ExternalProfile, IdentityAssertion, IdentitySource, LedgerReason,
    NewPromocode, NewWithdrawal, PromocodeCode, Role, SessionToken, WithdrawalCreation,
    WithdrawalFilter, WithdrawalPolicy, WithdrawalStatus,
};
use rewards_domain::services::{
    IdentityResolver, Ledger, PromocodeDraft, PromocodeRedemption, SessionCache, SessionManager,
    WithdrawalWorkflow,
};
use rewards_domain::{
    AccountStore, GameId, LedgerStore, PromocodeStore, RewardsError, ValidationError,
    WithdrawalStore,
};

use crate::SeaOrmStorage;

async fn storage() -> SeaOrmStorage {
    SeaOrmStorage::connect("sqlite::memory:")
        .await
        .expect("storage inits")
}

/// Temporary SQLite file, removed together with its journal files on drop.
struct ScratchDb {
    path: std::path::PathBuf,
}

impl ScratchDb {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "rewards-storage-{name}-{}-{}.db",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::SystemTime::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        Self { path }
    }

    /// Pooled storage with several real connections to the same file.
    async fn pooled(&self, connections: u32) -> SeaOrmStorage {
        SeaOrmStorage::builder()
            .database_url(format!("sqlite://{}?mode=rwc", self.path.display()))
            .max_connections(connections)
            .build()
            .await
            .expect("file storage inits")
    }
}

impl Drop for ScratchDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path.display()));
        }
    }
}

async fn game_account(storage: &SeaOrmStorage, game_id: &str) -> AccountRecord {
    IdentityResolver::new(storage)
        .resolve(IdentityAssertion::Game(game_id.into()))
        .await
        .expect("account resolves")
        .account
}

async fn admin(storage: &SeaOrmStorage) -> AccountRecord {
    let account = game_account(storage, "99999").await;
    storage
        .set_role(account.id, Role::Admin)
        .await
        .unwrap()
        .expect("admin exists")
}

async fn fund(storage: &SeaOrmStorage, account: &AccountRecord, amount: i64) -> AccountRecord {
    Ledger::new(storage)
        .credit(account.id, amount, LedgerReason::AdminGrant, None)
        .await
        .expect("credit applies");
    storage.find_account(account.id).await.unwrap().unwrap()
}

async fn seed_promocode(storage: &SeaOrmStorage, code: &str, reward: i64, max_uses: i64) {
    storage
        .insert_promocode(NewPromocode {
            code: PromocodeCode::parse(code).unwrap(),
            reward,
            max_uses,
            expires_at: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
        .expect("promocode inserted");
}

#[tokio::test]
async fn resolving_same_identity_twice_yields_one_account() {
    let storage = storage().await;
    let resolver = IdentityResolver::new(&storage);

    let first = resolver
        .resolve(IdentityAssertion::Game("12345".into()))
        .await
        .unwrap();
    let second = resolver
        .resolve(IdentityAssertion::Game(" 12345 ".into()))
        .await
        .unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.account.id, second.account.id);
    assert_eq!(first.account.balance, 0);
    assert_eq!(first.account.role, Role::User);
    assert!(first.account.nickname.is_some());
}

#[tokio::test]
async fn concurrent_external_resolves_converge() {
    let storage = storage().await;
    let profile = ExternalProfile {
        source: IdentitySource::Discord,
        external_id: "80351110224678912".into(),
        display_name: Some("Nelly".into()),
        avatar_url: None,
    };
    let resolver = IdentityResolver::new(&storage);

    let (left, right) = tokio::join!(
        resolver.resolve(IdentityAssertion::External(profile.clone())),
        resolver.resolve(IdentityAssertion::External(profile.clone())),
    );
    let (left, right) = (left.unwrap(), right.unwrap());

    assert_eq!(left.account.id, right.account.id);
    assert_eq!(
        [left.created, right.created].iter().filter(|c| **c).count(),
        1
    );
    assert_eq!(left.account.nickname.as_deref(), Some("Nelly"));
}

#[tokio::test]
async fn game_ids_and_discord_ids_do_not_collide() {
    let storage = storage().await;
    let resolver = IdentityResolver::new(&storage);
    let game = resolver
        .resolve(IdentityAssertion::Game("123456".into()))
        .await
        .unwrap();
    let discord = resolver
        .resolve(IdentityAssertion::External(ExternalProfile {
            source: IdentitySource::Discord,
            external_id: "123456".into(),
            display_name: None,
            avatar_url: None,
        }))
        .await
        .unwrap();
    assert_ne!(game.account.id, discord.account.id);
}

#[tokio::test]
async fn invalid_game_id_is_rejected_without_creating_account() {
    let storage = storage().await;
    let err = IdentityResolver::new(&storage)
        .resolve(IdentityAssertion::Game("12a".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, RewardsError::Validation(_)));
    let key = rewards_domain::IdentityKey::from_parts(IdentitySource::Game, "12a");
    assert!(storage.find_account_by_identity(&key).await.unwrap().is_none());

    // A provider profile cannot smuggle in an unvalidated game id either.
    let err = IdentityResolver::new(&storage)
        .resolve(IdentityAssertion::External(ExternalProfile {
            source: IdentitySource::Game,
            external_id: "12a".into(),
            display_name: None,
            avatar_url: None,
        }))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RewardsError::Validation(ValidationError::ExternalId)
    ));
    assert!(storage.find_account_by_identity(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn nickname_changes_cap_at_two() {
    let storage = storage().await;
    let account = game_account(&storage, "12345").await;
    let resolver = IdentityResolver::new(&storage);

    let renamed = resolver.update_nickname(account.id, "First").await.unwrap();
    assert_eq!(renamed.nickname.as_deref(), Some("First"));
    let renamed = resolver.update_nickname(account.id, "Second").await.unwrap();
    assert_eq!(renamed.nickname_changes, 2);

    let err = resolver
        .update_nickname(account.id, "Third")
        .await
        .unwrap_err();
    assert!(matches!(err, RewardsError::NicknameLocked));
    assert_eq!(err.to_string(), "cannot update nickname");

    let stored = storage.find_account(account.id).await.unwrap().unwrap();
    assert_eq!(stored.nickname_changes, 2);
    assert_eq!(stored.nickname.as_deref(), Some("Second"));
}

#[tokio::test]
async fn ledger_records_every_mutation() {
    let storage = storage().await;
    let account = game_account(&storage, "12345").await;
    let ledger = Ledger::new(&storage);

    assert_eq!(
        ledger
            .credit(account.id, 300, LedgerReason::AdminGrant, None)
            .await
            .unwrap(),
        300
    );
    assert_eq!(
        ledger
            .debit(account.id, 120, Some("manual".into()))
            .await
            .unwrap(),
        180
    );
    let err = ledger.debit(account.id, 500, None).await.unwrap_err();
    assert!(matches!(
        err,
        RewardsError::InsufficientBalance {
            requested: 500,
            available: 180
        }
    ));
    assert!(matches!(
        ledger
            .credit(account.id, 0, LedgerReason::AdminGrant, None)
            .await,
        Err(RewardsError::Validation(_))
    ));

    let entries = ledger.entries(account.id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].delta, -120);
    assert_eq!(entries[0].balance_after, 180);
    assert_eq!(entries[0].reason, LedgerReason::AdminDebit);
    assert_eq!(entries[1].delta, 300);
}

#[tokio::test]
async fn crediting_missing_account_fails() {
    let storage = storage().await;
    let err = Ledger::new(&storage)
        .credit(
            rewards_domain::AccountId::new(404),
            10,
            LedgerReason::AdminGrant,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RewardsError::AccountNotFound));
}

#[tokio::test]
async fn credits_past_the_maximum_balance_are_rejected() {
    let storage = storage().await;
    let account = game_account(&storage, "12345").await;
    let account = fund(&storage, &account, 100).await;
    let ledger = Ledger::new(&storage);

    let err = ledger
        .credit(account.id, i64::MAX, LedgerReason::AdminGrant, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RewardsError::Validation(ValidationError::BalanceOverflow)
    ));
    let stored = storage.find_account(account.id).await.unwrap().unwrap();
    assert_eq!(stored.balance, 100);
    assert_eq!(ledger.entries(account.id).await.unwrap().len(), 1);

    // An exact fit still applies.
    assert_eq!(
        ledger
            .credit(account.id, i64::MAX - 100, LedgerReason::AdminGrant, None)
            .await
            .unwrap(),
        i64::MAX
    );
}

#[tokio::test]
async fn oversized_promocode_reward_fails_without_using_the_code() {
    let storage = storage().await;
    let account = game_account(&storage, "12345").await;
    let account = fund(&storage, &account, 1).await;
    seed_promocode(&storage, "JACKPOT", i64::MAX, 5).await;

    let err = PromocodeRedemption::new(&storage)
        .redeem(account.id, "JACKPOT")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RewardsError::Validation(ValidationError::BalanceOverflow)
    ));

    let promo = storage
        .find_promocode(&PromocodeCode::parse("JACKPOT").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(promo.current_uses, 0);
    let stored = storage.find_account(account.id).await.unwrap().unwrap();
    assert_eq!(stored.balance, 1);
}

#[tokio::test]
async fn refund_that_would_overflow_keeps_withdrawal_pending() {
    let storage = storage().await;
    let admin = admin(&storage).await;
    let account = game_account(&storage, "12345").await;
    let account = fund(&storage, &account, 300).await;
    let config = LedgerConfig::default();
    let workflow = WithdrawalWorkflow::new(&storage, &config);

    let requested = workflow.request(&account, 200, None).await.unwrap();
    Ledger::new(&storage)
        .credit(account.id, i64::MAX - 100, LedgerReason::AdminGrant, None)
        .await
        .unwrap();

    let err = workflow
        .transition(&admin, requested.withdrawal.id, WithdrawalStatus::Rejected)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RewardsError::Validation(ValidationError::BalanceOverflow)
    ));
    let stored = storage
        .find_withdrawal(requested.withdrawal.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, WithdrawalStatus::Pending);
}

#[tokio::test]
async fn admin_adjustments_pick_direction_from_sign() {
    let storage = storage().await;
    let admin = admin(&storage).await;
    let user = game_account(&storage, "55555").await;
    let ledger = Ledger::new(&storage);

    assert_eq!(
        ledger
            .adjust(&admin, user.id, 250, Some("support ticket".into()))
            .await
            .unwrap(),
        250
    );
    assert_eq!(ledger.adjust(&admin, user.id, -50, None).await.unwrap(), 200);
    assert!(matches!(
        ledger.adjust(&admin, user.id, -500, None).await,
        Err(RewardsError::InsufficientBalance {
            requested: 500,
            available: 200
        })
    ));
    assert!(matches!(
        ledger.adjust(&admin, user.id, 0, None).await,
        Err(RewardsError::Validation(_))
    ));
    assert!(matches!(
        ledger.adjust(&user, user.id, 10, None).await,
        Err(RewardsError::Authorization)
    ));

    let entries = ledger.entries(user.id).await.unwrap();
    let reasons: Vec<_> = entries.iter().map(|entry| entry.reason).collect();
    assert_eq!(reasons, vec![LedgerReason::AdminDebit, LedgerReason::AdminGrant]);
    assert_eq!(entries[1].reference.as_deref(), Some("support ticket"));
}

#[tokio::test]
async fn redeeming_twice_credits_once() {
    let storage = storage().await;
    let account = game_account(&storage, "12345").await;
    seed_promocode(&storage, "BONUS50", 50, 10).await;
    let redemption = PromocodeRedemption::new(&storage);

    let redeemed = redemption.redeem(account.id, "bonus50").await.unwrap();
    assert_eq!(redeemed.reward, 50);
    assert_eq!(redeemed.balance, 50);

    let err = redemption.redeem(account.id, "BONUS50").await.unwrap_err();
    assert!(matches!(err, RewardsError::AlreadyRedeemed));

    let stored = storage.find_account(account.id).await.unwrap().unwrap();
    assert_eq!(stored.balance, 50);
    let promo = storage
        .find_promocode(&PromocodeCode::parse("BONUS50").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(promo.current_uses, 1);
}

#[tokio::test]
async fn concurrent_redemptions_respect_cap() {
    let storage = storage().await;
    let alice = game_account(&storage, "11111").await;
    let bob = game_account(&storage, "22222").await;
    seed_promocode(&storage, "ONLYONE", 25, 1).await;
    let redemption = PromocodeRedemption::new(&storage);

    let (left, right) = tokio::join!(
        redemption.redeem(alice.id, "ONLYONE"),
        redemption.redeem(bob.id, "ONLYONE"),
    );

    let outcomes = [left, right];
    let successes = outcomes.iter().filter(|result| result.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(outcomes
        .iter()
        .any(|result| matches!(result, Err(RewardsError::PromocodeExhausted))));

    let promo = storage
        .find_promocode(&PromocodeCode::parse("ONLYONE").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(promo.current_uses, 1);

    let alice = storage.find_account(alice.id).await.unwrap().unwrap();
    let bob = storage.find_account(bob.id).await.unwrap().unwrap();
    assert_eq!(alice.balance + bob.balance, 25);
}

#[tokio::test]
async fn unknown_expired_and_malformed_codes_fail() {
    let storage = storage().await;
    let account = game_account(&storage, "12345").await;
    storage
        .insert_promocode(NewPromocode {
            code: PromocodeCode::parse("OLDCODE").unwrap(),
            reward: 10,
            max_uses: 5,
            expires_at: Some(Utc::now() - Duration::hours(1)),
            created_at: Utc::now() - Duration::days(2),
        })
        .await
        .unwrap();
    let redemption = PromocodeRedemption::new(&storage);

    assert!(matches!(
        redemption.redeem(account.id, "NOPE").await,
        Err(RewardsError::PromocodeNotFound)
    ));
    assert!(matches!(
        redemption.redeem(account.id, "x").await,
        Err(RewardsError::PromocodeNotFound)
    ));
    assert!(matches!(
        redemption.redeem(account.id, "OLDCODE").await,
        Err(RewardsError::PromocodeExpired)
    ));
    let stored = storage.find_account(account.id).await.unwrap().unwrap();
    assert_eq!(stored.balance, 0);
}

#[tokio::test]
async fn redemption_for_missing_account_leaves_counter_untouched() {
    let storage = storage().await;
    seed_promocode(&storage, "GHOST", 10, 3).await;
    let err = PromocodeRedemption::new(&storage)
        .redeem(rewards_domain::AccountId::new(77), "GHOST")
        .await
        .unwrap_err();
    assert!(matches!(err, RewardsError::AccountNotFound));
    let promo = storage
        .find_promocode(&PromocodeCode::parse("GHOST").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(promo.current_uses, 0);
}

#[tokio::test]
async fn admins_create_unique_promocodes() {
    let storage = storage().await;
    let admin = admin(&storage).await;
    let user = game_account(&storage, "12345").await;
    let redemption = PromocodeRedemption::new(&storage);
    let draft = PromocodeDraft {
        code: "welcome100".into(),
        reward: 100,
        max_uses: 1000,
        expires_at: None,
    };

    assert!(matches!(
        redemption.create(&user, draft.clone()).await,
        Err(RewardsError::Authorization)
    ));
    let created = redemption.create(&admin, draft.clone()).await.unwrap();
    assert_eq!(created.code.as_str(), "WELCOME100");
    assert!(matches!(
        redemption.create(&admin, draft).await,
        Err(RewardsError::DuplicatePromocode)
    ));
    assert!(matches!(
        redemption
            .create(
                &admin,
                PromocodeDraft {
                    code: "ZERO".into(),
                    reward: 0,
                    max_uses: 1,
                    expires_at: None,
                },
            )
            .await,
        Err(RewardsError::Validation(_))
    ));
    assert_eq!(redemption.list(&admin).await.unwrap().len(), 1);
}

#[tokio::test]
async fn overdrawn_withdrawal_leaves_no_trace() {
    let storage = storage().await;
    let account = game_account(&storage, "12345").await;
    let config = LedgerConfig::default();
    let workflow = WithdrawalWorkflow::new(&storage, &config);

    let err = workflow.request(&account, 100, None).await.unwrap_err();
    assert!(matches!(
        err,
        RewardsError::InsufficientBalance {
            requested: 100,
            available: 0
        }
    ));
    assert!(workflow.list_for_account(account.id).await.unwrap().is_empty());
    assert!(storage.ledger_entries(account.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn withdrawal_amount_follows_policy() {
    let storage = storage().await;
    let account = game_account(&storage, "12345").await;
    let account = fund(&storage, &account, 1_000).await;
    let config = LedgerConfig::default();
    let workflow = WithdrawalWorkflow::new(&storage, &config);

    for amount in [0, -100, 50, 150] {
        assert!(matches!(
            workflow.request(&account, amount, None).await,
            Err(RewardsError::Validation(_))
        ));
    }

    let relaxed = LedgerConfig::new(WithdrawalPolicy::new(1, 1), true);
    let requested = WithdrawalWorkflow::new(&storage, &relaxed)
        .request(&account, 150, None)
        .await
        .unwrap();
    assert_eq!(requested.balance, 850);
}

#[tokio::test]
async fn discord_accounts_need_an_explicit_recipient() {
    let storage = storage().await;
    let account = IdentityResolver::new(&storage)
        .resolve(IdentityAssertion::External(ExternalProfile {
            source: IdentitySource::Discord,
            external_id: "42".into(),
            display_name: None,
            avatar_url: None,
        }))
        .await
        .unwrap()
        .account;
    let account = fund(&storage, &account, 200).await;
    let config = LedgerConfig::default();
    let workflow = WithdrawalWorkflow::new(&storage, &config);

    assert!(matches!(
        workflow.request(&account, 100, None).await,
        Err(RewardsError::Validation(_))
    ));
    let requested = workflow
        .request(&account, 100, Some("5551234"))
        .await
        .unwrap();
    assert_eq!(requested.withdrawal.recipient.as_str(), "5551234");
}

#[tokio::test]
async fn racing_withdrawals_cannot_overdraw() {
    let storage = storage().await;
    let account = game_account(&storage, "12345").await;
    fund(&storage, &account, 100).await;
    let request = || NewWithdrawal {
        account_id: account.id,
        amount: 100,
        recipient: GameId::parse("12345").unwrap(),
        requested_at: Utc::now(),
    };

    let (left, right) = tokio::join!(
        storage.create_withdrawal(request()),
        storage.create_withdrawal(request()),
    );
    let outcomes = [left.unwrap(), right.unwrap()];
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| matches!(outcome, WithdrawalCreation::Created { .. }))
            .count(),
        1
    );
    assert!(outcomes.iter().any(|outcome| matches!(
        outcome,
        WithdrawalCreation::InsufficientBalance { available: 0 }
    )));

    let stored = storage.find_account(account.id).await.unwrap().unwrap();
    assert_eq!(stored.balance, 0);
    let filter = WithdrawalFilter {
        account_id: Some(account.id),
        ..WithdrawalFilter::default()
    };
    assert_eq!(storage.list_withdrawals(&filter).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pooled_redemptions_losers_see_exhausted() {
    let db = ScratchDb::new("redeem-race");
    let storage = db.pooled(4).await;
    seed_promocode(&storage, "RUSH", 25, 1).await;
    let mut accounts = Vec::new();
    for n in 0..8 {
        accounts.push(game_account(&storage, &format!("1000{n}")).await.id);
    }

    let handles: Vec<_> = accounts
        .iter()
        .map(|account| {
            let storage = storage.clone();
            let account = *account;
            tokio::spawn(async move {
                PromocodeRedemption::new(&storage)
                    .redeem(account, "RUSH")
                    .await
            })
        })
        .collect();
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.expect("task joins"));
    }

    assert_eq!(outcomes.iter().filter(|result| result.is_ok()).count(), 1);
    for result in outcomes.iter().filter(|result| result.is_err()) {
        assert!(
            matches!(result, Err(RewardsError::PromocodeExhausted)),
            "unexpected outcome: {result:?}"
        );
    }

    let promo = storage
        .find_promocode(&PromocodeCode::parse("RUSH").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(promo.current_uses, 1);
    let mut total = 0;
    for account in accounts {
        total += storage.find_account(account).await.unwrap().unwrap().balance;
    }
    assert_eq!(total, 25);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pooled_withdrawals_losers_see_insufficient_balance() {
    let db = ScratchDb::new("withdraw-race");
    let storage = db.pooled(4).await;
    let account = game_account(&storage, "12345").await;
    fund(&storage, &account, 100).await;

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let storage = storage.clone();
            let request = NewWithdrawal {
                account_id: account.id,
                amount: 100,
                recipient: GameId::parse("12345").unwrap(),
                requested_at: Utc::now(),
            };
            tokio::spawn(async move { storage.create_withdrawal(request).await })
        })
        .collect();
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.expect("task joins").expect("no storage failure"));
    }

    let created = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, WithdrawalCreation::Created { .. }))
        .count();
    assert_eq!(created, 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| matches!(
                outcome,
                WithdrawalCreation::InsufficientBalance { available: 0 }
            ))
            .count(),
        5
    );
    let stored = storage.find_account(account.id).await.unwrap().unwrap();
    assert_eq!(stored.balance, 0);
}

#[tokio::test]
async fn rejection_refunds_and_terminal_states_stick() {
    let storage = storage().await;
    let admin = admin(&storage).await;
    let account = game_account(&storage, "12345").await;
    let account = fund(&storage, &account, 300).await;
    let config = LedgerConfig::default();
    let workflow = WithdrawalWorkflow::new(&storage, &config);

    let requested = workflow.request(&account, 200, None).await.unwrap();
    assert_eq!(requested.balance, 100);
    let id = requested.withdrawal.id;

    assert!(matches!(
        workflow
            .transition(&account, id, WithdrawalStatus::Completed)
            .await,
        Err(RewardsError::Authorization)
    ));

    let processing = workflow
        .transition(&admin, id, WithdrawalStatus::Processing)
        .await
        .unwrap();
    assert_eq!(processing.withdrawal.status, WithdrawalStatus::Processing);
    assert_eq!(processing.refunded, None);

    let rejected = workflow
        .transition(&admin, id, WithdrawalStatus::Rejected)
        .await
        .unwrap();
    assert_eq!(rejected.refunded, Some(200));
    let stored = storage.find_account(account.id).await.unwrap().unwrap();
    assert_eq!(stored.balance, 300);

    let err = workflow
        .transition(&admin, id, WithdrawalStatus::Completed)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RewardsError::InvalidTransition {
            from: WithdrawalStatus::Rejected,
            to: WithdrawalStatus::Completed
        }
    ));
    assert!(matches!(
        workflow
            .transition(&admin, id, WithdrawalStatus::Pending)
            .await,
        Err(RewardsError::InvalidTransition { .. })
    ));

    let reasons: Vec<_> = storage
        .ledger_entries(account.id)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.reason)
        .collect();
    assert_eq!(
        reasons,
        vec![
            LedgerReason::WithdrawalRefund,
            LedgerReason::Withdrawal,
            LedgerReason::AdminGrant
        ]
    );
}

#[tokio::test]
async fn rejection_without_refund_keeps_balance() {
    let storage = storage().await;
    let admin = admin(&storage).await;
    let account = game_account(&storage, "12345").await;
    let account = fund(&storage, &account, 100).await;
    let config = LedgerConfig::new(WithdrawalPolicy::default(), false);
    let workflow = WithdrawalWorkflow::new(&storage, &config);

    let requested = workflow.request(&account, 100, None).await.unwrap();
    let rejected = workflow
        .transition(&admin, requested.withdrawal.id, WithdrawalStatus::Rejected)
        .await
        .unwrap();
    assert_eq!(rejected.refunded, None);
    let stored = storage.find_account(account.id).await.unwrap().unwrap();
    assert_eq!(stored.balance, 0);
}

#[tokio::test]
async fn transition_of_unknown_withdrawal_is_not_found() {
    let storage = storage().await;
    let admin = admin(&storage).await;
    let config = LedgerConfig::default();
    let err = WithdrawalWorkflow::new(&storage, &config)
        .transition(
            &admin,
            rewards_domain::WithdrawalId::new(9),
            WithdrawalStatus::Completed,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RewardsError::WithdrawalNotFound));
}

#[tokio::test]
async fn admin_listing_filters_by_status_and_search() {
    let storage = storage().await;
    let admin = admin(&storage).await;
    let config = LedgerConfig::default();
    let workflow = WithdrawalWorkflow::new(&storage, &config);
    let resolver = IdentityResolver::new(&storage);

    let alice = game_account(&storage, "11111").await;
    let alice = resolver.update_nickname(alice.id, "NightHawk").await.unwrap();
    let alice = fund(&storage, &alice, 200).await;
    let bob = game_account(&storage, "22222").await;
    let bob = resolver.update_nickname(bob.id, "StormRider").await.unwrap();
    let bob = fund(&storage, &bob, 100).await;

    let first = workflow.request(&alice, 100, None).await.unwrap();
    workflow.request(&alice, 100, None).await.unwrap();
    workflow.request(&bob, 100, None).await.unwrap();
    workflow
        .transition(&admin, first.withdrawal.id, WithdrawalStatus::Completed)
        .await
        .unwrap();

    let pending = workflow
        .list(
            &admin,
            &WithdrawalFilter {
                status: Some(WithdrawalStatus::Pending),
                ..WithdrawalFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);

    let by_nickname = workflow
        .list(
            &admin,
            &WithdrawalFilter {
                search: Some("nighthawk".into()),
                ..WithdrawalFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(by_nickname.len(), 2);
    assert!(by_nickname.iter().all(|w| w.account_id == alice.id));

    let by_game_id = workflow
        .list(
            &admin,
            &WithdrawalFilter {
                search: Some("2222".into()),
                ..WithdrawalFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(by_game_id.len(), 1);
    assert_eq!(by_game_id[0].account_id, bob.id);

    assert!(matches!(
        workflow.list(&bob, &WithdrawalFilter::default()).await,
        Err(RewardsError::Authorization)
    ));
}

#[tokio::test]
async fn end_to_end_welcome_flow() {
    let storage = storage().await;
    let admin = admin(&storage).await;
    let config = LedgerConfig::default();

    let resolved = IdentityResolver::new(&storage)
        .resolve(IdentityAssertion::Game("12345".into()))
        .await
        .unwrap();
    assert!(resolved.created);
    assert_eq!(resolved.account.balance, 0);

    let redemption = PromocodeRedemption::new(&storage);
    redemption
        .create(
            &admin,
            PromocodeDraft {
                code: "WELCOME100".into(),
                reward: 100,
                max_uses: 1000,
                expires_at: None,
            },
        )
        .await
        .unwrap();
    let redeemed = redemption
        .redeem(resolved.account.id, "WELCOME100")
        .await
        .unwrap();
    assert_eq!(redeemed.balance, 100);

    let account = storage
        .find_account(resolved.account.id)
        .await
        .unwrap()
        .unwrap();
    let workflow = WithdrawalWorkflow::new(&storage, &config);
    let requested = workflow.request(&account, 100, None).await.unwrap();
    assert_eq!(requested.balance, 0);
    assert_eq!(requested.withdrawal.status, WithdrawalStatus::Pending);
    assert_eq!(requested.withdrawal.recipient.as_str(), "12345");

    let completed = workflow
        .transition(&admin, requested.withdrawal.id, WithdrawalStatus::Completed)
        .await
        .unwrap();
    assert_eq!(completed.withdrawal.status, WithdrawalStatus::Completed);
    assert_eq!(completed.refunded, None);

    let account = storage.find_account(account.id).await.unwrap().unwrap();
    assert_eq!(account.balance, 0);
}

#[tokio::test]
async fn sessions_open_authenticate_and_close() {
    let storage = storage().await;
    let account = game_account(&storage, "12345").await;
    let cache = SessionCache::default();
    let sessions = SessionManager::new(&storage, &cache);

    let (token, opened) = sessions.open(account.clone()).await.unwrap();
    assert_eq!(opened.account.id, account.id);

    let authenticated = sessions.authenticate(&token).await.unwrap();
    assert_eq!(authenticated.account.id, account.id);

    // A fresh cache forces the stored session to be consulted.
    let cold = SessionCache::default();
    let cold_sessions = SessionManager::new(&storage, &cold);
    assert!(cold_sessions.authenticate(&token).await.is_ok());

    sessions.close(&token).await.unwrap();
    sessions.close(&token).await.unwrap();
    assert!(matches!(
        sessions.authenticate(&token).await,
        Err(RewardsError::Unauthenticated)
    ));
    assert!(matches!(
        SessionManager::new(&storage, &SessionCache::default())
            .authenticate(&SessionToken::new("unknown"))
            .await,
        Err(RewardsError::Unauthenticated)
    ));
}

#[tokio::test]
async fn role_assignment_requires_admin() {
    let storage = storage().await;
    let admin = admin(&storage).await;
    let user = game_account(&storage, "12345").await;
    let resolver = IdentityResolver::new(&storage);

    assert!(matches!(
        resolver.assign_role(&user, user.id, Role::Admin).await,
        Err(RewardsError::Authorization)
    ));
    let promoted = resolver
        .assign_role(&admin, user.id, Role::Admin)
        .await
        .unwrap();
    assert!(promoted.is_admin());
    assert!(matches!(
        resolver
            .assign_role(&admin, rewards_domain::AccountId::new(999), Role::User)
            .await,
        Err(RewardsError::AccountNotFound)
    ));
}
