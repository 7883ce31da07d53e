//! Wallet service, the only way points balances change. Every mutation
//! locks the user row and appends a ledger row in the same transaction.

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Error as FailureError;
use r2d2::ManageConnection;

use super::types::ServiceFuture;
use errors::Error;
use models::*;
use repos::{NotificationsRepo, PointsTransactionsRepo, ReposFactory, UsersRepo};
use services::Service;
use types::UserId;

/// Default size of a history page
pub const HISTORY_LIMIT: i64 = 50;

/// Applies `change` to the locked user row and appends the ledger row.
/// Must be called inside a transaction.
pub fn apply_points(
    users_repo: &UsersRepo,
    ledger_repo: &PointsTransactionsRepo,
    change: PointsChange,
) -> Result<PointsTransaction, FailureError> {
    let PointsChange {
        user_id,
        delta,
        kind,
        reason,
        meta,
        ref_promotion_id,
        allow_negative,
    } = change;

    let sign_matches = match kind {
        PointsKind::Earn => delta > 0,
        PointsKind::Spend => delta < 0,
        PointsKind::Adjust => delta != 0,
    };
    if !sign_matches {
        return Err(format_err!("Delta {} is not valid for {} transaction", delta, kind)
            .context(Error::InvalidDelta)
            .into());
    }

    let user = users_repo
        .find_for_update(user_id)?
        .ok_or_else(|| format_err!("User {} not found", user_id).context(Error::UserNotFound))?;

    let balance_after = user
        .points
        .checked_add(delta)
        .ok_or_else(|| format_err!("Balance of user {} overflows with delta {}", user_id, delta).context(Error::InvalidDelta))?;

    if balance_after < 0 && !allow_negative {
        return Err(format_err!("User {} has {} points, needs {}", user_id, user.points, -delta)
            .context(Error::NotEnoughPoints)
            .into());
    }

    users_repo.set_points(user_id, balance_after)?;
    let transaction = ledger_repo.create(NewPointsTransaction {
        user_id,
        kind,
        delta,
        balance_after,
        reason,
        ref_promotion_id,
        meta,
    })?;

    info!(
        "Points of user {} changed by {} ({}), balance {}",
        user_id, delta, transaction.reason, balance_after
    );
    Ok(transaction)
}

/// Credits `amount` and lets the user know. Must be called inside a transaction.
pub fn reward_points(
    users_repo: &UsersRepo,
    ledger_repo: &PointsTransactionsRepo,
    notifications_repo: &NotificationsRepo,
    user_id: UserId,
    amount: i32,
    reason: &str,
) -> Result<PointsTransaction, FailureError> {
    let transaction = apply_points(users_repo, ledger_repo, PointsChange::earn(user_id, amount, reason))?;
    notifications_repo.create(NewNotification::new(
        user_id,
        NotificationKind::Wallet,
        NotificationStatus::Reward,
        "Points received",
        format!("You received {} points. Balance: {}", amount, transaction.balance_after),
    ))?;
    Ok(transaction)
}

pub trait WalletService {
    /// Current balance
    fn balance(&self, user_id: UserId) -> ServiceFuture<i32>;
    /// Latest ledger rows, newest first
    fn history(&self, user_id: UserId, limit: Option<i64>) -> ServiceFuture<Vec<PointsTransaction>>;
    /// Compares the balance with the ledger
    fn audit(&self, user_id: UserId) -> ServiceFuture<WalletAudit>;
    /// Raw wallet mutation, moderators only. Internal callers use the free `apply_points`
    fn apply_points(&self, change: PointsChange) -> ServiceFuture<PointsTransaction>;
    /// Credits points, moderators only
    fn earn(&self, user_id: UserId, amount: i32, reason: String) -> ServiceFuture<PointsTransaction>;
    /// Debits points, never below zero, moderators only
    fn spend(&self, user_id: UserId, amount: i32, reason: String) -> ServiceFuture<PointsTransaction>;
    /// Moderator correction
    fn adjust(&self, payload: AdjustPoints) -> ServiceFuture<PointsTransaction>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > WalletService for Service<T, M, F>
{
    fn balance(&self, user_id: UserId) -> ServiceFuture<i32> {
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let users_repo = repo_factory.create_users_repo(&*conn);
            users_repo
                .find(user_id)
                .and_then(|user| {
                    user.map(|user| user.points)
                        .ok_or_else(|| format_err!("User {} not found", user_id).context(Error::UserNotFound).into())
                })
                .map_err(|e| e.context("Service Wallet, balance endpoint error occurred.").into())
        })
    }

    fn history(&self, user_id: UserId, limit: Option<i64>) -> ServiceFuture<Vec<PointsTransaction>> {
        let current_user = self.dynamic_context.user_id;
        let repo_factory = self.static_context.repo_factory.clone();
        let limit = clamp_limit(limit.unwrap_or(HISTORY_LIMIT));

        self.spawn_on_pool(move |conn| {
            let ledger_repo = repo_factory.create_points_transactions_repo(&*conn, current_user);
            ledger_repo
                .list_for_user(user_id, limit)
                .map_err(|e| e.context("Service Wallet, history endpoint error occurred.").into())
        })
    }

    fn audit(&self, user_id: UserId) -> ServiceFuture<WalletAudit> {
        let current_user = self.dynamic_context.user_id;
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let users_repo = repo_factory.create_users_repo(&*conn);
            let ledger_repo = repo_factory.create_points_transactions_repo(&*conn, current_user);
            conn.transaction::<WalletAudit, FailureError, _>(move || {
                let user = users_repo
                    .find(user_id)?
                    .ok_or_else(|| format_err!("User {} not found", user_id).context(Error::UserNotFound))?;
                let last = ledger_repo.last_for_user(user_id)?;
                let ledger_sum = ledger_repo.sum_for_user(user_id)?;
                let audit = WalletAudit::new(user_id, user.points, ledger_sum, last.map(|t| t.balance_after));
                if !audit.consistent {
                    error!("Wallet of user {} diverged from its ledger: {:?}", user_id, audit);
                }
                Ok(audit)
            })
            .map_err(|e| e.context("Service Wallet, audit endpoint error occurred.").into())
        })
    }

    fn apply_points(&self, change: PointsChange) -> ServiceFuture<PointsTransaction> {
        let current_user = self.dynamic_context.user_id;
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let users_repo = repo_factory.create_users_repo(&*conn);
            let ledger_repo = repo_factory.create_points_transactions_repo(&*conn, current_user);
            conn.transaction::<PointsTransaction, FailureError, _>(move || apply_points(&*users_repo, &*ledger_repo, change))
                .map_err(|e| e.context("Service Wallet, apply_points endpoint error occurred.").into())
        })
    }

    fn earn(&self, user_id: UserId, amount: i32, reason: String) -> ServiceFuture<PointsTransaction> {
        let current_user = self.dynamic_context.user_id;
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let users_repo = repo_factory.create_users_repo(&*conn);
            let ledger_repo = repo_factory.create_points_transactions_repo(&*conn, current_user);
            let notifications_repo = repo_factory.create_notifications_repo(&*conn);
            conn.transaction::<PointsTransaction, FailureError, _>(move || {
                if amount <= 0 {
                    return Err(format_err!("Earned amount must be positive, got {}", amount)
                        .context(Error::InvalidDelta)
                        .into());
                }
                reward_points(&*users_repo, &*ledger_repo, &*notifications_repo, user_id, amount, &reason)
            })
            .map_err(|e| e.context("Service Wallet, earn endpoint error occurred.").into())
        })
    }

    fn spend(&self, user_id: UserId, amount: i32, reason: String) -> ServiceFuture<PointsTransaction> {
        let current_user = self.dynamic_context.user_id;
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let users_repo = repo_factory.create_users_repo(&*conn);
            let ledger_repo = repo_factory.create_points_transactions_repo(&*conn, current_user);
            conn.transaction::<PointsTransaction, FailureError, _>(move || {
                if amount <= 0 {
                    return Err(format_err!("Spent amount must be positive, got {}", amount)
                        .context(Error::InvalidDelta)
                        .into());
                }
                apply_points(&*users_repo, &*ledger_repo, PointsChange::spend(user_id, amount, &reason))
            })
            .map_err(|e| e.context("Service Wallet, spend endpoint error occurred.").into())
        })
    }

    fn adjust(&self, payload: AdjustPoints) -> ServiceFuture<PointsTransaction> {
        let current_user = self.dynamic_context.user_id;
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let users_repo = repo_factory.create_users_repo(&*conn);
            // ledger writes are checked against the caller's roles
            let ledger_repo = repo_factory.create_points_transactions_repo(&*conn, current_user);
            let notifications_repo = repo_factory.create_notifications_repo(&*conn);
            conn.transaction::<PointsTransaction, FailureError, _>(move || {
                let AdjustPoints {
                    user_id,
                    delta,
                    reason,
                    allow_negative,
                } = payload;
                let transaction = apply_points(
                    &*users_repo,
                    &*ledger_repo,
                    PointsChange {
                        user_id,
                        delta,
                        kind: PointsKind::Adjust,
                        reason,
                        meta: json!({ "adjusted_by": current_user }),
                        ref_promotion_id: None,
                        allow_negative,
                    },
                )?;
                if delta > 0 {
                    notifications_repo.create(NewNotification::new(
                        user_id,
                        NotificationKind::Wallet,
                        NotificationStatus::Charged,
                        "Points added",
                        format!("{} points were added to your wallet. Balance: {}", delta, transaction.balance_after),
                    ))?;
                }
                Ok(transaction)
            })
            .map_err(|e| e.context("Service Wallet, adjust endpoint error occurred.").into())
        })
    }
}

#[cfg(test)]
pub mod tests {
    use tokio_core::reactor::Core;

    use errors::Error;
    use models::*;
    use repos::repo_factory::tests::*;
    use services::*;
    use types::*;

    fn seed_moderator(db: &SharedMockDb) -> User {
        let mut db = db.lock().unwrap();
        let moderator = db.add_user(0);
        db.add_role(moderator.id, Role::Moderator);
        moderator
    }

    #[test]
    fn test_spend_and_earn_keep_ledger_consistent() {
        let db = MockDb::shared();
        let user = db.lock().unwrap().add_user(0);
        let moderator = seed_moderator(&db);
        let mut core = Core::new().unwrap();
        let service = create_service(Some(moderator.id), db.clone());

        let earned = core.run(service.earn(user.id, 100, "bonus".to_string())).unwrap();
        assert_eq!(earned.balance_after, 100);
        let spent = core.run(service.spend(user.id, 35, "test".to_string())).unwrap();
        assert_eq!(spent.delta, -35);
        assert_eq!(spent.balance_after, 65);

        let own = create_service(Some(user.id), db.clone());
        let audit = core.run(own.audit(user.id)).unwrap();
        assert_eq!(audit.points, 65);
        assert_eq!(audit.ledger_sum, 65);
        assert!(audit.consistent);

        let history = core.run(own.history(user.id, None)).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, spent.id);
        let rewards = db.lock().unwrap().notifications_of(user.id);
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].status, NotificationStatus::Reward);
    }

    #[test]
    fn test_ledger_sum_matches_balance_after_mixed_operations() {
        let db = MockDb::shared();
        let user = db.lock().unwrap().add_user(0);
        let moderator = seed_moderator(&db);
        let mut core = Core::new().unwrap();
        let service = create_service(Some(moderator.id), db.clone());

        core.run(service.earn(user.id, 50, "referral".to_string())).unwrap();
        core.run(service.spend(user.id, 20, "republish".to_string())).unwrap();
        core.run(service.earn(user.id, 30, "bonus".to_string())).unwrap();
        let err = core.run(service.spend(user.id, 500, "featured".to_string())).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::NotEnoughPoints));
        core.run(service.spend(user.id, 60, "featured".to_string())).unwrap();
        core.run(service.adjust(AdjustPoints {
            user_id: user.id,
            delta: 7,
            reason: "correction".to_string(),
            allow_negative: false,
        }))
        .unwrap();

        let db = db.lock().unwrap();
        let mut rows: Vec<_> = db.points_transactions.iter().filter(|t| t.user_id == user.id).cloned().collect();
        rows.sort_by_key(|t| t.id);
        assert_eq!(rows.len(), 5);
        let mut running = 0;
        for row in &rows {
            running += row.delta;
            assert_eq!(row.balance_after, running);
        }
        assert_eq!(running, 7);
        assert_eq!(db.user(user.id).points, running);
    }

    #[test]
    fn test_plain_user_can_not_mint_or_drain_points() {
        let db = MockDb::shared();
        let (user, victim) = {
            let mut db = db.lock().unwrap();
            (db.add_user(0), db.add_user(50))
        };
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db.clone());

        let err = core.run(service.earn(user.id, 1_000_000, "free money".to_string())).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::Forbidden));

        let mut drain = PointsChange::spend(victim.id, 500, "drain");
        drain.allow_negative = true;
        let err = core.run(service.apply_points(drain)).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::Forbidden));

        let err = core.run(service.spend(victim.id, 10, "drain".to_string())).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::Forbidden));

        let db = db.lock().unwrap();
        assert_eq!(db.user(user.id).points, 0);
        assert_eq!(db.user(victim.id).points, 50);
        assert!(db.points_transactions.is_empty());
        assert!(db.notifications_of(user.id).is_empty());
    }

    #[test]
    fn test_overspend_fails_without_changes() {
        let db = MockDb::shared();
        let user = db.lock().unwrap().add_user(10);
        let moderator = seed_moderator(&db);
        let mut core = Core::new().unwrap();
        let service = create_service(Some(moderator.id), db.clone());

        let err = core.run(service.spend(user.id, 11, "test".to_string())).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::NotEnoughPoints));
        let db = db.lock().unwrap();
        assert_eq!(db.user(user.id).points, 10);
        assert!(db.points_transactions.is_empty());
    }

    #[test]
    fn test_zero_and_wrong_sign_deltas_are_invalid() {
        let db = MockDb::shared();
        let user = db.lock().unwrap().add_user(10);
        let mut core = Core::new().unwrap();
        let service = create_service(None, db.clone());

        let zero = PointsChange::earn(user.id, 0, "nothing");
        let err = core.run(service.apply_points(zero)).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::InvalidDelta));

        let mut wrong_sign = PointsChange::spend(user.id, 5, "oops");
        wrong_sign.delta = 5;
        let err = core.run(service.apply_points(wrong_sign)).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::InvalidDelta));

        let err = core.run(service.spend(user.id, -5, "negative".to_string())).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::InvalidDelta));
    }

    #[test]
    fn test_unknown_user() {
        let db = MockDb::shared();
        let mut core = Core::new().unwrap();
        let service = create_service(None, db);

        let err = core.run(service.apply_points(PointsChange::earn(UserId(404), 5, "gift"))).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::UserNotFound));
    }

    #[test]
    fn test_allow_negative_adjustment_by_moderator() {
        let db = MockDb::shared();
        let (user, moderator) = {
            let mut db = db.lock().unwrap();
            let user = db.add_user(5);
            let moderator = db.add_user(0);
            db.add_role(moderator.id, Role::Moderator);
            (user, moderator)
        };
        let mut core = Core::new().unwrap();
        let service = create_service(Some(moderator.id), db.clone());

        let transaction = core
            .run(service.adjust(AdjustPoints {
                user_id: user.id,
                delta: -8,
                reason: "chargeback".to_string(),
                allow_negative: true,
            }))
            .unwrap();
        assert_eq!(transaction.kind, PointsKind::Adjust);
        assert_eq!(transaction.balance_after, -3);
        assert_eq!(db.lock().unwrap().user(user.id).points, -3);
    }

    #[test]
    fn test_adjust_requires_moderator() {
        let db = MockDb::shared();
        let user = db.lock().unwrap().add_user(5);
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db.clone());

        let err = core
            .run(service.adjust(AdjustPoints {
                user_id: user.id,
                delta: 1000,
                reason: "free money".to_string(),
                allow_negative: false,
            }))
            .unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::Forbidden));
        let db = db.lock().unwrap();
        assert_eq!(db.user(user.id).points, 5);
        assert!(db.points_transactions.is_empty());
    }

    #[test]
    fn test_user_can_not_read_foreign_history() {
        let db = MockDb::shared();
        let (owner, stranger) = {
            let mut db = db.lock().unwrap();
            (db.add_user(0), db.add_user(0))
        };
        let moderator = seed_moderator(&db);
        let mut core = Core::new().unwrap();
        core.run(create_service(Some(moderator.id), db.clone()).earn(owner.id, 10, "bonus".to_string()))
            .unwrap();

        let err = core
            .run(create_service(Some(stranger.id), db.clone()).history(owner.id, Some(10)))
            .unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::Forbidden));
    }
}
