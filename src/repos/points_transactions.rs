//! Ledger repo, rows are only ever appended
use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::dsl::sum;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Error as FailureError;

use models::authorization::*;
use models::{NewPointsTransaction, PointsTransaction};
use repos::acl;
use repos::legacy_acl::CheckScope;
use repos::types::{RepoAcl, RepoResult};
use schema::points_transactions::dsl as PointsTransactions;
use types::UserId;

pub trait PointsTransactionsRepo {
    /// Appends a ledger row
    fn create(&self, payload: NewPointsTransaction) -> RepoResult<PointsTransaction>;

    /// Latest rows of the user, most recent first
    fn list_for_user(&self, user_id: UserId, limit: i64) -> RepoResult<Vec<PointsTransaction>>;

    /// Sum of all deltas of the user
    fn sum_for_user(&self, user_id: UserId) -> RepoResult<i64>;

    /// Most recent row of the user
    fn last_for_user(&self, user_id: UserId) -> RepoResult<Option<PointsTransaction>>;
}

pub struct PointsTransactionsRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
    pub acl: Box<RepoAcl<PointsTransaction>>,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> PointsTransactionsRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T, acl: Box<RepoAcl<PointsTransaction>>) -> Self {
        Self { db_conn, acl }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> PointsTransactionsRepo
    for PointsTransactionsRepoImpl<'a, T>
{
    fn create(&self, payload: NewPointsTransaction) -> RepoResult<PointsTransaction> {
        debug!("Append points transaction {:?}.", payload);
        diesel::insert_into(PointsTransactions::points_transactions)
            .values(&payload)
            .get_result::<PointsTransaction>(self.db_conn)
            .map_err(From::from)
            .and_then(|transaction| {
                acl::check(
                    &*self.acl,
                    Resource::PointsTransactions,
                    Action::Create,
                    self,
                    Some(&transaction),
                )?;
                Ok(transaction)
            })
            .map_err(|e: FailureError| e.context(format!("Append points transaction {:?} error occurred", payload)).into())
    }

    fn list_for_user(&self, user_id: UserId, limit: i64) -> RepoResult<Vec<PointsTransaction>> {
        debug!("List points transactions of user {}, limit {}.", user_id, limit);
        PointsTransactions::points_transactions
            .filter(PointsTransactions::user_id.eq(user_id))
            .order((PointsTransactions::created_at.desc(), PointsTransactions::id.desc()))
            .limit(limit)
            .get_results::<PointsTransaction>(self.db_conn)
            .map_err(From::from)
            .and_then(|transactions| {
                for transaction in &transactions {
                    acl::check(&*self.acl, Resource::PointsTransactions, Action::Read, self, Some(transaction))?;
                }
                Ok(transactions)
            })
            .map_err(|e: FailureError| e.context(format!("List points transactions of user {} error occurred", user_id)).into())
    }

    fn sum_for_user(&self, user_id: UserId) -> RepoResult<i64> {
        debug!("Sum points transactions of user {}.", user_id);
        PointsTransactions::points_transactions
            .filter(PointsTransactions::user_id.eq(user_id))
            .select(sum(PointsTransactions::delta))
            .get_result::<Option<i64>>(self.db_conn)
            .map(|total| total.unwrap_or(0))
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Sum points transactions of user {} error occurred", user_id)).into())
    }

    fn last_for_user(&self, user_id: UserId) -> RepoResult<Option<PointsTransaction>> {
        debug!("Find last points transaction of user {}.", user_id);
        PointsTransactions::points_transactions
            .filter(PointsTransactions::user_id.eq(user_id))
            .order(PointsTransactions::id.desc())
            .first::<PointsTransaction>(self.db_conn)
            .optional()
            .map_err(From::from)
            .and_then(|transaction| {
                if let Some(ref transaction) = transaction {
                    acl::check(&*self.acl, Resource::PointsTransactions, Action::Read, self, Some(transaction))?;
                }
                Ok(transaction)
            })
            .map_err(|e: FailureError| e.context(format!("Find last points transaction of user {} error occurred", user_id)).into())
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CheckScope<Scope, PointsTransaction>
    for PointsTransactionsRepoImpl<'a, T>
{
    fn is_in_scope(&self, user_id: UserId, scope: &Scope, obj: Option<&PointsTransaction>) -> bool {
        match *scope {
            Scope::All => true,
            Scope::Owned => {
                if let Some(transaction) = obj {
                    transaction.user_id == user_id
                } else {
                    false
                }
            }
        }
    }
}
