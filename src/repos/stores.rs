//! Stores and store follows
use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Error as FailureError;

use models::{NewStoreFollow, Store, StoreFollow};
use repos::types::RepoResult;
use schema::store_follows::dsl as StoreFollows;
use schema::stores::dsl as Stores;
use types::{StoreId, UserId};

pub trait StoresRepo {
    /// Find active store by id
    fn find(&self, store_id: StoreId) -> RepoResult<Option<Store>>;

    /// Active store owned by the user
    fn find_by_user(&self, user_id: UserId) -> RepoResult<Option<Store>>;
}

pub trait StoreFollowsRepo {
    /// Returns true when a new follow was inserted
    fn create(&self, payload: NewStoreFollow) -> RepoResult<bool>;

    /// Returns true when an existing follow was removed
    fn delete(&self, store_id: StoreId, user_id: UserId) -> RepoResult<bool>;

    fn list_followers(&self, store_id: StoreId) -> RepoResult<Vec<StoreFollow>>;

    fn count(&self, store_id: StoreId) -> RepoResult<i64>;
}

pub struct StoresRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> StoresRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T) -> Self {
        Self { db_conn }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> StoresRepo for StoresRepoImpl<'a, T> {
    fn find(&self, store_id: StoreId) -> RepoResult<Option<Store>> {
        debug!("Find in stores with id {}.", store_id);
        Stores::stores
            .filter(Stores::id.eq(store_id))
            .filter(Stores::is_active.eq(true))
            .get_result(self.db_conn)
            .optional()
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Find store by id: {} error occurred", store_id)).into())
    }

    fn find_by_user(&self, user_id: UserId) -> RepoResult<Option<Store>> {
        debug!("Find in stores with user id {}.", user_id);
        Stores::stores
            .filter(Stores::user_id.eq(user_id))
            .filter(Stores::is_active.eq(true))
            .order(Stores::id)
            .first(self.db_conn)
            .optional()
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Find store by user id: {} error occurred", user_id)).into())
    }
}

pub struct StoreFollowsRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> StoreFollowsRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T) -> Self {
        Self { db_conn }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> StoreFollowsRepo for StoreFollowsRepoImpl<'a, T> {
    fn create(&self, payload: NewStoreFollow) -> RepoResult<bool> {
        debug!("Create store follow {:?}.", payload);
        diesel::insert_into(StoreFollows::store_follows)
            .values(&payload)
            .on_conflict_do_nothing()
            .execute(self.db_conn)
            .map(|inserted| inserted > 0)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Create store follow {:?} error occurred", payload)).into())
    }

    fn delete(&self, store_id: StoreId, user_id: UserId) -> RepoResult<bool> {
        debug!("Delete follow of user {} on store {}.", user_id, store_id);
        let filter = StoreFollows::store_follows
            .filter(StoreFollows::store_id.eq(store_id))
            .filter(StoreFollows::user_id.eq(user_id));
        diesel::delete(filter)
            .execute(self.db_conn)
            .map(|deleted| deleted > 0)
            .map_err(From::from)
            .map_err(|e: FailureError| {
                e.context(format!("Delete follow of user {} on store {} error occurred", user_id, store_id))
                    .into()
            })
    }

    fn list_followers(&self, store_id: StoreId) -> RepoResult<Vec<StoreFollow>> {
        debug!("List followers of store {}.", store_id);
        StoreFollows::store_follows
            .filter(StoreFollows::store_id.eq(store_id))
            .order(StoreFollows::id)
            .get_results(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("List followers of store {} error occurred", store_id)).into())
    }

    fn count(&self, store_id: StoreId) -> RepoResult<i64> {
        debug!("Count followers of store {}.", store_id);
        StoreFollows::store_follows
            .filter(StoreFollows::store_id.eq(store_id))
            .select(count_star())
            .get_result(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Count followers of store {} error occurred", store_id)).into())
    }
}
