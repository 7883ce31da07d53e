//! Users repo, owner of the wallet balance column
use std::time::SystemTime;

use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Error as FailureError;

use models::{NewUser, User};
use repos::types::RepoResult;
use schema::users::dsl as Users;
use types::UserId;

pub trait UsersRepo {
    /// Find user by id
    fn find(&self, user_id: UserId) -> RepoResult<Option<User>>;

    /// Find user by id and lock the row until the end of the transaction
    fn find_for_update(&self, user_id: UserId) -> RepoResult<Option<User>>;

    /// Find user whose phone equals any of the candidates
    fn find_by_phones(&self, phones: Vec<String>) -> RepoResult<Option<User>>;

    /// Find user by referral code
    fn find_by_referral_code(&self, code: String) -> RepoResult<Option<User>>;

    /// Creates new user
    fn create(&self, payload: NewUser) -> RepoResult<User>;

    /// Persists a new balance
    fn set_points(&self, user_id: UserId, points: i32) -> RepoResult<User>;
}

/// Implementation of UsersRepo trait
pub struct UsersRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> UsersRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T) -> Self {
        Self { db_conn }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> UsersRepo for UsersRepoImpl<'a, T> {
    fn find(&self, user_id: UserId) -> RepoResult<Option<User>> {
        debug!("Find user {}.", user_id);
        Users::users
            .filter(Users::id.eq(user_id))
            .get_result(self.db_conn)
            .optional()
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Find user by id: {} error occurred", user_id)).into())
    }

    fn find_for_update(&self, user_id: UserId) -> RepoResult<Option<User>> {
        debug!("Find user {} for update.", user_id);
        Users::users
            .filter(Users::id.eq(user_id))
            .for_update()
            .get_result(self.db_conn)
            .optional()
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Lock user by id: {} error occurred", user_id)).into())
    }

    fn find_by_phones(&self, phones: Vec<String>) -> RepoResult<Option<User>> {
        debug!("Find user by phones {:?}.", phones);
        Users::users
            .filter(Users::phone.eq_any(&phones))
            .order(Users::id)
            .first(self.db_conn)
            .optional()
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Find user by phones: {:?} error occurred", phones)).into())
    }

    fn find_by_referral_code(&self, code: String) -> RepoResult<Option<User>> {
        debug!("Find user by referral code {}.", code);
        Users::users
            .filter(Users::referral_code.eq(&code))
            .get_result(self.db_conn)
            .optional()
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Find user by referral code: {} error occurred", code)).into())
    }

    fn create(&self, payload: NewUser) -> RepoResult<User> {
        debug!("Create user {:?}.", payload);
        diesel::insert_into(Users::users)
            .values(&payload)
            .get_result::<User>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Create user {:?} error occurred", payload)).into())
    }

    fn set_points(&self, user_id: UserId, points: i32) -> RepoResult<User> {
        debug!("Set points of user {} to {}.", user_id, points);
        let filter = Users::users.filter(Users::id.eq(user_id));
        diesel::update(filter)
            .set((Users::points.eq(points), Users::updated_at.eq(SystemTime::now())))
            .get_result::<User>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Set points of user {} error occurred", user_id)).into())
    }
}
