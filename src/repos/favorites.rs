use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Error as FailureError;

use models::{Favorite, NewFavorite};
use repos::types::RepoResult;
use schema::favorites::dsl as Favorites;
use types::{FavoriteId, ListingId, UserId};

pub trait FavoritesRepo {
    /// Adds the pair unless it already exists, returns true when inserted
    fn create(&self, payload: NewFavorite) -> RepoResult<bool>;

    /// Removes the pair, returns true when something was removed
    fn delete(&self, user_id: UserId, listing_id: ListingId) -> RepoResult<bool>;

    /// Favorites of the user, most recent first
    fn list_for_user(&self, user_id: UserId) -> RepoResult<Vec<Favorite>>;

    /// Removes stale rows
    fn delete_many(&self, ids: Vec<FavoriteId>) -> RepoResult<usize>;
}

pub struct FavoritesRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> FavoritesRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T) -> Self {
        Self { db_conn }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> FavoritesRepo for FavoritesRepoImpl<'a, T> {
    fn create(&self, payload: NewFavorite) -> RepoResult<bool> {
        debug!("Create favorite {:?}.", payload);
        diesel::insert_into(Favorites::favorites)
            .values(&payload)
            .on_conflict_do_nothing()
            .execute(self.db_conn)
            .map(|inserted| inserted > 0)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Create favorite {:?} error occurred", payload)).into())
    }

    fn delete(&self, user_id: UserId, listing_id: ListingId) -> RepoResult<bool> {
        debug!("Delete favorite of user {} on listing {}.", user_id, listing_id);
        let filter = Favorites::favorites
            .filter(Favorites::user_id.eq(user_id))
            .filter(Favorites::listing_id.eq(listing_id));
        diesel::delete(filter)
            .execute(self.db_conn)
            .map(|deleted| deleted > 0)
            .map_err(From::from)
            .map_err(|e: FailureError| {
                e.context(format!("Delete favorite of user {} on listing {} error occurred", user_id, listing_id))
                    .into()
            })
    }

    fn list_for_user(&self, user_id: UserId) -> RepoResult<Vec<Favorite>> {
        debug!("List favorites of user {}.", user_id);
        Favorites::favorites
            .filter(Favorites::user_id.eq(user_id))
            .order((Favorites::created_at.desc(), Favorites::id.desc()))
            .get_results(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("List favorites of user {} error occurred", user_id)).into())
    }

    fn delete_many(&self, ids: Vec<FavoriteId>) -> RepoResult<usize> {
        debug!("Delete favorites {:?}.", ids);
        diesel::delete(Favorites::favorites.filter(Favorites::id.eq_any(&ids)))
            .execute(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Delete favorites {:?} error occurred", ids)).into())
    }
}
