//! Items repo, the for-sale side of listings
use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Error as FailureError;

use models::{NewItem, Item, UpdateItem};
use repos::types::RepoResult;
use schema::items::dsl as Items;
use types::ListingId;

pub trait ItemsRepo {
    /// Find item of the listing
    fn find(&self, listing_id: ListingId) -> RepoResult<Option<Item>>;

    /// Find items of many listings
    fn find_many(&self, listing_ids: Vec<ListingId>) -> RepoResult<Vec<Item>>;

    /// Creates the item row of a listing
    fn create(&self, payload: NewItem) -> RepoResult<Item>;

    /// Updates the item row of a listing
    fn update(&self, listing_id: ListingId, payload: UpdateItem) -> RepoResult<Item>;
}

pub struct ItemsRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> ItemsRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T) -> Self {
        Self { db_conn }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> ItemsRepo for ItemsRepoImpl<'a, T> {
    fn find(&self, listing_id: ListingId) -> RepoResult<Option<Item>> {
        debug!("Find item of listing {}.", listing_id);
        Items::items
            .filter(Items::listing_id.eq(listing_id))
            .get_result(self.db_conn)
            .optional()
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Find item of listing {} error occurred", listing_id)).into())
    }

    fn find_many(&self, listing_ids: Vec<ListingId>) -> RepoResult<Vec<Item>> {
        debug!("Find items of listings {:?}.", listing_ids);
        Items::items
            .filter(Items::listing_id.eq_any(&listing_ids))
            .get_results(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Find items of listings {:?} error occurred", listing_ids)).into())
    }

    fn create(&self, payload: NewItem) -> RepoResult<Item> {
        debug!("Create item {:?}.", payload);
        diesel::insert_into(Items::items)
            .values(&payload)
            .get_result::<Item>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Create item {:?} error occurred", payload)).into())
    }

    fn update(&self, listing_id: ListingId, payload: UpdateItem) -> RepoResult<Item> {
        debug!("Update item of listing {} with {:?}.", listing_id, payload);
        let filter = Items::items.filter(Items::listing_id.eq(listing_id));
        diesel::update(filter)
            .set(&payload)
            .get_result::<Item>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Update item of listing {} error occurred", listing_id)).into())
    }
}
