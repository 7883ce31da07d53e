use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Error as FailureError;

use models::{ListingPhoto, NewListingPhoto};
use repos::types::RepoResult;
use schema::listing_photos::dsl as Photos;
use types::ListingId;

pub trait PhotosRepo {
    /// Photos of the listing, oldest first
    fn list_for_listing(&self, listing_id: ListingId) -> RepoResult<Vec<ListingPhoto>>;

    /// Adds a photo
    fn create(&self, payload: NewListingPhoto) -> RepoResult<ListingPhoto>;

    /// Drops the main mark from every photo of the listing
    fn clear_main(&self, listing_id: ListingId) -> RepoResult<usize>;
}

pub struct PhotosRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> PhotosRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T) -> Self {
        Self { db_conn }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> PhotosRepo for PhotosRepoImpl<'a, T> {
    fn list_for_listing(&self, listing_id: ListingId) -> RepoResult<Vec<ListingPhoto>> {
        debug!("List photos of listing {}.", listing_id);
        Photos::listing_photos
            .filter(Photos::listing_id.eq(listing_id))
            .order(Photos::id)
            .get_results(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("List photos of listing {} error occurred", listing_id)).into())
    }

    fn create(&self, payload: NewListingPhoto) -> RepoResult<ListingPhoto> {
        debug!("Create photo {:?}.", payload);
        diesel::insert_into(Photos::listing_photos)
            .values(&payload)
            .get_result::<ListingPhoto>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Create photo {:?} error occurred", payload)).into())
    }

    fn clear_main(&self, listing_id: ListingId) -> RepoResult<usize> {
        debug!("Clear main photo of listing {}.", listing_id);
        let filter = Photos::listing_photos
            .filter(Photos::listing_id.eq(listing_id))
            .filter(Photos::is_main.eq(true));
        diesel::update(filter)
            .set(Photos::is_main.eq(false))
            .execute(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Clear main photo of listing {} error occurred", listing_id)).into())
    }
}
