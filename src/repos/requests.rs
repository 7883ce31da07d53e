//! Requests repo, the wanted side of listings
use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Error as FailureError;

use models::{NewRequest, Request, UpdateRequest};
use repos::types::RepoResult;
use schema::requests::dsl as Requests;
use types::ListingId;

pub trait RequestsRepo {
    /// Find request of the listing
    fn find(&self, listing_id: ListingId) -> RepoResult<Option<Request>>;

    /// Find requests of many listings
    fn find_many(&self, listing_ids: Vec<ListingId>) -> RepoResult<Vec<Request>>;

    /// Creates the request row of a listing
    fn create(&self, payload: NewRequest) -> RepoResult<Request>;

    /// Updates the request row of a listing
    fn update(&self, listing_id: ListingId, payload: UpdateRequest) -> RepoResult<Request>;
}

pub struct RequestsRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> RequestsRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T) -> Self {
        Self { db_conn }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> RequestsRepo for RequestsRepoImpl<'a, T> {
    fn find(&self, listing_id: ListingId) -> RepoResult<Option<Request>> {
        debug!("Find request of listing {}.", listing_id);
        Requests::requests
            .filter(Requests::listing_id.eq(listing_id))
            .get_result(self.db_conn)
            .optional()
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Find request of listing {} error occurred", listing_id)).into())
    }

    fn find_many(&self, listing_ids: Vec<ListingId>) -> RepoResult<Vec<Request>> {
        debug!("Find requests of listings {:?}.", listing_ids);
        Requests::requests
            .filter(Requests::listing_id.eq_any(&listing_ids))
            .get_results(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Find requests of listings {:?} error occurred", listing_ids)).into())
    }

    fn create(&self, payload: NewRequest) -> RepoResult<Request> {
        debug!("Create request {:?}.", payload);
        diesel::insert_into(Requests::requests)
            .values(&payload)
            .get_result::<Request>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Create request {:?} error occurred", payload)).into())
    }

    fn update(&self, listing_id: ListingId, payload: UpdateRequest) -> RepoResult<Request> {
        debug!("Update request of listing {} with {:?}.", listing_id, payload);
        let filter = Requests::requests.filter(Requests::listing_id.eq(listing_id));
        diesel::update(filter)
            .set(&payload)
            .get_result::<Request>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Update request of listing {} error occurred", listing_id)).into())
    }
}
