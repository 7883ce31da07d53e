//! Listing promotions and their event trail
use std::time::SystemTime;

use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Error as FailureError;

use models::{
    ListingPromotion, NewListingPromotion, NewPromotionEvent, PromotionEvent, PromotionKind, PromotionStatus, UpdateListingPromotion,
};
use repos::types::RepoResult;
use schema::listing_promotions::dsl as Promotions;
use schema::promotion_events::dsl as PromotionEvents;
use types::{ListingId, PromotionId};

pub trait PromotionsRepo {
    fn create(&self, payload: NewListingPromotion) -> RepoResult<ListingPromotion>;

    fn update(&self, promotion_id: PromotionId, payload: UpdateListingPromotion) -> RepoResult<ListingPromotion>;

    /// Expires active featured promotions of the listing that ended at `now`
    fn expire_ended(&self, listing_id: ListingId, now: SystemTime) -> RepoResult<Vec<ListingPromotion>>;

    /// Active featured promotion still running at `now`, latest ending first
    fn find_active(&self, listing_id: ListingId, now: SystemTime) -> RepoResult<Option<ListingPromotion>>;

    /// Expires every active promotion that ended at `now`
    fn expire_all_ended(&self, now: SystemTime) -> RepoResult<Vec<ListingPromotion>>;
}

pub trait PromotionEventsRepo {
    fn create(&self, payload: NewPromotionEvent) -> RepoResult<PromotionEvent>;

    fn list_for_promotion(&self, promotion_id: PromotionId) -> RepoResult<Vec<PromotionEvent>>;
}

pub struct PromotionsRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> PromotionsRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T) -> Self {
        Self { db_conn }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> PromotionsRepo for PromotionsRepoImpl<'a, T> {
    fn create(&self, payload: NewListingPromotion) -> RepoResult<ListingPromotion> {
        debug!("Create promotion {:?}.", payload);
        diesel::insert_into(Promotions::listing_promotions)
            .values(&payload)
            .get_result::<ListingPromotion>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Create promotion {:?} error occurred", payload)).into())
    }

    fn update(&self, promotion_id: PromotionId, payload: UpdateListingPromotion) -> RepoResult<ListingPromotion> {
        debug!("Update promotion {} with {:?}.", promotion_id, payload);
        diesel::update(Promotions::listing_promotions.filter(Promotions::id.eq(promotion_id)))
            .set(&payload)
            .get_result::<ListingPromotion>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Update promotion {} error occurred", promotion_id)).into())
    }

    fn expire_ended(&self, listing_id: ListingId, now: SystemTime) -> RepoResult<Vec<ListingPromotion>> {
        debug!("Expire ended promotions of listing {}.", listing_id);
        let filter = Promotions::listing_promotions
            .filter(Promotions::listing_id.eq(listing_id))
            .filter(Promotions::kind.eq(PromotionKind::Featured))
            .filter(Promotions::status.eq(PromotionStatus::Active))
            .filter(Promotions::ends_at.le(now));
        diesel::update(filter)
            .set((Promotions::status.eq(PromotionStatus::Expired), Promotions::expired_at.eq(now)))
            .get_results::<ListingPromotion>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Expire ended promotions of listing {} error occurred", listing_id)).into())
    }

    fn find_active(&self, listing_id: ListingId, now: SystemTime) -> RepoResult<Option<ListingPromotion>> {
        debug!("Find active promotion of listing {}.", listing_id);
        Promotions::listing_promotions
            .filter(Promotions::listing_id.eq(listing_id))
            .filter(Promotions::kind.eq(PromotionKind::Featured))
            .filter(Promotions::status.eq(PromotionStatus::Active))
            .filter(Promotions::ends_at.gt(now))
            .order(Promotions::ends_at.desc())
            .first(self.db_conn)
            .optional()
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Find active promotion of listing {} error occurred", listing_id)).into())
    }

    fn expire_all_ended(&self, now: SystemTime) -> RepoResult<Vec<ListingPromotion>> {
        debug!("Expire all ended promotions.");
        let filter = Promotions::listing_promotions
            .filter(Promotions::status.eq(PromotionStatus::Active))
            .filter(Promotions::ends_at.le(now));
        diesel::update(filter)
            .set((Promotions::status.eq(PromotionStatus::Expired), Promotions::expired_at.eq(now)))
            .get_results::<ListingPromotion>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context("Expire all ended promotions error occurred").into())
    }
}

pub struct PromotionEventsRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> PromotionEventsRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T) -> Self {
        Self { db_conn }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> PromotionEventsRepo
    for PromotionEventsRepoImpl<'a, T>
{
    fn create(&self, payload: NewPromotionEvent) -> RepoResult<PromotionEvent> {
        debug!("Create promotion event {:?}.", payload);
        diesel::insert_into(PromotionEvents::promotion_events)
            .values(&payload)
            .get_result::<PromotionEvent>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Create promotion event {:?} error occurred", payload)).into())
    }

    fn list_for_promotion(&self, promotion_id: PromotionId) -> RepoResult<Vec<PromotionEvent>> {
        debug!("List events of promotion {}.", promotion_id);
        PromotionEvents::promotion_events
            .filter(PromotionEvents::promotion_id.eq(promotion_id))
            .order(PromotionEvents::id)
            .get_results(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("List events of promotion {} error occurred", promotion_id)).into())
    }
}
