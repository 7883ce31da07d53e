//! Listings repo. The `featured_until` cache is only written through
//! `set_featured_until`, everything else goes through `UpdateListing`.
use std::time::SystemTime;

use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::dsl::{not, sql};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::sql_types::Bool;
use diesel::Connection;
use failure::Error as FailureError;

use errors::Error;
use models::authorization::*;
use models::{Listing, ListingsQuery, NewListing, SellerType, SortBy, UpdateListing};
use repos::acl;
use repos::legacy_acl::CheckScope;
use repos::types::{RepoAcl, RepoResult};
use schema::items::dsl as Items;
use schema::listings;
use schema::listings::dsl as Listings;
use schema::requests::dsl as Requests;
use schema::stores::dsl as Stores;
use types::{ListingId, UserId};

pub trait ListingsRepo {
    /// Find listing by id, deleted ones included
    fn find(&self, listing_id: ListingId) -> RepoResult<Option<Listing>>;

    /// Find listing by id and lock the row until the end of the transaction
    fn find_for_update(&self, listing_id: ListingId) -> RepoResult<Option<Listing>>;

    /// Find listings by ids, order is not preserved
    fn find_many(&self, listing_ids: Vec<ListingId>) -> RepoResult<Vec<Listing>>;

    /// Creates new listing
    fn create(&self, payload: NewListing) -> RepoResult<Listing>;

    /// Applies owner or system changes
    fn update(&self, listing_id: ListingId, payload: UpdateListing) -> RepoResult<Listing>;

    /// Applies moderator decision, requires moderation rights
    fn moderate(&self, listing_id: ListingId, payload: UpdateListing) -> RepoResult<Listing>;

    /// Writes the promotion cache
    fn set_featured_until(&self, listing_id: ListingId, featured_until: Option<SystemTime>) -> RepoResult<Listing>;

    /// Atomic `views_count += 1`
    fn increment_views(&self, listing_id: ListingId) -> RepoResult<Listing>;

    /// Visible listings matching the query, ranked for public surfaces
    fn list_public(&self, query: ListingsQuery) -> RepoResult<Vec<Listing>>;

    /// Not deleted listings of the owner, freshest first
    fn list_by_owner(&self, user_id: UserId) -> RepoResult<Vec<Listing>>;
}

pub struct ListingsRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
    pub acl: Box<RepoAcl<Listing>>,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> ListingsRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T, acl: Box<RepoAcl<Listing>>) -> Self {
        Self { db_conn, acl }
    }
}

fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// ORDER BY list: featured first, then the selected sort, then freshness
pub fn public_order_clause(sort: SortBy) -> String {
    let featured = "CASE WHEN listings.featured_until > now() THEN listings.featured_until END DESC NULLS LAST";
    let price = "(SELECT items.price FROM items WHERE items.listing_id = listings.id)";
    let budget = "(SELECT requests.budget FROM requests WHERE requests.listing_id = listings.id)";
    let secondary = match sort {
        SortBy::Latest => None,
        SortBy::PriceAsc => Some(format!("{} ASC NULLS LAST", price)),
        SortBy::PriceDesc => Some(format!("{} DESC NULLS LAST", price)),
        SortBy::BudgetAsc => Some(format!("{} ASC NULLS LAST", budget)),
        SortBy::BudgetDesc => Some(format!("{} DESC NULLS LAST", budget)),
    };

    let mut clause = vec![featured.to_string()];
    clause.extend(secondary);
    clause.push("listings.published_at DESC".to_string());
    clause.push("listings.id DESC".to_string());
    clause.join(", ")
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> ListingsRepo for ListingsRepoImpl<'a, T> {
    fn find(&self, listing_id: ListingId) -> RepoResult<Option<Listing>> {
        debug!("Find listing {}.", listing_id);
        Listings::listings
            .filter(Listings::id.eq(listing_id))
            .get_result(self.db_conn)
            .optional()
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Find listing by id: {} error occurred", listing_id)).into())
    }

    fn find_for_update(&self, listing_id: ListingId) -> RepoResult<Option<Listing>> {
        debug!("Find listing {} for update.", listing_id);
        Listings::listings
            .filter(Listings::id.eq(listing_id))
            .for_update()
            .get_result(self.db_conn)
            .optional()
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Lock listing by id: {} error occurred", listing_id)).into())
    }

    fn find_many(&self, listing_ids: Vec<ListingId>) -> RepoResult<Vec<Listing>> {
        debug!("Find listings {:?}.", listing_ids);
        Listings::listings
            .filter(Listings::id.eq_any(&listing_ids))
            .get_results(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Find listings by ids: {:?} error occurred", listing_ids)).into())
    }

    fn create(&self, payload: NewListing) -> RepoResult<Listing> {
        debug!("Create listing {:?}.", payload);
        diesel::insert_into(Listings::listings)
            .values(&payload)
            .get_result::<Listing>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Create listing {:?} error occurred", payload)).into())
    }

    fn update(&self, listing_id: ListingId, payload: UpdateListing) -> RepoResult<Listing> {
        debug!("Update listing {} with {:?}.", listing_id, payload);
        let mut payload = payload;
        payload.updated_at = Some(SystemTime::now());

        let filter = Listings::listings.filter(Listings::id.eq(listing_id));
        diesel::update(filter)
            .set(&payload)
            .get_result::<Listing>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Update listing {} error occurred", listing_id)).into())
    }

    fn moderate(&self, listing_id: ListingId, payload: UpdateListing) -> RepoResult<Listing> {
        debug!("Moderate listing {} with {:?}.", listing_id, payload);
        self.find(listing_id)
            .and_then(|listing| {
                let listing = listing.ok_or_else(|| format_err!("Listing {} not found", listing_id).context(Error::NotFound))?;
                acl::check(&*self.acl, Resource::Listings, Action::Moderate, self, Some(&listing))?;
                self.update(listing_id, payload)
            })
            .map_err(|e: FailureError| e.context(format!("Moderate listing {} error occurred", listing_id)).into())
    }

    fn set_featured_until(&self, listing_id: ListingId, featured_until: Option<SystemTime>) -> RepoResult<Listing> {
        debug!("Set featured_until of listing {} to {:?}.", listing_id, featured_until);
        let filter = Listings::listings.filter(Listings::id.eq(listing_id));
        diesel::update(filter)
            .set(Listings::featured_until.eq(featured_until))
            .get_result::<Listing>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Set featured_until of listing {} error occurred", listing_id)).into())
    }

    fn increment_views(&self, listing_id: ListingId) -> RepoResult<Listing> {
        debug!("Increment views of listing {}.", listing_id);
        let filter = Listings::listings.filter(Listings::id.eq(listing_id));
        diesel::update(filter)
            .set(Listings::views_count.eq(Listings::views_count + 1))
            .get_result::<Listing>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Increment views of listing {} error occurred", listing_id)).into())
    }

    fn list_public(&self, query: ListingsQuery) -> RepoResult<Vec<Listing>> {
        debug!("List public listings by {:?}.", query);
        type BoxedExpr = Box<BoxableExpression<listings::table, Pg, SqlType = Bool>>;

        let ListingsQuery {
            search,
            category_ids,
            ids,
            published_after,
            offset,
            limit,
            ..
        } = query;

        let mut filter: BoxedExpr = Box::new(
            Listings::is_approved
                .eq(true)
                .and(Listings::is_active.eq(true))
                .and(Listings::is_deleted.eq(false)),
        );

        if let Some(listing_type) = search.listing_type {
            filter = Box::new(filter.and(Listings::listing_type.eq(listing_type)));
        }

        match (ids, search.text.as_ref()) {
            (Some(ids), _) => {
                filter = Box::new(filter.and(Listings::id.eq_any(ids)));
            }
            (None, Some(text)) if !text.trim().is_empty() => {
                let pattern = format!("%{}%", escape_like(text.trim()));
                filter = Box::new(filter.and(Listings::title.ilike(pattern.clone()).or(Listings::description.ilike(pattern))));
            }
            _ => {}
        }

        if let Some(category_ids) = category_ids {
            filter = Box::new(filter.and(Listings::category_id.eq_any(category_ids)));
        }

        if let Some(city) = search.city {
            filter = Box::new(filter.and(Listings::city.eq(city)));
        }

        if let Some(price_from) = search.price_from {
            filter = Box::new(filter.and(Listings::id.eq_any(Items::items.filter(Items::price.ge(price_from)).select(Items::listing_id))));
        }

        if let Some(price_to) = search.price_to {
            filter = Box::new(filter.and(Listings::id.eq_any(Items::items.filter(Items::price.le(price_to)).select(Items::listing_id))));
        }

        if let Some(condition) = search.condition {
            filter = Box::new(filter.and(Listings::id.eq_any(Items::items.filter(Items::condition.eq(condition)).select(Items::listing_id))));
        }

        if let Some(budget_from) = search.budget_from {
            filter = Box::new(filter.and(Listings::id.eq_any(
                Requests::requests.filter(Requests::budget.ge(budget_from)).select(Requests::listing_id),
            )));
        }

        if let Some(budget_to) = search.budget_to {
            filter = Box::new(filter.and(Listings::id.eq_any(
                Requests::requests.filter(Requests::budget.le(budget_to)).select(Requests::listing_id),
            )));
        }

        match search.seller_type {
            Some(SellerType::Store) => {
                filter = Box::new(filter.and(Listings::user_id.eq_any(Stores::stores.filter(Stores::is_active.eq(true)).select(Stores::user_id))));
            }
            Some(SellerType::Individual) => {
                filter = Box::new(filter.and(not(
                    Listings::user_id.eq_any(Stores::stores.filter(Stores::is_active.eq(true)).select(Stores::user_id)),
                )));
            }
            None => {}
        }

        if let Some(published_after) = published_after {
            filter = Box::new(filter.and(Listings::published_at.ge(published_after)));
        }

        let order = public_order_clause(search.sort);

        Listings::listings
            .filter(filter)
            .order(sql::<Bool>(&order))
            .offset(offset)
            .limit(limit)
            .get_results::<Listing>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context("List public listings error occurred").into())
    }

    fn list_by_owner(&self, user_id: UserId) -> RepoResult<Vec<Listing>> {
        debug!("List listings of user {}.", user_id);
        Listings::listings
            .filter(Listings::user_id.eq(user_id))
            .filter(Listings::is_deleted.eq(false))
            .order((Listings::published_at.desc(), Listings::id.desc()))
            .get_results(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("List listings of user {} error occurred", user_id)).into())
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CheckScope<Scope, Listing>
    for ListingsRepoImpl<'a, T>
{
    fn is_in_scope(&self, user_id: UserId, scope: &Scope, obj: Option<&Listing>) -> bool {
        match *scope {
            Scope::All => true,
            Scope::Owned => {
                if let Some(listing) = obj {
                    listing.user_id == user_id
                } else {
                    false
                }
            }
        }
    }
}
