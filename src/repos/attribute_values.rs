//! Attribute values of listings. Items and requests keep them in separate
//! tables, the listing type picks one.
use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Error as FailureError;

use models::{AttributeValue, ListingType, NewAttributeValue};
use repos::types::RepoResult;
use schema::item_attribute_values::dsl as ItemValues;
use schema::request_attribute_values::dsl as RequestValues;
use types::ListingId;

pub trait AttributeValuesRepo {
    /// Values of the listing ordered by attribute
    fn list_for_listing(&self, listing_type: ListingType, listing_id: ListingId) -> RepoResult<Vec<AttributeValue>>;

    /// Replaces all values of the listing
    fn replace_for_listing(
        &self,
        listing_type: ListingType,
        listing_id: ListingId,
        values: Vec<NewAttributeValue>,
    ) -> RepoResult<Vec<AttributeValue>>;
}

pub struct AttributeValuesRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> AttributeValuesRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T) -> Self {
        Self { db_conn }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> AttributeValuesRepo
    for AttributeValuesRepoImpl<'a, T>
{
    fn list_for_listing(&self, listing_type: ListingType, listing_id: ListingId) -> RepoResult<Vec<AttributeValue>> {
        debug!("List attribute values of {} {}.", listing_type, listing_id);
        let res = match listing_type {
            ListingType::Item => ItemValues::item_attribute_values
                .filter(ItemValues::listing_id.eq(listing_id))
                .order((ItemValues::attribute_id, ItemValues::id))
                .get_results::<AttributeValue>(self.db_conn),
            ListingType::Request => RequestValues::request_attribute_values
                .filter(RequestValues::listing_id.eq(listing_id))
                .order((RequestValues::attribute_id, RequestValues::id))
                .get_results::<AttributeValue>(self.db_conn),
        };

        res.map_err(From::from).map_err(|e: FailureError| {
            e.context(format!("List attribute values of {} {} error occurred", listing_type, listing_id))
                .into()
        })
    }

    fn replace_for_listing(
        &self,
        listing_type: ListingType,
        listing_id: ListingId,
        values: Vec<NewAttributeValue>,
    ) -> RepoResult<Vec<AttributeValue>> {
        debug!("Replace attribute values of {} {} with {:?}.", listing_type, listing_id, values);
        let res = match listing_type {
            ListingType::Item => {
                let rows = values
                    .iter()
                    .map(|v| {
                        (
                            ItemValues::listing_id.eq(listing_id),
                            ItemValues::attribute_id.eq(v.attribute_id),
                            ItemValues::value.eq(v.value.trim().to_string()),
                        )
                    })
                    .collect::<Vec<_>>();
                diesel::delete(ItemValues::item_attribute_values.filter(ItemValues::listing_id.eq(listing_id)))
                    .execute(self.db_conn)
                    .and_then(|_| {
                        if rows.is_empty() {
                            return Ok(vec![]);
                        }
                        diesel::insert_into(ItemValues::item_attribute_values)
                            .values(&rows)
                            .get_results::<AttributeValue>(self.db_conn)
                    })
            }
            ListingType::Request => {
                let rows = values
                    .iter()
                    .map(|v| {
                        (
                            RequestValues::listing_id.eq(listing_id),
                            RequestValues::attribute_id.eq(v.attribute_id),
                            RequestValues::value.eq(v.value.trim().to_string()),
                        )
                    })
                    .collect::<Vec<_>>();
                diesel::delete(RequestValues::request_attribute_values.filter(RequestValues::listing_id.eq(listing_id)))
                    .execute(self.db_conn)
                    .and_then(|_| {
                        if rows.is_empty() {
                            return Ok(vec![]);
                        }
                        diesel::insert_into(RequestValues::request_attribute_values)
                            .values(&rows)
                            .get_results::<AttributeValue>(self.db_conn)
                    })
            }
        };

        res.map_err(From::from).map_err(|e: FailureError| {
            e.context(format!("Replace attribute values of {} {} error occurred", listing_type, listing_id))
                .into()
        })
    }
}
