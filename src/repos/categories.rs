//! Categories and their attribute schema, read only for the core
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Error as FailureError;

use models::{Attribute, AttributeOption, AttributeWithOptions, Category};
use repos::types::RepoResult;
use schema::attribute_options::dsl as AttributeOptions;
use schema::attributes::dsl as Attributes;
use schema::categories::dsl as Categories;
use types::CategoryId;

pub trait CategoriesRepo {
    /// Find category by id
    fn find(&self, category_id: CategoryId) -> RepoResult<Option<Category>>;

    /// All categories, the tree is small
    fn list_all(&self) -> RepoResult<Vec<Category>>;

    /// Attributes of the category ordered by position, with their options
    fn list_attributes(&self, category_id: CategoryId) -> RepoResult<Vec<AttributeWithOptions>>;
}

pub struct CategoriesRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CategoriesRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T) -> Self {
        Self { db_conn }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CategoriesRepo for CategoriesRepoImpl<'a, T> {
    fn find(&self, category_id: CategoryId) -> RepoResult<Option<Category>> {
        debug!("Find category {}.", category_id);
        Categories::categories
            .filter(Categories::id.eq(category_id))
            .get_result(self.db_conn)
            .optional()
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Find category by id: {} error occurred", category_id)).into())
    }

    fn list_all(&self) -> RepoResult<Vec<Category>> {
        debug!("List all categories.");
        Categories::categories
            .order((Categories::position, Categories::id))
            .get_results(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context("List all categories error occurred").into())
    }

    fn list_attributes(&self, category_id: CategoryId) -> RepoResult<Vec<AttributeWithOptions>> {
        debug!("List attributes of category {}.", category_id);
        Attributes::attributes
            .filter(Attributes::category_id.eq(category_id))
            .order((Attributes::position, Attributes::id))
            .get_results::<Attribute>(self.db_conn)
            .and_then(|attributes| {
                let ids = attributes.iter().map(|a| a.id).collect::<Vec<_>>();
                AttributeOptions::attribute_options
                    .filter(AttributeOptions::attribute_id.eq_any(ids))
                    .order((AttributeOptions::position, AttributeOptions::id))
                    .get_results::<AttributeOption>(self.db_conn)
                    .map(|options| {
                        attributes
                            .into_iter()
                            .map(|attribute| {
                                let options = options.iter().filter(|o| o.attribute_id == attribute.id).cloned().collect();
                                AttributeWithOptions { attribute, options }
                            })
                            .collect()
                    })
            })
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("List attributes of category {} error occurred", category_id)).into())
    }
}
