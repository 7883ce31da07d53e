//! Categories Services, the category tree and per-category attribute schema

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use r2d2::ManageConnection;

use super::types::ServiceFuture;
use errors::Error;
use models::{build_category_tree, category_closure, AttributeWithOptions, CategoryTree};
use repos::ReposFactory;
use services::Service;
use types::CategoryId;

pub trait CategoriesService {
    /// Returns all categories as a forest of root categories
    fn category_tree(&self) -> ServiceFuture<Vec<CategoryTree>>;
    /// Returns the category with all its descendants
    fn category_closure(&self, root: CategoryId) -> ServiceFuture<Vec<CategoryId>>;
    /// Returns attributes of the category ordered by position, with select options
    fn category_attributes(&self, category_id: CategoryId) -> ServiceFuture<Vec<AttributeWithOptions>>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > CategoriesService for Service<T, M, F>
{
    fn category_tree(&self) -> ServiceFuture<Vec<CategoryTree>> {
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let categories_repo = repo_factory.create_categories_repo(&*conn);
            categories_repo
                .list_all()
                .map(|categories| build_category_tree(&categories))
                .map_err(|e| e.context("Service Categories, tree endpoint error occurred.").into())
        })
    }

    fn category_closure(&self, root: CategoryId) -> ServiceFuture<Vec<CategoryId>> {
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let categories_repo = repo_factory.create_categories_repo(&*conn);
            categories_repo
                .list_all()
                .and_then(|categories| {
                    if categories.iter().any(|category| category.id == root) {
                        Ok(category_closure(root, &categories))
                    } else {
                        Err(format_err!("Category {} not found", root).context(Error::NotFound).into())
                    }
                })
                .map_err(|e| e.context("Service Categories, closure endpoint error occurred.").into())
        })
    }

    fn category_attributes(&self, category_id: CategoryId) -> ServiceFuture<Vec<AttributeWithOptions>> {
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let categories_repo = repo_factory.create_categories_repo(&*conn);
            categories_repo
                .find(category_id)
                .and_then(|category| {
                    category
                        .map(|_| ())
                        .ok_or_else(|| format_err!("Category {} not found", category_id).context(Error::NotFound).into())
                })
                .and_then(|_| categories_repo.list_attributes(category_id))
                .map_err(|e| e.context("Service Categories, attributes endpoint error occurred.").into())
        })
    }
}
