//! Stores Services, store cards and following

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Error as FailureError;
use futures::future;
use r2d2::ManageConnection;

use super::types::ServiceFuture;
use errors::Error;
use models::*;
use repos::ReposFactory;
use services::Service;
use types::{StoreId, UserId};

pub trait StoresService {
    /// Returns active store by ID with its followers count
    fn get_store(&self, store_id: StoreId) -> ServiceFuture<StoreWithFollowers>;
    /// Follows the store, returns `false` when already following
    fn follow_store(&self, store_id: StoreId) -> ServiceFuture<bool>;
    /// Unfollows the store, returns `false` when was not following
    fn unfollow_store(&self, store_id: StoreId) -> ServiceFuture<bool>;
}

fn follow_notification(store: &Store, follower_id: UserId, status: NotificationStatus) -> NewNotification {
    let (title, verb) = match status {
        NotificationStatus::Unfollowed => ("Store unfollowed", "unfollowed"),
        _ => ("New follower", "followed"),
    };
    NewNotification::new(
        store.user_id,
        NotificationKind::StoreFollow,
        status,
        title,
        format!("User {} {} {}", follower_id, verb, store.name),
    )
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > StoresService for Service<T, M, F>
{
    fn get_store(&self, store_id: StoreId) -> ServiceFuture<StoreWithFollowers> {
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let stores_repo = repo_factory.create_stores_repo(&*conn);
            let store_follows_repo = repo_factory.create_store_follows_repo(&*conn);

            stores_repo
                .find(store_id)
                .and_then(|store| store.ok_or_else(|| format_err!("Store {} not found", store_id).context(Error::NotFound).into()))
                .and_then(|store| {
                    store_follows_repo.count(store_id).map(|followers_count| StoreWithFollowers {
                        store,
                        followers_count,
                    })
                })
                .map_err(|e| e.context("Service Stores, get endpoint error occurred.").into())
        })
    }

    fn follow_store(&self, store_id: StoreId) -> ServiceFuture<bool> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let stores_repo = repo_factory.create_stores_repo(&*conn);
            let store_follows_repo = repo_factory.create_store_follows_repo(&*conn);
            let notifications_repo = repo_factory.create_notifications_repo(&*conn);

            conn.transaction::<bool, FailureError, _>(move || {
                let store = stores_repo
                    .find(store_id)?
                    .ok_or_else(|| format_err!("Store {} not found", store_id).context(Error::NotFound))?;
                if store.user_id == user_id {
                    return Err(format_err!("User {} tried to follow own store {}", user_id, store_id)
                        .context(Error::Forbidden)
                        .into());
                }

                let followed = store_follows_repo.create(NewStoreFollow { store_id, user_id })?;
                if followed {
                    notifications_repo.create(follow_notification(&store, user_id, NotificationStatus::Followed))?;
                }
                Ok(followed)
            })
            .map_err(|e| e.context("Service Stores, follow endpoint error occurred.").into())
        })
    }

    fn unfollow_store(&self, store_id: StoreId) -> ServiceFuture<bool> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let stores_repo = repo_factory.create_stores_repo(&*conn);
            let store_follows_repo = repo_factory.create_store_follows_repo(&*conn);
            let notifications_repo = repo_factory.create_notifications_repo(&*conn);

            conn.transaction::<bool, FailureError, _>(move || {
                let store = stores_repo
                    .find(store_id)?
                    .ok_or_else(|| format_err!("Store {} not found", store_id).context(Error::NotFound))?;

                let unfollowed = store_follows_repo.delete(store_id, user_id)?;
                if unfollowed {
                    notifications_repo.create(follow_notification(&store, user_id, NotificationStatus::Unfollowed))?;
                }
                Ok(unfollowed)
            })
            .map_err(|e| e.context("Service Stores, unfollow endpoint error occurred.").into())
        })
    }
}
