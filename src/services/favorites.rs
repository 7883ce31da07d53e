//! Favorites service, listing bookmarks of a user

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
use types::ListingId;

pub trait FavoritesService {
    /// Bookmarks a visible listing, returns `false` when it was already there
    fn add_favorite(&self, listing_id: ListingId) -> ServiceFuture<bool>;
    /// Returns `false` when there was nothing to remove
    fn remove_favorite(&self, listing_id: ListingId) -> ServiceFuture<bool>;
    /// Favorited listings, newest bookmark first. Stale bookmarks are dropped.
    fn list_favorites(&self) -> ServiceFuture<Vec<ListingCard>>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > FavoritesService for Service<T, M, F>
{
    fn add_favorite(&self, listing_id: ListingId) -> ServiceFuture<bool> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let listings_repo = repo_factory.create_listings_repo(&*conn, Some(user_id));
            let favorites_repo = repo_factory.create_favorites_repo(&*conn);
            let notifications_repo = repo_factory.create_notifications_repo(&*conn);

            conn.transaction::<bool, FailureError, _>(move || {
                let listing = listings_repo
                    .find(listing_id)?
                    .and_then(|listing| if listing.is_visible() { Some(listing) } else { None })
                    .ok_or_else(|| format_err!("Listing {} not found", listing_id).context(Error::NotFound))?;

                let added = favorites_repo.create(NewFavorite { user_id, listing_id })?;
                if added && listing.user_id != user_id {
                    notifications_repo.create(
                        NewNotification::new(
                            listing.user_id,
                            NotificationKind::Fav,
                            NotificationStatus::Added,
                            "Added to favorites",
                            format!("Someone added \"{}\" to favorites", listing.title),
                        )
                        .with_listing(listing_id),
                    )?;
                }
                Ok(added)
            })
            .map_err(|e| e.context("Service Favorites, add endpoint error occurred.").into())
        })
    }

    fn remove_favorite(&self, listing_id: ListingId) -> ServiceFuture<bool> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let favorites_repo = repo_factory.create_favorites_repo(&*conn);
            favorites_repo
                .delete(user_id, listing_id)
                .map_err(|e| e.context("Service Favorites, remove endpoint error occurred.").into())
        })
    }

    fn list_favorites(&self) -> ServiceFuture<Vec<ListingCard>> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let listings_repo = repo_factory.create_listings_repo(&*conn, Some(user_id));
            let items_repo = repo_factory.create_items_repo(&*conn);
            let requests_repo = repo_factory.create_requests_repo(&*conn);
            let favorites_repo = repo_factory.create_favorites_repo(&*conn);

            conn.transaction::<Vec<ListingCard>, FailureError, _>(move || {
                let favorites = favorites_repo.list_for_user(user_id)?;
                let listing_ids = favorites.iter().map(|favorite| favorite.listing_id).collect::<Vec<_>>();
                let listings = listings_repo.find_many(listing_ids.clone())?;
                let items = items_repo.find_many(listing_ids.clone())?;
                let requests = requests_repo.find_many(listing_ids)?;

                let mut stale = vec![];
                let mut cards = vec![];
                for favorite in favorites {
                    let listing = listings.iter().find(|listing| listing.id == favorite.listing_id);
                    let item = items.iter().find(|item| item.listing_id == favorite.listing_id).cloned();
                    let request = requests.iter().find(|request| request.listing_id == favorite.listing_id).cloned();
                    match listing {
                        None => stale.push(favorite.id),
                        Some(listing) if listing.is_deleted => stale.push(favorite.id),
                        Some(listing) if listing.listing_type == ListingType::Item && item.is_none() => stale.push(favorite.id),
                        // hidden for now, the bookmark stays
                        Some(listing) if !listing.is_visible() => (),
                        Some(listing) => cards.push(ListingCard {
                            listing: listing.clone(),
                            item,
                            request,
                        }),
                    }
                }

                if !stale.is_empty() {
                    let swept = favorites_repo.delete_many(stale)?;
                    debug!("Swept {} stale favorites of user {}", swept, user_id);
                }
                Ok(cards)
            })
            .map_err(|e| e.context("Service Favorites, list endpoint error occurred.").into())
        })
    }
}

#[cfg(test)]
pub mod tests {
    use tokio_core::reactor::Core;

    use errors::Error;
    use models::*;
    use repos::repo_factory::tests::*;
    use services::*;

    #[test]
    fn test_add_favorite_notifies_owner_once() {
        let db = MockDb::shared();
        let (owner, fan, listing) = {
            let mut db = db.lock().unwrap();
            let owner = db.add_user(0);
            let fan = db.add_user(0);
            let category = db.add_category(None);
            let listing = db.add_listing(owner.id, ListingType::Item, category.id);
            (owner, fan, listing)
        };
        let mut core = Core::new().unwrap();
        let service = create_service(Some(fan.id), db.clone());

        assert!(core.run(service.add_favorite(listing.id)).unwrap());
        assert!(!core.run(service.add_favorite(listing.id)).unwrap());

        let db = db.lock().unwrap();
        assert_eq!(db.favorites.len(), 1);
        let notifications = db.notifications_of(owner.id);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::Fav);
        assert_eq!(notifications[0].status, NotificationStatus::Added);
    }

    #[test]
    fn test_own_favorite_is_silent() {
        let db = MockDb::shared();
        let (owner, listing) = {
            let mut db = db.lock().unwrap();
            let owner = db.add_user(0);
            let category = db.add_category(None);
            let listing = db.add_listing(owner.id, ListingType::Request, category.id);
            (owner, listing)
        };
        let mut core = Core::new().unwrap();
        let service = create_service(Some(owner.id), db.clone());

        assert!(core.run(service.add_favorite(listing.id)).unwrap());
        assert!(db.lock().unwrap().notifications.is_empty());
    }

    #[test]
    fn test_hidden_listing_can_not_be_favorited() {
        let db = MockDb::shared();
        let (fan, listing) = {
            let mut db = db.lock().unwrap();
            let owner = db.add_user(0);
            let fan = db.add_user(0);
            let category = db.add_category(None);
            let listing = db.add_listing(owner.id, ListingType::Item, category.id);
            db.listing_mut(listing.id).is_approved = false;
            (fan, listing)
        };
        let mut core = Core::new().unwrap();
        let service = create_service(Some(fan.id), db.clone());

        let err = core.run(service.add_favorite(listing.id)).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::NotFound));
        assert!(db.lock().unwrap().favorites.is_empty());
    }

    #[test]
    fn test_list_sweeps_stale_favorites() {
        let db = MockDb::shared();
        let (fan, kept, deleted, broken) = {
            let mut db = db.lock().unwrap();
            let owner = db.add_user(0);
            let fan = db.add_user(0);
            let category = db.add_category(None);
            let kept = db.add_listing(owner.id, ListingType::Item, category.id);
            let deleted = db.add_listing(owner.id, ListingType::Item, category.id);
            let broken = db.add_listing(owner.id, ListingType::Item, category.id);
            (fan, kept, deleted, broken)
        };
        let mut core = Core::new().unwrap();
        let service = create_service(Some(fan.id), db.clone());
        for listing in &[&kept, &deleted, &broken] {
            core.run(service.add_favorite(listing.id)).unwrap();
        }
        {
            let mut db = db.lock().unwrap();
            let listing = db.listing_mut(deleted.id);
            listing.is_deleted = true;
            listing.is_active = false;
            db.items.retain(|item| item.listing_id != broken.id);
        }

        let cards = core.run(service.list_favorites()).unwrap();
        assert_eq!(cards.iter().map(|card| card.listing.id).collect::<Vec<_>>(), vec![kept.id]);

        let db = db.lock().unwrap();
        assert_eq!(db.favorites.len(), 1);
        assert_eq!(db.favorites[0].listing_id, kept.id);
    }

    #[test]
    fn test_remove_favorite() {
        let db = MockDb::shared();
        let (fan, listing) = {
            let mut db = db.lock().unwrap();
            let owner = db.add_user(0);
            let fan = db.add_user(0);
            let category = db.add_category(None);
            let listing = db.add_listing(owner.id, ListingType::Item, category.id);
            (fan, listing)
        };
        let mut core = Core::new().unwrap();
        let service = create_service(Some(fan.id), db.clone());

        core.run(service.add_favorite(listing.id)).unwrap();
        assert!(core.run(service.remove_favorite(listing.id)).unwrap());
        assert!(!core.run(service.remove_favorite(listing.id)).unwrap());
        assert!(core.run(service.list_favorites()).unwrap().is_empty());
    }
}
