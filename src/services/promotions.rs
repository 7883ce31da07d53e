//! Promotions service sells featured windows for points and expires them.
//!
//! A purchase is one transaction: lock the user, lock the listing, sweep
//! ended promotions, spend through the wallet, activate and refresh the
//! listing's `featured_until` cache.

use std::cmp;
use std::time::{SystemTime, UNIX_EPOCH};

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Error as FailureError;
use futures::future;
use r2d2::ManageConnection;

use super::types::ServiceFuture;
use errors::Error;
use models::*;
use repos::{ListingsRepo, NotificationsRepo, PromotionEventsRepo, ReposFactory};
use services::wallet::apply_points;
use services::Service;
use types::PromotionId;

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Logs the expiry and tells the listing owner
fn record_expired(
    listings_repo: &ListingsRepo,
    events_repo: &PromotionEventsRepo,
    notifications_repo: &NotificationsRepo,
    promotion: &ListingPromotion,
) -> Result<(), FailureError> {
    events_repo.create(NewPromotionEvent {
        promotion_id: promotion.id,
        kind: PromotionEventKind::Expired,
        meta: json!({ "ends_at": promotion.ends_at.map(unix_secs) }),
    })?;
    if let Some(listing) = listings_repo.find(promotion.listing_id)? {
        notifications_repo.create(
            NewNotification::new(
                listing.user_id,
                listing.listing_type.notification_kind(),
                NotificationStatus::FeaturedExpired,
                "Featured period ended",
                format!("\"{}\" is no longer featured", listing.title),
            )
            .with_listing(listing.id),
        )?;
    }
    info!("Promotion {} of listing {} expired", promotion.id, promotion.listing_id);
    Ok(())
}

/// Expires every active promotion whose window is over. Idempotent, used by
/// the background sweeper.
pub fn expire_stale_promotions<T, F>(repo_factory: &F, conn: &T, now: SystemTime) -> Result<Vec<ListingPromotion>, FailureError>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    F: ReposFactory<T>,
{
    let promotions_repo = repo_factory.create_promotions_repo(conn);
    let events_repo = repo_factory.create_promotion_events_repo(conn);
    let listings_repo = repo_factory.create_listings_repo(conn, None);
    let notifications_repo = repo_factory.create_notifications_repo(conn);

    conn.transaction::<Vec<ListingPromotion>, FailureError, _>(|| {
        let expired = promotions_repo.expire_all_ended(now)?;
        for promotion in &expired {
            record_expired(&*listings_repo, &*events_repo, &*notifications_repo, promotion)?;
        }
        Ok(expired)
    })
}

pub trait PromotionsService {
    /// Buys a featured window for a listing of the caller
    fn purchase_featured(&self, payload: PurchaseFeatured) -> ServiceFuture<FeaturedPurchase>;
    /// Expires ended promotions now
    fn expire_stale(&self) -> ServiceFuture<Vec<ListingPromotion>>;
    /// Audit trail of a promotion
    fn promotion_events(&self, promotion_id: PromotionId) -> ServiceFuture<Vec<PromotionEvent>>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > PromotionsService for Service<T, M, F>
{
    fn purchase_featured(&self, payload: PurchaseFeatured) -> ServiceFuture<FeaturedPurchase> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let PurchaseFeatured { listing_id, days } = payload;
        let cost = match featured_cost(days) {
            Some(cost) => cost,
            None => {
                return Box::new(future::err(
                    format_err!("There is no featured package for {} days", days)
                        .context(Error::InvalidPackage)
                        .into(),
                ))
            }
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let users_repo = repo_factory.create_users_repo(&*conn);
            let ledger_repo = repo_factory.create_points_transactions_repo_with_sys_acl(&*conn);
            let listings_repo = repo_factory.create_listings_repo(&*conn, Some(user_id));
            let promotions_repo = repo_factory.create_promotions_repo(&*conn);
            let events_repo = repo_factory.create_promotion_events_repo(&*conn);
            let notifications_repo = repo_factory.create_notifications_repo(&*conn);

            conn.transaction::<FeaturedPurchase, FailureError, _>(move || {
                let now = SystemTime::now();

                users_repo
                    .find_for_update(user_id)?
                    .ok_or_else(|| format_err!("User {} not found", user_id).context(Error::UserNotFound))?;
                let listing = listings_repo
                    .find_for_update(listing_id)?
                    .and_then(|listing| if listing.is_deleted { None } else { Some(listing) })
                    .ok_or_else(|| format_err!("Listing {} not found", listing_id).context(Error::NotFound))?;

                for promotion in promotions_repo.expire_ended(listing_id, now)? {
                    record_expired(&*listings_repo, &*events_repo, &*notifications_repo, &promotion)?;
                }

                if let Some(active) = promotions_repo.find_active(listing_id, now)? {
                    return Err(format_err!("Listing {} is featured by promotion {}", listing_id, active.id)
                        .context(Error::AlreadyFeatured)
                        .into());
                }

                if listing.user_id != user_id {
                    return Err(format_err!("User {} does not own listing {}", user_id, listing_id)
                        .context(Error::NotOwner)
                        .into());
                }

                let promotion = promotions_repo.create(NewListingPromotion {
                    listing_id,
                    kind: PromotionKind::Featured,
                    status: PromotionStatus::Pending,
                    duration_days: days,
                    points_cost: cost,
                    paid_with_points: true,
                    paid_at: Some(now),
                })?;
                events_repo.create(NewPromotionEvent {
                    promotion_id: promotion.id,
                    kind: PromotionEventKind::Created,
                    meta: json!({ "days": days, "points_cost": cost }),
                })?;

                let transaction = apply_points(
                    &*users_repo,
                    &*ledger_repo,
                    PointsChange {
                        meta: json!({ "listing_id": listing_id, "days": days }),
                        ref_promotion_id: Some(promotion.id),
                        ..PointsChange::spend(user_id, cost, FEATURED_REASON)
                    },
                )?;
                events_repo.create(NewPromotionEvent {
                    promotion_id: promotion.id,
                    kind: PromotionEventKind::PointsSpent,
                    meta: json!({ "transaction_id": transaction.id, "balance_after": transaction.balance_after }),
                })?;

                // a window still running on this listing pushes the new one back
                let starts_at = promotions_repo
                    .find_active(listing_id, now)?
                    .and_then(|active| active.ends_at)
                    .map(|ends_at| cmp::max(ends_at, now))
                    .unwrap_or(now);
                let ends_at = starts_at + days_to_duration(days);
                let promotion = promotions_repo.update(
                    promotion.id,
                    UpdateListingPromotion {
                        status: Some(PromotionStatus::Active),
                        starts_at: Some(starts_at),
                        ends_at: Some(ends_at),
                        activated_at: Some(now),
                        ..Default::default()
                    },
                )?;

                let featured_until = cmp::max(listing.featured_until.unwrap_or(ends_at), ends_at);
                listings_repo.set_featured_until(listing_id, Some(featured_until))?;
                events_repo.create(NewPromotionEvent {
                    promotion_id: promotion.id,
                    kind: PromotionEventKind::Activated,
                    meta: json!({ "starts_at": unix_secs(starts_at), "ends_at": unix_secs(ends_at) }),
                })?;

                notifications_repo.create(
                    NewNotification::new(
                        user_id,
                        NotificationKind::Wallet,
                        NotificationStatus::Used,
                        "Points used",
                        format!(
                            "{} points were used to feature \"{}\" for {} days. Balance: {}",
                            cost, listing.title, days, transaction.balance_after
                        ),
                    )
                    .with_listing(listing_id),
                )?;

                info!("Listing {} featured until {:?} by promotion {}", listing_id, featured_until, promotion.id);
                Ok(FeaturedPurchase {
                    promotion,
                    balance_after: transaction.balance_after,
                    featured_until,
                })
            })
            .map_err(|e| e.context("Service Promotions, purchase_featured endpoint error occurred.").into())
        })
    }

    fn expire_stale(&self) -> ServiceFuture<Vec<ListingPromotion>> {
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            expire_stale_promotions(&repo_factory, &*conn, SystemTime::now())
                .map_err(|e| e.context("Service Promotions, expire_stale endpoint error occurred.").into())
        })
    }

    fn promotion_events(&self, promotion_id: PromotionId) -> ServiceFuture<Vec<PromotionEvent>> {
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let events_repo = repo_factory.create_promotion_events_repo(&*conn);
            events_repo
                .list_for_promotion(promotion_id)
                .map_err(|e| e.context("Service Promotions, promotion_events endpoint error occurred.").into())
        })
    }
}
