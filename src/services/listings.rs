//! Listings service is the listing registry: creation with subtype rows,
//! the moderation state machine, owner actions and the public query.
//!
//! Classifier calls never run inside a transaction. The listing is committed
//! first, then the verdict is applied in a transaction of its own.

use std::cmp::Reverse;
use std::time::{Duration, SystemTime};

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Error as FailureError;
use futures::future;
use futures::prelude::*;
use r2d2::ManageConnection;
use validator::{Validate, ValidationErrors};

use super::types::ServiceFuture;
use clients::{classify_or_manual, moderation_text};
use errors::Error;
use models::*;
use repos::{AttributeValuesRepo, ItemsRepo, ListingsRepo, NotificationsRepo, PhotosRepo, ReposFactory, RequestsRepo};
use services::wallet::apply_points;
use services::Service;
use types::{ListingId, UserId};

/// Ledger reason for early republishing
pub const REPUBLISH_REASON: &str = "republish";
/// Lifetime of the "already viewed" marker of a session
pub const VIEW_MARKER_TTL_S: u64 = 30 * 24 * 60 * 60;

pub fn view_marker_key(session_key: &str, listing_id: ListingId) -> String {
    format!("viewed:{}:{}", session_key, listing_id)
}

fn not_found(listing_id: ListingId) -> FailureError {
    format_err!("Listing {} not found", listing_id).context(Error::NotFound).into()
}

fn invalid_payload(errors: ValidationErrors) -> FailureError {
    format_err!("Listing payload is not valid").context(Error::Validate(errors)).into()
}

fn live(listing: Option<Listing>) -> Option<Listing> {
    listing.and_then(|listing| if listing.is_deleted { None } else { Some(listing) })
}

/// Not deleted listing owned by `user_id`
fn owned_listing(listing: Option<Listing>, listing_id: ListingId, user_id: UserId) -> Result<Listing, FailureError> {
    let listing = live(listing).ok_or_else(|| not_found(listing_id))?;
    if listing.user_id != user_id {
        return Err(format_err!("User {} does not own listing {}", user_id, listing_id)
            .context(Error::NotOwner)
            .into());
    }
    Ok(listing)
}

/// Cancel and reactivate only move approved listings between shown and hidden
fn ensure_approved(listing: &Listing) -> Result<(), FailureError> {
    if listing.is_approved {
        Ok(())
    } else {
        Err(format_err!("Listing {} is not approved", listing.id)
            .context(Error::Forbidden)
            .into())
    }
}

fn ensure_not_featured(listing: &Listing, now: SystemTime) -> Result<(), FailureError> {
    if listing.is_featured(now) {
        Err(format_err!("Listing {} is featured until {:?}", listing.id, listing.featured_until)
            .context(Error::LockedWhileFeatured)
            .into())
    } else {
        Ok(())
    }
}

fn listing_notification(listing: &Listing, status: NotificationStatus, title: &str, body: String) -> NewNotification {
    NewNotification::new(listing.user_id, listing.listing_type.notification_kind(), status, title, body).with_listing(listing.id)
}

fn pending_notification(listing: &Listing) -> NewNotification {
    listing_notification(
        listing,
        NotificationStatus::Pending,
        "Listing under review",
        format!("\"{}\" is waiting for moderation", listing.title),
    )
}

fn rejected_notification(listing: &Listing, reason: &str) -> NewNotification {
    listing_notification(
        listing,
        NotificationStatus::Rejected,
        "Listing rejected",
        format!("\"{}\" was rejected: {}", listing.title, reason),
    )
}

fn load_details(
    items_repo: &ItemsRepo,
    requests_repo: &RequestsRepo,
    attribute_values_repo: &AttributeValuesRepo,
    photos_repo: &PhotosRepo,
    listing: Listing,
) -> Result<ListingDetails, FailureError> {
    let (item, request) = match listing.listing_type {
        ListingType::Item => (items_repo.find(listing.id)?, None),
        ListingType::Request => (None, requests_repo.find(listing.id)?),
    };
    let attributes = attribute_values_repo.list_for_listing(listing.listing_type, listing.id)?;
    let photos = photos_repo.list_for_listing(listing.id)?;
    let main = main_photo(&photos);
    Ok(ListingDetails {
        listing,
        item,
        request,
        attributes,
        photos,
        main_photo: main,
    })
}

fn load_cards(items_repo: &ItemsRepo, requests_repo: &RequestsRepo, listings: Vec<Listing>) -> Result<Vec<ListingCard>, FailureError> {
    let ids = listings.iter().map(|listing| listing.id).collect::<Vec<_>>();
    let items = items_repo.find_many(ids.clone())?;
    let requests = requests_repo.find_many(ids)?;
    Ok(listings
        .into_iter()
        .map(|listing| {
            let item = items.iter().find(|item| item.listing_id == listing.id).cloned();
            let request = requests.iter().find(|request| request.listing_id == listing.id).cloned();
            ListingCard { listing, item, request }
        })
        .collect())
}

/// Applies a classifier verdict. Only listings still waiting for review are
/// rejected, a moderator decision taken meanwhile wins.
fn apply_decision(
    listings_repo: &ListingsRepo,
    notifications_repo: &NotificationsRepo,
    listing_id: ListingId,
    decision: ModerationDecision,
) -> Result<Listing, FailureError> {
    let listing = listings_repo.find_for_update(listing_id)?.ok_or_else(|| not_found(listing_id))?;
    let is_pending = !listing.is_approved && listing.is_active && !listing.is_deleted;

    match decision {
        ModerationDecision::Reject { reason } => {
            if !is_pending {
                return Ok(listing);
            }
            let listing = listings_repo.update(
                listing_id,
                UpdateListing {
                    is_active: Some(false),
                    auto_rejected: Some(true),
                    moderation_reason: Some(reason.clone()),
                    ..Default::default()
                },
            )?;
            notifications_repo.create(rejected_notification(&listing, &reason))?;
            info!("Listing {} rejected automatically: {}", listing_id, reason);
            Ok(listing)
        }
        ModerationDecision::Manual => Ok(listing),
    }
}

pub trait ListingsService {
    /// Creates a listing with its subtype, waiting for moderation
    fn create_listing(&self, payload: CreateListing) -> ServiceFuture<ListingDetails>;
    /// Owner edit, sends the listing back to moderation
    fn edit_listing(&self, listing_id: ListingId, payload: EditListing) -> ServiceFuture<ListingDetails>;
    /// Applies a classifier verdict
    fn moderate_hook(&self, listing_id: ListingId, decision: ModerationDecision) -> ServiceFuture<Listing>;
    /// Moderator approval
    fn approve_listing(&self, listing_id: ListingId) -> ServiceFuture<Listing>;
    /// Moderator rejection
    fn reject_listing(&self, listing_id: ListingId, reason: String) -> ServiceFuture<Listing>;
    /// Hides an approved listing, it stays approved
    fn cancel_listing(&self, listing_id: ListingId, payload: CancelListing) -> ServiceFuture<Listing>;
    fn reactivate_listing(&self, listing_id: ListingId) -> ServiceFuture<Listing>;
    /// Idempotent soft delete
    fn delete_listing(&self, listing_id: ListingId) -> ServiceFuture<SoftDeleteResult>;
    /// Moves the listing to the top of the fresh ones, paid when done early
    fn republish_listing(&self, listing_id: ListingId) -> ServiceFuture<RepublishResult>;
    /// Counts a view at most once per session, returns whether it counted
    fn increment_view(&self, session_key: String, listing_id: ListingId) -> ServiceFuture<bool>;
    /// Public filtered query, featured listings first
    fn list_public(&self, search: ListingsSearch) -> ServiceFuture<Page<ListingCard>>;
    fn get_listing(&self, listing_id: ListingId) -> ServiceFuture<ListingDetails>;
    /// Not deleted listings of the caller
    fn list_mine(&self) -> ServiceFuture<Vec<ListingCard>>;
    fn add_photo(&self, listing_id: ListingId, payload: AddPhoto) -> ServiceFuture<ListingPhoto>;
    /// Anyone may report, signed in reporters are remembered
    fn report_listing(&self, listing_id: ListingId, payload: ReportListing) -> ServiceFuture<IssueReport>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > Service<T, M, F>
{
    /// Classifies the committed listing and applies the verdict
    fn moderate_after_commit(&self, listing: &Listing) -> ServiceFuture<Listing> {
        let service = self.clone();
        let listing_id = listing.id;
        let text = moderation_text(&listing.title, &listing.description);
        Box::new(
            classify_or_manual(&*self.static_context.classifier, text).and_then(move |decision| service.moderate_hook(listing_id, decision)),
        )
    }

    /// The listing is already stored, so a failed moderation leaves it pending
    /// instead of failing the request
    fn moderate_committed(&self, details: ListingDetails) -> ServiceFuture<ListingDetails> {
        let listing_id = details.listing.id;
        Box::new(self.moderate_after_commit(&details.listing).then(move |res| -> Result<ListingDetails, FailureError> {
            match res {
                Ok(listing) => Ok(ListingDetails { listing, ..details }),
                Err(e) => {
                    error!("Moderation of listing {} failed, it stays pending: {:?}", listing_id, e);
                    Ok(details)
                }
            }
        }))
    }
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > ListingsService for Service<T, M, F>
{
    fn create_listing(&self, payload: CreateListing) -> ServiceFuture<ListingDetails> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();
        let service = self.clone();

        let created = self.spawn_on_pool(move |conn| {
            let listings_repo = repo_factory.create_listings_repo(&*conn, Some(user_id));
            let items_repo = repo_factory.create_items_repo(&*conn);
            let requests_repo = repo_factory.create_requests_repo(&*conn);
            let attribute_values_repo = repo_factory.create_attribute_values_repo(&*conn);
            let photos_repo = repo_factory.create_photos_repo(&*conn);
            let categories_repo = repo_factory.create_categories_repo(&*conn);
            let notifications_repo = repo_factory.create_notifications_repo(&*conn);

            conn.transaction::<ListingDetails, FailureError, _>(move || {
                payload.validate().map_err(invalid_payload)?;
                let CreateListing {
                    listing_type,
                    category_id,
                    city,
                    title,
                    description,
                    show_phone,
                    item,
                    request,
                    attributes,
                } = payload;

                let category_id =
                    category_id.ok_or_else(|| format_err!("Listing without category").context(Error::CategoryRequired))?;
                if categories_repo.find(category_id)?.is_none() {
                    return Err(invalid_payload(
                        validation_errors!({"category_id": ["exists" => "Category does not exist"]}),
                    ));
                }

                match (listing_type, &item, &request) {
                    (ListingType::Item, &Some(ref item), _) => item.validate().map_err(invalid_payload)?,
                    (ListingType::Request, _, &Some(ref request)) => {
                        if let Some(budget) = request.budget {
                            if let Err(e) = validate_non_negative(budget) {
                                let mut errors = ValidationErrors::new();
                                errors.add("budget", e);
                                return Err(invalid_payload(errors));
                            }
                        }
                    }
                    (ListingType::Item, _, _) => {
                        return Err(invalid_payload(
                            validation_errors!({"item": ["required" => "Item details are required"]}),
                        ))
                    }
                    (ListingType::Request, _, _) => {
                        return Err(invalid_payload(
                            validation_errors!({"request": ["required" => "Request details are required"]}),
                        ))
                    }
                }

                let schema = categories_repo.list_attributes(category_id)?;
                validate_attribute_values(&schema, &attributes).map_err(invalid_payload)?;

                let listing = listings_repo.create(NewListing {
                    listing_type,
                    user_id,
                    category_id,
                    city,
                    title,
                    description,
                    is_approved: false,
                    is_active: true,
                    show_phone,
                    published_at: SystemTime::now(),
                })?;
                match listing_type {
                    ListingType::Item => {
                        if let Some(item) = item {
                            items_repo.create(NewItem {
                                listing_id: listing.id,
                                price: item.price,
                                condition: item.condition,
                            })?;
                        }
                    }
                    ListingType::Request => {
                        if let Some(request) = request {
                            requests_repo.create(NewRequest {
                                listing_id: listing.id,
                                budget: request.budget,
                                condition_preference: request.condition_preference,
                            })?;
                        }
                    }
                }
                attribute_values_repo.replace_for_listing(listing_type, listing.id, attributes)?;
                notifications_repo.create(pending_notification(&listing))?;

                info!("Listing {} of type {} created by user {}", listing.id, listing_type, user_id);
                load_details(&*items_repo, &*requests_repo, &*attribute_values_repo, &*photos_repo, listing)
            })
            .map_err(|e| e.context("Service Listings, create endpoint error occurred.").into())
        });

        Box::new(created.and_then(move |details| service.moderate_committed(details)))
    }

    fn edit_listing(&self, listing_id: ListingId, payload: EditListing) -> ServiceFuture<ListingDetails> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();
        let service = self.clone();

        let edited = self.spawn_on_pool(move |conn| {
            let listings_repo = repo_factory.create_listings_repo(&*conn, Some(user_id));
            let items_repo = repo_factory.create_items_repo(&*conn);
            let requests_repo = repo_factory.create_requests_repo(&*conn);
            let attribute_values_repo = repo_factory.create_attribute_values_repo(&*conn);
            let photos_repo = repo_factory.create_photos_repo(&*conn);
            let categories_repo = repo_factory.create_categories_repo(&*conn);
            let notifications_repo = repo_factory.create_notifications_repo(&*conn);

            conn.transaction::<ListingDetails, FailureError, _>(move || {
                payload.validate().map_err(invalid_payload)?;
                let listing = owned_listing(listings_repo.find_for_update(listing_id)?, listing_id, user_id)?;
                ensure_not_featured(&listing, SystemTime::now())?;

                let EditListing {
                    title,
                    description,
                    price,
                    condition,
                    attributes,
                } = payload;

                match listing.listing_type {
                    ListingType::Item => {
                        let update = UpdateItem {
                            price,
                            condition,
                            ..Default::default()
                        };
                        if !update.is_empty() {
                            items_repo.update(listing_id, update)?;
                        }
                    }
                    ListingType::Request => {
                        if price.is_some() || condition.is_some() {
                            return Err(invalid_payload(
                                validation_errors!({"price": ["item_only" => "Price and condition apply to items only"]}),
                            ));
                        }
                    }
                }

                if let Some(attributes) = attributes {
                    let schema = categories_repo.list_attributes(listing.category_id)?;
                    validate_attribute_values(&schema, &attributes).map_err(invalid_payload)?;
                    attribute_values_repo.replace_for_listing(listing.listing_type, listing_id, attributes)?;
                }

                // an auto rejected listing is resubmitted by editing it
                let listing = listings_repo.update(
                    listing_id,
                    UpdateListing {
                        title,
                        description,
                        is_approved: Some(false),
                        auto_rejected: Some(false),
                        was_edited: Some(true),
                        is_active: if listing.auto_rejected { Some(true) } else { None },
                        ..Default::default()
                    },
                )?;
                notifications_repo.create(pending_notification(&listing))?;

                info!("Listing {} edited by user {}, back to moderation", listing_id, user_id);
                load_details(&*items_repo, &*requests_repo, &*attribute_values_repo, &*photos_repo, listing)
            })
            .map_err(|e| e.context("Service Listings, edit endpoint error occurred.").into())
        });

        Box::new(edited.and_then(move |details| service.moderate_committed(details)))
    }

    fn moderate_hook(&self, listing_id: ListingId, decision: ModerationDecision) -> ServiceFuture<Listing> {
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let listings_repo = repo_factory.create_listings_repo(&*conn, None);
            let notifications_repo = repo_factory.create_notifications_repo(&*conn);

            conn.transaction::<Listing, FailureError, _>(move || apply_decision(&*listings_repo, &*notifications_repo, listing_id, decision))
                .map_err(|e| e.context("Service Listings, moderate_hook endpoint error occurred.").into())
        })
    }

    fn approve_listing(&self, listing_id: ListingId) -> ServiceFuture<Listing> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let listings_repo = repo_factory.create_listings_repo(&*conn, Some(user_id));
            let stores_repo = repo_factory.create_stores_repo(&*conn);
            let store_follows_repo = repo_factory.create_store_follows_repo(&*conn);
            let notifications_repo = repo_factory.create_notifications_repo(&*conn);

            conn.transaction::<Listing, FailureError, _>(move || {
                live(listings_repo.find_for_update(listing_id)?).ok_or_else(|| not_found(listing_id))?;
                let listing = listings_repo.moderate(
                    listing_id,
                    UpdateListing {
                        is_approved: Some(true),
                        is_active: Some(true),
                        auto_rejected: Some(false),
                        approved_by: Some(user_id),
                        approved_at: Some(SystemTime::now()),
                        ..Default::default()
                    },
                )?;
                notifications_repo.create(listing_notification(
                    &listing,
                    NotificationStatus::Approved,
                    "Listing approved",
                    format!("\"{}\" is now visible", listing.title),
                ))?;
                info!("Listing {} approved by user {}", listing_id, user_id);

                if listing.followers_notified {
                    return Ok(listing);
                }
                if let Some(store) = stores_repo.find_by_user(listing.user_id)? {
                    let followers = store_follows_repo.list_followers(store.id)?;
                    for follow in &followers {
                        notifications_repo.create(
                            NewNotification::new(
                                follow.user_id,
                                NotificationKind::StoreFollow,
                                NotificationStatus::Info,
                                "New listing",
                                format!("{} published \"{}\"", store.name, listing.title),
                            )
                            .with_listing(listing.id),
                        )?;
                    }
                    debug!("Notified {} followers of store {} about listing {}", followers.len(), store.id, listing_id);
                }
                listings_repo.update(
                    listing_id,
                    UpdateListing {
                        followers_notified: Some(true),
                        ..Default::default()
                    },
                )
            })
            .map_err(|e| e.context("Service Listings, approve endpoint error occurred.").into())
        })
    }

    fn reject_listing(&self, listing_id: ListingId, reason: String) -> ServiceFuture<Listing> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let listings_repo = repo_factory.create_listings_repo(&*conn, Some(user_id));
            let notifications_repo = repo_factory.create_notifications_repo(&*conn);

            conn.transaction::<Listing, FailureError, _>(move || {
                live(listings_repo.find_for_update(listing_id)?).ok_or_else(|| not_found(listing_id))?;
                let listing = listings_repo.moderate(
                    listing_id,
                    UpdateListing {
                        is_approved: Some(false),
                        is_active: Some(false),
                        rejected_by: Some(user_id),
                        rejected_at: Some(SystemTime::now()),
                        moderation_reason: Some(reason.clone()),
                        ..Default::default()
                    },
                )?;
                notifications_repo.create(rejected_notification(&listing, &reason))?;
                info!("Listing {} rejected by user {}", listing_id, user_id);
                Ok(listing)
            })
            .map_err(|e| e.context("Service Listings, reject endpoint error occurred.").into())
        })
    }

    fn cancel_listing(&self, listing_id: ListingId, payload: CancelListing) -> ServiceFuture<Listing> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let listings_repo = repo_factory.create_listings_repo(&*conn, Some(user_id));
            let items_repo = repo_factory.create_items_repo(&*conn);

            conn.transaction::<Listing, FailureError, _>(move || {
                let listing = owned_listing(listings_repo.find_for_update(listing_id)?, listing_id, user_id)?;
                ensure_approved(&listing)?;
                if listing.listing_type == ListingType::Item {
                    items_repo.update(
                        listing_id,
                        UpdateItem {
                            cancel_reason: Some(payload.reason),
                            sold_on_site: payload.sold_on_site,
                            ..Default::default()
                        },
                    )?;
                }
                listings_repo.update(
                    listing_id,
                    UpdateListing {
                        is_active: Some(false),
                        ..Default::default()
                    },
                )
            })
            .map_err(|e| e.context("Service Listings, cancel endpoint error occurred.").into())
        })
    }

    fn reactivate_listing(&self, listing_id: ListingId) -> ServiceFuture<Listing> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let listings_repo = repo_factory.create_listings_repo(&*conn, Some(user_id));

            conn.transaction::<Listing, FailureError, _>(move || {
                let listing = owned_listing(listings_repo.find_for_update(listing_id)?, listing_id, user_id)?;
                ensure_approved(&listing)?;
                listings_repo.update(
                    listing_id,
                    UpdateListing {
                        is_active: Some(true),
                        ..Default::default()
                    },
                )
            })
            .map_err(|e| e.context("Service Listings, reactivate endpoint error occurred.").into())
        })
    }

    fn delete_listing(&self, listing_id: ListingId) -> ServiceFuture<SoftDeleteResult> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let listings_repo = repo_factory.create_listings_repo(&*conn, Some(user_id));

            conn.transaction::<SoftDeleteResult, FailureError, _>(move || {
                let listing = listings_repo.find_for_update(listing_id)?.ok_or_else(|| not_found(listing_id))?;
                if listing.user_id != user_id {
                    return Err(format_err!("User {} does not own listing {}", user_id, listing_id)
                        .context(Error::NotOwner)
                        .into());
                }
                if listing.is_deleted {
                    return Ok(SoftDeleteResult {
                        ok: true,
                        already_deleted: true,
                    });
                }
                listings_repo.update(
                    listing_id,
                    UpdateListing {
                        is_deleted: Some(true),
                        is_active: Some(false),
                        deleted_at: Some(SystemTime::now()),
                        ..Default::default()
                    },
                )?;
                info!("Listing {} deleted by user {}", listing_id, user_id);
                Ok(SoftDeleteResult {
                    ok: true,
                    already_deleted: false,
                })
            })
            .map_err(|e| e.context("Service Listings, delete endpoint error occurred.").into())
        })
    }

    fn republish_listing(&self, listing_id: ListingId) -> ServiceFuture<RepublishResult> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let users_repo = repo_factory.create_users_repo(&*conn);
            let ledger_repo = repo_factory.create_points_transactions_repo_with_sys_acl(&*conn);
            let listings_repo = repo_factory.create_listings_repo(&*conn, Some(user_id));

            conn.transaction::<RepublishResult, FailureError, _>(move || {
                let now = SystemTime::now();
                let user = users_repo
                    .find_for_update(user_id)?
                    .ok_or_else(|| format_err!("User {} not found", user_id).context(Error::UserNotFound))?;
                let listing = owned_listing(listings_repo.find_for_update(listing_id)?, listing_id, user_id)?;
                ensure_approved(&listing)?;
                ensure_not_featured(&listing, now)?;

                let cost = republish_cost(listing.published_at, now);
                let balance_after = if cost > 0 {
                    let transaction = apply_points(
                        &*users_repo,
                        &*ledger_repo,
                        PointsChange {
                            meta: json!({ "listing_id": listing_id }),
                            ..PointsChange::spend(user_id, cost, REPUBLISH_REASON)
                        },
                    )?;
                    transaction.balance_after
                } else {
                    user.points
                };

                listings_repo.update(
                    listing_id,
                    UpdateListing {
                        published_at: Some(now),
                        is_active: Some(true),
                        ..Default::default()
                    },
                )?;
                info!("Listing {} republished by user {} for {} points", listing_id, user_id, cost);
                Ok(RepublishResult {
                    cost,
                    free: cost == 0,
                    balance_after,
                    published_at: now,
                })
            })
            .map_err(|e| e.context("Service Listings, republish endpoint error occurred.").into())
        })
    }

    fn increment_view(&self, session_key: String, listing_id: ListingId) -> ServiceFuture<bool> {
        let repo_factory = self.static_context.repo_factory.clone();
        let sessions = self.static_context.sessions.clone();

        self.spawn_on_pool(move |conn| {
            let listings_repo = repo_factory.create_listings_repo(&*conn, None);
            let marker = view_marker_key(&session_key, listing_id);
            let mut marked = false;

            let counted = conn.transaction::<bool, FailureError, _>(|| {
                listings_repo
                    .find(listing_id)?
                    .and_then(|listing| if listing.is_visible() { Some(listing) } else { None })
                    .ok_or_else(|| not_found(listing_id))?;
                if !sessions.set_if_absent(&marker, "1", Duration::from_secs(VIEW_MARKER_TTL_S))? {
                    return Ok(false);
                }
                marked = true;
                listings_repo.increment_views(listing_id)?;
                Ok(true)
            });

            if counted.is_err() && marked {
                // the view was not stored, so the session may count it again
                if let Err(e) = sessions.remove(&marker) {
                    warn!("Failed to release view marker {}: {}", marker, e);
                }
            }
            counted.map_err(|e| e.context("Service Listings, increment_view endpoint error occurred.").into())
        })
    }

    fn list_public(&self, search: ListingsSearch) -> ServiceFuture<Page<ListingCard>> {
        let repo_factory = self.static_context.repo_factory.clone();
        let service = self.clone();
        let text = search
            .text
            .as_ref()
            .map(|text| text.trim().to_string())
            .and_then(|text| if text.is_empty() { None } else { Some(text) });

        let search_ids: Box<Future<Item = Option<Vec<ListingId>>, Error = FailureError>> = match (self.static_context.search.clone(), text) {
            (Some(client), Some(text)) => Box::new(client.search_ids(text).then(|res| match res {
                Ok(ids) => Ok(Some(ids)),
                Err(e) => {
                    warn!("Listing search failed, falling back to substring match: {}", e);
                    Ok(None)
                }
            })),
            _ => Box::new(future::ok(None)),
        };

        Box::new(search_ids.and_then(move |ids| {
            service.spawn_on_pool(move |conn| {
                let listings_repo = repo_factory.create_listings_repo(&*conn, None);
                let items_repo = repo_factory.create_items_repo(&*conn);
                let requests_repo = repo_factory.create_requests_repo(&*conn);
                let categories_repo = repo_factory.create_categories_repo(&*conn);

                conn.transaction::<Page<ListingCard>, FailureError, _>(move || {
                    let now = SystemTime::now();
                    let page = page_number(search.page);
                    let category_ids = match search.category_id {
                        Some(root) => Some(category_closure(root, &categories_repo.list_all()?)),
                        None => None,
                    };
                    let published_after = search
                        .within_hours
                        .map(|hours| now - Duration::from_secs(u64::from(hours) * 60 * 60));

                    let mut listings = match ids {
                        // search ids are ranked by the search, so the page is cut here
                        Some(ids) => {
                            if ids.is_empty() {
                                vec![]
                            } else {
                                let mut listings = listings_repo.list_public(ListingsQuery {
                                    search,
                                    category_ids,
                                    ids: Some(ids.clone()),
                                    published_after,
                                    now,
                                    offset: 0,
                                    limit: ids.len() as i64,
                                })?;
                                let position = |listing: &Listing| ids.iter().position(|id| *id == listing.id).unwrap_or(ids.len());
                                listings.sort_by_key(|listing| {
                                    let featured = if listing.is_featured(now) { listing.featured_until } else { None };
                                    (Reverse(featured), position(listing))
                                });
                                listings
                                    .into_iter()
                                    .skip(page_offset(page) as usize)
                                    .take(PAGE_SIZE as usize + 1)
                                    .collect()
                            }
                        }
                        None => listings_repo.list_public(ListingsQuery {
                            search,
                            category_ids,
                            ids: None,
                            published_after,
                            now,
                            offset: page_offset(page),
                            limit: PAGE_SIZE + 1,
                        })?,
                    };

                    let has_next = listings.len() as i64 > PAGE_SIZE;
                    listings.truncate(PAGE_SIZE as usize);
                    Ok(Page {
                        items: load_cards(&*items_repo, &*requests_repo, listings)?,
                        page,
                        has_next,
                    })
                })
                .map_err(|e| e.context("Service Listings, list_public endpoint error occurred.").into())
            })
        }))
    }

    fn get_listing(&self, listing_id: ListingId) -> ServiceFuture<ListingDetails> {
        let current_user = self.dynamic_context.user_id;
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let listings_repo = repo_factory.create_listings_repo(&*conn, current_user);
            let items_repo = repo_factory.create_items_repo(&*conn);
            let requests_repo = repo_factory.create_requests_repo(&*conn);
            let attribute_values_repo = repo_factory.create_attribute_values_repo(&*conn);
            let photos_repo = repo_factory.create_photos_repo(&*conn);

            conn.transaction::<ListingDetails, FailureError, _>(move || {
                let listing = live(listings_repo.find(listing_id)?)
                    .and_then(|listing| {
                        if listing.is_visible() || Some(listing.user_id) == current_user {
                            Some(listing)
                        } else {
                            None
                        }
                    })
                    .ok_or_else(|| not_found(listing_id))?;
                load_details(&*items_repo, &*requests_repo, &*attribute_values_repo, &*photos_repo, listing)
            })
            .map_err(|e| e.context("Service Listings, get endpoint error occurred.").into())
        })
    }

    fn list_mine(&self) -> ServiceFuture<Vec<ListingCard>> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let listings_repo = repo_factory.create_listings_repo(&*conn, Some(user_id));
            let items_repo = repo_factory.create_items_repo(&*conn);
            let requests_repo = repo_factory.create_requests_repo(&*conn);

            listings_repo
                .list_by_owner(user_id)
                .and_then(|listings| load_cards(&*items_repo, &*requests_repo, listings))
                .map_err(|e| e.context("Service Listings, list_mine endpoint error occurred.").into())
        })
    }

    fn add_photo(&self, listing_id: ListingId, payload: AddPhoto) -> ServiceFuture<ListingPhoto> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let listings_repo = repo_factory.create_listings_repo(&*conn, Some(user_id));
            let photos_repo = repo_factory.create_photos_repo(&*conn);

            conn.transaction::<ListingPhoto, FailureError, _>(move || {
                payload.validate().map_err(invalid_payload)?;
                owned_listing(listings_repo.find_for_update(listing_id)?, listing_id, user_id)?;
                if payload.is_main {
                    photos_repo.clear_main(listing_id)?;
                }
                photos_repo.create(NewListingPhoto {
                    listing_id,
                    image: payload.image,
                    is_main: payload.is_main,
                })
            })
            .map_err(|e| e.context("Service Listings, add_photo endpoint error occurred.").into())
        })
    }

    fn report_listing(&self, listing_id: ListingId, payload: ReportListing) -> ServiceFuture<IssueReport> {
        let reporter_id = self.dynamic_context.user_id;
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let listings_repo = repo_factory.create_listings_repo(&*conn, reporter_id);
            let issue_reports_repo = repo_factory.create_issue_reports_repo(&*conn);

            conn.transaction::<IssueReport, FailureError, _>(move || {
                live(listings_repo.find(listing_id)?).ok_or_else(|| not_found(listing_id))?;
                let report = NewIssueReport {
                    listing_id,
                    reporter_id,
                    reason: payload.reason,
                    message: payload.message,
                };
                report.validate().map_err(invalid_payload)?;
                let report = issue_reports_repo.create(report)?;
                info!("Listing {} reported: {}", listing_id, report.reason);
                Ok(report)
            })
            .map_err(|e| e.context("Service Listings, report endpoint error occurred.").into())
        })
    }
}

#[cfg(test)]
pub mod tests {
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    use futures::future;
    use tokio_core::reactor::Core;

    use clients::moderation::tests::{flagged, FixedClassifier};
    use clients::moderation::{Classification, ModerationClassifier};
    use clients::ClientFuture;
    use clients::search::tests::FixedSearch;
    use errors::Error;
    use models::*;
    use repos::repo_factory::tests::*;
    use services::*;
    use types::*;

    fn item_payload(category_id: Option<CategoryId>, title: &str) -> CreateListing {
        CreateListing {
            listing_type: ListingType::Item,
            category_id,
            city: "Amman".to_string(),
            title: title.to_string(),
            description: "Barely used, with charger".to_string(),
            show_phone: true,
            item: Some(ItemPayload {
                price: 250.0,
                condition: ItemCondition::Used,
            }),
            request: None,
            attributes: vec![],
        }
    }

    fn is_validation_error(err: &::failure::Error) -> bool {
        match Error::kind_of(err) {
            Some(Error::Validate(_)) => true,
            _ => false,
        }
    }

    /// Owner with an approved item listing
    fn seed(db: &SharedMockDb) -> (User, Listing) {
        let mut db = db.lock().unwrap();
        let user = db.add_user(0);
        let category = db.add_category(None);
        let listing = db.add_listing(user.id, ListingType::Item, category.id);
        (user, listing)
    }

    #[test]
    fn test_create_listing_waits_for_moderation() {
        let db = MockDb::shared();
        let (user, category) = {
            let mut db = db.lock().unwrap();
            (db.add_user(0), db.add_category(None))
        };
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db.clone());

        let details = core.run(service.create_listing(item_payload(Some(category.id), "iPhone 12"))).unwrap();
        assert!(!details.listing.is_approved);
        assert!(details.listing.is_active);
        assert!(!details.listing.auto_rejected);
        assert_eq!(details.item.map(|item| item.price), Some(250.0));

        let notifications = db.lock().unwrap().notifications_of(user.id);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::Ad);
        assert_eq!(notifications[0].status, NotificationStatus::Pending);
    }

    #[test]
    fn test_create_rejects_links_and_missing_category() {
        let db = MockDb::shared();
        let (user, category) = {
            let mut db = db.lock().unwrap();
            (db.add_user(0), db.add_category(None))
        };
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db.clone());

        let err = core
            .run(service.create_listing(item_payload(Some(category.id), "Visit http://spam.example")))
            .unwrap_err();
        assert!(is_validation_error(&err));

        let err = core.run(service.create_listing(item_payload(None, "iPhone 12"))).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::CategoryRequired));

        let mut payload = item_payload(Some(category.id), "iPhone 12");
        payload.item = None;
        let err = core.run(service.create_listing(payload)).unwrap_err();
        assert!(is_validation_error(&err));

        let db = db.lock().unwrap();
        assert!(db.listings.is_empty());
        assert!(db.items.is_empty());
        assert!(db.notifications.is_empty());
    }

    #[test]
    fn test_create_checks_attribute_schema() {
        let db = MockDb::shared();
        let (user, category, attribute_id) = {
            let mut db = db.lock().unwrap();
            let user = db.add_user(0);
            let category = db.add_category(None);
            let attribute_id = AttributeId(db.next_id());
            db.attributes.push(AttributeWithOptions {
                attribute: Attribute {
                    id: attribute_id,
                    category_id: category.id,
                    name: "Storage".to_string(),
                    input_type: InputType::Number,
                    ui_type: "input".to_string(),
                    is_required: false,
                    position: 1,
                },
                options: vec![],
            });
            (user, category, attribute_id)
        };
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db.clone());

        let mut payload = item_payload(Some(category.id), "iPhone 12");
        payload.attributes = vec![NewAttributeValue {
            attribute_id,
            value: "a lot".to_string(),
        }];
        let err = core.run(service.create_listing(payload.clone())).unwrap_err();
        assert!(is_validation_error(&err));

        payload.attributes[0].value = "64".to_string();
        let details = core.run(service.create_listing(payload)).unwrap();
        assert_eq!(details.attributes.len(), 1);
        assert_eq!(details.attributes[0].value, "64");
    }

    #[test]
    fn test_flagged_listing_is_rejected_automatically() {
        let db = MockDb::shared();
        let (user, category) = {
            let mut db = db.lock().unwrap();
            (db.add_user(0), db.add_category(None))
        };
        let mut core = Core::new().unwrap();
        let collaborators = MockCollaborators {
            classifier: Arc::new(FixedClassifier(Some(flagged(&["violence"])))),
            ..Default::default()
        };
        let service = create_service_with(Some(user.id), db.clone(), collaborators);

        let details = core.run(service.create_listing(item_payload(Some(category.id), "Hunting knife"))).unwrap();
        assert!(details.listing.auto_rejected);
        assert!(!details.listing.is_active);
        assert_eq!(
            details.listing.moderation_reason,
            Some("Inappropriate content detected: violence".to_string())
        );

        let statuses = db
            .lock()
            .unwrap()
            .notifications_of(user.id)
            .iter()
            .map(|n| n.status)
            .collect::<Vec<_>>();
        assert_eq!(statuses, vec![NotificationStatus::Pending, NotificationStatus::Rejected]);
    }

    #[test]
    fn test_classifier_outage_leaves_listing_pending() {
        let db = MockDb::shared();
        let (user, category) = {
            let mut db = db.lock().unwrap();
            (db.add_user(0), db.add_category(None))
        };
        let mut core = Core::new().unwrap();
        let collaborators = MockCollaborators {
            classifier: Arc::new(FixedClassifier(None)),
            ..Default::default()
        };
        let service = create_service_with(Some(user.id), db.clone(), collaborators);

        let details = core.run(service.create_listing(item_payload(Some(category.id), "Bicycle"))).unwrap();
        assert!(!details.listing.auto_rejected);
        assert!(details.listing.is_active);
        assert!(!details.listing.is_approved);
    }

    /// Flags the text, then drops the listing row so applying the verdict fails
    struct VanishingClassifier(SharedMockDb);

    impl ModerationClassifier for VanishingClassifier {
        fn classify(&self, _text: String) -> ClientFuture<Classification> {
            self.0.lock().unwrap().listings.clear();
            Box::new(future::ok(flagged(&["spam"])))
        }
    }

    #[test]
    fn test_failed_moderation_still_returns_created_listing() {
        let db = MockDb::shared();
        let (user, category) = {
            let mut db = db.lock().unwrap();
            (db.add_user(0), db.add_category(None))
        };
        let mut core = Core::new().unwrap();
        let collaborators = MockCollaborators {
            classifier: Arc::new(VanishingClassifier(db.clone())),
            ..Default::default()
        };
        let service = create_service_with(Some(user.id), db.clone(), collaborators);

        let details = core.run(service.create_listing(item_payload(Some(category.id), "Bicycle"))).unwrap();
        assert_eq!(details.listing.title, "Bicycle");
        assert!(!details.listing.is_approved);
        assert!(!details.listing.auto_rejected);
        assert!(details.listing.is_active);
    }

    #[test]
    fn test_manual_decision_keeps_state() {
        let db = MockDb::shared();
        let (user, listing) = seed(&db);
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db.clone());

        let after = core.run(service.moderate_hook(listing.id, ModerationDecision::Manual)).unwrap();
        assert_eq!(after, listing);
    }

    #[test]
    fn test_late_auto_reject_does_not_override_approval() {
        let db = MockDb::shared();
        let (user, listing) = seed(&db);
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db.clone());

        let decision = ModerationDecision::Reject {
            reason: "spam".to_string(),
        };
        let after = core.run(service.moderate_hook(listing.id, decision)).unwrap();
        assert!(after.is_approved);
        assert!(after.is_active);
        assert!(!after.auto_rejected);
    }

    #[test]
    fn test_edit_sends_listing_back_to_moderation() {
        let db = MockDb::shared();
        let (user, listing) = seed(&db);
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db.clone());

        let payload = EditListing {
            title: Some("iPhone 12 Pro".to_string()),
            price: Some(300.0),
            ..Default::default()
        };
        let details = core.run(service.edit_listing(listing.id, payload)).unwrap();
        assert_eq!(details.listing.title, "iPhone 12 Pro");
        assert!(!details.listing.is_approved);
        assert!(details.listing.was_edited);
        assert_eq!(details.item.map(|item| item.price), Some(300.0));
        assert_eq!(
            db.lock().unwrap().notifications_of(user.id).last().map(|n| n.status),
            Some(NotificationStatus::Pending)
        );
    }

    #[test]
    fn test_edit_is_owner_only_and_locked_while_featured() {
        let db = MockDb::shared();
        let (user, listing) = seed(&db);
        let stranger = db.lock().unwrap().add_user(0);
        let mut core = Core::new().unwrap();

        let service = create_service(Some(stranger.id), db.clone());
        let err = core.run(service.edit_listing(listing.id, EditListing::default())).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::NotOwner));

        db.lock().unwrap().listing_mut(listing.id).featured_until = Some(SystemTime::now() + Duration::from_secs(3600));
        let service = create_service(Some(user.id), db.clone());
        let err = core.run(service.edit_listing(listing.id, EditListing::default())).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::LockedWhileFeatured));
        assert!(db.lock().unwrap().listing(listing.id).is_approved);
    }

    #[test]
    fn test_approve_fans_out_to_store_followers_once() {
        let db = MockDb::shared();
        let (owner, listing, moderator, follower) = {
            let mut db = db.lock().unwrap();
            let owner = db.add_user(0);
            let store = db.add_store(owner.id);
            let category = db.add_category(None);
            let listing = db.add_listing(owner.id, ListingType::Item, category.id);
            db.listing_mut(listing.id).is_approved = false;
            let moderator = db.add_user(0);
            db.add_role(moderator.id, Role::Moderator);
            let follower = db.add_user(0);
            let id = db.next_id();
            db.store_follows.push(StoreFollow {
                id: StoreFollowId(id),
                store_id: store.id,
                user_id: follower.id,
                created_at: SystemTime::now(),
            });
            (owner, listing, moderator, follower)
        };
        let mut core = Core::new().unwrap();
        let service = create_service(Some(moderator.id), db.clone());

        let approved = core.run(service.approve_listing(listing.id)).unwrap();
        assert!(approved.is_approved);
        assert!(approved.followers_notified);
        assert_eq!(approved.approved_by, Some(moderator.id));

        core.run(service.approve_listing(listing.id)).unwrap();

        let db = db.lock().unwrap();
        let fan_out = db.notifications_of(follower.id);
        assert_eq!(fan_out.len(), 1);
        assert_eq!(fan_out[0].kind, NotificationKind::StoreFollow);
        assert_eq!(fan_out[0].status, NotificationStatus::Info);
        assert!(db
            .notifications_of(owner.id)
            .iter()
            .all(|n| n.status == NotificationStatus::Approved));
    }

    #[test]
    fn test_plain_user_cannot_moderate() {
        let db = MockDb::shared();
        let (user, listing) = seed(&db);
        db.lock().unwrap().listing_mut(listing.id).is_approved = false;
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db.clone());

        let err = core.run(service.approve_listing(listing.id)).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::Forbidden));
        assert!(!db.lock().unwrap().listing(listing.id).is_approved);
    }

    #[test]
    fn test_moderator_rejects_listing() {
        let db = MockDb::shared();
        let (owner, listing) = seed(&db);
        let moderator = {
            let mut db = db.lock().unwrap();
            let moderator = db.add_user(0);
            db.add_role(moderator.id, Role::Moderator);
            moderator
        };
        let mut core = Core::new().unwrap();
        let service = create_service(Some(moderator.id), db.clone());

        let rejected = core.run(service.reject_listing(listing.id, "Duplicate".to_string())).unwrap();
        assert!(!rejected.is_approved);
        assert!(!rejected.is_active);
        assert_eq!(rejected.rejected_by, Some(moderator.id));
        assert_eq!(rejected.moderation_reason, Some("Duplicate".to_string()));
        assert_eq!(
            db.lock().unwrap().notifications_of(owner.id).last().map(|n| n.status),
            Some(NotificationStatus::Rejected)
        );
    }

    #[test]
    fn test_cancel_reactivate_and_delete() {
        let db = MockDb::shared();
        let (user, listing) = seed(&db);
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db.clone());

        let canceled = core
            .run(service.cancel_listing(
                listing.id,
                CancelListing {
                    reason: "Sold".to_string(),
                    sold_on_site: Some(true),
                },
            ))
            .unwrap();
        assert!(!canceled.is_active);
        assert!(canceled.is_approved);
        {
            let db = db.lock().unwrap();
            let item = db.items.iter().find(|i| i.listing_id == listing.id).unwrap();
            assert_eq!(item.cancel_reason, Some("Sold".to_string()));
            assert_eq!(item.sold_on_site, Some(true));
        }

        let reactivated = core.run(service.reactivate_listing(listing.id)).unwrap();
        assert!(reactivated.is_active);

        let first = core.run(service.delete_listing(listing.id)).unwrap();
        assert_eq!(
            first,
            SoftDeleteResult {
                ok: true,
                already_deleted: false
            }
        );
        let second = core.run(service.delete_listing(listing.id)).unwrap();
        assert!(second.already_deleted);
        let deleted = db.lock().unwrap().listing(listing.id);
        assert!(deleted.is_deleted);
        assert!(!deleted.is_active);
        assert!(deleted.deleted_at.is_some());

        let err = core.run(service.reactivate_listing(listing.id)).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::NotFound));
    }

    #[test]
    fn test_only_approved_listings_are_canceled_or_reactivated() {
        let db = MockDb::shared();
        let (user, listing) = seed(&db);
        let moderator = {
            let mut db = db.lock().unwrap();
            let moderator = db.add_user(0);
            db.add_role(moderator.id, Role::Moderator);
            moderator
        };
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db.clone());

        {
            let mut db = db.lock().unwrap();
            let listing = db.listing_mut(listing.id);
            listing.is_approved = false;
            listing.is_active = false;
            listing.rejected_by = Some(moderator.id);
        }
        let err = core.run(service.reactivate_listing(listing.id)).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::Forbidden));
        let rejected = db.lock().unwrap().listing(listing.id);
        assert!(!rejected.is_active);
        assert!(!rejected.is_approved);

        {
            let mut db = db.lock().unwrap();
            let listing = db.listing_mut(listing.id);
            listing.rejected_by = None;
            listing.auto_rejected = true;
            listing.moderation_reason = Some("Inappropriate content detected: spam".to_string());
        }
        let err = core.run(service.reactivate_listing(listing.id)).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::Forbidden));
        let auto_rejected = db.lock().unwrap().listing(listing.id);
        assert!(auto_rejected.auto_rejected);
        assert!(!auto_rejected.is_active);

        {
            let mut db = db.lock().unwrap();
            let listing = db.listing_mut(listing.id);
            listing.auto_rejected = false;
            listing.moderation_reason = None;
            listing.is_active = true;
        }
        let err = core
            .run(service.cancel_listing(
                listing.id,
                CancelListing {
                    reason: "Changed my mind".to_string(),
                    sold_on_site: None,
                },
            ))
            .unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::Forbidden));
        let db = db.lock().unwrap();
        assert!(db.listing(listing.id).is_active);
        let item = db.items.iter().find(|i| i.listing_id == listing.id).unwrap();
        assert_eq!(item.cancel_reason, None);
    }

    #[test]
    fn test_early_republish_is_paid() {
        let db = MockDb::shared();
        let (user, listing) = seed(&db);
        db.lock().unwrap().users[0].points = 30;
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db.clone());

        let result = core.run(service.republish_listing(listing.id)).unwrap();
        assert_eq!(result.cost, REPUBLISH_FEE);
        assert!(!result.free);
        assert_eq!(result.balance_after, 10);

        let db = db.lock().unwrap();
        assert_eq!(db.user(user.id).points, 10);
        assert_eq!(db.points_transactions.len(), 1);
        assert_eq!(db.points_transactions[0].reason, REPUBLISH_REASON);
        assert_eq!(db.listing(listing.id).published_at, result.published_at);
    }

    #[test]
    fn test_late_republish_is_free_and_reactivates() {
        let db = MockDb::shared();
        let (user, listing) = seed(&db);
        {
            let mut db = db.lock().unwrap();
            let listing = db.listing_mut(listing.id);
            listing.published_at = SystemTime::now() - Duration::from_secs(8 * 24 * 60 * 60);
            listing.is_active = false;
        }
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db.clone());

        let result = core.run(service.republish_listing(listing.id)).unwrap();
        assert!(result.free);
        assert_eq!(result.cost, 0);
        assert_eq!(result.balance_after, 0);

        let db = db.lock().unwrap();
        assert!(db.points_transactions.is_empty());
        assert!(db.listing(listing.id).is_active);
    }

    #[test]
    fn test_republish_failures_change_nothing() {
        let db = MockDb::shared();
        let (user, listing) = seed(&db);
        db.lock().unwrap().users[0].points = 5;
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db.clone());

        let err = core.run(service.republish_listing(listing.id)).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::NotEnoughPoints));
        assert_eq!(db.lock().unwrap().listing(listing.id).published_at, listing.published_at);

        db.lock().unwrap().listing_mut(listing.id).featured_until = Some(SystemTime::now() + Duration::from_secs(60));
        let err = core.run(service.republish_listing(listing.id)).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::LockedWhileFeatured));

        {
            let mut db = db.lock().unwrap();
            let listing = db.listing_mut(listing.id);
            listing.featured_until = None;
            listing.is_approved = false;
        }
        let err = core.run(service.republish_listing(listing.id)).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::Forbidden));
        assert_eq!(db.lock().unwrap().user(user.id).points, 5);
    }

    #[test]
    fn test_view_counts_once_per_session() {
        let db = MockDb::shared();
        let (_, listing) = seed(&db);
        let mut core = Core::new().unwrap();
        let service = create_service(None, db.clone());

        assert!(core.run(service.increment_view("session-a".to_string(), listing.id)).unwrap());
        assert!(!core.run(service.increment_view("session-a".to_string(), listing.id)).unwrap());
        assert!(core.run(service.increment_view("session-b".to_string(), listing.id)).unwrap());
        assert_eq!(db.lock().unwrap().listing(listing.id).views_count, 2);
    }

    #[test]
    fn test_failed_view_update_does_not_burn_session_marker() {
        let db = MockDb::shared();
        let (_, listing) = seed(&db);
        db.lock().unwrap().fail_view_updates = true;
        let mut core = Core::new().unwrap();
        let service = create_service(None, db.clone());

        assert!(core.run(service.increment_view("session-a".to_string(), listing.id)).is_err());
        assert_eq!(db.lock().unwrap().listing(listing.id).views_count, 0);

        db.lock().unwrap().fail_view_updates = false;
        assert!(core.run(service.increment_view("session-a".to_string(), listing.id)).unwrap());
        assert_eq!(db.lock().unwrap().listing(listing.id).views_count, 1);
    }

    #[test]
    fn test_public_list_puts_featured_first_and_hides_pending() {
        let db = MockDb::shared();
        let (first, second, third) = {
            let mut db = db.lock().unwrap();
            let user = db.add_user(0);
            let category = db.add_category(None);
            let first = db.add_listing(user.id, ListingType::Item, category.id);
            let second = db.add_listing(user.id, ListingType::Item, category.id);
            let third = db.add_listing(user.id, ListingType::Request, category.id);
            db.listing_mut(first.id).featured_until = Some(SystemTime::now() + Duration::from_secs(3600));
            db.listing_mut(second.id).is_approved = false;
            (first, second, third)
        };
        let mut core = Core::new().unwrap();
        let service = create_service(None, db.clone());

        let page = core.run(service.list_public(ListingsSearch::default())).unwrap();
        let ids = page.items.iter().map(|card| card.listing.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![first.id, third.id]);
        assert!(!ids.contains(&second.id));
        assert!(!page.has_next);
        assert!(page.items[1].request.is_some());
    }

    #[test]
    fn test_public_list_pages_by_27() {
        let db = MockDb::shared();
        {
            let mut db = db.lock().unwrap();
            let user = db.add_user(0);
            let category = db.add_category(None);
            for _ in 0..28 {
                db.add_listing(user.id, ListingType::Item, category.id);
            }
        }
        let mut core = Core::new().unwrap();
        let service = create_service(None, db.clone());

        let first = core.run(service.list_public(ListingsSearch::default())).unwrap();
        assert_eq!(first.items.len(), 27);
        assert!(first.has_next);

        let search = ListingsSearch {
            page: Some(2),
            ..Default::default()
        };
        let second = core.run(service.list_public(search)).unwrap();
        assert_eq!(second.page, 2);
        assert_eq!(second.items.len(), 1);
        assert!(!second.has_next);
    }

    #[test]
    fn test_public_list_includes_subcategories() {
        let db = MockDb::shared();
        let (root, inside, outside) = {
            let mut db = db.lock().unwrap();
            let user = db.add_user(0);
            let root = db.add_category(None);
            let child = db.add_category(Some(root.id));
            let other = db.add_category(None);
            let inside = db.add_listing(user.id, ListingType::Item, child.id);
            let outside = db.add_listing(user.id, ListingType::Item, other.id);
            (root, inside, outside)
        };
        let mut core = Core::new().unwrap();
        let service = create_service(None, db.clone());

        let search = ListingsSearch {
            category_id: Some(root.id),
            ..Default::default()
        };
        let page = core.run(service.list_public(search)).unwrap();
        let ids = page.items.iter().map(|card| card.listing.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![inside.id]);
        assert!(!ids.contains(&outside.id));
    }

    #[test]
    fn test_public_list_keeps_search_order() {
        let db = MockDb::shared();
        let (first, second, third) = {
            let mut db = db.lock().unwrap();
            let user = db.add_user(0);
            let category = db.add_category(None);
            (
                db.add_listing(user.id, ListingType::Item, category.id),
                db.add_listing(user.id, ListingType::Item, category.id),
                db.add_listing(user.id, ListingType::Item, category.id),
            )
        };
        let mut core = Core::new().unwrap();
        let collaborators = MockCollaborators {
            search: Some(Arc::new(FixedSearch(Some(vec![first.id, third.id])))),
            ..Default::default()
        };
        let service = create_service_with(None, db.clone(), collaborators);

        let search = ListingsSearch {
            text: Some("phone".to_string()),
            ..Default::default()
        };
        let page = core.run(service.list_public(search)).unwrap();
        let ids = page.items.iter().map(|card| card.listing.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![first.id, third.id]);
        assert!(!ids.contains(&second.id));
    }

    #[test]
    fn test_search_outage_falls_back_to_substring() {
        let db = MockDb::shared();
        let bicycle = {
            let mut db = db.lock().unwrap();
            let user = db.add_user(0);
            let category = db.add_category(None);
            let bicycle = db.add_listing(user.id, ListingType::Item, category.id);
            db.add_listing(user.id, ListingType::Item, category.id);
            db.listing_mut(bicycle.id).title = "Red Bicycle".to_string();
            bicycle
        };
        let mut core = Core::new().unwrap();
        let collaborators = MockCollaborators {
            search: Some(Arc::new(FixedSearch(None))),
            ..Default::default()
        };
        let service = create_service_with(None, db.clone(), collaborators);

        let search = ListingsSearch {
            text: Some("bicycle".to_string()),
            ..Default::default()
        };
        let page = core.run(service.list_public(search)).unwrap();
        let ids = page.items.iter().map(|card| card.listing.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![bicycle.id]);
    }

    #[test]
    fn test_pending_listing_is_visible_to_owner_only() {
        let db = MockDb::shared();
        let (owner, listing) = seed(&db);
        let stranger = {
            let mut db = db.lock().unwrap();
            db.listing_mut(listing.id).is_approved = false;
            db.add_user(0)
        };
        let mut core = Core::new().unwrap();

        let service = create_service(Some(stranger.id), db.clone());
        let err = core.run(service.get_listing(listing.id)).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::NotFound));

        let service = create_service(Some(owner.id), db.clone());
        let details = core.run(service.get_listing(listing.id)).unwrap();
        assert_eq!(details.listing.id, listing.id);

        let mine = core.run(service.list_mine()).unwrap();
        assert_eq!(mine.len(), 1);
        assert!(mine[0].item.is_some());
    }

    #[test]
    fn test_main_photo_is_exclusive() {
        let db = MockDb::shared();
        let (user, listing) = seed(&db);
        let stranger = db.lock().unwrap().add_user(0);
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db.clone());

        let photo = |image: &str, is_main: bool| AddPhoto {
            image: image.to_string(),
            is_main,
        };
        let first = core.run(service.add_photo(listing.id, photo("a.jpg", true))).unwrap();
        let second = core.run(service.add_photo(listing.id, photo("b.jpg", true))).unwrap();

        let details = core.run(service.get_listing(listing.id)).unwrap();
        assert_eq!(details.photos.iter().filter(|p| p.is_main).count(), 1);
        assert_eq!(details.main_photo.map(|p| p.id), Some(second.id));
        assert!(details.photos.iter().any(|p| p.id == first.id && !p.is_main));

        let service = create_service(Some(stranger.id), db.clone());
        let err = core.run(service.add_photo(listing.id, photo("c.jpg", false))).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::NotOwner));
    }

    #[test]
    fn test_anonymous_report_is_validated() {
        let db = MockDb::shared();
        let (_, listing) = seed(&db);
        let mut core = Core::new().unwrap();
        let service = create_service(None, db.clone());

        let report = core
            .run(service.report_listing(
                listing.id,
                ReportListing {
                    reason: "scam".to_string(),
                    message: "Asks for prepayment".to_string(),
                },
            ))
            .unwrap();
        assert_eq!(report.reporter_id, None);

        let err = core
            .run(service.report_listing(
                listing.id,
                ReportListing {
                    reason: "scam".to_string(),
                    message: "see www.proof.example".to_string(),
                },
            ))
            .unwrap_err();
        assert!(is_validation_error(&err));
        assert_eq!(db.lock().unwrap().issue_reports.len(), 1);
    }
}
