//! Listing unifies items for sale and wanted requests
use std::cmp::Ordering;
use std::time::{Duration, SystemTime};

use validator::Validate;

use models::attribute::{AttributeValue, NewAttributeValue};
use models::item::{Item, ItemCondition};
use models::notification::NotificationKind;
use models::photo::ListingPhoto;
use models::request::{ConditionPreference, Request};
use models::validation_rules::*;
use schema::listings;
use types::{CategoryId, ListingId, UserId};

/// Early republish fee in points
pub const REPUBLISH_FEE: i32 = 20;
/// Republishing is free once this many days passed since the last publish
pub const REPUBLISH_FREE_AFTER_DAYS: u64 = 7;

const SECONDS_IN_DAY: u64 = 24 * 60 * 60;

varchar_enum! {
    #[serde(rename_all = "snake_case")]
    pub enum ListingType {
        Item => "item",
        Request => "request",
    }
}

impl ListingType {
    /// Notification family for events of this listing type
    pub fn notification_kind(&self) -> NotificationKind {
        match *self {
            ListingType::Item => NotificationKind::Ad,
            ListingType::Request => NotificationKind::Request,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct Listing {
    pub id: ListingId,
    pub listing_type: ListingType,
    pub user_id: UserId,
    pub category_id: CategoryId,
    pub city: String,
    pub title: String,
    pub description: String,
    pub is_approved: bool,
    pub auto_rejected: bool,
    pub moderation_reason: Option<String>,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<SystemTime>,
    pub rejected_by: Option<UserId>,
    pub rejected_at: Option<SystemTime>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub deleted_at: Option<SystemTime>,
    pub was_edited: bool,
    pub followers_notified: bool,
    pub featured_until: Option<SystemTime>,
    pub views_count: i32,
    pub show_phone: bool,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    pub published_at: SystemTime,
}

impl Listing {
    /// Public surfaces only ever show approved, active, not deleted listings
    pub fn is_visible(&self) -> bool {
        self.is_approved && self.is_active && !self.is_deleted
    }

    pub fn is_featured(&self, now: SystemTime) -> bool {
        self.featured_until.map(|until| until > now).unwrap_or(false)
    }
}

#[derive(Serialize, Deserialize, Insertable, Clone, Debug)]
#[table_name = "listings"]
pub struct NewListing {
    pub listing_type: ListingType,
    pub user_id: UserId,
    pub category_id: CategoryId,
    pub city: String,
    pub title: String,
    pub description: String,
    pub is_approved: bool,
    pub is_active: bool,
    pub show_phone: bool,
    pub published_at: SystemTime,
}

/// Changeset for every listing column except the promotion cache
#[derive(Serialize, Deserialize, AsChangeset, Clone, Debug, Default)]
#[table_name = "listings"]
pub struct UpdateListing {
    pub category_id: Option<CategoryId>,
    pub city: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_approved: Option<bool>,
    pub auto_rejected: Option<bool>,
    pub moderation_reason: Option<String>,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<SystemTime>,
    pub rejected_by: Option<UserId>,
    pub rejected_at: Option<SystemTime>,
    pub is_active: Option<bool>,
    pub is_deleted: Option<bool>,
    pub deleted_at: Option<SystemTime>,
    pub was_edited: Option<bool>,
    pub followers_notified: Option<bool>,
    pub show_phone: Option<bool>,
    pub updated_at: Option<SystemTime>,
    pub published_at: Option<SystemTime>,
}

#[derive(Serialize, Deserialize, Validate, Clone, Debug)]
pub struct ItemPayload {
    #[validate(custom = "validate_non_negative")]
    pub price: f64,
    pub condition: ItemCondition,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RequestPayload {
    pub budget: Option<f64>,
    pub condition_preference: ConditionPreference,
}

/// Payload for creating listings, `item` or `request` must match `listing_type`
#[derive(Serialize, Deserialize, Validate, Clone, Debug)]
pub struct CreateListing {
    pub listing_type: ListingType,
    pub category_id: Option<CategoryId>,
    #[validate(length(min = "1", max = "100"))]
    pub city: String,
    #[validate(length(min = "1", max = "200"), custom = "validate_content")]
    pub title: String,
    #[validate(custom = "validate_content")]
    pub description: String,
    pub show_phone: bool,
    pub item: Option<ItemPayload>,
    pub request: Option<RequestPayload>,
    pub attributes: Vec<NewAttributeValue>,
}

/// Owner edits, only these fields are mutable
#[derive(Serialize, Deserialize, Validate, Clone, Debug, Default)]
pub struct EditListing {
    #[validate(length(min = "1", max = "200"), custom = "validate_content")]
    pub title: Option<String>,
    #[validate(custom = "validate_content")]
    pub description: Option<String>,
    #[validate(custom = "validate_non_negative")]
    pub price: Option<f64>,
    pub condition: Option<ItemCondition>,
    pub attributes: Option<Vec<NewAttributeValue>>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CancelListing {
    pub reason: String,
    pub sold_on_site: Option<bool>,
}

/// Classifier verdict applied to a pending listing
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum ModerationDecision {
    Reject { reason: String },
    Manual,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct SoftDeleteResult {
    pub ok: bool,
    pub already_deleted: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct RepublishResult {
    pub cost: i32,
    pub free: bool,
    pub balance_after: i32,
    pub published_at: SystemTime,
}

/// Points charged for republishing a listing published at `published_at`
pub fn republish_cost(published_at: SystemTime, now: SystemTime) -> i32 {
    let age = now.duration_since(published_at).unwrap_or_else(|_| Duration::from_secs(0));
    if age >= Duration::from_secs(REPUBLISH_FREE_AFTER_DAYS * SECONDS_IN_DAY) {
        0
    } else {
        REPUBLISH_FEE
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SellerType {
    Store,
    Individual,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum SortBy {
    #[serde(rename = "latest")]
    Latest,
    #[serde(rename = "priceAsc")]
    PriceAsc,
    #[serde(rename = "priceDesc")]
    PriceDesc,
    #[serde(rename = "budgetAsc")]
    BudgetAsc,
    #[serde(rename = "budgetDesc")]
    BudgetDesc,
}

impl Default for SortBy {
    fn default() -> Self {
        SortBy::Latest
    }
}

/// Public listings filter
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ListingsSearch {
    pub text: Option<String>,
    pub listing_type: Option<ListingType>,
    pub category_id: Option<CategoryId>,
    pub city: Option<String>,
    pub price_from: Option<f64>,
    pub price_to: Option<f64>,
    pub budget_from: Option<f64>,
    pub budget_to: Option<f64>,
    pub condition: Option<ItemCondition>,
    pub seller_type: Option<SellerType>,
    pub within_hours: Option<u32>,
    #[serde(default)]
    pub sort: SortBy,
    /// 1-based
    pub page: Option<i64>,
}

/// Filter resolved by the service before hitting the repo
#[derive(Clone, Debug)]
pub struct ListingsQuery {
    pub search: ListingsSearch,
    /// category closure, `None` means any category
    pub category_ids: Option<Vec<CategoryId>>,
    /// ids returned by the search collaborator, `None` falls back to substring match
    pub ids: Option<Vec<ListingId>>,
    pub published_after: Option<SystemTime>,
    pub now: SystemTime,
    pub offset: i64,
    pub limit: i64,
}

/// Values a listing is ranked by on public surfaces
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PublicSortKey {
    pub id: ListingId,
    pub featured_until: Option<SystemTime>,
    pub published_at: SystemTime,
    /// price for items, budget for requests
    pub amount: Option<f64>,
}

impl PublicSortKey {
    pub fn new(listing: &Listing, amount: Option<f64>) -> Self {
        Self {
            id: listing.id,
            featured_until: listing.featured_until,
            published_at: listing.published_at,
            amount,
        }
    }
}

fn cmp_amount(a: Option<f64>, b: Option<f64>, ascending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        }
        // missing amounts go last in both directions
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Public ordering: featured first (later `featured_until` wins), then the
/// selected sort, then fresher `published_at`, then higher id.
pub fn cmp_public(a: &PublicSortKey, b: &PublicSortKey, sort: SortBy, now: SystemTime) -> Ordering {
    let featured = |key: &PublicSortKey| key.featured_until.and_then(|until| if until > now { Some(until) } else { None });

    let by_featured = match (featured(a), featured(b)) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    let by_sort = match sort {
        SortBy::Latest => Ordering::Equal,
        SortBy::PriceAsc | SortBy::BudgetAsc => cmp_amount(a.amount, b.amount, true),
        SortBy::PriceDesc | SortBy::BudgetDesc => cmp_amount(a.amount, b.amount, false),
    };

    by_featured
        .then(by_sort)
        .then_with(|| b.published_at.cmp(&a.published_at))
        .then_with(|| b.id.cmp(&a.id))
}

/// Listing row with its subtype for list views
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ListingCard {
    pub listing: Listing,
    pub item: Option<Item>,
    pub request: Option<Request>,
}

/// Full listing view
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ListingDetails {
    pub listing: Listing,
    pub item: Option<Item>,
    pub request: Option<Request>,
    pub attributes: Vec<AttributeValue>,
    pub photos: Vec<ListingPhoto>,
    pub main_photo: Option<ListingPhoto>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: i32, featured_secs: Option<u64>, published_secs: u64, amount: Option<f64>) -> PublicSortKey {
        let epoch = SystemTime::UNIX_EPOCH;
        PublicSortKey {
            id: ListingId(id),
            featured_until: featured_secs.map(|s| epoch + Duration::from_secs(s)),
            published_at: epoch + Duration::from_secs(published_secs),
            amount,
        }
    }

    #[test]
    fn test_featured_sorts_before_fresh() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let mut keys = vec![
            key(1, None, 900, None),
            key(2, Some(2_000), 100, None),
            key(3, Some(500), 950, None),
            key(4, Some(3_000), 50, None),
        ];
        keys.sort_by(|a, b| cmp_public(a, b, SortBy::Latest, now));
        let ids = keys.iter().map(|k| k.id.0).collect::<Vec<_>>();
        // listing 3 is no longer featured
        assert_eq!(ids, vec![4, 2, 3, 1]);
    }

    #[test]
    fn test_price_sort_is_secondary() {
        let now = SystemTime::UNIX_EPOCH;
        let mut keys = vec![
            key(1, None, 10, Some(30.0)),
            key(2, None, 20, Some(10.0)),
            key(3, Some(100), 5, Some(99.0)),
            key(4, None, 30, None),
        ];
        keys.sort_by(|a, b| cmp_public(a, b, SortBy::PriceAsc, now));
        let ids = keys.iter().map(|k| k.id.0).collect::<Vec<_>>();
        assert_eq!(ids, vec![3, 2, 1, 4]);
    }

    #[test]
    fn test_republish_pricing() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(30 * SECONDS_IN_DAY);
        assert_eq!(republish_cost(now - Duration::from_secs(3 * SECONDS_IN_DAY), now), REPUBLISH_FEE);
        assert_eq!(republish_cost(now - Duration::from_secs(7 * SECONDS_IN_DAY), now), 0);
        assert_eq!(republish_cost(now - Duration::from_secs(20 * SECONDS_IN_DAY), now), 0);
    }
}
