//! Featured promotions bought with points
use std::time::{Duration, SystemTime};

use serde_json;

use schema::{listing_promotions, promotion_events};
use types::{ListingId, PromotionEventId, PromotionId};

/// Featured packages: days to points
pub const FEATURED_PACKAGES: [(i32, i32); 3] = [(3, 30), (7, 60), (14, 100)];

/// Ledger reason for featured purchases
pub const FEATURED_REASON: &str = "featured_listing";

/// Points cost of a featured package, `None` for unknown durations
pub fn featured_cost(days: i32) -> Option<i32> {
    FEATURED_PACKAGES
        .iter()
        .find(|&&(package_days, _)| package_days == days)
        .map(|&(_, cost)| cost)
}

pub fn days_to_duration(count: i32) -> Duration {
    Duration::from_secs(count.max(0) as u64 * 24 * 60 * 60)
}

varchar_enum! {
    #[serde(rename_all = "snake_case")]
    pub enum PromotionKind {
        Featured => "featured",
    }
}

varchar_enum! {
    #[serde(rename_all = "snake_case")]
    pub enum PromotionStatus {
        Pending => "pending",
        Active => "active",
        Expired => "expired",
        Canceled => "canceled",
        Failed => "failed",
    }
}

varchar_enum! {
    #[serde(rename_all = "snake_case")]
    pub enum PromotionEventKind {
        Created => "created",
        PointsSpent => "points_spent",
        Activated => "activated",
        Expired => "expired",
    }
}

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct ListingPromotion {
    pub id: PromotionId,
    pub listing_id: ListingId,
    pub kind: PromotionKind,
    pub status: PromotionStatus,
    pub duration_days: i32,
    pub points_cost: i32,
    pub paid_with_points: bool,
    pub paid_at: Option<SystemTime>,
    pub starts_at: Option<SystemTime>,
    pub ends_at: Option<SystemTime>,
    pub activated_at: Option<SystemTime>,
    pub expired_at: Option<SystemTime>,
    pub created_at: SystemTime,
}

impl ListingPromotion {
    /// Active and not yet ended at `now`
    pub fn is_running(&self, now: SystemTime) -> bool {
        self.status == PromotionStatus::Active && self.ends_at.map(|ends_at| ends_at > now).unwrap_or(false)
    }
}

#[derive(Serialize, Deserialize, Insertable, Clone, Debug)]
#[table_name = "listing_promotions"]
pub struct NewListingPromotion {
    pub listing_id: ListingId,
    pub kind: PromotionKind,
    pub status: PromotionStatus,
    pub duration_days: i32,
    pub points_cost: i32,
    pub paid_with_points: bool,
    pub paid_at: Option<SystemTime>,
}

#[derive(Serialize, Deserialize, AsChangeset, Clone, Debug, Default)]
#[table_name = "listing_promotions"]
pub struct UpdateListingPromotion {
    pub status: Option<PromotionStatus>,
    pub starts_at: Option<SystemTime>,
    pub ends_at: Option<SystemTime>,
    pub activated_at: Option<SystemTime>,
    pub expired_at: Option<SystemTime>,
}

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct PromotionEvent {
    pub id: PromotionEventId,
    pub promotion_id: PromotionId,
    pub kind: PromotionEventKind,
    pub meta: serde_json::Value,
    pub created_at: SystemTime,
}

#[derive(Serialize, Deserialize, Insertable, Clone, Debug)]
#[table_name = "promotion_events"]
pub struct NewPromotionEvent {
    pub promotion_id: PromotionId,
    pub kind: PromotionEventKind,
    pub meta: serde_json::Value,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct PurchaseFeatured {
    pub listing_id: ListingId,
    pub days: i32,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct FeaturedPurchase {
    pub promotion: ListingPromotion,
    pub balance_after: i32,
    pub featured_until: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_featured_packages() {
        assert_eq!(featured_cost(3), Some(30));
        assert_eq!(featured_cost(7), Some(60));
        assert_eq!(featured_cost(14), Some(100));
        assert_eq!(featured_cost(5), None);
        assert_eq!(featured_cost(0), None);
    }
}
