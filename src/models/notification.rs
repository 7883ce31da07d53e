//! Stored notifications, the client polls them
use std::time::SystemTime;

use schema::notifications;
use types::{ListingId, NotificationId, UserId};

/// Upper bound for a single notifications page
pub const NOTIFICATIONS_MAX_LIMIT: i64 = 100;

varchar_enum! {
    #[serde(rename_all = "snake_case")]
    pub enum NotificationKind {
        Request => "request",
        Ad => "ad",
        Wallet => "wallet",
        Fav => "fav",
        System => "system",
        StoreFollow => "store_follow",
    }
}

varchar_enum! {
    #[serde(rename_all = "snake_case")]
    pub enum NotificationStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        FeaturedExpired => "featured_expired",
        Charged => "charged",
        Used => "used",
        Reward => "reward",
        Added => "added",
        Info => "info",
        Followed => "followed",
        Unfollowed => "unfollowed",
    }
}

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub status: NotificationStatus,
    pub title: String,
    pub body: String,
    pub listing_id: Option<ListingId>,
    pub is_read: bool,
    pub created_at: SystemTime,
}

#[derive(Serialize, Deserialize, Insertable, Clone, Debug, PartialEq)]
#[table_name = "notifications"]
pub struct NewNotification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub status: NotificationStatus,
    pub title: String,
    pub body: String,
    pub listing_id: Option<ListingId>,
}

impl NewNotification {
    pub fn new(user_id: UserId, kind: NotificationKind, status: NotificationStatus, title: &str, body: String) -> Self {
        Self {
            user_id,
            kind,
            status,
            title: title.to_string(),
            body,
            listing_id: None,
        }
    }

    pub fn with_listing(mut self, listing_id: ListingId) -> Self {
        self.listing_id = Some(listing_id);
        self
    }
}

/// Clamps a requested page size to 1..=100
pub fn clamp_limit(limit: i64) -> i64 {
    if limit < 1 {
        1
    } else if limit > NOTIFICATIONS_MAX_LIMIT {
        NOTIFICATIONS_MAX_LIMIT
    } else {
        limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(-5), 1);
        assert_eq!(clamp_limit(20), 20);
        assert_eq!(clamp_limit(500), NOTIFICATIONS_MAX_LIMIT);
    }

    #[test]
    fn test_serde_names_match_stored_names() {
        for status in &[NotificationStatus::FeaturedExpired, NotificationStatus::Unfollowed] {
            let json = ::serde_json::to_string(status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            let parsed: NotificationStatus = ::serde_json::from_str(&json).unwrap();
            assert_eq!(&parsed, status);
        }
        let kind: NotificationKind = ::serde_json::from_str("\"store_follow\"").unwrap();
        assert_eq!(kind, NotificationKind::StoreFollow);
        assert_eq!("store_follow".parse::<NotificationKind>().unwrap(), kind);
    }
}
